use crate::error::Result;
use crate::events::{CreateEvent, MapEvent, Position, Rect, WindowEvent, WindowId, WindowRecord};
use crate::trace_if_enabled;
use crate::xsnow_error;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use x11rb::atom_manager;
use x11rb::connection::Connection;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xinerama::ConnectionExt as _;
use x11rb::protocol::xproto::{
    self, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ColormapAlloc,
    ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask, ExposeEvent, KeyButMask,
    MapState, PropMode, VisualClass, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::NONE;

use super::r#trait::{
    select_monitor, OverlayInfo, OverlayRequest, OverlayWindows, WindowOracle, WindowSystem,
};
use crate::config::Stacking;

atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_CURRENT_DESKTOP,
        _NET_WM_DESKTOP,
        _NET_ACTIVE_WINDOW,
        _NET_WM_STATE,
        _NET_WM_STATE_STICKY,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_BELOW,
        _NET_WM_STATE_ABOVE,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DOCK,
        _MOTIF_WM_HINTS,
    }
}

/// `_NET_WM_DESKTOP` окна, видимого на всех рабочих пространствах
const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;
/// Бит SendEvent в response_type
const SEND_EVENT_BIT: u8 = 0x80;
/// `PointerRoot` в ответе GetInputFocus
const POINTER_ROOT: u32 = 1;
const WM_CLASS: &[u8] = b"xsnow\0xsnow\0";

const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;

pub struct X11Desktop {
    conn: RustConnection,
    screen_num: usize,
    root: xproto::Window,
    atoms: Atoms,
    last_active: Mutex<Option<WindowId>>,
}

impl X11Desktop {
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let display_name = display.unwrap_or("$DISPLAY");
        info!("Подключение к X-серверу (дисплей: {})", display_name);

        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn)?.reply()?;

        // Подписка на структурные изменения окон верхнего уровня и свойства корня
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE,
            ),
        )?
        .check()?;
        conn.flush()?;

        let desktop = Self {
            conn,
            screen_num,
            root,
            atoms,
            last_active: Mutex::new(None),
        };
        *desktop.last_active.lock() = desktop.active_window();

        info!("X-сервер подключён, корневое окно {}", WindowId(root));
        Ok(desktop)
    }

    fn screen(&self) -> &xproto::Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    fn full_screen(&self) -> Rect {
        let screen = self.screen();
        Rect::new(
            0,
            0,
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        )
    }

    fn cardinal_property(
        &self,
        window: xproto::Window,
        property: xproto::Atom,
        kind: impl Into<xproto::Atom>,
    ) -> Option<u32> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, 1)
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next();
        value
    }

    fn atom_list(&self, window: xproto::Window, property: xproto::Atom) -> Vec<xproto::Atom> {
        self.conn
            .get_property(false, window, property, AtomEnum::ATOM, 0, 64)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().map(|values| values.collect()))
            .unwrap_or_default()
    }

    /// Окно, несущее EWMH-свойства: сама рамка или её первый клиент
    fn client_of(&self, frame: xproto::Window) -> xproto::Window {
        if self
            .cardinal_property(frame, self.atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL)
            .is_some()
        {
            return frame;
        }
        let children = match self.conn.query_tree(frame).ok().and_then(|c| c.reply().ok()) {
            Some(tree) => tree.children,
            None => return frame,
        };
        children
            .into_iter()
            .find(|&child| {
                self.cardinal_property(child, self.atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL)
                    .is_some()
            })
            .unwrap_or(frame)
    }

    fn describe_window(&self, frame: xproto::Window, geometry: Rect) -> WindowRecord {
        let client = self.client_of(frame);
        let mut record = WindowRecord::new(WindowId(frame), geometry);

        match self.cardinal_property(client, self.atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL) {
            Some(ALL_DESKTOPS) => record.sticky = true,
            Some(desktop) => record.workspace = Some(i64::from(desktop)),
            None => {}
        }

        let states = self.atom_list(client, self.atoms._NET_WM_STATE);
        record.sticky |= states.contains(&self.atoms._NET_WM_STATE_STICKY);
        record.hidden = states.contains(&self.atoms._NET_WM_STATE_HIDDEN);

        let types = self.atom_list(client, self.atoms._NET_WM_WINDOW_TYPE);
        record.dock = types.contains(&self.atoms._NET_WM_WINDOW_TYPE_DOCK);

        record
    }

    fn send_wm_state(&self, window: WindowId, action: u32, property: xproto::Atom) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            window.value(),
            self.atoms._NET_WM_STATE,
            [action, property, 0, 1, 0],
        );
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// 32-битный TrueColor визуал для прозрачного окна, если он есть
    fn argb_visual(&self) -> Option<xproto::Visualid> {
        self.screen()
            .allowed_depths
            .iter()
            .find(|depth| depth.depth == 32)
            .and_then(|depth| {
                depth
                    .visuals
                    .iter()
                    .find(|visual| visual.class == VisualClass::TRUE_COLOR)
            })
            .map(|visual| visual.visual_id)
    }

    fn translate_event(&self, event: Event) -> Option<WindowEvent> {
        let synthetic = |response_type: u8| response_type & SEND_EVENT_BIT != 0;

        match event {
            Event::CreateNotify(e) => Some(WindowEvent::Created(CreateEvent {
                window: WindowId(e.window),
                parent: WindowId(e.parent),
                x: i32::from(e.x),
                y: i32::from(e.y),
                width: u32::from(e.width),
                height: u32::from(e.height),
                border_width: u32::from(e.border_width),
                override_redirect: e.override_redirect,
                synthetic: synthetic(e.response_type),
            })),
            Event::MapNotify(e) => Some(WindowEvent::Mapped(MapEvent {
                event_window: WindowId(e.event),
                window: WindowId(e.window),
                override_redirect: e.override_redirect,
                synthetic: synthetic(e.response_type),
            })),
            Event::UnmapNotify(e) => Some(WindowEvent::Unmapped {
                window: WindowId(e.window),
            }),
            Event::DestroyNotify(e) => Some(WindowEvent::Destroyed {
                window: WindowId(e.window),
            }),
            Event::ReparentNotify(e) => Some(WindowEvent::Reparented {
                window: WindowId(e.window),
                parent: WindowId(e.parent),
            }),
            Event::ConfigureNotify(e) => Some(WindowEvent::Configured {
                window: WindowId(e.window),
            }),
            Event::FocusIn(e) => Some(WindowEvent::FocusIn {
                window: WindowId(e.event),
            }),
            Event::FocusOut(e) => Some(WindowEvent::FocusOut {
                window: WindowId(e.event),
            }),
            Event::PropertyNotify(e) if e.window == self.root => {
                if e.atom == self.atoms._NET_ACTIVE_WINDOW {
                    let active = self.active_window();
                    let mut last = self.last_active.lock();
                    if *last == active {
                        return None;
                    }
                    *last = active;
                    Some(WindowEvent::ActiveAppChanged { window: active })
                } else if e.atom == self.atoms._NET_CURRENT_DESKTOP {
                    Some(WindowEvent::WorkspaceChanged)
                } else {
                    None
                }
            }
            Event::Error(e) => {
                debug!("X11 ошибка в потоке событий: {:?}", e);
                None
            }
            other => {
                trace_if_enabled!("Пропускаем X11 событие {:?}", other);
                None
            }
        }
    }
}

impl WindowOracle for X11Desktop {
    fn pointer_button_held(&self, window: WindowId) -> bool {
        let reply = match self
            .conn
            .query_pointer(window.value())
            .ok()
            .and_then(|cookie| cookie.reply().ok())
        {
            Some(reply) => reply,
            None => return false,
        };
        u16::from(reply.mask) & u16::from(KeyButMask::BUTTON1) != 0
    }

    fn focused_window(&self) -> Option<WindowId> {
        let reply = self.conn.get_input_focus().ok()?.reply().ok()?;
        if reply.focus == NONE || reply.focus == POINTER_ROOT {
            return None;
        }
        Some(WindowId(reply.focus))
    }

    fn parent_of(&self, window: WindowId) -> Option<WindowId> {
        let tree = self.conn.query_tree(window.value()).ok()?.reply().ok()?;
        if tree.parent == NONE {
            return None;
        }
        Some(WindowId(tree.parent))
    }
}

impl WindowSystem for X11Desktop {
    fn root(&self) -> WindowId {
        WindowId(self.root)
    }

    fn list_windows(&self) -> Result<Vec<WindowRecord>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;

        // Отправляем все запросы сразу, ответы собираем потом
        let cookies = tree
            .children
            .iter()
            .map(|&window| {
                Ok((
                    window,
                    self.conn.get_window_attributes(window)?,
                    self.conn.get_geometry(window)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(cookies.len());
        for (window, attributes, geometry) in cookies {
            let (Ok(attributes), Ok(geometry)) = (attributes.reply(), geometry.reply()) else {
                // Окно успело исчезнуть между запросами
                continue;
            };
            if attributes.map_state != MapState::VIEWABLE || attributes.override_redirect {
                continue;
            }
            let rect = Rect::new(
                i32::from(geometry.x),
                i32::from(geometry.y),
                u32::from(geometry.width),
                u32::from(geometry.height),
            );
            records.push(self.describe_window(window, rect));
        }

        Ok(records)
    }

    fn window_geometry(&self, window: WindowId) -> Result<Rect> {
        let geometry = self.conn.get_geometry(window.value())?.reply()?;
        Ok(Rect::new(
            i32::from(geometry.x),
            i32::from(geometry.y),
            u32::from(geometry.width),
            u32::from(geometry.height),
        ))
    }

    fn current_workspace(&self) -> Option<i64> {
        self.cardinal_property(self.root, self.atoms._NET_CURRENT_DESKTOP, AtomEnum::CARDINAL)
            .map(i64::from)
    }

    fn monitors(&self) -> Result<Vec<Rect>> {
        let screens = self.conn.xinerama_query_screens()?.reply()?.screen_info;
        if screens.is_empty() {
            return Ok(vec![self.full_screen()]);
        }
        Ok(screens
            .iter()
            .map(|s| {
                Rect::new(
                    i32::from(s.x_org),
                    i32::from(s.y_org),
                    u32::from(s.width),
                    u32::from(s.height),
                )
            })
            .collect())
    }

    fn active_window(&self) -> Option<WindowId> {
        self.cardinal_property(self.root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)
            .filter(|&window| window != NONE)
            .map(WindowId)
    }

    fn create_probe_window(&self) -> Result<WindowId> {
        let screen = self.screen();
        let window = self.conn.generate_id()?;

        self.conn.create_window(
            screen.root_depth,
            window,
            self.root,
            1,
            1,
            1,
            1,
            10,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .border_pixel(screen.white_pixel)
                .event_mask(EventMask::BUTTON_PRESS),
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            WM_CLASS,
        )?;

        // USPosition | USSize: WM не должен спрашивать пользователя о позиции
        let mut size_hints = [0u32; 18];
        size_hints[0] = 1 | 2;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NORMAL_HINTS,
            AtomEnum::WM_SIZE_HINTS,
            &size_hints,
        )?;

        // Без декораций
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._MOTIF_WM_HINTS,
            self.atoms._MOTIF_WM_HINTS,
            &[2, 0, 0, 0, 0],
        )?;
        self.conn.flush()?;

        Ok(WindowId(window))
    }

    fn map_window(&self, window: WindowId) -> Result<()> {
        self.conn.map_window(window.value())?;
        self.conn.flush()?;
        Ok(())
    }

    fn move_window(&self, window: WindowId, position: Position) -> Result<()> {
        self.conn.configure_window(
            window.value(),
            &ConfigureWindowAux::new().x(position.x).y(position.y),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    fn wait_until_viewable(&self, window: WindowId, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let attributes = self.conn.get_window_attributes(window.value())?.reply()?;
            if attributes.map_state == MapState::VIEWABLE {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn workspace_of(&self, window: WindowId) -> Result<i64> {
        let client = self.client_of(window.value());
        self.cardinal_property(client, self.atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL)
            .map(i64::from)
            .ok_or_else(|| xsnow_error!(internal, "у окна {} нет _NET_WM_DESKTOP", window))
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        self.conn.destroy_window(window.value())?;
        self.conn.flush()?;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WindowEvent>> {
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(event) = self.translate_event(event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn send_expose(&self, window: WindowId, size: Rect) -> Result<()> {
        let event = ExposeEvent {
            response_type: xproto::EXPOSE_EVENT,
            sequence: 0,
            window: window.value(),
            x: 0,
            y: 0,
            width: size.width.min(u32::from(u16::MAX)) as u16,
            height: size.height.min(u32::from(u16::MAX)) as u16,
            count: 0,
        };
        self.conn
            .send_event(true, window.value(), EventMask::EXPOSURE, event)?;
        self.conn.flush()?;
        Ok(())
    }
}

impl OverlayWindows for X11Desktop {
    fn create_overlay_window(&self, request: OverlayRequest) -> Result<OverlayInfo> {
        info!("Создание окна снега: {:?}", request);

        let geometry = if request.screen < 0 {
            self.full_screen()
        } else {
            let monitors = self.monitors().unwrap_or_else(|e| {
                warn!("Xinerama недоступна: {}, используем весь экран", e);
                vec![self.full_screen()]
            });
            select_monitor(&monitors, request.screen as usize).unwrap_or_else(|| self.full_screen())
        };

        let screen = self.screen();
        let window = self.conn.generate_id()?;
        let argb = self.argb_visual();

        let (depth, visual, aux) = match argb {
            Some(visual) => {
                let colormap = self.conn.generate_id()?;
                self.conn
                    .create_colormap(ColormapAlloc::NONE, colormap, self.root, visual)?;
                (
                    32,
                    visual,
                    CreateWindowAux::new()
                        .background_pixel(0)
                        .border_pixel(0)
                        .colormap(colormap),
                )
            }
            None => {
                warn!("32-битный визуал не найден, окно снега будет непрозрачным");
                (
                    screen.root_depth,
                    screen.root_visual,
                    CreateWindowAux::new().background_pixel(screen.black_pixel),
                )
            }
        };

        self.conn.create_window(
            depth,
            window,
            self.root,
            geometry.x as i16,
            geometry.y as i16,
            geometry.width.min(u32::from(u16::MAX)) as u16,
            geometry.height.min(u32::from(u16::MAX)) as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &aux,
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            WM_CLASS,
        )?;

        if request.dock {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms._NET_WM_WINDOW_TYPE,
                AtomEnum::ATOM,
                &[self.atoms._NET_WM_WINDOW_TYPE_DOCK],
            )?;
        }

        let mut states = Vec::new();
        if request.sticky {
            states.push(self.atoms._NET_WM_STATE_STICKY);
        }
        match request.stacking {
            Stacking::Below => states.push(self.atoms._NET_WM_STATE_BELOW),
            Stacking::Above => states.push(self.atoms._NET_WM_STATE_ABOVE),
            Stacking::Unchanged => {}
        }
        if !states.is_empty() {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms._NET_WM_STATE,
                AtomEnum::ATOM,
                &states,
            )?;
        }

        // Пустая input-область: клики проходят сквозь окно снега
        self.conn.shape_rectangles(
            shape::SO::SET,
            shape::SK::INPUT,
            xproto::ClipOrdering::UNSORTED,
            window,
            0,
            0,
            &[],
        )?;

        self.conn.map_window(window)?;
        self.conn.flush()?;

        let overlay = WindowId(window);
        info!("Окно снега создано: {} {:?}", overlay, geometry);

        Ok(OverlayInfo {
            window: overlay,
            geometry,
            is_root: false,
            transparent: argb.is_some(),
        })
    }

    fn set_stacking_below(&self, window: WindowId) -> Result<()> {
        self.send_wm_state(window, NET_WM_STATE_REMOVE, self.atoms._NET_WM_STATE_ABOVE)?;
        self.send_wm_state(window, NET_WM_STATE_ADD, self.atoms._NET_WM_STATE_BELOW)
    }

    fn set_stacking_above(&self, window: WindowId) -> Result<()> {
        self.send_wm_state(window, NET_WM_STATE_REMOVE, self.atoms._NET_WM_STATE_BELOW)?;
        self.send_wm_state(window, NET_WM_STATE_ADD, self.atoms._NET_WM_STATE_ABOVE)
    }
}

impl Drop for X11Desktop {
    fn drop(&mut self) {
        info!("X11Desktop завершает работу");
    }
}

