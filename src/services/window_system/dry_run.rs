use crate::events::{CreateEvent, MapEvent, Position, Rect, WindowEvent, WindowId, WindowRecord};
use std::time::{Duration, Instant};
use tracing::info;

use super::simulated::SimulatedDesktop;
use super::r#trait::WindowSystem;

/// Dry-run рабочий стол: симуляция с двумя мониторами и сценарием событий
pub fn dry_run_desktop() -> SimulatedDesktop {
    info!("Dry-run режим - оконная система работает в режиме эмуляции");

    let desktop = SimulatedDesktop::with_scenario(DryRunScenario::new(Duration::from_secs(3)));
    desktop.set_monitors(vec![
        (Rect::new(0, 0, 1920, 1080), 0),
        (Rect::new(1920, 0, 1920, 1080), 0),
    ]);

    let fake_windows = [
        ("Terminal - dry_run", Rect::new(100, 200, 800, 500)),
        ("Browser - dry_run", Rect::new(1000, 150, 1200, 800)),
        ("Editor - dry_run", Rect::new(2200, 300, 900, 600)),
    ];
    for (index, (title, geometry)) in fake_windows.iter().enumerate() {
        let window = WindowId(0x0100_0001 + index as u32);
        info!("Dry-run: окно {} \"{}\"", window, title);
        desktop.add_window(WindowRecord::new(window, *geometry).with_workspace(0));
    }

    desktop
}

/// Шаги сценария, повторяемые по кругу
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ActivateApp,
    CreateDragHelper,
    MapDragHelper,
    MoveActiveApp,
    DestroyDragHelper,
    PressOnTitlebar,
    ReleaseTitlebar,
    SwitchWorkspace,
}

const STEPS: [Step; 8] = [
    Step::ActivateApp,
    Step::CreateDragHelper,
    Step::MapDragHelper,
    Step::MoveActiveApp,
    Step::DestroyDragHelper,
    Step::PressOnTitlebar,
    Step::ReleaseTitlebar,
    Step::SwitchWorkspace,
];

/// Эмуляция KDE-перетаскивания с клавиатуры, перетаскивания мышью и
/// переключения рабочих пространств.
pub struct DryRunScenario {
    period: Duration,
    last_step: Option<Instant>,
    index: usize,
    helper: Option<WindowId>,
    titlebar_popup: Option<WindowId>,
}

impl DryRunScenario {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_step: None,
            index: 0,
            helper: None,
            titlebar_popup: None,
        }
    }

    /// Выполняет следующий шаг, если пришло время
    pub fn advance(&mut self, desktop: &SimulatedDesktop) {
        let now = Instant::now();
        if let Some(last) = self.last_step {
            if now.duration_since(last) < self.period {
                return;
            }
        }
        self.last_step = Some(now);

        let step = STEPS[self.index];
        self.index = (self.index + 1) % STEPS.len();
        info!("Dry-run: шаг сценария {:?}", step);

        let root = desktop.root();
        let active = WindowId(0x0100_0001);

        match step {
            Step::ActivateApp => {
                desktop.set_focus(Some(active));
                desktop.set_active(Some(active));
                desktop.push_event(WindowEvent::ActiveAppChanged { window: Some(active) });
            }
            Step::CreateDragHelper => {
                let (helper, size) = desktop.with_state(|state| {
                    let size = state
                        .windows
                        .iter()
                        .find(|w| w.dock)
                        .map(|w| w.geometry())
                        .unwrap_or(Rect::new(0, 0, 3840, 1080));
                    (state.allocate_id(), size)
                });
                self.helper = Some(helper);
                desktop.push_event(WindowEvent::Created(CreateEvent {
                    window: helper,
                    parent: root,
                    x: 0,
                    y: 0,
                    width: size.width,
                    height: size.height,
                    border_width: 0,
                    override_redirect: false,
                    synthetic: false,
                }));
            }
            Step::MapDragHelper => {
                if let Some(helper) = self.helper {
                    desktop.push_event(WindowEvent::Mapped(MapEvent {
                        event_window: root,
                        window: helper,
                        override_redirect: false,
                        synthetic: false,
                    }));
                }
            }
            Step::MoveActiveApp => {
                desktop.move_record(active, Position::new(300, 260));
                if let Some(helper) = self.helper {
                    desktop.push_event(WindowEvent::Unmapped { window: helper });
                }
            }
            Step::DestroyDragHelper => {
                if let Some(helper) = self.helper.take() {
                    desktop.push_event(WindowEvent::Destroyed { window: helper });
                }
                desktop.move_record(active, Position::new(100, 200));
            }
            Step::PressOnTitlebar => {
                let popup = desktop.with_state(|state| state.allocate_id());
                let client = WindowId(0x0100_0002);
                desktop.set_parent(popup, client);
                desktop.set_focus(Some(popup));
                desktop.set_button_held(true);
                self.titlebar_popup = Some(popup);
                desktop.push_event(WindowEvent::Mapped(MapEvent {
                    event_window: root,
                    window: popup,
                    override_redirect: true,
                    synthetic: false,
                }));
            }
            Step::ReleaseTitlebar => {
                desktop.set_button_held(false);
                desktop.set_focus(Some(active));
                if let Some(popup) = self.titlebar_popup.take() {
                    desktop.push_event(WindowEvent::Unmapped { window: popup });
                }
            }
            Step::SwitchWorkspace => {
                let next = match desktop.current_workspace() {
                    Some(0) => 1,
                    _ => 0,
                };
                desktop.set_current_workspace(Some(next));
                desktop.set_monitors(vec![
                    (Rect::new(0, 0, 1920, 1080), next),
                    (Rect::new(1920, 0, 1920, 1080), next),
                ]);
                desktop.push_event(WindowEvent::WorkspaceChanged);
            }
        }
    }
}
