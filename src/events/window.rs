use serde::{Deserialize, Serialize};
use std::fmt;

/// Идентификатор окна X11 (XID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

impl WindowId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Позиция окна в координатах корневого окна
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Прямоугольная область (монитор, окно)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn center(&self) -> Position {
        Position::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// Снимок одного окна на экране в конкретный момент времени
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRecord {
    pub window: WindowId,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Рабочее пространство окна, если WM его сообщает
    pub workspace: Option<i64>,
    pub sticky: bool,
    pub dock: bool,
    pub hidden: bool,
}

impl WindowRecord {
    pub fn new(window: WindowId, geometry: Rect) -> Self {
        Self {
            window,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            workspace: None,
            sticky: false,
            dock: false,
            hidden: false,
        }
    }

    pub fn with_workspace(mut self, workspace: i64) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn geometry(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl fmt::Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{}+{}+{}",
            self.window, self.width, self.height, self.x, self.y
        )
    }
}

/// Поля CreateNotify, нужные для распознавания служебного окна перетаскивания
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEvent {
    pub window: WindowId,
    pub parent: WindowId,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub border_width: u32,
    pub override_redirect: bool,
    /// Событие отправлено через SendEvent, а не сервером
    pub synthetic: bool,
}

/// Поля MapNotify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEvent {
    /// Окно, на котором выбрано событие (обычно корневое)
    pub event_window: WindowId,
    pub window: WindowId,
    pub override_redirect: bool,
    pub synthetic: bool,
}

/// Событие оконной системы, уже переведённое из сырого протокола
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Created(CreateEvent),
    Mapped(MapEvent),
    Unmapped { window: WindowId },
    Destroyed { window: WindowId },
    Reparented { window: WindowId, parent: WindowId },
    Configured { window: WindowId },
    FocusIn { window: WindowId },
    FocusOut { window: WindowId },
    ActiveAppChanged { window: Option<WindowId> },
    WorkspaceChanged,
}

impl WindowEvent {
    pub fn kind(&self) -> WindowEventType {
        match self {
            WindowEvent::Created(_) => WindowEventType::Created,
            WindowEvent::Mapped(_) => WindowEventType::Mapped,
            WindowEvent::Unmapped { .. } => WindowEventType::Unmapped,
            WindowEvent::Destroyed { .. } => WindowEventType::Destroyed,
            WindowEvent::Reparented { .. } => WindowEventType::Reparented,
            WindowEvent::Configured { .. } => WindowEventType::Configured,
            WindowEvent::FocusIn { .. } => WindowEventType::FocusIn,
            WindowEvent::FocusOut { .. } => WindowEventType::FocusOut,
            WindowEvent::ActiveAppChanged { .. } => WindowEventType::ActiveAppChanged,
            WindowEvent::WorkspaceChanged => WindowEventType::WorkspaceChanged,
        }
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowEvent::Created(e) => write!(
                f,
                "Created: se? {} w [{}] pw [{}] pos ({},{}) @ ({},{}) b({}) r? {}",
                e.synthetic as u8,
                e.window,
                e.parent,
                e.x,
                e.y,
                e.width,
                e.height,
                e.border_width,
                e.override_redirect as u8
            ),
            WindowEvent::Mapped(e) => write!(
                f,
                "Mapped: se? {} ew [{}] w [{}] r? {}",
                e.synthetic as u8, e.event_window, e.window, e.override_redirect as u8
            ),
            WindowEvent::Unmapped { window } => write!(f, "Unmapped: {}", window),
            WindowEvent::Destroyed { window } => write!(f, "Destroyed: {}", window),
            WindowEvent::Reparented { window, parent } => {
                write!(f, "Reparented: {} -> {}", window, parent)
            }
            WindowEvent::Configured { window } => write!(f, "Configured: {}", window),
            WindowEvent::FocusIn { window } => write!(f, "FocusIn: {}", window),
            WindowEvent::FocusOut { window } => write!(f, "FocusOut: {}", window),
            WindowEvent::ActiveAppChanged { window: Some(window) } => {
                write!(f, "ActiveAppChanged: {}", window)
            }
            WindowEvent::ActiveAppChanged { window: None } => write!(f, "ActiveAppChanged: none"),
            WindowEvent::WorkspaceChanged => write!(f, "WorkspaceChanged"),
        }
    }
}

/// Тип события окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowEventType {
    Created,
    Mapped,
    Unmapped,
    Destroyed,
    Reparented,
    Configured,
    FocusIn,
    FocusOut,
    ActiveAppChanged,
    WorkspaceChanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id_display() {
        assert_eq!(WindowId(0x1886367).to_string(), "0x01886367");
    }

    #[test]
    fn test_rect_center() {
        let rect = Rect::new(1920, 0, 1280, 1024);
        assert_eq!(rect.center(), Position::new(2560, 512));
    }

    #[test]
    fn test_window_record_creation() {
        let record = WindowRecord::new(WindowId(7), Rect::new(10, 20, 300, 200))
            .with_workspace(2)
            .with_sticky(true);

        assert_eq!(record.position(), Position::new(10, 20));
        assert_eq!(record.workspace, Some(2));
        assert!(record.sticky);
        assert_eq!(record.to_string(), "0x00000007 300x200+10+20");
    }

    #[test]
    fn test_event_kind() {
        let event = WindowEvent::Unmapped { window: WindowId(1) };
        assert_eq!(event.kind(), WindowEventType::Unmapped);
        assert_eq!(WindowEvent::WorkspaceChanged.kind(), WindowEventType::WorkspaceChanged);
    }
}
