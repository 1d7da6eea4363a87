use crate::events::{Position, WindowId};
use std::fmt;

/// Как было распознано перетаскивание
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragMethod {
    /// Кнопка мыши зажата на заголовке окна
    ClickHold,
    /// KDE Plasma: перемещение активного окна с клавиатуры
    ActiveAppKeyboard,
}

/// Состояние перетаскивания окна
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        window: WindowId,
        method: DragMethod,
    },
}

impl DragState {
    pub fn is_dragging(&self) -> bool {
        matches!(self, DragState::Dragging { .. })
    }

    pub fn window(&self) -> Option<WindowId> {
        match self {
            DragState::Dragging { window, .. } => Some(*window),
            DragState::Idle => None,
        }
    }
}

impl fmt::Display for DragState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DragState::Idle => write!(f, "Idle"),
            DragState::Dragging { window, method } => {
                write!(f, "Dragging({}, {:?})", window, method)
            }
        }
    }
}

/// Активное приложение и кандидат в служебное окно перетаскивания
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveAppState {
    pub window: Option<WindowId>,
    /// Последняя известная позиция; `None` если окна не было в снимке
    pub position: Option<Position>,
    pub drag_candidate: Option<WindowId>,
}

/// Что нужно сделать со снегом после перехода
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnowEffect {
    None,
    ClearWindow(WindowId),
    ClearAll,
}
