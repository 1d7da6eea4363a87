use crate::config::{Config, Stacking};
use crate::error::Result;
use crate::events::{Position, Rect, WindowEvent, WindowId, WindowRecord};
use std::sync::Arc;
use std::time::Duration;

/// Узкие запросы, нужные эвристикам перетаскивания.
///
/// Вынесены отдельно от [`WindowSystem`], чтобы правила перетаскивания
/// можно было проверять без живого X-сервера. Ошибка запроса означает
/// "нет результата", а не ошибку.
pub trait WindowOracle: Send + Sync {
    /// Зажата ли левая кнопка мыши, если смотреть из окна `window`
    fn pointer_button_held(&self, window: WindowId) -> bool;

    /// Окно с фокусом ввода
    fn focused_window(&self) -> Option<WindowId>;

    /// Родитель окна; `None` для корневого окна или при ошибке
    fn parent_of(&self, window: WindowId) -> Option<WindowId>;
}

/// Доступ к оконной системе: перечисление окон, рабочие пространства,
/// пробное окно и поток событий.
pub trait WindowSystem: WindowOracle {
    fn root(&self) -> WindowId;

    /// Все видимые окна верхнего уровня в порядке стека
    fn list_windows(&self) -> Result<Vec<WindowRecord>>;

    fn window_geometry(&self, window: WindowId) -> Result<Rect>;

    /// Номер текущего рабочего пространства; `None` если WM его не сообщает
    fn current_workspace(&self) -> Option<i64>;

    /// Геометрия мониторов (Xinerama)
    fn monitors(&self) -> Result<Vec<Rect>>;

    fn active_window(&self) -> Option<WindowId>;

    fn create_probe_window(&self) -> Result<WindowId>;

    fn map_window(&self, window: WindowId) -> Result<()>;

    fn move_window(&self, window: WindowId, position: Position) -> Result<()>;

    /// Ждёт, пока окно станет видимым; `false` по истечении таймаута
    fn wait_until_viewable(&self, window: WindowId, timeout: Duration) -> Result<bool>;

    fn workspace_of(&self, window: WindowId) -> Result<i64>;

    fn destroy_window(&self, window: WindowId) -> Result<()>;

    /// Неблокирующее чтение следующего события
    fn poll_event(&self) -> Result<Option<WindowEvent>>;

    /// Отправляет окну синтетический Expose на всю площадь
    fn send_expose(&self, window: WindowId, size: Rect) -> Result<()>;
}

/// Параметры создания окна снега
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRequest {
    /// Номер монитора; отрицательное значение означает весь экран
    pub screen: i32,
    pub sticky: bool,
    pub stacking: Stacking,
    pub dock: bool,
}

/// Созданное окно снега
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayInfo {
    pub window: WindowId,
    pub geometry: Rect,
    /// Снег рисуется прямо в корневом окне
    pub is_root: bool,
    /// Прозрачное окно композитора: его пропажа из списка окон не фатальна
    pub transparent: bool,
}

/// Создание и управление окном снега
pub trait OverlayWindows: Send + Sync {
    fn create_overlay_window(&self, request: OverlayRequest) -> Result<OverlayInfo>;

    fn set_stacking_below(&self, window: WindowId) -> Result<()>;

    fn set_stacking_above(&self, window: WindowId) -> Result<()>;
}

/// Оконная система вместе с управлением окном снега
pub trait Desktop: WindowSystem + OverlayWindows {
    fn as_window_system(&self) -> &dyn WindowSystem;

    fn as_oracle(&self) -> &dyn WindowOracle;
}

impl<T: WindowSystem + OverlayWindows> Desktop for T {
    fn as_window_system(&self) -> &dyn WindowSystem {
        self
    }

    fn as_oracle(&self) -> &dyn WindowOracle {
        self
    }
}

/// Factory function to create an appropriate window system based on the dry_run flag
pub fn create_window_system(config: &Config, dry_run: bool) -> Result<Arc<dyn Desktop>> {
    if dry_run {
        Ok(Arc::new(super::dry_run::dry_run_desktop()))
    } else {
        Ok(Arc::new(super::x11::X11Desktop::connect(
            config.display.name.as_deref(),
        )?))
    }
}

/// Выбор монитора для окна снега: запрошенный номер ограничивается
/// последним монитором.
pub fn select_monitor(monitors: &[Rect], requested: usize) -> Option<Rect> {
    if monitors.is_empty() {
        return None;
    }
    let index = requested.min(monitors.len() - 1);
    monitors.get(index).copied()
}

/// Цепочка предков окна для отладочных логов: `0x... -> 0x... -> ...`
pub fn describe_ancestry(oracle: &dyn WindowOracle, window: WindowId) -> String {
    const MAX_DEPTH: usize = 64;

    let mut chain = vec![window.to_string()];
    let mut node = window;
    while let Some(parent) = oracle.parent_of(node) {
        chain.push(parent.to_string());
        if chain.len() > MAX_DEPTH {
            break;
        }
        node = parent;
    }
    chain.join(" -> ")
}
