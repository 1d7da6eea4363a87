use crate::events::{Position, WindowId};
use crate::services::window_system::WindowSystem;
use smallvec::SmallVec;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Видимые рабочие пространства (по одному на монитор) и поправка
/// координат окон.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSet {
    visible: SmallVec<[i64; 4]>,
    pub offset: Position,
}

impl WorkspaceSet {
    pub fn single(workspace: i64, offset: Position) -> Self {
        let mut visible = SmallVec::new();
        visible.push(workspace);
        Self { visible, offset }
    }

    pub fn visible(&self) -> &[i64] {
        &self.visible
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn contains(&self, workspace: i64) -> bool {
        self.visible.contains(&workspace)
    }

    /// Показывать ли снег: на всех рабочих пространствах или выбранное видимо
    pub fn is_active(&self, chosen: i64, all_workspaces: bool) -> bool {
        all_workspaces || self.contains(chosen)
    }
}

/// Определение видимых рабочих пространств с помощью пробного окна.
///
/// На одном мониторе ответ тривиален. На нескольких (bspwm и другие
/// тайловые WM) пробное окно ставится в центр каждого монитора, и WM
/// спрашивают, какому рабочему пространству оно принадлежит.
pub struct WorkspaceDiscovery {
    probe_timeout: Duration,
}

impl WorkspaceDiscovery {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    pub fn discover_visible_workspaces(
        &self,
        system: &dyn WindowSystem,
        current: i64,
        offset: Position,
    ) -> WorkspaceSet {
        let monitors = match system.monitors() {
            Ok(monitors) => monitors,
            Err(e) => {
                debug!("Геометрия мониторов недоступна: {}", e);
                return WorkspaceSet::single(current, offset);
            }
        };
        if monitors.len() <= 1 {
            return WorkspaceSet::single(current, offset);
        }

        let probe = match system.create_probe_window() {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Не удалось создать пробное окно: {}", e);
                return WorkspaceSet::single(current, offset);
            }
        };
        if let Err(e) = system.map_window(probe) {
            warn!("Не удалось показать пробное окно {}: {}", probe, e);
        }

        let mut set = WorkspaceSet {
            visible: SmallVec::with_capacity(monitors.len()),
            offset,
        };
        let mut previous: Option<i64> = None;

        for (index, monitor) in monitors.iter().enumerate() {
            let workspace = self.probe_monitor(system, probe, index, monitor.center(), current);
            set.visible.push(workspace);

            // Мониторы на разных рабочих пространствах (bspwm): общего
            // начала координат нет, поправку сбрасываем
            if let Some(previous) = previous {
                if previous != workspace {
                    set.offset = Position::default();
                }
            }
            previous = Some(workspace);
        }

        if let Err(e) = system.destroy_window(probe) {
            warn!("Не удалось удалить пробное окно {}: {}", probe, e);
        }

        info!(
            "Видимые рабочие пространства ({} мониторов): {:?}",
            set.len(),
            set.visible()
        );
        set
    }

    fn probe_monitor(
        &self,
        system: &dyn WindowSystem,
        probe: WindowId,
        index: usize,
        center: Position,
        fallback: i64,
    ) -> i64 {
        if let Err(e) = system.move_window(probe, center) {
            warn!("Не удалось переместить пробное окно на монитор {}: {}", index, e);
            return fallback;
        }

        match system.wait_until_viewable(probe, self.probe_timeout) {
            Ok(true) => {}
            Ok(false) => debug!("Пробное окно не стало видимым на мониторе {}", index),
            Err(e) => debug!("Ожидание пробного окна прервано: {}", e),
        }

        system.workspace_of(probe).unwrap_or_else(|e| {
            debug!(
                "Рабочее пространство монитора {} неизвестно ({}), берём текущее {}",
                index, e, fallback
            );
            fallback
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Rect;
    use crate::services::window_system::SimulatedDesktop;

    fn discovery() -> WorkspaceDiscovery {
        WorkspaceDiscovery::new(Duration::from_millis(50))
    }

    fn two_monitors(desktop: &SimulatedDesktop, left: i64, right: i64) {
        desktop.set_monitors(vec![
            (Rect::new(0, 0, 1920, 1080), left),
            (Rect::new(1920, 0, 1920, 1080), right),
        ]);
    }

    #[test]
    fn test_single_monitor_needs_no_probe() {
        let desktop = SimulatedDesktop::new();
        let set = discovery().discover_visible_workspaces(&desktop, 4, Position::new(3, 3));

        assert_eq!(set.visible(), &[4]);
        assert_eq!(set.offset, Position::new(3, 3));
        assert_eq!(desktop.probe_operations(), 0);
    }

    #[test]
    fn test_each_monitor_is_probed_once() {
        let desktop = SimulatedDesktop::new();
        desktop.set_monitors(vec![
            (Rect::new(0, 0, 1920, 1080), 1),
            (Rect::new(1920, 0, 1920, 1080), 1),
            (Rect::new(3840, 0, 1280, 1024), 1),
        ]);

        let set = discovery().discover_visible_workspaces(&desktop, 1, Position::default());

        assert_eq!(set.len(), 3);
        assert_eq!(desktop.probe_relocations(), 3);
        assert_eq!(desktop.live_probes(), 0);
    }

    #[test]
    fn test_failed_query_falls_back_to_current() {
        let desktop = SimulatedDesktop::new();
        two_monitors(&desktop, 2, 5);
        desktop.fail_workspace_query_on(1);

        let set = discovery().discover_visible_workspaces(&desktop, 2, Position::default());
        assert_eq!(set.visible(), &[2, 2]);
    }

    #[test]
    fn test_offset_reset_when_monitors_differ() {
        let desktop = SimulatedDesktop::new();
        two_monitors(&desktop, 0, 1);

        let set = discovery().discover_visible_workspaces(&desktop, 0, Position::new(10, 20));
        assert_eq!(set.visible(), &[0, 1]);
        assert_eq!(set.offset, Position::default());

        two_monitors(&desktop, 1, 1);
        let set = discovery().discover_visible_workspaces(&desktop, 1, Position::new(10, 20));
        assert_eq!(set.offset, Position::new(10, 20));
    }

    #[test]
    fn test_is_active() {
        let set = WorkspaceSet::single(2, Position::default());
        assert!(set.is_active(2, false));
        assert!(!set.is_active(3, false));
        assert!(set.is_active(3, true));
    }
}
