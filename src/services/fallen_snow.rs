use crate::debug_if_enabled;
use crate::events::{Rect, WindowId, WindowRecord};
use crate::services::snapshot::Snapshot;
use crate::services::workspace::WorkspaceSet;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Сколько ждать блокировку, когда лимит мягких попыток исчерпан
const ESCALATED_LOCK_WAIT: Duration = Duration::from_millis(20);

/// Предельная высота слоя снега на окне
const MAX_SNOW_DEPTH: u32 = 64;

/// Движок накопления снега на окнах
pub trait FallenSnowEngine: Send + Sync {
    fn remove_snow_from_window(&self, window: WindowId);

    fn remove_snow_from_all_windows(&self);

    /// Приводит поверхности снега в соответствие со снимком окон
    fn reconcile_window_surfaces(&self, snapshot: &Snapshot, workspaces: &WorkspaceSet);
}

/// Неблокирующая ("мягкая") блокировка общего состояния.
///
/// Периодический цикл не должен подвисать на занятой блокировке: он
/// пропускает такт и пробует снова. После `max_tries` неудач подряд
/// делается одна попытка с коротким ожиданием.
pub struct FallenSnowLock<T> {
    inner: Mutex<T>,
}

impl<T> FallenSnowLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn soft_lock(&self, max_tries: u32, failures: &mut u32) -> Option<MutexGuard<'_, T>> {
        if let Some(guard) = self.inner.try_lock() {
            *failures = 0;
            return Some(guard);
        }

        *failures += 1;
        if *failures <= max_tries {
            return None;
        }

        *failures = 0;
        self.inner.try_lock_for(ESCALATED_LOCK_WAIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Surface {
    geometry: Rect,
    depth: u32,
}

/// Учёт снега, лежащего на окнах: по поверхности на каждое видимое окно.
///
/// Каждая сверка, в которой окно не сдвинулось, добавляет слой снега;
/// движение или изменение размера окна стряхивает его.
#[derive(Default)]
pub struct FallenSnowLedger {
    surfaces: DashMap<WindowId, Surface>,
    clear_all_count: AtomicUsize,
    /// Окно снега в списке окон, но снег на себе не держит
    overlay: Option<WindowId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    pub surfaces: usize,
    pub cleared_all: usize,
}

impl FallenSnowLedger {
    pub fn for_overlay(overlay: WindowId) -> Self {
        Self {
            overlay: Some(overlay),
            ..Self::default()
        }
    }

    pub fn depth(&self, window: WindowId) -> Option<u32> {
        self.surfaces.get(&window).map(|s| s.depth)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            surfaces: self.surfaces.len(),
            cleared_all: self.clear_all_count.load(Ordering::Relaxed),
        }
    }

    fn holds_snow(&self, record: &WindowRecord, workspaces: &WorkspaceSet) -> bool {
        if record.hidden || self.overlay == Some(record.window) {
            return false;
        }
        match record.workspace {
            Some(workspace) => record.sticky || workspaces.contains(workspace),
            None => true,
        }
    }
}

impl FallenSnowEngine for FallenSnowLedger {
    fn remove_snow_from_window(&self, window: WindowId) {
        if let Some(mut surface) = self.surfaces.get_mut(&window) {
            debug_if_enabled!("Снег стряхнут с окна {}", window);
            surface.depth = 0;
        }
    }

    fn remove_snow_from_all_windows(&self) {
        self.surfaces.iter_mut().for_each(|mut s| s.depth = 0);
        self.clear_all_count.fetch_add(1, Ordering::Relaxed);
        info!("Снег стряхнут со всех окон ({})", self.surfaces.len());
    }

    fn reconcile_window_surfaces(&self, snapshot: &Snapshot, workspaces: &WorkspaceSet) {
        self.surfaces.retain(|window, _| {
            snapshot
                .lookup(*window)
                .is_some_and(|record| self.holds_snow(record, workspaces))
        });

        for record in snapshot.iter().filter(|r| self.holds_snow(r, workspaces)) {
            let geometry = record.geometry();
            self.surfaces
                .entry(record.window)
                .and_modify(|surface| {
                    if surface.geometry != geometry {
                        debug_if_enabled!("Окно {} сдвинулось, снег падает", record.window);
                        surface.geometry = geometry;
                        surface.depth = 0;
                    } else {
                        surface.depth = (surface.depth + 1).min(MAX_SNOW_DEPTH);
                    }
                })
                .or_insert(Surface { geometry, depth: 0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Position;

    fn window(id: u32, x: i32, workspace: i64) -> WindowRecord {
        WindowRecord::new(WindowId(id), Rect::new(x, 100, 300, 200)).with_workspace(workspace)
    }

    fn visible(workspace: i64) -> WorkspaceSet {
        WorkspaceSet::single(workspace, Position::default())
    }

    #[test]
    fn test_soft_lock_defers_then_escalates() {
        let lock = FallenSnowLock::new(0u32);
        let mut failures = 0;

        let held = lock.lock();
        for attempt in 1..=3 {
            assert!(lock.soft_lock(3, &mut failures).is_none());
            assert_eq!(failures, attempt);
        }
        // Четвёртая попытка ждёт ограниченное время и сбрасывает счётчик
        assert!(lock.soft_lock(3, &mut failures).is_none());
        assert_eq!(failures, 0);
        drop(held);

        failures = 2;
        assert!(lock.soft_lock(3, &mut failures).is_some());
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_overlay_never_holds_snow() {
        let overlay = WindowId(0x0500_0000);
        let ledger = FallenSnowLedger::for_overlay(overlay);
        let snapshot = Snapshot::new(vec![
            WindowRecord::new(overlay, Rect::new(0, 0, 1920, 1080)).with_sticky(true),
            window(1, 0, 0),
        ]);

        ledger.reconcile_window_surfaces(&snapshot, &visible(0));
        assert_eq!(ledger.depth(overlay), None);
        assert_eq!(ledger.depth(WindowId(1)), Some(0));
        assert_eq!(ledger.stats().surfaces, 1);
    }

    #[test]
    fn test_reconcile_tracks_visible_windows() {
        let ledger = FallenSnowLedger::default();
        let mut hidden = window(3, 0, 0);
        hidden.hidden = true;
        let snapshot = Snapshot::new(vec![window(1, 0, 0), window(2, 400, 1), hidden]);

        ledger.reconcile_window_surfaces(&snapshot, &visible(0));
        assert_eq!(ledger.depth(WindowId(1)), Some(0));
        assert_eq!(ledger.depth(WindowId(2)), None);
        assert_eq!(ledger.depth(WindowId(3)), None);

        ledger.reconcile_window_surfaces(&snapshot, &visible(0));
        assert_eq!(ledger.depth(WindowId(1)), Some(1));
    }

    #[test]
    fn test_sticky_windows_hold_snow_everywhere() {
        let ledger = FallenSnowLedger::default();
        let snapshot = Snapshot::new(vec![window(1, 0, 5).with_sticky(true)]);

        ledger.reconcile_window_surfaces(&snapshot, &visible(0));
        assert!(ledger.depth(WindowId(1)).is_some());
    }

    #[test]
    fn test_moved_window_loses_snow_and_vanished_is_dropped() {
        let ledger = FallenSnowLedger::default();
        let before = Snapshot::new(vec![window(1, 0, 0), window(2, 400, 0)]);
        for _ in 0..3 {
            ledger.reconcile_window_surfaces(&before, &visible(0));
        }
        assert_eq!(ledger.depth(WindowId(1)), Some(2));

        let after = Snapshot::new(vec![window(1, 50, 0)]);
        ledger.reconcile_window_surfaces(&after, &visible(0));
        assert_eq!(ledger.depth(WindowId(1)), Some(0));
        assert_eq!(ledger.depth(WindowId(2)), None);
    }

    #[test]
    fn test_clear_one_and_all() {
        let ledger = FallenSnowLedger::default();
        let snapshot = Snapshot::new(vec![window(1, 0, 0), window(2, 400, 0)]);
        for _ in 0..3 {
            ledger.reconcile_window_surfaces(&snapshot, &visible(0));
        }

        ledger.remove_snow_from_window(WindowId(1));
        assert_eq!(ledger.depth(WindowId(1)), Some(0));
        assert_eq!(ledger.depth(WindowId(2)), Some(2));

        ledger.remove_snow_from_all_windows();
        assert_eq!(ledger.depth(WindowId(2)), Some(0));
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                surfaces: 2,
                cleared_all: 1
            }
        );
    }
}
