use crate::events::{Position, WindowId, WindowRecord};
use crate::services::window_system::WindowSystem;
use crate::debug_if_enabled;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Неизменяемый снимок всех окон на экране
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    windows: Vec<WindowRecord>,
}

impl Snapshot {
    pub fn new(windows: Vec<WindowRecord>) -> Self {
        Self { windows }
    }

    pub fn lookup(&self, window: WindowId) -> Option<&WindowRecord> {
        self.windows.iter().find(|record| record.window == window)
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.lookup(window).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowRecord> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Хранилище текущего снимка окон.
///
/// Снимок заменяется целиком (`Arc` под `RwLock`), поэтому читатели видят
/// либо старый, либо новый список, но никогда не частично обновлённый.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    changed: AtomicBool,
    /// Поправка к позициям окон: смещение WM минус позиция окна снега
    correction: RwLock<Position>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
            changed: AtomicBool::new(true),
            correction: RwLock::new(Position::default()),
        }
    }

    /// Перечитывает окна из оконной системы, атомарно заменяет снимок и
    /// отмечает изменение для цикла сверки.
    pub fn refresh(&self, system: &dyn WindowSystem) -> Arc<Snapshot> {
        let snapshot = self.reload(system);
        self.mark_changed();
        snapshot
    }

    /// То же, что `refresh`, но флаг изменений не трогает: отметка,
    /// поставленная обработчиком во время чтения, доживает до следующего такта.
    /// Ошибка запроса означает "нет видимых окон".
    pub fn reload(&self, system: &dyn WindowSystem) -> Arc<Snapshot> {
        let mut windows = match system.list_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Не удалось получить список окон: {}, считаем что окон нет", e);
                Vec::new()
            }
        };

        let correction = *self.correction.read();
        if correction != Position::default() {
            for record in &mut windows {
                record.x += correction.x;
                record.y += correction.y;
            }
        }

        let snapshot = Arc::new(Snapshot::new(windows));
        *self.current.write() = Arc::clone(&snapshot);

        debug_if_enabled!("Снимок окон обновлён: {} окон", snapshot.len());
        snapshot
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn lookup(&self, window: WindowId) -> Option<WindowRecord> {
        self.current.read().lookup(window).cloned()
    }

    /// Обходит окна в порядке перечисления
    pub fn for_each(&self, mut f: impl FnMut(&WindowRecord)) {
        let snapshot = self.current();
        snapshot.iter().for_each(|record| f(record));
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }

    /// Возвращает и сбрасывает флаг изменений
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    pub fn set_correction(&self, correction: Position) {
        *self.correction.write() = correction;
    }
}
