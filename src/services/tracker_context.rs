use crate::events::{Position, Rect, WindowId};
use crate::services::drag_tracker::{CandidateContext, DragTracker};
use crate::services::fallen_snow::{FallenSnowEngine, FallenSnowLock};
use crate::services::snapshot::SnapshotStore;
use crate::services::window_system::{Desktop, OverlayInfo};
use crate::services::workspace::WorkspaceSet;
use crate::utils::Shutdown;
use std::sync::Arc;
use tracing::info;

/// Изменяемое состояние отслеживания, защищённое общей блокировкой снега
pub struct TrackerState {
    pub drag: DragTracker,
    pub workspaces: WorkspaceSet,
    /// Рабочее пространство, виденное последним тактом
    pub current_workspace: Option<i64>,
    /// Рабочее пространство, на котором показывается снег
    pub chosen_workspace: i64,
    pub snow_visible: bool,
    /// Текущая геометрия окна снега; меняется вместе с разрешением экрана
    pub overlay_geometry: Rect,
}

impl TrackerState {
    pub fn new(chosen_workspace: i64, overlay_geometry: Rect) -> Self {
        Self {
            drag: DragTracker::new(),
            workspaces: WorkspaceSet::single(chosen_workspace, Position::default()),
            current_workspace: None,
            chosen_workspace,
            snow_visible: true,
            overlay_geometry,
        }
    }

    /// Сигнатура служебного окна перетаскивания для текущего размера окна снега
    pub fn candidate_context(&self, root: WindowId) -> CandidateContext {
        CandidateContext {
            root,
            overlay_width: self.overlay_geometry.width,
            overlay_height: self.overlay_geometry.height,
        }
    }
}

/// Общий контекст для обработчиков событий и цикла сверки
pub struct TrackerContext {
    pub system: Arc<dyn Desktop>,
    pub engine: Arc<dyn FallenSnowEngine>,
    pub state: FallenSnowLock<TrackerState>,
    pub snapshot: SnapshotStore,
    pub overlay: OverlayInfo,
    pub shutdown: Shutdown,
}

impl TrackerContext {
    pub fn new(
        system: Arc<dyn Desktop>,
        engine: Arc<dyn FallenSnowEngine>,
        overlay: OverlayInfo,
        shutdown: Shutdown,
    ) -> Self {
        let chosen = system.current_workspace().unwrap_or(0);
        info!(
            "Окно снега {} ({}x{}), рабочее пространство {}",
            overlay.window, overlay.geometry.width, overlay.geometry.height, chosen
        );

        let snapshot = SnapshotStore::new();
        let mut state = TrackerState::new(chosen, overlay.geometry);

        // Окно, активное ещё до запуска: без него перетаскивание с клавиатуры
        // не распознаётся до первой смены активного окна
        if let Some(active) = system.active_window() {
            let current = snapshot.refresh(system.as_window_system());
            state.drag.on_active_app_changed(Some(active), &current);
        }

        Self {
            system,
            engine,
            state: FallenSnowLock::new(state),
            snapshot,
            overlay,
            shutdown,
        }
    }

    pub fn root(&self) -> WindowId {
        self.system.root()
    }
}
