use crate::config::Config;
use crate::error::{Result, XsnowError};
use crate::events::Position;
use crate::services::notifier::FatalReporter;
use crate::services::tracker_context::{TrackerContext, TrackerState};
use crate::services::workspace::WorkspaceDiscovery;
use crate::{debug_if_enabled, xsnow_error};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub keep_snow_on_windows: bool,
    /// Принудительное обновление снимка каждые N тактов
    pub force_refresh_every: u32,
    pub soft_lock_retries: u32,
    pub offset: Position,
    /// Снег на всех рабочих пространствах (в том числе для "липкого" окна)
    pub all_workspaces: bool,
}

impl ReconcileSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            keep_snow_on_windows: config.windows.keep_snow_on_windows,
            force_refresh_every: config.windows.force_refresh_every,
            soft_lock_retries: config.windows.soft_lock_retries,
            offset: Position::new(config.windows.offset_x, config.windows.offset_y),
            all_workspaces: config.windows.all_workspaces || config.overlay.sticky,
        }
    }
}

/// Периодическая сверка снимка окон, рабочих пространств и снега.
///
/// `tick` вызывается планировщиком; `false` означает "больше не вызывать".
pub struct Reconciler {
    context: Arc<TrackerContext>,
    discovery: WorkspaceDiscovery,
    reporter: Arc<dyn FatalReporter>,
    settings: ReconcileSettings,
    ticks_since_refresh: u32,
    lock_failures: u32,
}

impl Reconciler {
    pub fn new(
        context: Arc<TrackerContext>,
        reporter: Arc<dyn FatalReporter>,
        settings: ReconcileSettings,
        probe_timeout: Duration,
    ) -> Self {
        info!(
            "Инициализация Reconciler (принудительное обновление каждые {} тактов)",
            settings.force_refresh_every
        );
        Self {
            context,
            discovery: WorkspaceDiscovery::new(probe_timeout),
            reporter,
            settings,
            ticks_since_refresh: 0,
            lock_failures: 0,
        }
    }

    /// `tick` для вызова из рабочего потока tokio: поиск рабочих
    /// пространств синхронно ждёт пробное окно.
    pub fn tick_blocking(&mut self) -> bool {
        tokio::task::block_in_place(|| self.tick())
    }

    pub fn tick(&mut self) -> bool {
        if self.context.shutdown.is_requested() {
            return false;
        }
        if !self.settings.keep_snow_on_windows {
            return true;
        }

        let context = Arc::clone(&self.context);
        let Some(mut state) = context
            .state
            .soft_lock(self.settings.soft_lock_retries, &mut self.lock_failures)
        else {
            debug_if_enabled!("Блокировка снега занята, такт пропущен");
            return true;
        };

        self.ticks_since_refresh += 1;
        let forced = self.ticks_since_refresh >= self.settings.force_refresh_every;

        let changed = context.snapshot.take_changed();
        if !changed && !forced {
            return true;
        }
        if forced && !changed {
            debug_if_enabled!("Принудительное обновление снимка окон");
        }
        self.ticks_since_refresh = 0;

        let system = context.system.as_window_system();
        let Some(workspace) = system.current_workspace() else {
            drop(state);
            self.fatal("Рабочее пространство потеряно", XsnowError::WorkspaceLost);
            return false;
        };

        if state.current_workspace != Some(workspace) {
            self.on_workspace_changed(&mut state, workspace);
        }

        if state.drag.is_dragging() {
            // Окно двигает WM: список окон не перечитываем
            debug_if_enabled!("Идёт перетаскивание окна {:?}", state.drag.state().window());
            context
                .engine
                .reconcile_window_surfaces(&context.snapshot.current(), &state.workspaces);
            return true;
        }

        let snapshot = context.snapshot.reload(system);
        if tracing::enabled!(tracing::Level::TRACE) {
            context.snapshot.for_each(|record| tracing::trace!("  {}", record));
        }

        if let Err(error) = self.update_overlay_geometry(&mut state) {
            drop(state);
            self.fatal("Окно снега потеряно", error);
            return false;
        }

        context
            .engine
            .reconcile_window_surfaces(&snapshot, &state.workspaces);
        true
    }

    fn on_workspace_changed(&self, state: &mut TrackerState, workspace: i64) {
        info!(
            "Рабочее пространство: {:?} -> {}",
            state.current_workspace, workspace
        );

        let set = self.discovery.discover_visible_workspaces(
            self.context.system.as_window_system(),
            workspace,
            self.settings.offset,
        );

        let overlay = state.overlay_geometry.origin();
        self.context
            .snapshot
            .set_correction(Position::new(set.offset.x - overlay.x, set.offset.y - overlay.y));

        let visible = set.is_active(state.chosen_workspace, self.settings.all_workspaces);
        if visible != state.snow_visible {
            info!(
                "Снег {} (рабочее пространство {})",
                if visible { "показан" } else { "скрыт" },
                state.chosen_workspace
            );
        }

        state.snow_visible = visible;
        state.workspaces = set;
        state.current_workspace = Some(workspace);
    }

    /// Перечитывает размер окна снега (смена разрешения, RandR).
    ///
    /// Пропажа окна фатальна, кроме корневого и прозрачного окна композитора.
    fn update_overlay_geometry(&self, state: &mut TrackerState) -> Result<()> {
        let overlay = self.context.overlay;
        let geometry = match self.context.system.window_geometry(overlay.window) {
            Ok(geometry) => geometry,
            Err(e) if overlay.is_root || overlay.transparent => {
                debug!("Геометрия окна снега {} недоступна: {}", overlay.window, e);
                return Ok(());
            }
            Err(e) => {
                return Err(xsnow_error!(
                    overlay_lost,
                    "окно {} больше не существует: {}",
                    overlay.window,
                    e
                ))
            }
        };

        let current = &mut state.overlay_geometry;
        if (current.width, current.height) != (geometry.width, geometry.height) {
            info!(
                "Размер окна снега {}: {}x{} -> {}x{}",
                overlay.window, current.width, current.height, geometry.width, geometry.height
            );
            current.width = geometry.width;
            current.height = geometry.height;
        }
        Ok(())
    }

    fn fatal(&self, title: &str, error: XsnowError) {
        self.reporter.report_fatal(title, &error.to_string());
        self.context.shutdown.request(title);
    }
}
