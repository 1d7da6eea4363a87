use crate::error::{XsnowError, Result};
use crate::events::{Position, Rect, WindowEvent, WindowId, WindowRecord};
use crate::xsnow_error;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::debug;

use super::dry_run::DryRunScenario;
use super::r#trait::{
    select_monitor, OverlayInfo, OverlayRequest, OverlayWindows, WindowOracle, WindowSystem,
};

const ROOT: WindowId = WindowId(0x0000_0764);
const FIRST_ID: u32 = 0x0180_0000;

/// In-memory рабочий стол: окна, мониторы, фокус и очередь событий.
///
/// Используется в dry-run режиме (со сценарием) и как тестовый двойник
/// в модульных тестах.
pub struct SimulatedDesktop {
    state: Mutex<DesktopState>,
    scenario: Mutex<Option<DryRunScenario>>,
}

#[derive(Debug)]
pub(super) struct DesktopState {
    pub windows: Vec<WindowRecord>,
    pub parents: HashMap<WindowId, WindowId>,
    pub focused: Option<WindowId>,
    pub active: Option<WindowId>,
    pub button_held: bool,
    pub current_workspace: Option<i64>,
    pub monitors: Vec<Rect>,
    /// Рабочее пространство, видимое на каждом мониторе
    pub monitor_workspaces: Vec<i64>,
    pub failing_monitor_queries: HashSet<usize>,
    pub list_fails: bool,
    pub events: VecDeque<WindowEvent>,
    next_id: u32,
    probes: HashMap<WindowId, Option<Position>>,
    mapped_probes: HashSet<WindowId>,
    probe_operations: usize,
    probe_relocations: usize,
    expose_count: usize,
    stacking_calls: Vec<(WindowId, &'static str)>,
}

impl DesktopState {
    pub fn allocate_id(&mut self) -> WindowId {
        self.next_id += 1;
        WindowId(self.next_id)
    }

    fn root_size(&self) -> Rect {
        let width = self
            .monitors
            .iter()
            .map(|m| m.x + m.width as i32)
            .max()
            .unwrap_or(1920);
        let height = self
            .monitors
            .iter()
            .map(|m| m.y + m.height as i32)
            .max()
            .unwrap_or(1080);
        Rect::new(0, 0, width.max(0) as u32, height.max(0) as u32)
    }

    pub fn record_mut(&mut self, window: WindowId) -> Option<&mut WindowRecord> {
        self.windows.iter_mut().find(|w| w.window == window)
    }
}

impl Default for SimulatedDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDesktop {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DesktopState {
                windows: Vec::new(),
                parents: HashMap::new(),
                focused: None,
                active: None,
                button_held: false,
                current_workspace: Some(0),
                monitors: vec![Rect::new(0, 0, 1920, 1080)],
                monitor_workspaces: vec![0],
                failing_monitor_queries: HashSet::new(),
                list_fails: false,
                events: VecDeque::new(),
                next_id: FIRST_ID,
                probes: HashMap::new(),
                mapped_probes: HashSet::new(),
                probe_operations: 0,
                probe_relocations: 0,
                expose_count: 0,
                stacking_calls: Vec::new(),
            }),
            scenario: Mutex::new(None),
        }
    }

    pub(super) fn with_scenario(scenario: DryRunScenario) -> Self {
        let desktop = Self::new();
        *desktop.scenario.lock() = Some(scenario);
        desktop
    }

    pub(super) fn with_state<R>(&self, f: impl FnOnce(&mut DesktopState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn add_window(&self, record: WindowRecord) {
        let mut state = self.state.lock();
        state.parents.insert(record.window, ROOT);
        state.windows.push(record);
    }

    pub fn move_record(&self, window: WindowId, position: Position) {
        if let Some(record) = self.state.lock().record_mut(window) {
            record.x = position.x;
            record.y = position.y;
        }
    }

    pub fn set_parent(&self, window: WindowId, parent: WindowId) {
        self.state.lock().parents.insert(window, parent);
    }

    pub fn set_focus(&self, window: Option<WindowId>) {
        self.state.lock().focused = window;
    }

    pub fn set_active(&self, window: Option<WindowId>) {
        self.state.lock().active = window;
    }

    pub fn set_button_held(&self, held: bool) {
        self.state.lock().button_held = held;
    }

    pub fn set_current_workspace(&self, workspace: Option<i64>) {
        self.state.lock().current_workspace = workspace;
    }

    /// Задаёт мониторы и рабочее пространство, видимое на каждом из них
    pub fn set_monitors(&self, monitors: Vec<(Rect, i64)>) {
        let mut state = self.state.lock();
        state.monitors = monitors.iter().map(|(rect, _)| *rect).collect();
        state.monitor_workspaces = monitors.iter().map(|(_, ws)| *ws).collect();
    }

    pub fn push_event(&self, event: WindowEvent) {
        self.state.lock().events.push_back(event);
    }

    fn restack(&self, window: WindowId, place: &'static str) {
        let mut state = self.state.lock();
        state.stacking_calls.push((window, place));
        debug!(
            "Симуляция: окно {} {} ({} изменений стека)",
            window,
            place,
            state.stacking_calls.len()
        );
    }

    fn monitor_index_at(state: &DesktopState, position: Position) -> Option<usize> {
        state.monitors.iter().position(|m| {
            position.x >= m.x
                && position.y >= m.y
                && position.x < m.x + m.width as i32
                && position.y < m.y + m.height as i32
        })
    }
}

/// Управление сбоями и счётчики для тестов
#[cfg(test)]
impl SimulatedDesktop {
    pub fn remove_window(&self, window: WindowId) {
        let mut state = self.state.lock();
        state.windows.retain(|w| w.window != window);
        state.parents.remove(&window);
    }

    pub fn resize_window(&self, window: WindowId, width: u32, height: u32) {
        if let Some(record) = self.state.lock().record_mut(window) {
            record.width = width;
            record.height = height;
        }
    }

    pub fn fail_workspace_query_on(&self, monitor: usize) {
        self.state.lock().failing_monitor_queries.insert(monitor);
    }

    pub fn set_list_failure(&self, fails: bool) {
        self.state.lock().list_fails = fails;
    }

    pub fn probe_relocations(&self) -> usize {
        self.state.lock().probe_relocations
    }

    pub fn probe_operations(&self) -> usize {
        self.state.lock().probe_operations
    }

    pub fn live_probes(&self) -> usize {
        self.state.lock().probes.len()
    }

    pub fn expose_count(&self) -> usize {
        self.state.lock().expose_count
    }

    pub fn stacking_calls(&self) -> Vec<(WindowId, &'static str)> {
        self.state.lock().stacking_calls.clone()
    }
}

impl WindowOracle for SimulatedDesktop {
    fn pointer_button_held(&self, _window: WindowId) -> bool {
        self.state.lock().button_held
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.state.lock().focused
    }

    fn parent_of(&self, window: WindowId) -> Option<WindowId> {
        if window == ROOT {
            return None;
        }
        self.state.lock().parents.get(&window).copied()
    }
}

impl WindowSystem for SimulatedDesktop {
    fn root(&self) -> WindowId {
        ROOT
    }

    fn list_windows(&self) -> Result<Vec<WindowRecord>> {
        let state = self.state.lock();
        if state.list_fails {
            return Err(xsnow_error!(internal, "симуляция: список окон недоступен"));
        }
        Ok(state.windows.clone())
    }

    fn window_geometry(&self, window: WindowId) -> Result<Rect> {
        let state = self.state.lock();
        if window == ROOT {
            return Ok(state.root_size());
        }
        state
            .windows
            .iter()
            .find(|w| w.window == window)
            .map(|w| w.geometry())
            .ok_or_else(|| xsnow_error!(internal, "окно {} не существует", window))
    }

    fn current_workspace(&self) -> Option<i64> {
        self.state.lock().current_workspace
    }

    fn monitors(&self) -> Result<Vec<Rect>> {
        Ok(self.state.lock().monitors.clone())
    }

    fn active_window(&self) -> Option<WindowId> {
        self.state.lock().active
    }

    fn create_probe_window(&self) -> Result<WindowId> {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.probes.insert(id, None);
        state.probe_operations += 1;
        Ok(id)
    }

    fn map_window(&self, window: WindowId) -> Result<()> {
        let mut state = self.state.lock();
        if state.probes.contains_key(&window) {
            state.mapped_probes.insert(window);
            state.probe_operations += 1;
        }
        Ok(())
    }

    fn move_window(&self, window: WindowId, position: Position) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(slot) = state.probes.get_mut(&window) {
            *slot = Some(position);
            state.probe_operations += 1;
            state.probe_relocations += 1;
        } else if let Some(record) = state.record_mut(window) {
            record.x = position.x;
            record.y = position.y;
        }
        Ok(())
    }

    fn wait_until_viewable(&self, window: WindowId, _timeout: Duration) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.mapped_probes.contains(&window)
            || state.windows.iter().any(|w| w.window == window))
    }

    fn workspace_of(&self, window: WindowId) -> Result<i64> {
        let state = self.state.lock();
        if let Some(position) = state.probes.get(&window).copied().flatten() {
            let monitor = Self::monitor_index_at(&state, position)
                .ok_or_else(|| xsnow_error!(internal, "пробное окно вне мониторов"))?;
            if state.failing_monitor_queries.contains(&monitor) {
                return Err(XsnowError::WorkspaceLost);
            }
            return state
                .monitor_workspaces
                .get(monitor)
                .copied()
                .ok_or(XsnowError::WorkspaceLost);
        }
        state
            .windows
            .iter()
            .find(|w| w.window == window)
            .and_then(|w| w.workspace)
            .ok_or(XsnowError::WorkspaceLost)
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        let mut state = self.state.lock();
        if state.probes.remove(&window).is_some() {
            state.mapped_probes.remove(&window);
            state.probe_operations += 1;
            debug!(
                "Симуляция: пробное окно {} удалено ({} перемещений, {} операций)",
                window, state.probe_relocations, state.probe_operations
            );
        }
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WindowEvent>> {
        if let Some(event) = self.state.lock().events.pop_front() {
            return Ok(Some(event));
        }
        if let Some(scenario) = self.scenario.lock().as_mut() {
            scenario.advance(self);
        }
        Ok(self.state.lock().events.pop_front())
    }

    fn send_expose(&self, window: WindowId, _size: Rect) -> Result<()> {
        let mut state = self.state.lock();
        state.expose_count += 1;
        debug!("Симуляция: Expose #{} для {}", state.expose_count, window);
        Ok(())
    }
}

impl OverlayWindows for SimulatedDesktop {
    fn create_overlay_window(&self, request: OverlayRequest) -> Result<OverlayInfo> {
        let mut state = self.state.lock();
        let geometry = if request.screen < 0 {
            state.root_size()
        } else {
            select_monitor(&state.monitors, request.screen as usize)
                .unwrap_or_else(|| state.root_size())
        };

        let window = state.allocate_id();
        let mut record = WindowRecord::new(window, geometry).with_sticky(request.sticky);
        record.dock = request.dock;
        state.parents.insert(window, ROOT);
        state.windows.push(record);

        Ok(OverlayInfo {
            window,
            geometry,
            is_root: false,
            transparent: true,
        })
    }

    fn set_stacking_below(&self, window: WindowId) -> Result<()> {
        self.restack(window, "below");
        Ok(())
    }

    fn set_stacking_above(&self, window: WindowId) -> Result<()> {
        self.restack(window, "above");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Stacking;

    #[test]
    fn test_probe_bookkeeping() {
        let desktop = SimulatedDesktop::new();
        desktop.set_monitors(vec![
            (Rect::new(0, 0, 1920, 1080), 0),
            (Rect::new(1920, 0, 1920, 1080), 3),
        ]);

        let probe = desktop.create_probe_window().unwrap();
        desktop.map_window(probe).unwrap();
        desktop.move_window(probe, Position::new(2880, 540)).unwrap();

        assert!(desktop.wait_until_viewable(probe, Duration::from_millis(10)).unwrap());
        assert_eq!(desktop.workspace_of(probe).unwrap(), 3);
        assert_eq!(desktop.probe_relocations(), 1);

        desktop.destroy_window(probe).unwrap();
        assert_eq!(desktop.live_probes(), 0);
        assert_eq!(desktop.probe_operations(), 4);
    }

    #[test]
    fn test_overlay_is_listed() {
        let desktop = SimulatedDesktop::new();
        let overlay = desktop
            .create_overlay_window(OverlayRequest {
                screen: -1,
                sticky: true,
                stacking: Stacking::Below,
                dock: true,
            })
            .unwrap();

        let windows = desktop.list_windows().unwrap();
        assert!(windows.iter().any(|w| w.window == overlay.window));
        assert_eq!(overlay.geometry, Rect::new(0, 0, 1920, 1080));
        assert_eq!(desktop.parent_of(overlay.window), Some(desktop.root()));
    }

    #[test]
    fn test_expose_and_stacking_are_recorded() {
        let desktop = SimulatedDesktop::new();
        let window = WindowId(0x0500_0000);

        desktop.send_expose(window, Rect::new(0, 0, 1920, 1080)).unwrap();
        desktop.set_stacking_below(window).unwrap();
        desktop.set_stacking_above(window).unwrap();

        assert_eq!(desktop.expose_count(), 1);
        assert_eq!(desktop.stacking_calls(), vec![(window, "below"), (window, "above")]);
    }
}
