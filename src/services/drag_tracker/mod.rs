//! DragTracker: responsibility and boundaries
//!
//! There is no window-system-wide "drag started/ended" event, so the tracker
//! infers a drag from incidental events (map, create, unmap, destroy, active
//! window change). It only decides transitions and reports which snow has to
//! be cleared; applying that to the accumulation engine is the dispatcher's job.

mod rules;
mod state;

pub use rules::{
    match_drag_window_signature, resolve_drag_window, CandidateContext, MapFacts, MAP_RULES,
};
pub use state::{ActiveAppState, DragMethod, DragState, SnowEffect};

use crate::debug_if_enabled;
use crate::events::{CreateEvent, WindowId};
use crate::services::snapshot::Snapshot;
use tracing::info;

#[derive(Debug, Default)]
pub struct DragTracker {
    state: DragState,
    active: ActiveAppState,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn active_app(&self) -> &ActiveAppState {
        &self.active
    }

    pub fn is_dragging(&self) -> bool {
        self.state.is_dragging()
    }

    /// Запоминает созданное окно как кандидата, если оно похоже на
    /// служебное окно перетаскивания KDE. Возвращает `true` при записи.
    pub fn on_window_created(&mut self, event: &CreateEvent, context: &CandidateContext) -> bool {
        match match_drag_window_signature(event, context) {
            Ok(()) => {
                debug_if_enabled!("Кандидат в окно перетаскивания: {}", event.window);
                self.active.drag_candidate = Some(event.window);
                true
            }
            Err(field) => {
                debug_if_enabled!(
                    "Окно {} не похоже на окно перетаскивания (поле {})",
                    event.window,
                    field
                );
                false
            }
        }
    }

    /// Проверяет правила MapNotify по порядку и применяет первое сработавшее
    pub fn on_window_mapped(&mut self, facts: &MapFacts<'_>) -> SnowEffect {
        for rule in MAP_RULES.iter() {
            if rule.idle_only && self.state.is_dragging() {
                continue;
            }
            if let Some(transition) = (rule.evaluate)(facts, &self.active) {
                info!(
                    "Перетаскивание ({}): {} -> {}",
                    rule.name, self.state, transition.next
                );
                self.state = transition.next;
                return transition.effect;
            }
        }
        SnowEffect::None
    }

    /// Любое скрытие окна завершает перетаскивание. Возвращает `true`,
    /// если состояние было сброшено.
    pub fn on_window_unmapped(&mut self, window: WindowId) -> bool {
        self.finish_drag(window)
    }

    pub fn on_window_destroyed(&mut self, window: WindowId) -> bool {
        self.finish_drag(window)
    }

    /// Смена активного приложения всегда сбрасывает перетаскивание
    pub fn on_active_app_changed(&mut self, window: Option<WindowId>, snapshot: &Snapshot) {
        self.clear_active_app_fields();

        self.active.window = window;
        self.active.position = window
            .and_then(|w| snapshot.lookup(w))
            .map(|record| record.position());

        debug_if_enabled!("Активное приложение: {:?}", self.active);
    }

    fn finish_drag(&mut self, window: WindowId) -> bool {
        if !self.state.is_dragging() {
            return false;
        }
        info!("Перетаскивание завершено ({}): {} -> Idle", window, self.state);
        self.clear_drag_fields();
        true
    }

    fn clear_drag_fields(&mut self) {
        self.state = DragState::Idle;
        self.active.drag_candidate = None;
    }

    fn clear_active_app_fields(&mut self) {
        self.active.window = None;
        self.active.position = None;
        self.clear_drag_fields();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MapEvent, Position, Rect, WindowRecord};
    use crate::services::window_system::{SimulatedDesktop, WindowSystem};

    const APP: WindowId = WindowId(0x0100_0001);
    const HELPER: WindowId = WindowId(0x0188_6367);

    fn snapshot() -> Snapshot {
        Snapshot::new(vec![
            WindowRecord::new(APP, Rect::new(100, 200, 800, 600)),
            WindowRecord::new(WindowId(0x0100_0002), Rect::new(900, 100, 400, 300)),
        ])
    }

    fn context(desktop: &SimulatedDesktop) -> CandidateContext {
        CandidateContext {
            root: desktop.root(),
            overlay_width: 1920,
            overlay_height: 1080,
        }
    }

    fn helper_created(desktop: &SimulatedDesktop) -> CreateEvent {
        CreateEvent {
            window: HELPER,
            parent: desktop.root(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            border_width: 0,
            override_redirect: false,
            synthetic: false,
        }
    }

    fn mapped(desktop: &SimulatedDesktop, window: WindowId) -> MapEvent {
        MapEvent {
            event_window: desktop.root(),
            window,
            override_redirect: false,
            synthetic: false,
        }
    }

    #[test]
    fn test_active_app_change_records_position() {
        let mut tracker = DragTracker::new();
        tracker.on_active_app_changed(Some(APP), &snapshot());

        assert_eq!(tracker.active_app().window, Some(APP));
        assert_eq!(tracker.active_app().position, Some(Position::new(100, 200)));

        tracker.on_active_app_changed(Some(WindowId(0xdead)), &snapshot());
        assert_eq!(tracker.active_app().position, None);
    }

    #[test]
    fn test_keyboard_drag_detected_and_clears_all_once() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        let mut tracker = DragTracker::new();
        tracker.on_active_app_changed(Some(APP), &snapshot);

        assert!(tracker.on_window_created(&helper_created(&desktop), &context(&desktop)));
        assert_eq!(tracker.active_app().drag_candidate, Some(HELPER));

        let event = mapped(&desktop, HELPER);
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        assert_eq!(tracker.on_window_mapped(&facts), SnowEffect::ClearAll);
        assert_eq!(
            tracker.state(),
            DragState::Dragging {
                window: APP,
                method: DragMethod::ActiveAppKeyboard
            }
        );
    }

    #[test]
    fn test_keyboard_drag_needs_active_app() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        let mut tracker = DragTracker::new();
        tracker.on_window_created(&helper_created(&desktop), &context(&desktop));

        let event = mapped(&desktop, HELPER);
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        assert_eq!(tracker.on_window_mapped(&facts), SnowEffect::None);
        assert_eq!(tracker.state(), DragState::Idle);
    }

    #[test]
    fn test_keyboard_drag_ignores_other_windows() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        let mut tracker = DragTracker::new();
        tracker.on_active_app_changed(Some(APP), &snapshot);
        tracker.on_window_created(&helper_created(&desktop), &context(&desktop));

        let mut event = mapped(&desktop, WindowId(0x4242));
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        assert_eq!(tracker.on_window_mapped(&facts), SnowEffect::None);

        event = MapEvent {
            synthetic: true,
            ..mapped(&desktop, HELPER)
        };
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        assert_eq!(tracker.on_window_mapped(&facts), SnowEffect::None);
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn test_click_hold_drag_resolves_ancestor() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        let titlebar = WindowId(0x0200_0005);
        desktop.set_parent(titlebar, WindowId(0x0100_0002));
        desktop.set_focus(Some(titlebar));
        desktop.set_button_held(true);

        let mut tracker = DragTracker::new();
        let event = mapped(&desktop, WindowId(0x0300_0000));
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };

        assert_eq!(
            tracker.on_window_mapped(&facts),
            SnowEffect::ClearWindow(WindowId(0x0100_0002))
        );
        assert_eq!(
            tracker.state(),
            DragState::Dragging {
                window: WindowId(0x0100_0002),
                method: DragMethod::ClickHold
            }
        );
    }

    #[test]
    fn test_click_hold_needs_button() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        desktop.set_focus(Some(APP));

        let mut tracker = DragTracker::new();
        let event = mapped(&desktop, WindowId(0x0300_0000));
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        assert_eq!(tracker.on_window_mapped(&facts), SnowEffect::None);
    }

    #[test]
    fn test_unmap_and_destroy_reset_drag() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        desktop.set_focus(Some(APP));
        desktop.set_button_held(true);

        let mut tracker = DragTracker::new();
        let event = mapped(&desktop, WindowId(0x0300_0000));
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        tracker.on_window_mapped(&facts);
        assert!(tracker.is_dragging());

        assert!(tracker.on_window_unmapped(APP));
        assert_eq!(tracker.state(), DragState::Idle);
        // Повторный сброс ничего не меняет
        assert!(!tracker.on_window_unmapped(APP));
        assert!(!tracker.on_window_destroyed(APP));
        assert_eq!(tracker.state(), DragState::Idle);
    }

    #[test]
    fn test_reset_clears_candidate() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        let mut tracker = DragTracker::new();
        tracker.on_active_app_changed(Some(APP), &snapshot);
        tracker.on_window_created(&helper_created(&desktop), &context(&desktop));

        let event = mapped(&desktop, HELPER);
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        tracker.on_window_mapped(&facts);
        tracker.on_window_destroyed(HELPER);

        assert_eq!(tracker.active_app().drag_candidate, None);
        assert_eq!(tracker.active_app().window, Some(APP));
    }

    #[test]
    fn test_active_app_change_resets_drag() {
        let desktop = SimulatedDesktop::new();
        let snapshot = snapshot();
        desktop.set_focus(Some(APP));
        desktop.set_button_held(true);

        let mut tracker = DragTracker::new();
        let event = mapped(&desktop, WindowId(0x0300_0000));
        let facts = MapFacts {
            event: &event,
            root: desktop.root(),
            snapshot: &snapshot,
            oracle: &desktop,
        };
        tracker.on_window_mapped(&facts);
        assert!(tracker.is_dragging());

        tracker.on_active_app_changed(None, &snapshot);
        assert_eq!(tracker.state(), DragState::Idle);
        assert_eq!(tracker.active_app(), &ActiveAppState::default());
    }
}
