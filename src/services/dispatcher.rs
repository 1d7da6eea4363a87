use crate::events::{CreateEvent, MapEvent, WindowEvent, WindowId};
use crate::services::drag_tracker::{MapFacts, SnowEffect};
use crate::services::tracker_context::{TrackerContext, TrackerState};
use crate::services::window_system::describe_ancestry;
use crate::{debug_if_enabled, trace_if_enabled};
use parking_lot::MutexGuard;
use std::sync::Arc;

/// Раздаёт события оконной системы обработчикам, по одному на вид события
pub struct EventDispatcher {
    context: Arc<TrackerContext>,
}

impl EventDispatcher {
    pub fn new(context: Arc<TrackerContext>) -> Self {
        Self { context }
    }

    pub fn dispatch(&self, event: &WindowEvent) {
        trace_if_enabled!(kind = ?event.kind(), "Событие: {}", event);

        match event {
            WindowEvent::Created(e) => self.on_created(e),
            WindowEvent::Mapped(e) => self.on_mapped(e),
            WindowEvent::Unmapped { window } => self.on_unmapped(*window),
            WindowEvent::Destroyed { window } => self.on_destroyed(*window),
            WindowEvent::ActiveAppChanged { window } => self.on_active_app_changed(*window),
            WindowEvent::Configured { .. } | WindowEvent::WorkspaceChanged => {
                self.context.snapshot.mark_changed()
            }
            WindowEvent::Reparented { .. }
            | WindowEvent::FocusIn { .. }
            | WindowEvent::FocusOut { .. } => {}
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.context.state.lock()
    }

    fn refresh(&self) {
        self.context
            .snapshot
            .refresh(self.context.system.as_window_system());
    }

    fn on_created(&self, event: &CreateEvent) {
        {
            let mut state = self.state();
            let context = state.candidate_context(self.context.root());
            state.drag.on_window_created(event, &context);
        }
        self.refresh();
    }

    fn on_mapped(&self, event: &MapEvent) {
        self.refresh();

        let snapshot = self.context.snapshot.current();
        let facts = MapFacts {
            event,
            root: self.context.root(),
            snapshot: &snapshot,
            oracle: self.context.system.as_oracle(),
        };

        let effect = self.state().drag.on_window_mapped(&facts);
        if effect != SnowEffect::None {
            debug_if_enabled!(
                "Окно {}: {}",
                event.window,
                describe_ancestry(self.context.system.as_oracle(), event.window)
            );
        }
        self.apply(effect);
    }

    fn on_unmapped(&self, window: WindowId) {
        self.state().drag.on_window_unmapped(window);
        self.refresh();
    }

    fn on_destroyed(&self, window: WindowId) {
        self.state().drag.on_window_destroyed(window);
        self.refresh();
    }

    fn on_active_app_changed(&self, window: Option<WindowId>) {
        let snapshot = self.context.snapshot.current();
        self.state().drag.on_active_app_changed(window, &snapshot);
    }

    fn apply(&self, effect: SnowEffect) {
        match effect {
            SnowEffect::None => {}
            SnowEffect::ClearWindow(window) => self.context.engine.remove_snow_from_window(window),
            SnowEffect::ClearAll => self.context.engine.remove_snow_from_all_windows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Position, Rect, WindowRecord};
    use crate::services::drag_tracker::{DragMethod, DragState};
    use crate::services::fallen_snow::{FallenSnowEngine, FallenSnowLedger};
    use crate::services::window_system::{
        OverlayInfo, SimulatedDesktop, WindowSystem,
    };
    use crate::services::workspace::WorkspaceSet;
    use crate::utils::Shutdown;

    const APP: WindowId = WindowId(0x0100_0001);
    const HELPER: WindowId = WindowId(0x0188_6367);

    struct Fixture {
        desktop: Arc<SimulatedDesktop>,
        ledger: Arc<FallenSnowLedger>,
        context: Arc<TrackerContext>,
        dispatcher: EventDispatcher,
    }

    fn fixture() -> Fixture {
        fixture_on(SimulatedDesktop::new())
    }

    fn fixture_on(desktop: SimulatedDesktop) -> Fixture {
        let desktop = Arc::new(desktop);
        desktop.add_window(WindowRecord::new(APP, Rect::new(100, 100, 800, 600)).with_workspace(0));
        let ledger = Arc::new(FallenSnowLedger::default());
        let overlay = OverlayInfo {
            window: WindowId(0x0500_0000),
            geometry: Rect::new(0, 0, 1920, 1080),
            is_root: false,
            transparent: true,
        };
        let context = Arc::new(TrackerContext::new(
            desktop.clone(),
            ledger.clone(),
            overlay,
            Shutdown::new(),
        ));
        let dispatcher = EventDispatcher::new(context.clone());
        Fixture {
            desktop,
            ledger,
            context,
            dispatcher,
        }
    }

    fn helper_created(root: WindowId) -> WindowEvent {
        WindowEvent::Created(CreateEvent {
            window: HELPER,
            parent: root,
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            border_width: 0,
            override_redirect: false,
            synthetic: false,
        })
    }

    fn mapped(root: WindowId, window: WindowId) -> WindowEvent {
        WindowEvent::Mapped(MapEvent {
            event_window: root,
            window,
            override_redirect: false,
            synthetic: false,
        })
    }

    fn settle_snow(f: &Fixture) {
        let snapshot = f.context.snapshot.refresh(f.desktop.as_ref());
        let workspaces = WorkspaceSet::single(0, Default::default());
        for _ in 0..3 {
            f.ledger.reconcile_window_surfaces(&snapshot, &workspaces);
        }
    }

    #[test]
    fn test_keyboard_drag_clears_all_once() {
        let f = fixture();
        let root = f.desktop.root();
        settle_snow(&f);

        f.dispatcher.dispatch(&WindowEvent::ActiveAppChanged { window: Some(APP) });
        f.dispatcher.dispatch(&helper_created(root));
        f.dispatcher.dispatch(&mapped(root, HELPER));

        assert_eq!(
            f.context.state.lock().drag.state(),
            DragState::Dragging {
                window: APP,
                method: DragMethod::ActiveAppKeyboard
            }
        );
        assert_eq!(f.ledger.stats().cleared_all, 1);
        assert_eq!(f.ledger.depth(APP), Some(0));

        f.dispatcher.dispatch(&WindowEvent::Destroyed { window: HELPER });
        assert_eq!(f.context.state.lock().drag.state(), DragState::Idle);
        assert_eq!(f.ledger.stats().cleared_all, 1);
    }

    #[test]
    fn test_keyboard_drag_of_window_active_before_start() {
        let desktop = SimulatedDesktop::new();
        desktop.set_active(Some(APP));
        let f = fixture_on(desktop);
        let root = f.desktop.root();

        let active = *f.context.state.lock().drag.active_app();
        assert_eq!(active.window, Some(APP));
        assert_eq!(active.position, Some(Position::new(100, 100)));

        f.dispatcher.dispatch(&helper_created(root));
        f.dispatcher.dispatch(&mapped(root, HELPER));

        assert_eq!(
            f.context.state.lock().drag.state(),
            DragState::Dragging {
                window: APP,
                method: DragMethod::ActiveAppKeyboard
            }
        );
        assert_eq!(f.ledger.stats().cleared_all, 1);
    }

    #[test]
    fn test_click_hold_clears_dragged_window() {
        let f = fixture();
        let root = f.desktop.root();
        let other = WindowId(0x0100_0002);
        f.desktop
            .add_window(WindowRecord::new(other, Rect::new(1000, 100, 400, 300)).with_workspace(0));
        settle_snow(&f);

        let titlebar = WindowId(0x0200_0001);
        f.desktop.set_parent(titlebar, APP);
        f.desktop.set_focus(Some(titlebar));
        f.desktop.set_button_held(true);

        f.dispatcher.dispatch(&mapped(root, WindowId(0x0300_0001)));

        assert_eq!(f.ledger.depth(APP), Some(0));
        assert_eq!(f.ledger.depth(other), Some(2));
        assert_eq!(f.ledger.stats().cleared_all, 0);

        f.dispatcher.dispatch(&WindowEvent::Unmapped {
            window: WindowId(0x0300_0001),
        });
        assert!(!f.context.state.lock().drag.is_dragging());
    }

    #[test]
    fn test_structure_events_refresh_snapshot() {
        let f = fixture();
        let root = f.desktop.root();
        let late = WindowId(0x0100_0009);

        f.desktop.add_window(WindowRecord::new(late, Rect::new(0, 0, 10, 10)));
        f.dispatcher.dispatch(&mapped(root, late));
        assert!(f.context.snapshot.lookup(late).is_some());

        f.desktop.remove_window(late);
        f.dispatcher.dispatch(&WindowEvent::Destroyed { window: late });
        assert!(f.context.snapshot.lookup(late).is_none());
    }

    #[test]
    fn test_configure_only_marks_changed() {
        let f = fixture();
        f.context.snapshot.take_changed();

        f.dispatcher.dispatch(&WindowEvent::Configured { window: APP });
        assert!(f.context.snapshot.take_changed());

        f.dispatcher.dispatch(&WindowEvent::FocusIn { window: APP });
        f.dispatcher.dispatch(&WindowEvent::Reparented {
            window: APP,
            parent: WindowId(0x42),
        });
        assert!(!f.context.snapshot.take_changed());
    }
}
