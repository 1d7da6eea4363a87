pub mod dispatcher;
pub mod drag_tracker;
pub mod event_pump;
pub mod fallen_snow;
pub mod load_measure;
pub mod notifier;
pub mod reconciler;
pub mod snapshot;
pub mod tracker_context;
pub mod window_system;
pub mod workspace;

pub use dispatcher::EventDispatcher;
pub use event_pump::create_event_pump;
pub use fallen_snow::FallenSnowLedger;
pub use load_measure::LoadMonitor;
pub use notifier::create_fatal_reporter;
pub use reconciler::{ReconcileSettings, Reconciler};
pub use tracker_context::TrackerContext;
pub use window_system::create_window_system;
