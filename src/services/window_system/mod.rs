//! Window system adapter: responsibility and boundaries
//!
//! This module and its submodules only talk to the display server: enumerate
//! windows, answer pointer/focus/parent queries, drive the probe window and
//! translate raw protocol events into [`WindowEvent`](crate::events::WindowEvent).
//! Drag inference and snapshot bookkeeping live in the tracker services.

mod dry_run;
mod simulated;
mod x11;
mod r#trait;

pub use self::r#trait::{
    create_window_system, describe_ancestry, select_monitor, Desktop, OverlayInfo,
    OverlayRequest, OverlayWindows, WindowOracle, WindowSystem,
};
pub use self::simulated::SimulatedDesktop;
