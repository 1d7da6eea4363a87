pub mod window;

pub use window::{
    CreateEvent, MapEvent, Position, Rect, WindowEvent, WindowEventType, WindowId, WindowRecord,
};
