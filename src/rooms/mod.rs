//! Room registry and the tick loop that drives it

pub mod manager;
pub mod service;
pub mod timers;

pub use manager::{Joined, RoomLimits, RoomManager};
pub use service::{run_tick_loop, shared, SharedRooms};
