//! Game simulation modules

pub mod bot;
pub mod combat;
pub mod geometry;
pub mod knight;
pub mod map;
pub mod powerup;
pub mod room;
pub mod rules;
pub mod settings;
pub mod snapshot;
pub mod terrain;
pub mod weapon;
pub mod world;

pub use room::{GameMode, Room, RoomError, RoomState};
