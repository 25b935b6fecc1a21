//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::map::{MapCatalog, MapProvider};
use crate::rooms::{self, RoomLimits, RoomManager, SharedRooms};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub maps: Arc<dyn MapProvider>,
    pub rooms: SharedRooms,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let maps: Arc<dyn MapProvider> = Arc::new(MapCatalog::builtin());

        let limits = RoomLimits {
            max_rooms: config.max_rooms,
            max_players_per_room: config.max_players_per_room,
        };
        let rooms = rooms::shared(RoomManager::new(Arc::clone(&maps), limits));

        Self { config, maps, rooms }
    }
}
