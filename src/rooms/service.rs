//! Global tick loop driving every room

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::interval;
use tracing::{info, warn};

use crate::util::time::{unix_millis, Timer, SIMULATION_TPS, TICK_DURATION_MICROS};

use super::manager::RoomManager;

/// Registry handle shared by the tick loop and every connection
pub type SharedRooms = Arc<Mutex<RoomManager>>;

pub fn shared(manager: RoomManager) -> SharedRooms {
    Arc::new(Mutex::new(manager))
}

/// Tick all rooms at a fixed rate until the process exits
pub async fn run_tick_loop(rooms: SharedRooms) {
    info!(tps = SIMULATION_TPS, "Room tick loop started");

    let budget_ms = TICK_DURATION_MICROS / 1_000;
    let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tick_interval.tick().await;

        let timer = Timer::new();
        let room_count = {
            let mut manager = rooms.lock();
            manager.tick_all(unix_millis());
            manager.room_count()
        };

        let elapsed = timer.elapsed_ms();
        if elapsed > budget_ms {
            warn!(elapsed_ms = elapsed, budget_ms, rooms = room_count, "Slow tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    use crate::game::bot::Difficulty;
    use crate::game::map::MapCatalog;
    use crate::game::GameMode;
    use crate::rooms::RoomLimits;
    use crate::ws::protocol::ServerMsg;

    #[tokio::test]
    async fn loop_drives_the_countdown() {
        let mut manager = RoomManager::with_seed(Arc::new(MapCatalog::builtin()), RoomLimits::default(), 2);
        let session = Uuid::new_v4();
        let now = unix_millis();
        let joined = assert_ok!(manager.create_room(session, "Ada", None, GameMode::FreeForAll, now));
        assert_ok!(manager.add_bot(session, Difficulty::Easy, None, now));
        assert_ok!(manager.start_game(session, now));

        let mut rx = joined.rx;
        let rooms = shared(manager);
        let ticker = tokio::spawn(run_tick_loop(Arc::clone(&rooms)));

        let next_count = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match rx.recv().await {
                    Ok(ServerMsg::Countdown { count }) if count < 3 => return count,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return u32::MAX,
                    _ => {}
                }
            }
        })
        .await;
        ticker.abort();

        assert_eq!(next_count.ok(), Some(2));
    }
}
