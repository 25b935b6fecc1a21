//! Room registry: owns every room, the connections' sessions and the timer
//! side table. All access goes through one lock; nothing here awaits.

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::bot::Difficulty;
use crate::game::knight::{PlayerId, TeamId};
use crate::game::map::MapProvider;
use crate::game::room::{GameMode, Room, RoomError, RoomState};
use crate::game::settings::MatchSettingsUpdate;
use crate::game::snapshot::LobbyState;
use crate::ws::protocol::{PlayerInput, PlayerInputEntry, ServerMsg};

use super::timers::RoomTimers;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const ROOM_CODE_LEN: usize = 4;
const BROADCAST_CAPACITY: usize = 256;

/// Registry limits
#[derive(Debug, Clone, Copy)]
pub struct RoomLimits {
    pub max_rooms: usize,
    pub max_players_per_room: usize,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            max_rooms: 256,
            max_players_per_room: 8,
        }
    }
}

/// A room plus its broadcast channel
pub struct RoomEntry {
    pub room: Room,
    pub tx: broadcast::Sender<ServerMsg>,
}

impl RoomEntry {
    fn broadcast(&self, msg: ServerMsg) {
        // No receivers is fine
        let _ = self.tx.send(msg);
    }

    fn broadcast_lobby(&self) {
        self.broadcast(ServerMsg::UpdateLobby {
            room: LobbyState::project(&self.room),
        });
    }
}

/// What one connection controls
#[derive(Debug, Default, Clone)]
pub struct Session {
    pub room: Option<String>,
    /// Primary knight first, then local players
    pub players: Vec<PlayerId>,
}

/// Result of creating or joining a room
pub struct Joined {
    pub player_id: PlayerId,
    pub lobby: LobbyState,
    pub rx: broadcast::Receiver<ServerMsg>,
}

pub struct RoomManager {
    rooms: HashMap<String, RoomEntry>,
    sessions: HashMap<Uuid, Session>,
    timers: RoomTimers,
    maps: Arc<dyn MapProvider>,
    limits: RoomLimits,
    rng: ChaCha8Rng,
    next_player_id: PlayerId,
}

impl RoomManager {
    pub fn new(maps: Arc<dyn MapProvider>, limits: RoomLimits) -> Self {
        Self::with_seed(maps, limits, rand::random())
    }

    pub fn with_seed(maps: Arc<dyn MapProvider>, limits: RoomLimits, seed: u64) -> Self {
        Self {
            rooms: HashMap::new(),
            sessions: HashMap::new(),
            timers: RoomTimers::new(),
            maps,
            limits,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_player_id: 1,
        }
    }

    pub fn maps(&self) -> &dyn MapProvider {
        self.maps.as_ref()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn player_count(&self) -> usize {
        self.rooms.values().map(|e| e.room.human_count()).sum()
    }

    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code).map(|e| &e.room)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn connect(&mut self, session: Uuid) {
        self.sessions.insert(session, Session::default());
        debug!(session = %session, "Session opened");
    }

    /// Leave any room and forget the session
    pub fn disconnect(&mut self, session: Uuid) {
        self.leave(session);
        self.sessions.remove(&session);
        debug!(session = %session, "Session closed");
    }

    fn allocate_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    fn generate_code(&mut self) -> String {
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| ROOM_CODE_ALPHABET[self.rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Room code and primary knight of a session in a room
    fn context(&self, session: Uuid) -> Result<(String, PlayerId), RoomError> {
        let s = self.sessions.get(&session).ok_or(RoomError::NotInRoom)?;
        let code = s.room.clone().ok_or(RoomError::NotInRoom)?;
        let primary = *s.players.first().ok_or(RoomError::NotInRoom)?;
        Ok((code, primary))
    }

    fn entry_mut(&mut self, code: &str) -> Result<&mut RoomEntry, RoomError> {
        self.rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))
    }

    fn owns(&self, session: Uuid, player: PlayerId) -> bool {
        self.sessions
            .get(&session)
            .is_some_and(|s| s.players.contains(&player))
    }

    fn require_idle(&self, session: Uuid) -> Result<(), RoomError> {
        match self.sessions.get(&session) {
            Some(s) if s.room.is_some() => Err(RoomError::AlreadyInRoom),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Room membership
    // ========================================================================

    pub fn create_room(
        &mut self,
        session: Uuid,
        player_name: &str,
        room_name: Option<String>,
        mode: GameMode,
        now: u64,
    ) -> Result<Joined, RoomError> {
        self.require_idle(session)?;
        if self.rooms.len() >= self.limits.max_rooms {
            return Err(RoomError::TooManyRooms);
        }

        let map_id = self.maps.default_map_id();
        let map = self
            .maps
            .get(&map_id)
            .ok_or_else(|| RoomError::UnknownMap(map_id.clone()))?;
        let code = self.generate_code();
        let name = room_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Room {code}"));
        let seed = self.rng.gen();
        let mut room = Room::new(
            code.clone(),
            name,
            mode,
            map,
            self.limits.max_players_per_room,
            seed,
            now,
        )?;

        let player_id = self.allocate_player_id();
        room.add_player(player_id, player_name)?;

        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        let lobby = LobbyState::project(&room);
        self.rooms.insert(code.clone(), RoomEntry { room, tx });
        let s = self.sessions.entry(session).or_default();
        s.room = Some(code.clone());
        s.players = vec![player_id];

        info!(room = %code, player_id, mode = ?mode, "Room created");
        Ok(Joined {
            player_id,
            lobby,
            rx,
        })
    }

    pub fn join_room(&mut self, session: Uuid, code: &str, player_name: &str) -> Result<Joined, RoomError> {
        self.require_idle(session)?;
        let code = code.trim().to_uppercase();
        let player_id = self.next_player_id;

        let entry = self.entry_mut(&code)?;
        entry.room.add_player(player_id, player_name)?;
        let rx = entry.tx.subscribe();
        let lobby = LobbyState::project(&entry.room);
        entry.broadcast_lobby();

        self.next_player_id += 1;
        let s = self.sessions.entry(session).or_default();
        s.room = Some(code);
        s.players = vec![player_id];
        Ok(Joined {
            player_id,
            lobby,
            rx,
        })
    }

    /// Extra knights driven from the same connection
    pub fn register_local_players(
        &mut self,
        session: Uuid,
        names: &[String],
    ) -> Result<Vec<PlayerId>, RoomError> {
        let (code, _) = self.context(session)?;
        let first_id = self.next_player_id;

        let entry = self.entry_mut(&code)?;
        if entry.room.state != RoomState::Lobby {
            return Err(RoomError::GameInProgress);
        }
        if entry.room.player_count() + names.len() > entry.room.max_players {
            return Err(RoomError::RoomFull);
        }
        let mut ids = Vec::with_capacity(names.len());
        for (offset, name) in names.iter().enumerate() {
            let id = first_id + offset as PlayerId;
            entry.room.add_player(id, name)?;
            ids.push(id);
        }
        entry.broadcast_lobby();

        self.next_player_id += names.len() as PlayerId;
        if let Some(s) = self.sessions.get_mut(&session) {
            s.players.extend(&ids);
        }
        Ok(ids)
    }

    /// Remove every knight this connection controls. Re-elects the host,
    /// and tears the room down once no human is left.
    pub fn leave(&mut self, session: Uuid) {
        let Some(s) = self.sessions.get_mut(&session) else {
            return;
        };
        let Some(code) = s.room.take() else {
            return;
        };
        let players = std::mem::take(&mut s.players);

        let Some(entry) = self.rooms.get_mut(&code) else {
            return;
        };
        let previous_host = entry.room.host_id;
        for id in &players {
            entry.room.remove_player(*id);
        }

        if !entry.room.has_humans() {
            self.timers.cancel(&code);
            self.rooms.remove(&code);
            info!(room = %code, "Room closed");
            return;
        }

        if entry.room.host_id != previous_host {
            if let Some(host_id) = entry.room.host_id {
                entry.broadcast(ServerMsg::HostChanged { host_id });
            }
        }
        entry.broadcast_lobby();
    }

    // ========================================================================
    // Host controls
    // ========================================================================

    pub fn add_bot(
        &mut self,
        session: Uuid,
        difficulty: Difficulty,
        team: Option<TeamId>,
        now: u64,
    ) -> Result<PlayerId, RoomError> {
        let (code, primary) = self.context(session)?;
        let id = self.next_player_id;
        let entry = self.entry_mut(&code)?;
        if !entry.room.is_host(primary) {
            return Err(RoomError::NotHost);
        }
        entry.room.add_bot(id, difficulty, team, now)?;
        entry.broadcast_lobby();
        self.next_player_id += 1;
        Ok(id)
    }

    pub fn remove_bot(&mut self, session: Uuid, bot: PlayerId) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.entry_mut(&code)?;
        entry.room.remove_bot(primary, bot)?;
        entry.broadcast_lobby();
        Ok(())
    }

    pub fn start_game(&mut self, session: Uuid, now: u64) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.rooms.get_mut(&code).ok_or(RoomError::NotInRoom)?;
        let msgs = entry.room.start_game(primary, now)?;
        for msg in msgs {
            entry.broadcast(msg);
        }
        entry.broadcast(self.timers.start_countdown(&code, now));
        Ok(())
    }

    pub fn play_again(&mut self, session: Uuid, now: u64) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.rooms.get_mut(&code).ok_or(RoomError::NotInRoom)?;
        let msgs = entry.room.play_again(primary, now)?;
        for msg in msgs {
            entry.broadcast(msg);
        }
        entry.broadcast(self.timers.start_countdown(&code, now));
        Ok(())
    }

    pub fn end_game(&mut self, session: Uuid, now: u64) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.rooms.get_mut(&code).ok_or(RoomError::NotInRoom)?;
        entry.room.end_game(primary, now)?;
        self.timers.cancel(&code);
        entry.broadcast(ServerMsg::ReturnToLobby {
            room: LobbyState::project(&entry.room),
        });
        Ok(())
    }

    pub fn pause(&mut self, session: Uuid, now: u64) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.entry_mut(&code)?;
        entry.room.pause(primary, now)?;
        entry.broadcast(ServerMsg::GamePaused);
        Ok(())
    }

    pub fn resume(&mut self, session: Uuid, now: u64) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let entry = self.entry_mut(&code)?;
        entry.room.resume(primary, now)?;
        entry.broadcast(ServerMsg::GameResumed);
        Ok(())
    }

    /// A connection may move its own knights; anything else needs the host
    pub fn assign_team(&mut self, session: Uuid, player: PlayerId, team: TeamId) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let requester = if self.owns(session, player) { player } else { primary };
        let entry = self.entry_mut(&code)?;
        entry.room.assign_team(requester, player, team)?;
        entry.broadcast_lobby();
        Ok(())
    }

    pub fn update_settings(&mut self, session: Uuid, update: MatchSettingsUpdate) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let maps = Arc::clone(&self.maps);
        let entry = self.entry_mut(&code)?;
        entry.room.update_settings(primary, update, maps.as_ref())?;
        entry.broadcast_lobby();
        Ok(())
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Input for the primary knight, or for one of the connection's local knights
    pub fn player_input(
        &mut self,
        session: Uuid,
        player: Option<PlayerId>,
        input: &PlayerInput,
    ) -> Result<(), RoomError> {
        let (code, primary) = self.context(session)?;
        let player = player.unwrap_or(primary);
        if !self.owns(session, player) {
            return Err(RoomError::NotYourPlayer(player));
        }
        self.entry_mut(&code)?.room.apply_input(player, input)
    }

    /// All-or-nothing: one foreign id rejects the whole batch
    pub fn player_input_batch(&mut self, session: Uuid, inputs: &[PlayerInputEntry]) -> Result<(), RoomError> {
        let (code, _) = self.context(session)?;
        if let Some(foreign) = inputs.iter().find(|e| !self.owns(session, e.player_id)) {
            return Err(RoomError::NotYourPlayer(foreign.player_id));
        }
        let entry = self.entry_mut(&code)?;
        for e in inputs {
            entry.room.apply_input(e.player_id, &e.input)?;
        }
        Ok(())
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Fire due timers and tick every room once, broadcasting the results
    pub fn tick_all(&mut self, now: u64) {
        for (code, entry) in self.rooms.iter_mut() {
            let mut msgs = self.timers.advance(&mut entry.room, now);
            msgs.extend(entry.room.tick(now));

            for msg in msgs {
                match &msg {
                    ServerMsg::RoundOver { .. } => self.timers.schedule_restart(code, now),
                    ServerMsg::MatchOver { .. } => self.timers.cancel(code),
                    _ => {}
                }
                entry.broadcast(msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapCatalog;

    fn manager() -> RoomManager {
        RoomManager::with_seed(Arc::new(MapCatalog::builtin()), RoomLimits::default(), 11)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn create_and_join_share_a_room() {
        let mut m = manager();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        m.connect(a);
        m.connect(b);

        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let code = host.lobby.code.clone();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert_eq!(host.lobby.host_id, Some(host.player_id));

        let guest = m.join_room(b, &code.to_lowercase(), "Bob").expect("join");
        assert_ne!(guest.player_id, host.player_id);
        assert_eq!(guest.lobby.players.len(), 2);
        assert_eq!(m.player_count(), 2);

        assert_eq!(
            m.create_room(b, "again", None, GameMode::FreeForAll, 0).err(),
            Some(RoomError::AlreadyInRoom)
        );
        assert_eq!(
            m.join_room(Uuid::new_v4(), "ZZZZ", "x").err(),
            Some(RoomError::RoomNotFound("ZZZZ".into()))
        );
    }

    #[test]
    fn room_limit_is_enforced() {
        let limits = RoomLimits {
            max_rooms: 1,
            max_players_per_room: 8,
        };
        let mut m = RoomManager::with_seed(Arc::new(MapCatalog::builtin()), limits, 1);
        m.create_room(Uuid::new_v4(), "a", None, GameMode::FreeForAll, 0).expect("first");
        assert_eq!(
            m.create_room(Uuid::new_v4(), "b", None, GameMode::FreeForAll, 0).err(),
            Some(RoomError::TooManyRooms)
        );
    }

    #[test]
    fn host_leaving_migrates_and_last_human_closes_room() {
        let mut m = manager();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let code = host.lobby.code.clone();
        let guest = m.join_room(b, &code, "Bob").expect("join");
        m.add_bot(a, Difficulty::Easy, None, 0).expect("bot");
        let mut rx = guest.rx;
        drain(&mut rx);

        m.leave(a);
        let msgs = drain(&mut rx);
        assert!(msgs
            .iter()
            .any(|msg| matches!(msg, ServerMsg::HostChanged { host_id } if *host_id == guest.player_id)));
        assert_eq!(m.room(&code).and_then(|r| r.host_id), Some(guest.player_id));

        // Bots alone do not keep a room alive
        m.disconnect(b);
        assert!(m.room(&code).is_none());
        assert_eq!(m.room_count(), 0);
    }

    #[test]
    fn non_host_cannot_run_the_room() {
        let mut m = manager();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        m.join_room(b, &host.lobby.code, "Bob").expect("join");

        assert_eq!(m.add_bot(b, Difficulty::Hard, None, 0), Err(RoomError::NotHost));
        assert_eq!(m.start_game(b, 0), Err(RoomError::NotHost));
        assert_eq!(m.pause(b, 0), Err(RoomError::NotHost));
        assert!(m.start_game(a, 0).is_ok());
    }

    #[test]
    fn local_players_and_batched_input_are_scoped_to_the_connection() {
        let mut m = manager();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let guest = m.join_room(b, &host.lobby.code, "Bob").expect("join");
        let locals = m
            .register_local_players(a, &["Couch".to_string()])
            .expect("locals");
        assert_eq!(locals.len(), 1);

        let input = PlayerInput {
            move_x: 1.0,
            ..PlayerInput::default()
        };
        assert_eq!(
            m.player_input(a, Some(guest.player_id), &input),
            Err(RoomError::NotYourPlayer(guest.player_id))
        );
        let batch = [
            PlayerInputEntry {
                player_id: host.player_id,
                input,
            },
            PlayerInputEntry {
                player_id: guest.player_id,
                input,
            },
        ];
        assert_eq!(
            m.player_input_batch(a, &batch),
            Err(RoomError::NotYourPlayer(guest.player_id))
        );
        assert!(m.player_input(a, Some(locals[0]), &input).is_ok());
    }

    #[test]
    fn tick_all_runs_countdown_into_play() {
        let mut m = manager();
        let a = Uuid::new_v4();
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let code = host.lobby.code.clone();
        let mut rx = host.rx;
        m.add_bot(a, Difficulty::Medium, None, 0).expect("bot");
        m.start_game(a, 0).expect("start");

        let mut now = 0;
        while now <= 3_100 {
            m.tick_all(now);
            now += 33;
        }
        assert_eq!(m.room(&code).map(|r| r.state), Some(RoomState::Playing));

        let counts: Vec<u32> = drain(&mut rx)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMsg::Countdown { count } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![3, 2, 1, 0]);
    }

    #[test]
    fn end_game_cancels_timers_and_returns_to_lobby() {
        let mut m = manager();
        let a = Uuid::new_v4();
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let code = host.lobby.code.clone();
        m.add_bot(a, Difficulty::Easy, None, 0).expect("bot");
        m.start_game(a, 0).expect("start");
        m.end_game(a, 500).expect("end");

        for now in (500..5_000).step_by(100) {
            m.tick_all(now);
        }
        assert_eq!(m.room(&code).map(|r| r.state), Some(RoomState::Lobby));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers_across_tasks() {
        let mut m = manager();
        let a = Uuid::new_v4();
        let host = m.create_room(a, "Alice", None, GameMode::FreeForAll, 0).expect("create");
        let mut rx = host.rx;
        m.add_bot(a, Difficulty::Easy, None, 0).expect("bot");

        let reader = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ServerMsg::GameStarting) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        });
        m.start_game(a, 0).expect("start");
        assert!(reader.await.expect("join"));
    }
}
