//! Room state and lifecycle: one isolated match with its own world
//!
//! A room never performs I/O. Operations return the messages to broadcast
//! and the registry decides who receives them.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ws::protocol::{PlayerInput, ServerMsg};

use super::bot::{BotEngine, BotMemory, Difficulty};
use super::combat::CombatSystem;
use super::geometry::angle_to;
use super::knight::{Knight, PlayerId, TeamId, KNIGHT_COLORS, SPAWN_INVULNERABILITY_MS};
use super::map::{MapDefinition, MapError, MapLayout, MapProvider};
use super::powerup::PowerupSpawner;
use super::rules::{Verdict, WinEvaluator};
use super::settings::{MatchSettings, MatchSettingsUpdate, WinType};
use super::snapshot::SnapshotBuilder;
use super::world::{CombatRules, World};

pub const COUNTDOWN_START: u32 = 3;
pub const ROUND_RESTART_DELAY_MS: u64 = 3_000;
pub const MIN_PLAYERS_TO_START: usize = 2;
/// Game state goes out every tick
pub const SNAPSHOT_INTERVAL_TICKS: u32 = 1;
/// Longest simulated step after a stall
const MAX_TICK_DT_MS: u64 = 100;
const MAX_NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    Lobby,
    Countdown,
    Playing,
    Paused,
    RoundOver,
    MatchOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    FreeForAll,
    Teams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub score: u32,
}

impl Team {
    pub fn defaults() -> [Team; 2] {
        [
            Team {
                id: 1,
                name: "Red".into(),
                color: "#e74c3c".into(),
                score: 0,
            },
            Team {
                id: 2,
                name: "Blue".into(),
                color: "#3498db".into(),
                score: 0,
            },
        ]
    }
}

/// Rejections; the room is left untouched when one is returned
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room {0} not found")]
    RoomNotFound(String),
    #[error("Room is full")]
    RoomFull,
    #[error("Server has reached its room limit")]
    TooManyRooms,
    #[error("A game is already in progress")]
    GameInProgress,
    #[error("Only the host can do that")]
    NotHost,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Already in a room")]
    AlreadyInRoom,
    #[error("At least two knights are needed to start")]
    NotEnoughPlayers,
    #[error("Both teams need at least one knight")]
    UnbalancedTeams,
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("Player {0} is not a bot")]
    NotABot(PlayerId),
    #[error("Player {0} is not controlled by this connection")]
    NotYourPlayer(PlayerId),
    #[error("Unknown map {0}")]
    UnknownMap(String),
    #[error("Invalid map: {0}")]
    InvalidMap(#[from] MapError),
    #[error("Team {0} does not exist")]
    InvalidTeam(TeamId),
    #[error("Room is not in team mode")]
    NotTeamMode,
    #[error("Not allowed while the room is {0:?}")]
    InvalidState(RoomState),
}

impl RoomError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound(_) => "room_not_found",
            RoomError::RoomFull => "room_full",
            RoomError::TooManyRooms => "too_many_rooms",
            RoomError::GameInProgress => "game_in_progress",
            RoomError::NotHost => "not_host",
            RoomError::NotInRoom => "not_in_room",
            RoomError::AlreadyInRoom => "already_in_room",
            RoomError::NotEnoughPlayers => "not_enough_players",
            RoomError::UnbalancedTeams => "unbalanced_teams",
            RoomError::UnknownPlayer(_) => "unknown_player",
            RoomError::NotABot(_) => "not_a_bot",
            RoomError::NotYourPlayer(_) => "not_your_player",
            RoomError::UnknownMap(_) => "unknown_map",
            RoomError::InvalidMap(_) => "invalid_map",
            RoomError::InvalidTeam(_) => "invalid_team",
            RoomError::NotTeamMode => "not_team_mode",
            RoomError::InvalidState(_) => "invalid_state",
        }
    }
}

pub struct Room {
    pub code: String,
    pub name: String,
    pub mode: GameMode,
    pub state: RoomState,
    /// State to restore on resume
    paused_from: Option<RoomState>,
    paused_at: Option<u64>,
    pub host_id: Option<PlayerId>,
    pub settings: MatchSettings,
    pub map: MapDefinition,
    layout: MapLayout,
    pub world: World,
    pub teams: [Team; 2],
    pub round: u32,
    pub match_start_time: Option<u64>,
    pub match_end_time: Option<u64>,
    pub last_update: u64,
    pub last_timer_emit: u64,
    pub max_players: usize,
    spawner: PowerupSpawner,
    snapshots: SnapshotBuilder,
    tick: u64,
}

impl Room {
    pub fn new(
        code: String,
        name: String,
        mode: GameMode,
        map: MapDefinition,
        max_players: usize,
        seed: u64,
        now: u64,
    ) -> Result<Self, RoomError> {
        let layout = map.decode()?;
        let settings = MatchSettings::with_map(map.id.clone());
        let mut world = World::new(seed);
        world.load_layout(layout.clone());
        world.rules = CombatRules {
            team_mode: mode == GameMode::Teams,
            friendly_fire: settings.friendly_fire,
            speed_pct: settings.speed_multiplier,
        };

        Ok(Self {
            code,
            name,
            mode,
            state: RoomState::Lobby,
            paused_from: None,
            paused_at: None,
            host_id: None,
            spawner: PowerupSpawner::new(now, settings.weapon_spawn_rate),
            settings,
            map,
            layout,
            world,
            teams: Team::defaults(),
            round: 0,
            match_start_time: None,
            match_end_time: None,
            last_update: now,
            last_timer_emit: now,
            max_players,
            snapshots: SnapshotBuilder::new(SNAPSHOT_INTERVAL_TICKS),
            tick: 0,
        })
    }

    pub fn team_mode(&self) -> bool {
        self.mode == GameMode::Teams
    }

    pub fn player_count(&self) -> usize {
        self.world.knights.len()
    }

    pub fn human_count(&self) -> usize {
        self.world.knights.values().filter(|k| !k.is_bot).count()
    }

    pub fn has_humans(&self) -> bool {
        self.human_count() > 0
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host_id == Some(id)
    }

    fn require_host(&self, id: PlayerId) -> Result<(), RoomError> {
        if self.is_host(id) {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn require_lobby(&self) -> Result<(), RoomError> {
        if self.state == RoomState::Lobby {
            Ok(())
        } else {
            Err(RoomError::GameInProgress)
        }
    }

    /// Remaining match time for time-based matches
    pub fn remaining_ms(&self, now: u64) -> Option<u64> {
        if self.settings.win_type != WinType::TimeBased {
            return None;
        }
        let end = self.match_end_time?;
        // Frozen while paused
        let at = self.paused_at.unwrap_or(now);
        Some(end.saturating_sub(at))
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Team with fewer knights, team 1 on a tie
    fn smaller_team(&self) -> TeamId {
        let count = |team: TeamId| {
            self.world
                .knights
                .values()
                .filter(|k| k.team_id == Some(team))
                .count()
        };
        if count(2) < count(1) {
            2
        } else {
            1
        }
    }

    fn admit(&mut self, mut knight: Knight, team: Option<TeamId>) -> Result<(), RoomError> {
        self.require_lobby()?;
        if self.player_count() >= self.max_players {
            return Err(RoomError::RoomFull);
        }
        if let Some(team) = team {
            if !self.teams.iter().any(|t| t.id == team) {
                return Err(RoomError::InvalidTeam(team));
            }
        }
        if self.team_mode() {
            knight.team_id = Some(team.unwrap_or_else(|| self.smaller_team()));
        }
        let slot = self.player_count();
        if let Some(&(x, y)) = self
            .world
            .spawn_points
            .get(slot % self.world.spawn_points.len().max(1))
        {
            knight.x = x;
            knight.y = y;
        }
        self.world.knights.insert(knight.id, knight);
        Ok(())
    }

    fn next_color(&self) -> String {
        KNIGHT_COLORS[self.player_count() % KNIGHT_COLORS.len()].to_string()
    }

    /// Add a human knight; the first human becomes host
    pub fn add_player(&mut self, id: PlayerId, name: &str) -> Result<(), RoomError> {
        let knight = Knight::new(id, clean_name(name, id), self.next_color(), false);
        self.admit(knight, None)?;
        if self.host_id.is_none() {
            self.host_id = Some(id);
        }
        info!(room = %self.code, player_id = id, "Player joined");
        Ok(())
    }

    pub fn add_bot(
        &mut self,
        id: PlayerId,
        difficulty: Difficulty,
        team: Option<TeamId>,
        now: u64,
    ) -> Result<(), RoomError> {
        let ordinal = self.world.knights.values().filter(|k| k.is_bot).count() + 1;
        let mut knight = Knight::new(id, format!("Bot {ordinal}"), self.next_color(), true);
        let seed = self.world.rng.gen();
        knight.bot = Some(BotMemory::new(difficulty, seed, now));
        self.admit(knight, team)?;
        info!(room = %self.code, player_id = id, ?difficulty, "Bot added");
        Ok(())
    }

    pub fn remove_bot(&mut self, requester: PlayerId, id: PlayerId) -> Result<(), RoomError> {
        self.require_host(requester)?;
        self.require_lobby()?;
        match self.world.knights.get(&id) {
            None => return Err(RoomError::UnknownPlayer(id)),
            Some(k) if !k.is_bot => return Err(RoomError::NotABot(id)),
            Some(_) => {}
        }
        self.remove_player(id);
        Ok(())
    }

    /// Drop a knight and everything it still has in flight. Re-elects the
    /// host to the first remaining human when the host leaves.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Knight> {
        let knight = self.world.knights.remove(&id)?;
        self.world.remove_owned_by(id);
        if self.host_id == Some(id) {
            self.host_id = self.world.knights.values().find(|k| !k.is_bot).map(|k| k.id);
            if let Some(host) = self.host_id {
                info!(room = %self.code, host_id = host, "Host changed");
            }
        }
        info!(room = %self.code, player_id = id, "Player left");
        Some(knight)
    }

    /// Host may move anyone; players may move themselves
    pub fn assign_team(
        &mut self,
        requester: PlayerId,
        player: PlayerId,
        team: TeamId,
    ) -> Result<(), RoomError> {
        if !self.team_mode() {
            return Err(RoomError::NotTeamMode);
        }
        self.require_lobby()?;
        if requester != player {
            self.require_host(requester)?;
        }
        if !self.teams.iter().any(|t| t.id == team) {
            return Err(RoomError::InvalidTeam(team));
        }
        let knight = self
            .world
            .knights
            .get_mut(&player)
            .ok_or(RoomError::UnknownPlayer(player))?;
        knight.team_id = Some(team);
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        requester: PlayerId,
        update: MatchSettingsUpdate,
        maps: &dyn MapProvider,
    ) -> Result<(), RoomError> {
        self.require_host(requester)?;
        self.require_lobby()?;

        let new_map = match update.map_id.as_deref() {
            Some(id) if id != self.map.id => {
                let map = maps.get(id).ok_or_else(|| RoomError::UnknownMap(id.to_string()))?;
                let layout = map.decode()?;
                Some((map, layout))
            }
            _ => None,
        };

        update.apply(&mut self.settings);
        if let Some((map, layout)) = new_map {
            debug!(room = %self.code, map = %map.id, "Map changed");
            self.map = map;
            self.layout = layout;
            self.world.load_layout(self.layout.clone());
        }
        self.sync_rules();
        Ok(())
    }

    fn sync_rules(&mut self) {
        self.world.rules = CombatRules {
            team_mode: self.team_mode(),
            friendly_fire: self.settings.friendly_fire,
            speed_pct: self.settings.speed_multiplier,
        };
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin a match. The caller starts the countdown.
    pub fn start_game(&mut self, requester: PlayerId, now: u64) -> Result<Vec<ServerMsg>, RoomError> {
        self.require_host(requester)?;
        self.require_lobby()?;
        if self.player_count() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers);
        }
        if self.team_mode() {
            let populated = self
                .teams
                .iter()
                .all(|t| self.world.knights.values().any(|k| k.team_id == Some(t.id)));
            if !populated {
                return Err(RoomError::UnbalancedTeams);
            }
        }

        for knight in self.world.knights.values_mut() {
            knight.score = 0;
            knight.kills = 0;
            knight.deaths = 0;
        }
        for team in &mut self.teams {
            team.score = 0;
        }
        self.round = 0;
        self.match_start_time = None;
        self.match_end_time = None;
        self.reset_round(now);

        info!(
            room = %self.code,
            players = self.player_count(),
            win_type = ?self.settings.win_type,
            map = %self.map.id,
            "Game starting"
        );
        Ok(vec![ServerMsg::GameStarting])
    }

    /// Fresh round: rebuild the map, respawn everyone on distinct spawn points
    /// and enter the countdown
    pub fn reset_round(&mut self, now: u64) {
        self.round += 1;
        self.world.load_layout(self.layout.clone());
        self.sync_rules();
        self.assign_spawns(now);
        self.spawner = PowerupSpawner::new(now, self.settings.weapon_spawn_rate);
        self.state = RoomState::Countdown;
        self.paused_from = None;
        self.paused_at = None;
        self.last_update = now;
        self.snapshots.force_next();
        debug!(room = %self.code, round = self.round, "Round reset");
    }

    /// Shuffled distinct spawn indices; reuse only when there are more
    /// knights than spawn points
    fn assign_spawns(&mut self, now: u64) {
        let spawns = self.world.spawn_points.clone();
        if spawns.is_empty() {
            return;
        }
        let mut order: Vec<usize> = (0..spawns.len()).collect();
        order.shuffle(&mut self.world.rng);

        let (cx, cy) = (self.world.width / 2.0, self.world.height / 2.0);
        for (i, knight) in self.world.knights.values_mut().enumerate() {
            let (x, y) = spawns[order[i % order.len()]];
            knight.angle = angle_to(x, y, cx, cy);
            knight.spawn_at(x, y, now);
            let facing = knight.angle;
            if let Some(memory) = knight.bot.as_mut() {
                memory.reset(now, facing);
            }
        }
    }

    /// Countdown reached zero
    pub fn begin_play(&mut self, now: u64) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        self.state = RoomState::Playing;
        for knight in self.world.knights.values_mut().filter(|k| k.is_alive) {
            knight.invulnerable_until = now + SPAWN_INVULNERABILITY_MS;
        }
        if self.settings.win_type == WinType::TimeBased {
            let end = now + self.settings.time_limit_ms();
            self.match_start_time = Some(now);
            self.match_end_time = Some(end);
            out.push(ServerMsg::TimerUpdate {
                remaining_ms: end - now,
            });
        }
        self.last_update = now;
        self.last_timer_emit = now;
        self.spawner = PowerupSpawner::new(now, self.settings.weapon_spawn_rate);
        info!(room = %self.code, round = self.round, "Round started");
        out
    }

    pub fn pause(&mut self, requester: PlayerId, now: u64) -> Result<(), RoomError> {
        self.require_host(requester)?;
        if !matches!(self.state, RoomState::Countdown | RoomState::Playing) {
            return Err(RoomError::InvalidState(self.state));
        }
        self.paused_from = Some(self.state);
        self.paused_at = Some(now);
        self.state = RoomState::Paused;
        info!(room = %self.code, "Game paused");
        Ok(())
    }

    /// Restore the paused state; the match clock and powerup timer skip the pause
    pub fn resume(&mut self, requester: PlayerId, now: u64) -> Result<(), RoomError> {
        self.require_host(requester)?;
        if self.state != RoomState::Paused {
            return Err(RoomError::InvalidState(self.state));
        }
        let paused_for = self.paused_at.take().map_or(0, |at| now.saturating_sub(at));
        if let Some(end) = self.match_end_time.as_mut() {
            *end += paused_for;
        }
        self.spawner.next_attempt_at += paused_for;
        self.state = self.paused_from.take().unwrap_or(RoomState::Playing);
        self.last_update = now;
        self.snapshots.force_next();
        info!(room = %self.code, paused_ms = paused_for, "Game resumed");
        Ok(())
    }

    /// Back to the lobby from any state, keeping the roster
    pub fn return_to_lobby(&mut self, now: u64) {
        self.state = RoomState::Lobby;
        self.paused_from = None;
        self.paused_at = None;
        self.match_start_time = None;
        self.match_end_time = None;
        self.round = 0;
        self.world.load_layout(self.layout.clone());
        for knight in self.world.knights.values_mut() {
            let (x, y) = (knight.x, knight.y);
            knight.spawn_at(x, y, now);
            knight.invulnerable_until = 0;
        }
        self.last_update = now;
        info!(room = %self.code, "Returned to lobby");
    }

    pub fn end_game(&mut self, requester: PlayerId, now: u64) -> Result<(), RoomError> {
        self.require_host(requester)?;
        self.return_to_lobby(now);
        Ok(())
    }

    pub fn play_again(&mut self, requester: PlayerId, now: u64) -> Result<Vec<ServerMsg>, RoomError> {
        self.require_host(requester)?;
        if self.state != RoomState::MatchOver {
            return Err(RoomError::InvalidState(self.state));
        }
        self.return_to_lobby(now);
        self.start_game(requester, now)
    }

    /// Record an intent; only live rounds accept input
    pub fn apply_input(&mut self, player: PlayerId, input: &PlayerInput) -> Result<(), RoomError> {
        let state = self.state;
        let knight = self
            .world
            .knights
            .get_mut(&player)
            .ok_or(RoomError::UnknownPlayer(player))?;
        if state != RoomState::Playing || !knight.is_alive {
            return Ok(());
        }
        knight.set_intent(
            input.move_x,
            input.move_y,
            input.angle,
            input.attacking,
            input.lunge,
            input.shield,
        );
        Ok(())
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance one tick and return what should be broadcast
    pub fn tick(&mut self, now: u64) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        match self.state {
            RoomState::Playing => self.simulate(now, &mut out),
            RoomState::Countdown | RoomState::RoundOver => {}
            RoomState::Lobby | RoomState::Paused | RoomState::MatchOver => {
                self.last_update = now;
                return out;
            }
        }
        self.last_update = now;
        self.tick += 1;

        if self.snapshots.should_send() {
            let snapshot = self.snapshots.build(self, self.tick, now);
            out.push(ServerMsg::GameState(Box::new(snapshot)));
        }
        out
    }

    fn simulate(&mut self, now: u64, out: &mut Vec<ServerMsg>) {
        let dt_ms = now.saturating_sub(self.last_update).min(MAX_TICK_DT_MS);
        let mut kills = Vec::new();

        CombatSystem::resolve_channels(&mut self.world, now, &mut kills);
        BotEngine::drive(&mut self.world, now);
        self.move_knights(now, dt_ms);

        CombatSystem::process_attacks(&mut self.world, now, &mut kills);
        CombatSystem::update_slashes(&mut self.world, now, &mut kills);
        CombatSystem::update_projectiles(&mut self.world, now, dt_ms, &mut kills);
        CombatSystem::update_mines(&mut self.world, now, &mut kills);
        CombatSystem::expire_effects(&mut self.world, now);

        self.spawn_powerup(now);

        let living = self.world.living_positions();
        let mines = self.world.mine_positions();
        let restored = self.world.terrain.update_respawns(now, &living, &mines);
        if !restored.is_empty() {
            debug!(room = %self.code, walls = ?restored, "Walls restored");
        }

        for kill in &kills {
            debug!(
                room = %self.code,
                victim = kill.victim,
                killer = ?kill.killer,
                cause = ?kill.cause,
                "Knight down"
            );
        }
        WinEvaluator::credit_kills(&mut self.world, &mut self.teams, &self.settings, &kills, now);
        WinEvaluator::respawn_due(&mut self.world, now);

        if let Some(remaining_ms) =
            WinEvaluator::timer_update(&self.settings, self.match_end_time, &mut self.last_timer_emit, now)
        {
            out.push(ServerMsg::TimerUpdate { remaining_ms });
        }

        match WinEvaluator::evaluate(
            &mut self.world,
            &mut self.teams,
            &self.settings,
            self.match_end_time,
            now,
        ) {
            Verdict::Continue => {}
            Verdict::RoundOver(winner) => {
                info!(room = %self.code, round = self.round, winner = ?winner, "Round over");
                self.state = RoomState::RoundOver;
                self.snapshots.force_next();
                out.push(ServerMsg::RoundOver {
                    round: self.round,
                    players: WinEvaluator::standings(&self.world),
                    winner,
                    team_mode: self.team_mode(),
                });
            }
            Verdict::MatchOver(winner) => {
                info!(room = %self.code, winner = ?winner, "Match over");
                self.state = RoomState::MatchOver;
                self.snapshots.force_next();
                out.push(ServerMsg::MatchOver {
                    players: WinEvaluator::standings(&self.world),
                    winner,
                    team_mode: self.team_mode(),
                });
            }
        }
    }

    fn move_knights(&mut self, now: u64, dt_ms: u64) {
        let World {
            knights,
            terrain,
            powerups,
            width,
            height,
            rules,
            ..
        } = &mut self.world;

        for knight in knights.values_mut() {
            knight.step(now, dt_ms, &terrain.walls, *width, *height, rules.speed_pct);
            for powerup in knight.collect_powerups(powerups) {
                debug!(room = %self.code, player_id = knight.id, kind = ?powerup.kind, "Powerup collected");
            }
        }
    }

    fn spawn_powerup(&mut self, now: u64) {
        let id = self.world.next_id();
        let World {
            knights,
            powerups,
            powerup_spots,
            rng,
            ..
        } = &mut self.world;

        let spawned = self.spawner.update(
            now,
            self.settings.weapon_spawn_rate,
            id,
            powerup_spots,
            powerups,
            knights.values(),
            &self.settings.enabled_weapons,
            rng,
        );
        if let Some(powerup) = spawned {
            debug!(room = %self.code, kind = ?powerup.kind, x = powerup.x, y = powerup.y, "Powerup spawned");
            powerups.push(powerup);
        }
    }
}

fn clean_name(name: &str, id: PlayerId) -> String {
    let trimmed: String = name.trim().chars().take(MAX_NAME_LEN).collect();
    if trimmed.is_empty() {
        format!("Knight {id}")
    } else {
        trimmed
    }
}
