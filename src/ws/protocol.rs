//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::bot::Difficulty;
use crate::game::knight::{PlayerId, TeamId};
use crate::game::map::{MapDefinition, MapSummary};
use crate::game::room::GameMode;
use crate::game::rules::{Standing, Winner};
use crate::game::settings::MatchSettingsUpdate;
use crate::game::snapshot::{GameSnapshot, LobbyState};

/// Intent for one knight. Missing fields mean "not pressed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInput {
    /// Movement direction; clamped to unit length server-side
    pub move_x: f32,
    pub move_y: f32,
    /// Facing angle in radians
    pub angle: f32,
    pub attacking: bool,
    pub lunge: bool,
    pub shield: bool,
}

/// Input for one of the connection's own knights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerInputEntry {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub input: PlayerInput,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a room and join it as host
    CreateRoom {
        player_name: String,
        room_name: Option<String>,
        #[serde(default)]
        mode: GameMode,
    },

    /// Join an existing room by code
    JoinRoom { code: String, player_name: String },

    /// Extra knights controlled from the same connection
    RegisterLocalPlayers { names: Vec<String> },

    AddBot {
        #[serde(default)]
        difficulty: Difficulty,
        team_id: Option<TeamId>,
    },

    RemoveBot { player_id: PlayerId },

    StartGame,

    /// Input for the connection's primary knight, or a specific local one
    PlayerInput {
        player_id: Option<PlayerId>,
        #[serde(flatten)]
        input: PlayerInput,
    },

    PlayerInputBatch { inputs: Vec<PlayerInputEntry> },

    AssignTeam { player_id: PlayerId, team_id: TeamId },

    UpdateMatchSettings { settings: MatchSettingsUpdate },

    PauseGame,
    ResumeGame,
    PlayAgain,
    EndGame,
    LeaveGame,

    GetMaps,
    GetMap { id: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    RoomCreated {
        player_id: PlayerId,
        room: LobbyState,
    },

    JoinSuccess {
        player_id: PlayerId,
        room: LobbyState,
    },

    JoinError {
        code: String,
        reason: String,
    },

    LocalPlayersRegistered { player_ids: Vec<PlayerId> },

    UpdateLobby { room: LobbyState },

    /// Seconds left before play; zero means go
    Countdown { count: u32 },

    GameStarting,

    /// Sanitized game state (sent every tick while a round runs)
    GameState(Box<GameSnapshot>),

    RoundOver {
        round: u32,
        players: Vec<Standing>,
        /// `None` on a draw
        winner: Option<Winner>,
        team_mode: bool,
    },

    MatchOver {
        players: Vec<Standing>,
        winner: Option<Winner>,
        team_mode: bool,
    },

    TimerUpdate { remaining_ms: u64 },

    HostChanged { host_id: PlayerId },

    GamePaused,
    GameResumed,

    ReturnToLobby { room: LobbyState },

    Maps { maps: Vec<MapSummary> },

    Map { map: MapDefinition },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}
