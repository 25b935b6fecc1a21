//! Snapshot building: allow-list projections of room state for the wire
//!
//! Nothing here copies bot memory, timers or rng state; every field a client
//! sees is listed explicitly below.

use serde::{Deserialize, Serialize};

use super::bot::Difficulty;
use super::knight::{Knight, PlayerId, TeamId};
use super::room::{GameMode, Room, RoomState, Team};
use super::settings::MatchSettings;
use super::weapon::WeaponKind;

/// Knight as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnightView {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_bot: bool,
    pub team_id: Option<TeamId>,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub is_alive: bool,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub weapon: WeaponKind,
    /// `None` for unlimited weapons
    pub ammo: Option<u32>,
    /// Milliseconds spent charging, if charging
    pub charge_ms: Option<u64>,
    pub lunging: bool,
    pub parrying: bool,
    pub invulnerable: bool,
    pub has_shield: bool,
    pub shield_active: bool,
    pub shield_energy: f32,
    pub respawn_at: Option<u64>,
}

impl KnightView {
    pub fn project(k: &Knight, now: u64) -> Self {
        Self {
            id: k.id,
            name: k.name.clone(),
            color: k.color.clone(),
            is_bot: k.is_bot,
            team_id: k.team_id,
            x: k.x,
            y: k.y,
            vx: k.vx,
            vy: k.vy,
            angle: k.angle,
            is_alive: k.is_alive,
            score: k.score,
            kills: k.kills,
            deaths: k.deaths,
            weapon: k.weapon.kind,
            ammo: k.weapon.ammo_count(),
            charge_ms: k.charge_started_at.map(|t| now.saturating_sub(t)),
            lunging: k.is_lunging(now),
            parrying: k.is_parrying(now),
            invulnerable: k.is_invulnerable(now),
            has_shield: k.has_shield,
            shield_active: k.shield_active,
            shield_energy: k.shield_energy,
            respawn_at: k.respawn_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallView {
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// `None` for indestructible walls
    pub hp: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyedWallView {
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub respawn_at: u64,
    pub preview_at: u64,
    /// Blink phase during the preview window
    pub preview_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: u64,
    pub owner_id: PlayerId,
    pub kind: WeaponKind,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashView {
    pub id: u64,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub arc: f32,
    pub range: f32,
    pub ends_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamView {
    pub owner_id: PlayerId,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineView {
    pub id: u64,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub armed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerupView {
    pub id: u64,
    pub kind: WeaponKind,
    pub x: f32,
    pub y: f32,
}

/// Sanitized per-tick game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub tick: u64,
    pub server_time: u64,
    pub state: RoomState,
    pub round: u32,
    /// Time-based matches only
    pub remaining_ms: Option<u64>,
    pub width: f32,
    pub height: f32,
    pub knights: Vec<KnightView>,
    pub walls: Vec<WallView>,
    pub destroyed_walls: Vec<DestroyedWallView>,
    pub projectiles: Vec<ProjectileView>,
    pub slashes: Vec<SlashView>,
    pub beams: Vec<BeamView>,
    pub mines: Vec<MineView>,
    pub explosions: Vec<ExplosionView>,
    pub powerups: Vec<PowerupView>,
    pub teams: Vec<Team>,
}

/// Lobby roster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_bot: bool,
    pub team_id: Option<TeamId>,
    pub difficulty: Option<Difficulty>,
}

/// Room summary sent on join and on every lobby change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyState {
    pub code: String,
    pub name: String,
    pub mode: GameMode,
    pub state: RoomState,
    pub host_id: Option<PlayerId>,
    pub players: Vec<PlayerInfo>,
    pub teams: Vec<Team>,
    pub settings: MatchSettings,
    pub max_players: usize,
}

impl LobbyState {
    pub fn project(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            name: room.name.clone(),
            mode: room.mode,
            state: room.state,
            host_id: room.host_id,
            players: room
                .world
                .knights
                .values()
                .map(|k| PlayerInfo {
                    id: k.id,
                    name: k.name.clone(),
                    color: k.color.clone(),
                    is_bot: k.is_bot,
                    team_id: k.team_id,
                    difficulty: k.bot.as_ref().map(|b| b.difficulty),
                })
                .collect(),
            teams: room.teams.to_vec(),
            settings: room.settings.clone(),
            max_players: room.max_players,
        }
    }
}

/// Paces game state broadcasts
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for state changes)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, room: &Room, tick: u64, now: u64) -> GameSnapshot {
        let world = &room.world;
        GameSnapshot {
            tick,
            server_time: now,
            state: room.state,
            round: room.round,
            remaining_ms: room.remaining_ms(now),
            width: world.width,
            height: world.height,
            knights: world.knights.values().map(|k| KnightView::project(k, now)).collect(),
            walls: world
                .terrain
                .walls
                .iter()
                .map(|w| WallView {
                    id: w.id,
                    row: w.row,
                    col: w.col,
                    x: w.rect.x,
                    y: w.rect.y,
                    w: w.rect.w,
                    h: w.rect.h,
                    hp: w.hp,
                })
                .collect(),
            destroyed_walls: world
                .terrain
                .destroyed
                .iter()
                .map(|d| DestroyedWallView {
                    id: d.id,
                    row: d.row,
                    col: d.col,
                    x: d.rect.x,
                    y: d.rect.y,
                    w: d.rect.w,
                    h: d.rect.h,
                    respawn_at: d.respawn_at,
                    preview_at: d.preview_at,
                    preview_visible: d.preview_visible(now),
                })
                .collect(),
            projectiles: world
                .projectiles
                .iter()
                .map(|p| ProjectileView {
                    id: p.id,
                    owner_id: p.owner_id,
                    kind: p.kind,
                    x: p.x,
                    y: p.y,
                    vx: p.vx,
                    vy: p.vy,
                })
                .collect(),
            slashes: world
                .slashes
                .iter()
                .filter_map(|s| {
                    let owner = world.knights.get(&s.owner_id)?;
                    Some(SlashView {
                        id: s.id,
                        owner_id: s.owner_id,
                        x: owner.x,
                        y: owner.y,
                        angle: s.angle,
                        arc: s.arc,
                        range: s.range,
                        ends_at: s.ends_at,
                    })
                })
                .collect(),
            beams: world
                .beams
                .iter()
                .map(|b| BeamView {
                    owner_id: b.owner_id,
                    x1: b.x1,
                    y1: b.y1,
                    x2: b.x2,
                    y2: b.y2,
                })
                .collect(),
            mines: world
                .mines
                .iter()
                .map(|m| MineView {
                    id: m.id,
                    owner_id: m.owner_id,
                    x: m.x,
                    y: m.y,
                    armed: m.is_armed(now),
                })
                .collect(),
            explosions: world
                .explosions
                .iter()
                .map(|e| ExplosionView {
                    id: e.id,
                    x: e.x,
                    y: e.y,
                    radius: e.radius,
                })
                .collect(),
            powerups: world
                .powerups
                .iter()
                .map(|p| PowerupView {
                    id: p.id,
                    kind: p.kind,
                    x: p.x,
                    y: p.y,
                })
                .collect(),
            teams: room.teams.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sends_every_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);

        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn zero_interval_sends_every_tick() {
        let mut builder = SnapshotBuilder::new(0);
        assert!(builder.should_send());
        assert!(builder.should_send());
    }
}
