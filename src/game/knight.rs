//! Knight state, movement and wall collision

use super::bot::BotMemory;
use super::geometry::{clamp_unit, normalize};
use super::powerup::Powerup;
use super::terrain::Wall;
use super::weapon::{Weapon, WeaponKind};

/// Player ids are allocated sequentially by the room manager
pub type PlayerId = u64;
/// Team ids are 1 and 2
pub type TeamId = u8;

/// Collision radius of every knight
pub const KNIGHT_RADIUS: f32 = 15.0;
/// Base movement speed in units per second
pub const BASE_SPEED: f32 = 180.0;
pub const LUNGE_MULTIPLIER: f32 = 2.8;
pub const LUNGE_DURATION_MS: u64 = 200;
pub const LUNGE_COOLDOWN_MS: u64 = 1200;
pub const MINIGUN_SPEED_PENALTY: f32 = 0.6;
/// Full shield charge, in milliseconds of active blocking
pub const SHIELD_MAX_ENERGY: f32 = 4000.0;
/// Extra reach beyond the knight radius for collecting powerups
pub const PICKUP_RADIUS: f32 = 18.0;
pub const SPAWN_INVULNERABILITY_MS: u64 = 1500;

pub const KNIGHT_COLORS: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f1c40f", "#9b59b6", "#e67e22", "#1abc9c", "#ecf0f1",
];

/// Latest intent for a knight, consumed by the next simulation tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KnightInput {
    pub move_x: f32,
    pub move_y: f32,
    pub aim: f32,
    pub attack_held: bool,
    /// Rising edge of the attack button, latched until the weapon engine reads it
    pub attack_pressed: bool,
    /// Falling edge of the attack button
    pub attack_released: bool,
    pub lunge: bool,
    pub shield: bool,
}

/// Authoritative knight state
#[derive(Debug, Clone)]
pub struct Knight {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_bot: bool,
    pub team_id: Option<TeamId>,

    // Position and movement
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,

    pub is_alive: bool,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,

    // Combat
    pub weapon: Weapon,
    pub intent: KnightInput,
    pub cooldown_until: u64,
    pub charge_started_at: Option<u64>,
    pub laser_fire_at: Option<u64>,
    pub parry_until: u64,
    pub parry_angle: f32,

    // Mobility
    pub lunge_until: u64,
    pub lunge_ready_at: u64,
    lunge_dir: (f32, f32),

    // Shield
    pub has_shield: bool,
    pub shield_active: bool,
    pub shield_energy: f32,

    pub invulnerable_until: u64,
    pub respawn_at: Option<u64>,

    /// Decision state for bot-controlled knights; never leaves the server
    pub bot: Option<BotMemory>,
}

impl Knight {
    pub fn new(id: PlayerId, name: String, color: String, is_bot: bool) -> Self {
        Self {
            id,
            name,
            color,
            is_bot,
            team_id: None,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            angle: 0.0,
            is_alive: true,
            score: 0,
            kills: 0,
            deaths: 0,
            weapon: Weapon::sword(),
            intent: KnightInput::default(),
            cooldown_until: 0,
            charge_started_at: None,
            laser_fire_at: None,
            parry_until: 0,
            parry_angle: 0.0,
            lunge_until: 0,
            lunge_ready_at: 0,
            lunge_dir: (0.0, 0.0),
            has_shield: false,
            shield_active: false,
            shield_energy: 0.0,
            invulnerable_until: 0,
            respawn_at: None,
            bot: None,
        }
    }

    /// Record a new intent. Movement is clamped to a unit vector; attack edges
    /// are derived from the held state so a dropped packet cannot leave a
    /// charge stuck.
    pub fn set_intent(
        &mut self,
        move_x: f32,
        move_y: f32,
        aim: f32,
        attacking: bool,
        lunge: bool,
        shield: bool,
    ) {
        let (mx, my) = clamp_unit(move_x, move_y);
        self.intent.move_x = mx;
        self.intent.move_y = my;
        if aim.is_finite() {
            self.intent.aim = aim;
        }
        if attacking && !self.intent.attack_held {
            self.intent.attack_pressed = true;
        }
        if !attacking && self.intent.attack_held {
            self.intent.attack_released = true;
        }
        self.intent.attack_held = attacking;
        self.intent.lunge |= lunge;
        self.intent.shield = shield;
    }

    pub fn is_lunging(&self, now: u64) -> bool {
        now < self.lunge_until
    }

    pub fn is_invulnerable(&self, now: u64) -> bool {
        now < self.invulnerable_until
    }

    pub fn is_parrying(&self, now: u64) -> bool {
        now < self.parry_until
    }

    pub fn shield_blocks(&self) -> bool {
        self.shield_active && self.shield_energy > 0.0
    }

    pub fn lunge_ready(&self, now: u64) -> bool {
        now >= self.lunge_ready_at
    }

    /// Effective speed for this tick in units per second
    pub fn effective_speed(&self, now: u64, speed_pct: u32) -> f32 {
        let mut speed = BASE_SPEED * speed_pct as f32 / 100.0;
        if self.is_lunging(now) {
            speed *= LUNGE_MULTIPLIER;
        }
        if self.weapon.kind == WeaponKind::Minigun {
            speed *= MINIGUN_SPEED_PENALTY;
        }
        speed
    }

    /// Shield activation and energy drain for one tick
    pub fn update_shield(&mut self, dt_ms: u64) {
        self.shield_active = self.intent.shield && self.has_shield && self.shield_energy > 0.0;
        if self.shield_active {
            self.shield_energy = (self.shield_energy - dt_ms as f32).max(0.0);
            if self.shield_energy <= 0.0 {
                self.has_shield = false;
                self.shield_active = false;
            }
        }
    }

    /// Start a lunge if one was requested and the cooldown allows it
    pub fn try_lunge(&mut self, now: u64) -> bool {
        let requested = std::mem::take(&mut self.intent.lunge);
        if !requested || !self.lunge_ready(now) {
            return false;
        }
        let (mx, my) = normalize(self.intent.move_x, self.intent.move_y);
        self.lunge_dir = if mx == 0.0 && my == 0.0 {
            (self.angle.cos(), self.angle.sin())
        } else {
            (mx, my)
        };
        self.lunge_until = now + LUNGE_DURATION_MS;
        self.lunge_ready_at = now + LUNGE_COOLDOWN_MS;
        true
    }

    /// Advance shield, lunge and position for one tick
    pub fn step(
        &mut self,
        now: u64,
        dt_ms: u64,
        walls: &[Wall],
        width: f32,
        height: f32,
        speed_pct: u32,
    ) {
        if !self.is_alive {
            self.vx = 0.0;
            self.vy = 0.0;
            return;
        }

        self.angle = self.intent.aim;
        self.update_shield(dt_ms);
        self.try_lunge(now);

        let (dir_x, dir_y) = if self.is_lunging(now) {
            self.lunge_dir
        } else {
            (self.intent.move_x, self.intent.move_y)
        };
        let speed = self.effective_speed(now, speed_pct);
        self.vx = dir_x * speed;
        self.vy = dir_y * speed;

        let dt = dt_ms as f32 / 1000.0;
        self.move_by(self.vx * dt, self.vy * dt, walls, width, height);
    }

    /// Move with axis-separated collision so knights slide along walls
    pub fn move_by(&mut self, dx: f32, dy: f32, walls: &[Wall], width: f32, height: f32) {
        let stuck = blocked(self.x, self.y, walls);

        let next_x = self.x + dx;
        if stuck || !blocked(next_x, self.y, walls) {
            self.x = next_x;
        }
        let next_y = self.y + dy;
        if stuck || !blocked(self.x, next_y, walls) {
            self.y = next_y;
        }

        self.x = self.x.clamp(KNIGHT_RADIUS, (width - KNIGHT_RADIUS).max(KNIGHT_RADIUS));
        self.y = self.y.clamp(KNIGHT_RADIUS, (height - KNIGHT_RADIUS).max(KNIGHT_RADIUS));
    }

    /// Consume any powerups within reach. Returns what was picked up.
    pub fn collect_powerups(&mut self, powerups: &mut Vec<Powerup>) -> Vec<Powerup> {
        if !self.is_alive {
            return Vec::new();
        }
        let reach = KNIGHT_RADIUS + PICKUP_RADIUS;
        let (taken, kept): (Vec<Powerup>, Vec<Powerup>) = powerups
            .drain(..)
            .partition(|p| super::geometry::distance_sq(self.x, self.y, p.x, p.y) <= reach * reach);
        *powerups = kept;

        for powerup in &taken {
            self.equip(powerup.kind);
        }
        taken
    }

    pub fn equip(&mut self, kind: WeaponKind) {
        if kind == WeaponKind::Shield {
            self.has_shield = true;
            self.shield_energy = SHIELD_MAX_ENERGY;
        } else {
            self.weapon = Weapon::new(kind);
            self.charge_started_at = None;
            self.laser_fire_at = None;
        }
    }

    /// Mark the knight dead and drop anything in progress
    pub fn die(&mut self) {
        self.is_alive = false;
        self.deaths += 1;
        self.vx = 0.0;
        self.vy = 0.0;
        self.charge_started_at = None;
        self.laser_fire_at = None;
        self.shield_active = false;
        self.lunge_until = 0;
    }

    /// Reset everything that does not survive a round or a respawn
    pub fn spawn_at(&mut self, x: f32, y: f32, now: u64) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
        self.is_alive = true;
        self.weapon = Weapon::sword();
        self.intent = KnightInput {
            aim: self.angle,
            ..KnightInput::default()
        };
        self.cooldown_until = 0;
        self.charge_started_at = None;
        self.laser_fire_at = None;
        self.parry_until = 0;
        self.lunge_until = 0;
        self.lunge_ready_at = 0;
        self.has_shield = false;
        self.shield_active = false;
        self.shield_energy = 0.0;
        self.respawn_at = None;
        self.invulnerable_until = now + SPAWN_INVULNERABILITY_MS;
    }
}

fn blocked(x: f32, y: f32, walls: &[Wall]) -> bool {
    walls
        .iter()
        .any(|w| w.rect.overlaps_inflated(x, y, KNIGHT_RADIUS))
}
