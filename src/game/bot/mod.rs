//! Bot engine - per-bot state machine driving knight intents
//!
//! Decisions (state changes, attacks, dashes) happen on a difficulty-dependent
//! interval; movement and aim are refreshed every tick and smoothed. Emergency
//! dodges are checked every tick.

pub mod steering;
pub mod targeting;
pub mod threat;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::geometry::distance;
use super::knight::{Knight, PlayerId, KNIGHT_RADIUS};
use super::weapon::{AttackShape, WeaponKind, WeaponParams};
use super::world::World;

use self::targeting::{best_powerup, best_target, has_line_of_sight, is_ranged, visible_enemies, Target};
use self::threat::{should_emergency_dodge, ThreatAssessment};

/// Idle bots start patrolling after this long without a target
pub const IDLE_PATROL_TIMEOUT_MS: u64 = 1_500;
/// Combat is abandoned beyond this distance
pub const COMBAT_LEASH: f32 = 750.0;
pub const EVADE_HOLD_MS: u64 = 900;
/// Pickup is abandoned for a fight when an enemy gets this close
pub const PICKUP_ABORT_DISTANCE: f32 = 130.0;
/// Patrolling bots engage enemies within this range
pub const PATROL_ENGAGE_RANGE: f32 = 350.0;
pub const STRAFE_FLIP_MS: u64 = 1_100;
const PATROL_ARRIVAL: f32 = 30.0;
const CROWD_RANGE: f32 = 250.0;
const LUNGE_THREAT_RANGE: f32 = 120.0;
const OUTGUNNED_RANGE: f32 = 450.0;
const DASH_CLOSE_MIN: f32 = 70.0;
const DASH_CLOSE_MAX: f32 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

/// Tuning knobs per difficulty
#[derive(Debug, Clone, Copy)]
pub struct DifficultyProfile {
    pub decision_interval_ms: u64,
    pub reaction_delay_ms: (u64, u64),
    /// Max aim error in radians either side
    pub aim_error: f32,
    pub aim_error_refresh_ms: u64,
    pub attack_chance: f64,
    pub dash_chance: f64,
    /// Fraction of full charge before releasing bows and grenades
    pub charge_fraction: f32,
    pub predict: bool,
}

impl Difficulty {
    pub fn profile(self) -> DifficultyProfile {
        match self {
            Difficulty::Easy => DifficultyProfile {
                decision_interval_ms: 450,
                reaction_delay_ms: (600, 1000),
                aim_error: 0.32,
                aim_error_refresh_ms: 900,
                attack_chance: 0.35,
                dash_chance: 0.04,
                charge_fraction: 0.45,
                predict: false,
            },
            Difficulty::Medium => DifficultyProfile {
                decision_interval_ms: 280,
                reaction_delay_ms: (350, 650),
                aim_error: 0.16,
                aim_error_refresh_ms: 650,
                attack_chance: 0.6,
                dash_chance: 0.1,
                charge_fraction: 0.7,
                predict: true,
            },
            Difficulty::Hard => DifficultyProfile {
                decision_interval_ms: 150,
                reaction_delay_ms: (150, 350),
                aim_error: 0.05,
                aim_error_refresh_ms: 400,
                attack_chance: 0.85,
                dash_chance: 0.2,
                charge_fraction: 0.95,
                predict: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    Idle,
    Combat,
    Evade,
    Pickup,
    Patrol,
}

/// Per-bot decision state. Refers to other entities by id only.
#[derive(Debug, Clone)]
pub struct BotMemory {
    pub difficulty: Difficulty,
    pub state: BotState,
    pub state_since: u64,
    pub reaction_ready_at: u64,
    pub next_decision_at: u64,
    pub target: Option<PlayerId>,
    pub powerup_target: Option<u64>,
    pub patrol_point: Option<(f32, f32)>,
    pub strafe_dir: f32,
    pub next_strafe_flip_at: u64,
    pub aim_error: f32,
    pub next_aim_error_at: u64,
    /// Smoothed movement actually applied
    pub velocity: (f32, f32),
    pub aim: f32,
    pub threats: ThreatAssessment,
    pub attack_hold_until: u64,
    dodge: Option<(f32, f32)>,
    lunge_requested: bool,
    rng: ChaCha8Rng,
}

/// What a bot wants its knight to do this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotIntent {
    pub move_x: f32,
    pub move_y: f32,
    pub aim: f32,
    pub attacking: bool,
    pub lunge: bool,
    pub shield: bool,
}

impl BotMemory {
    pub fn new(difficulty: Difficulty, seed: u64, now: u64) -> Self {
        let mut memory = Self {
            difficulty,
            state: BotState::Idle,
            state_since: now,
            reaction_ready_at: now,
            next_decision_at: now,
            target: None,
            powerup_target: None,
            patrol_point: None,
            strafe_dir: 1.0,
            next_strafe_flip_at: now,
            aim_error: 0.0,
            next_aim_error_at: now,
            velocity: (0.0, 0.0),
            aim: 0.0,
            threats: ThreatAssessment::default(),
            attack_hold_until: 0,
            dodge: None,
            lunge_requested: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        memory.reset(now, 0.0);
        memory
    }

    /// Start-of-round state: forget targets and wait out a fresh reaction delay
    pub fn reset(&mut self, now: u64, facing: f32) {
        let (lo, hi) = self.difficulty.profile().reaction_delay_ms;
        let delay = self.rng.gen_range(lo..=hi);
        self.state = BotState::Idle;
        self.state_since = now;
        self.reaction_ready_at = now + delay;
        self.next_decision_at = now + delay;
        self.target = None;
        self.powerup_target = None;
        self.patrol_point = None;
        self.velocity = (0.0, 0.0);
        self.aim = facing;
        self.threats = ThreatAssessment::default();
        self.attack_hold_until = 0;
        self.dodge = None;
        self.lunge_requested = false;
    }

    fn enter(&mut self, state: BotState, now: u64) {
        if self.state != state {
            self.state = state;
            self.state_since = now;
        }
    }
}

/// Drives every living bot in a world
pub struct BotEngine;

impl BotEngine {
    /// Compute and apply intents for all living bots
    pub fn drive(world: &mut World, now: u64) {
        let bots: Vec<PlayerId> = world
            .living()
            .filter(|k| k.bot.is_some())
            .map(|k| k.id)
            .collect();

        for id in bots {
            let Some(mut memory) = world.knights.get_mut(&id).and_then(|k| k.bot.take()) else {
                continue;
            };
            let intent = match world.knights.get(&id) {
                Some(me) => Self::think(world, me, &mut memory, now),
                None => continue,
            };
            if let Some(knight) = world.knights.get_mut(&id) {
                knight.set_intent(
                    intent.move_x,
                    intent.move_y,
                    intent.aim,
                    intent.attacking,
                    intent.lunge,
                    intent.shield,
                );
                knight.bot = Some(memory);
            }
        }
    }

    pub fn think(world: &World, me: &Knight, memory: &mut BotMemory, now: u64) -> BotIntent {
        let profile = memory.difficulty.profile();
        if now < memory.reaction_ready_at {
            return BotIntent {
                move_x: 0.0,
                move_y: 0.0,
                aim: me.angle,
                attacking: false,
                lunge: false,
                shield: false,
            };
        }

        if now >= memory.next_decision_at {
            memory.next_decision_at = now + profile.decision_interval_ms;
            memory.threats = threat::assess(world, me, now);
            Self::decide(world, me, memory, now);
        } else if me.lunge_ready(now) {
            // Between decisions only the most urgent shot is checked
            if let Some(threat) = threat::most_urgent_incoming(world, me).filter(should_emergency_dodge) {
                memory.dodge = Some(threat.escape_direction());
                memory.lunge_requested = true;
            }
        }

        if now >= memory.next_strafe_flip_at {
            memory.strafe_dir = -memory.strafe_dir;
            memory.next_strafe_flip_at = now + STRAFE_FLIP_MS;
        }
        if now >= memory.next_aim_error_at {
            memory.aim_error = memory.rng.gen_range(-profile.aim_error..=profile.aim_error);
            memory.next_aim_error_at = now + profile.aim_error_refresh_ms;
        }

        let target = memory
            .target
            .and_then(|id| world.knights.get(&id))
            .filter(|k| k.is_alive);

        let desired = match memory.state {
            BotState::Combat => target
                .map(|t| {
                    let (px, py) = steering::predict(me, t, profile.predict);
                    steering::combat_vector(me, px, py, memory.strafe_dir)
                })
                .unwrap_or((0.0, 0.0)),
            BotState::Evade => steering::evade_vector(me, &memory.threats, target.map(|t| (t.x, t.y))),
            BotState::Pickup => memory
                .powerup_target
                .and_then(|pid| world.powerups.iter().find(|p| p.id == pid))
                .map(|p| steering::seek(me, p.x, p.y))
                .unwrap_or((0.0, 0.0)),
            BotState::Patrol => memory
                .patrol_point
                .map(|(px, py)| steering::seek(me, px, py))
                .unwrap_or((0.0, 0.0)),
            BotState::Idle => (0.0, 0.0),
        };

        if let Some(dodge) = memory.dodge.take() {
            // Dodges skip smoothing so the lunge goes where it should
            memory.velocity = steering::avoid_walls(world, me.x, me.y, dodge);
        } else {
            let desired = steering::with_repulsion(desired, &memory.threats, me.x, me.y);
            let desired = steering::avoid_walls(world, me.x, me.y, desired);
            memory.velocity = steering::smooth_velocity(memory.velocity, desired);
        }

        let desired_aim = match (memory.state, target) {
            (BotState::Combat | BotState::Evade, Some(t)) => {
                let (px, py) = steering::predict(me, t, profile.predict);
                steering::aim_at(me, px, py) + memory.aim_error
            }
            _ => {
                let (vx, vy) = memory.velocity;
                if vx.abs() + vy.abs() > 0.05 {
                    vy.atan2(vx)
                } else {
                    memory.aim
                }
            }
        };
        memory.aim = steering::smooth_aim(memory.aim, desired_aim);

        BotIntent {
            move_x: memory.velocity.0,
            move_y: memory.velocity.1,
            aim: memory.aim,
            attacking: now < memory.attack_hold_until,
            lunge: std::mem::take(&mut memory.lunge_requested),
            shield: me.has_shield && !memory.threats.incoming.is_empty(),
        }
    }

    /// Evasion triggers: outgunned while unarmed, a lunging foe close by,
    /// two or more foes nearby, or standing in a danger zone
    fn should_evade(world: &World, me: &Knight, threats: &ThreatAssessment, now: u64) -> bool {
        let unarmed = me.weapon.kind == WeaponKind::Sword;
        let mut crowd = 0;
        for enemy in visible_enemies(world, me) {
            let d = distance(me.x, me.y, enemy.x, enemy.y);
            if unarmed && is_ranged(enemy.weapon.kind) && d <= OUTGUNNED_RANGE && d > LUNGE_THREAT_RANGE {
                return true;
            }
            if enemy.is_lunging(now) && d <= LUNGE_THREAT_RANGE {
                return true;
            }
            if d <= CROWD_RANGE {
                crowd += 1;
            }
        }
        crowd >= 2 || threats.in_danger_zone(me.x, me.y)
    }

    fn decide(world: &World, me: &Knight, memory: &mut BotMemory, now: u64) {
        let nearest = world
            .nearest_enemy_of(me.id, me.x, me.y)
            .map(|k| (k.id, distance(me.x, me.y, k.x, k.y)));

        match memory.state {
            BotState::Idle => match best_target(world, me, now) {
                Some(Target::Enemy(id)) => {
                    memory.target = Some(id);
                    memory.enter(BotState::Combat, now);
                }
                Some(Target::Powerup(pid)) => {
                    memory.powerup_target = Some(pid);
                    memory.enter(BotState::Pickup, now);
                }
                None => {
                    if now.saturating_sub(memory.state_since) >= IDLE_PATROL_TIMEOUT_MS {
                        memory.patrol_point = Some(Self::roll_patrol_point(world, memory));
                        memory.enter(BotState::Patrol, now);
                    }
                }
            },
            BotState::Combat => match nearest {
                Some((id, d)) if d <= COMBAT_LEASH => {
                    memory.target = Some(id);
                    if Self::should_evade(world, me, &memory.threats, now) {
                        memory.enter(BotState::Evade, now);
                    }
                }
                _ => {
                    memory.target = None;
                    memory.enter(BotState::Idle, now);
                }
            },
            BotState::Evade => {
                let held = now.saturating_sub(memory.state_since) >= EVADE_HOLD_MS;
                if held || !Self::should_evade(world, me, &memory.threats, now) {
                    memory.enter(BotState::Idle, now);
                }
            }
            BotState::Pickup => {
                let still_there = memory
                    .powerup_target
                    .is_some_and(|pid| world.powerups.iter().any(|p| p.id == pid));
                match nearest {
                    Some((id, d)) if d <= PICKUP_ABORT_DISTANCE => {
                        memory.target = Some(id);
                        memory.enter(BotState::Combat, now);
                    }
                    _ if !still_there => {
                        memory.powerup_target = None;
                        memory.enter(BotState::Idle, now);
                    }
                    _ => {}
                }
            }
            BotState::Patrol => {
                let engage = visible_enemies(world, me)
                    .map(|k| (k.id, distance(me.x, me.y, k.x, k.y)))
                    .filter(|(_, d)| *d <= PATROL_ENGAGE_RANGE)
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((id, _)) = engage {
                    memory.target = Some(id);
                    memory.enter(BotState::Combat, now);
                } else if let Some(pid) = best_powerup(world, me, now) {
                    memory.powerup_target = Some(pid);
                    memory.enter(BotState::Pickup, now);
                } else {
                    let arrived = memory
                        .patrol_point
                        .map_or(true, |(px, py)| distance(me.x, me.y, px, py) <= PATROL_ARRIVAL);
                    if arrived {
                        memory.patrol_point = Some(Self::roll_patrol_point(world, memory));
                    }
                }
            }
        }

        Self::decide_actions(world, me, memory, now);
    }

    fn decide_actions(world: &World, me: &Knight, memory: &mut BotMemory, now: u64) {
        let profile = memory.difficulty.profile();

        // An imminent close pass is dodged no matter what the dice say
        if let Some(threat) = memory.threats.most_urgent() {
            if should_emergency_dodge(threat) && me.lunge_ready(now) {
                memory.dodge = Some(threat.escape_direction());
                memory.lunge_requested = true;
                return;
            }
        }

        match memory.state {
            BotState::Evade => {
                if me.lunge_ready(now) && memory.rng.gen_bool(profile.dash_chance) {
                    memory.lunge_requested = true;
                }
            }
            BotState::Combat => {
                let Some(target) = memory
                    .target
                    .and_then(|id| world.knights.get(&id))
                    .filter(|k| k.is_alive)
                else {
                    return;
                };
                let d = distance(me.x, me.y, target.x, target.y);
                let close_range = matches!(
                    me.weapon.kind,
                    WeaponKind::Sword | WeaponKind::Shotgun | WeaponKind::Mine
                );
                if close_range
                    && (DASH_CLOSE_MIN..=DASH_CLOSE_MAX).contains(&d)
                    && me.lunge_ready(now)
                    && memory.rng.gen_bool(profile.dash_chance)
                {
                    memory.lunge_requested = true;
                }

                let in_range = match me.weapon.kind.params() {
                    WeaponParams::Sword(p) => d <= p.range + KNIGHT_RADIUS,
                    _ => {
                        d <= me.weapon.kind.preferred_range().1 + 60.0
                            && has_line_of_sight(world, me.x, me.y, target.x, target.y)
                    }
                };
                let idle_hands = now >= me.cooldown_until && now >= memory.attack_hold_until;
                if in_range && idle_hands && memory.rng.gen_bool(profile.attack_chance) {
                    memory.attack_hold_until = now + Self::attack_hold_ms(me.weapon.kind, &profile);
                }
            }
            BotState::Idle | BotState::Pickup | BotState::Patrol => {}
        }
    }

    /// How long to keep the attack input down for one attack
    fn attack_hold_ms(kind: WeaponKind, profile: &DifficultyProfile) -> u64 {
        match (kind.attack_shape(), kind.params()) {
            (AttackShape::ChargeRelease, WeaponParams::Bow(p)) => {
                (p.max_charge_ms as f32 * profile.charge_fraction) as u64
            }
            (AttackShape::ChargeRelease, WeaponParams::Grenade(p)) => {
                (p.throw.max_charge_ms as f32 * profile.charge_fraction) as u64
            }
            (AttackShape::Automatic, _) => profile.decision_interval_ms,
            _ => 1,
        }
    }

    fn roll_patrol_point(world: &World, memory: &mut BotMemory) -> (f32, f32) {
        let margin = KNIGHT_RADIUS * 2.0;
        let max_x = (world.width - margin).max(margin + 1.0);
        let max_y = (world.height - margin).max(margin + 1.0);
        for _ in 0..8 {
            let x = memory.rng.gen_range(margin..max_x);
            let y = memory.rng.gen_range(margin..max_y);
            if world.terrain.wall_at(x, y).is_none() {
                return (x, y);
            }
        }
        (world.width / 2.0, world.height / 2.0)
    }
}
