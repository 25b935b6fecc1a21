//! Weapon kinds and their per-kind parameters

use serde::{Deserialize, Serialize};

/// Every weapon a knight can hold (the shield is a pickup-only capability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Sword,
    Bow,
    Shotgun,
    Laser,
    Minigun,
    Grenade,
    Mine,
    Shield,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 8] = [
        WeaponKind::Sword,
        WeaponKind::Bow,
        WeaponKind::Shotgun,
        WeaponKind::Laser,
        WeaponKind::Minigun,
        WeaponKind::Grenade,
        WeaponKind::Mine,
        WeaponKind::Shield,
    ];

    pub fn params(self) -> WeaponParams {
        match self {
            WeaponKind::Sword => WeaponParams::Sword(SwordParams {
                cooldown_ms: 450,
                range: 55.0,
                arc: 2.1,
                slash_duration_ms: 180,
                parry_window_ms: 220,
            }),
            WeaponKind::Bow => WeaponParams::Bow(ChargeParams {
                cooldown_ms: 600,
                ammo: 6,
                max_charge_ms: 1000,
                min_speed: 420.0,
                max_speed: 950.0,
                range: 900.0,
            }),
            WeaponKind::Shotgun => WeaponParams::Shotgun(ShotgunParams {
                cooldown_ms: 900,
                ammo: 4,
                pellets: 6,
                spread: 0.5,
                speed: 700.0,
                range: 320.0,
                recoil: 22.0,
            }),
            WeaponKind::Laser => WeaponParams::Laser(LaserParams {
                cooldown_ms: 1600,
                ammo: 3,
                channel_ms: 550,
                step: 5.0,
                max_distance: 900.0,
            }),
            WeaponKind::Minigun => WeaponParams::Minigun(MinigunParams {
                cooldown_ms: 90,
                ammo: 45,
                speed: 760.0,
                spread: 0.16,
                range: 600.0,
            }),
            WeaponKind::Grenade => WeaponParams::Grenade(GrenadeParams {
                throw: ChargeParams {
                    cooldown_ms: 900,
                    ammo: 3,
                    max_charge_ms: 1000,
                    min_speed: 260.0,
                    max_speed: 560.0,
                    range: 520.0,
                },
                fuse_ms: 1400,
                blast_radius: 85.0,
            }),
            WeaponKind::Mine => WeaponParams::Mine(MineParams {
                cooldown_ms: 600,
                ammo: 3,
                place_offset: 28.0,
                arm_ms: 900,
                trigger_radius: 32.0,
                fuse_ms: 450,
                blast_radius: 75.0,
            }),
            WeaponKind::Shield => WeaponParams::Shield,
        }
    }

    pub fn attack_shape(self) -> AttackShape {
        match self {
            WeaponKind::Sword | WeaponKind::Shotgun | WeaponKind::Mine => AttackShape::Instant,
            WeaponKind::Minigun => AttackShape::Automatic,
            WeaponKind::Bow | WeaponKind::Grenade => AttackShape::ChargeRelease,
            WeaponKind::Laser => AttackShape::Channel,
            WeaponKind::Shield => AttackShape::Passive,
        }
    }

    pub fn cooldown_ms(self) -> u64 {
        match self.params() {
            WeaponParams::Sword(p) => p.cooldown_ms,
            WeaponParams::Bow(p) => p.cooldown_ms,
            WeaponParams::Shotgun(p) => p.cooldown_ms,
            WeaponParams::Laser(p) => p.cooldown_ms,
            WeaponParams::Minigun(p) => p.cooldown_ms,
            WeaponParams::Grenade(p) => p.throw.cooldown_ms,
            WeaponParams::Mine(p) => p.cooldown_ms,
            WeaponParams::Shield => 0,
        }
    }

    pub fn starting_ammo(self) -> Ammo {
        match self.params() {
            WeaponParams::Sword(_) | WeaponParams::Shield => Ammo::Unlimited,
            WeaponParams::Bow(p) => Ammo::Limited(p.ammo),
            WeaponParams::Shotgun(p) => Ammo::Limited(p.ammo),
            WeaponParams::Laser(p) => Ammo::Limited(p.ammo),
            WeaponParams::Minigun(p) => Ammo::Limited(p.ammo),
            WeaponParams::Grenade(p) => Ammo::Limited(p.throw.ammo),
            WeaponParams::Mine(p) => Ammo::Limited(p.ammo),
        }
    }

    /// Distance band a bot tries to hold while using this weapon
    pub fn preferred_range(self) -> (f32, f32) {
        match self {
            WeaponKind::Sword | WeaponKind::Shield => (0.0, 45.0),
            WeaponKind::Shotgun => (60.0, 190.0),
            WeaponKind::Mine => (0.0, 90.0),
            WeaponKind::Minigun => (140.0, 380.0),
            WeaponKind::Grenade => (160.0, 360.0),
            WeaponKind::Bow => (200.0, 520.0),
            WeaponKind::Laser => (220.0, 700.0),
        }
    }

    /// Rough desirability used by bot pickup scoring
    pub fn value(self) -> f32 {
        match self {
            WeaponKind::Sword => 0.0,
            WeaponKind::Mine => 0.45,
            WeaponKind::Bow => 0.6,
            WeaponKind::Grenade => 0.65,
            WeaponKind::Shield => 0.7,
            WeaponKind::Shotgun => 0.75,
            WeaponKind::Minigun => 0.85,
            WeaponKind::Laser => 0.9,
        }
    }

    /// Kinds of which at most one may exist on the field or in hand at once
    pub fn is_scarce(self) -> bool {
        matches!(self, WeaponKind::Laser | WeaponKind::Minigun | WeaponKind::Grenade)
    }
}

/// How a weapon turns input into an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackShape {
    /// Fires on press
    Instant,
    /// Fires on press and keeps firing while held
    Automatic,
    /// Charge on press, fire on release with power scaled by charge time
    ChargeRelease,
    /// Fires automatically after a fixed delay from press
    Channel,
    /// Never attacks
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeaponParams {
    Sword(SwordParams),
    Bow(ChargeParams),
    Shotgun(ShotgunParams),
    Laser(LaserParams),
    Minigun(MinigunParams),
    Grenade(GrenadeParams),
    Mine(MineParams),
    Shield,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwordParams {
    pub cooldown_ms: u64,
    pub range: f32,
    /// Full arc width in radians, centred on the facing angle
    pub arc: f32,
    pub slash_duration_ms: u64,
    pub parry_window_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeParams {
    pub cooldown_ms: u64,
    pub ammo: u32,
    pub max_charge_ms: u64,
    pub min_speed: f32,
    pub max_speed: f32,
    pub range: f32,
}

impl ChargeParams {
    /// Launch speed for a charge held for `held_ms`
    pub fn release_speed(&self, held_ms: u64) -> f32 {
        let t = (held_ms.min(self.max_charge_ms) as f32) / self.max_charge_ms.max(1) as f32;
        self.min_speed + (self.max_speed - self.min_speed) * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotgunParams {
    pub cooldown_ms: u64,
    pub ammo: u32,
    pub pellets: u32,
    pub spread: f32,
    pub speed: f32,
    pub range: f32,
    pub recoil: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserParams {
    pub cooldown_ms: u64,
    pub ammo: u32,
    pub channel_ms: u64,
    pub step: f32,
    pub max_distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinigunParams {
    pub cooldown_ms: u64,
    pub ammo: u32,
    pub speed: f32,
    pub spread: f32,
    pub range: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrenadeParams {
    pub throw: ChargeParams,
    pub fuse_ms: u64,
    pub blast_radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MineParams {
    pub cooldown_ms: u64,
    pub ammo: u32,
    pub place_offset: f32,
    pub arm_ms: u64,
    pub trigger_radius: f32,
    pub fuse_ms: u64,
    pub blast_radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ammo {
    Unlimited,
    Limited(u32),
}

/// A weapon in a knight's hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weapon {
    pub kind: WeaponKind,
    pub ammo: Ammo,
}

impl Weapon {
    pub fn new(kind: WeaponKind) -> Self {
        Self {
            kind,
            ammo: kind.starting_ammo(),
        }
    }

    pub fn sword() -> Self {
        Self::new(WeaponKind::Sword)
    }

    pub fn has_ammo(&self) -> bool {
        match self.ammo {
            Ammo::Unlimited => true,
            Ammo::Limited(n) => n > 0,
        }
    }

    /// Spend one shot. Returns true when the weapon is now empty.
    pub fn consume(&mut self) -> bool {
        match &mut self.ammo {
            Ammo::Unlimited => false,
            Ammo::Limited(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        }
    }

    /// Ammo for the wire (`None` means unlimited)
    pub fn ammo_count(&self) -> Option<u32> {
        match self.ammo {
            Ammo::Unlimited => None,
            Ammo::Limited(n) => Some(n),
        }
    }
}

impl Default for Weapon {
    fn default() -> Self {
        Self::sword()
    }
}

/// Weighted table the powerup spawner draws from
pub const DROP_TABLE: [(WeaponKind, u32); 7] = [
    (WeaponKind::Bow, 4),
    (WeaponKind::Shotgun, 4),
    (WeaponKind::Minigun, 2),
    (WeaponKind::Laser, 2),
    (WeaponKind::Grenade, 3),
    (WeaponKind::Mine, 3),
    (WeaponKind::Shield, 3),
];
