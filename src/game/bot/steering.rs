//! Bot movement and aim: range keeping, strafing, evasion, wall avoidance, smoothing

use crate::game::geometry::{angle_to, distance, lerp, lerp_angle, normalize};
use crate::game::knight::{Knight, KNIGHT_RADIUS};
use crate::game::weapon::{WeaponKind, WeaponParams};
use crate::game::world::World;

use super::threat::ThreatAssessment;

pub const MOVE_SMOOTHING: f32 = 0.25;
pub const AIM_SMOOTHING: f32 = 0.3;
pub const WALL_LOOKAHEAD: f32 = 45.0;
const STRAFE_WEIGHT: f32 = 0.6;
const REPULSION_WEIGHT: f32 = 1.5;

/// Projectile speed used to lead a target, `None` for hitscan or melee
pub fn lead_speed(kind: WeaponKind) -> Option<f32> {
    match kind.params() {
        WeaponParams::Bow(p) => Some((p.min_speed + p.max_speed) / 2.0),
        WeaponParams::Grenade(p) => Some((p.throw.min_speed + p.throw.max_speed) / 2.0),
        WeaponParams::Shotgun(p) => Some(p.speed),
        WeaponParams::Minigun(p) => Some(p.speed),
        WeaponParams::Sword(_) | WeaponParams::Laser(_) | WeaponParams::Mine(_) | WeaponParams::Shield => None,
    }
}

/// Where to aim at a moving target
pub fn predict(me: &Knight, target: &Knight, enabled: bool) -> (f32, f32) {
    if !enabled {
        return (target.x, target.y);
    }
    match lead_speed(me.weapon.kind) {
        Some(speed) if speed > 0.0 => {
            let t = distance(me.x, me.y, target.x, target.y) / speed;
            (target.x + target.vx * t, target.y + target.vy * t)
        }
        _ => (target.x, target.y),
    }
}

/// Close in or back off to the weapon's preferred band, strafing around the target
pub fn combat_vector(me: &Knight, tx: f32, ty: f32, strafe_dir: f32) -> (f32, f32) {
    let (to_x, to_y) = normalize(tx - me.x, ty - me.y);
    let d = distance(me.x, me.y, tx, ty);
    let (near, far) = me.weapon.kind.preferred_range();

    let approach = if d > far {
        1.0
    } else if d < near {
        -1.0
    } else {
        0.0
    };
    let (sx, sy) = (-to_y * strafe_dir, to_x * strafe_dir);
    normalize(
        to_x * approach + sx * STRAFE_WEIGHT,
        to_y * approach + sy * STRAFE_WEIGHT,
    )
}

/// Get away: sidestep the most urgent projectile, otherwise run from the threat source
pub fn evade_vector(me: &Knight, threats: &ThreatAssessment, from: Option<(f32, f32)>) -> (f32, f32) {
    if let Some(threat) = threats.most_urgent() {
        return threat.escape_direction();
    }
    if let Some((fx, fy)) = from {
        return normalize(me.x - fx, me.y - fy);
    }
    let (rx, ry) = threats.repulsion(me.x, me.y);
    normalize(rx, ry)
}

pub fn seek(me: &Knight, tx: f32, ty: f32) -> (f32, f32) {
    normalize(tx - me.x, ty - me.y)
}

/// Add danger-zone repulsion to a desired direction
pub fn with_repulsion(dir: (f32, f32), threats: &ThreatAssessment, x: f32, y: f32) -> (f32, f32) {
    let (rx, ry) = threats.repulsion(x, y);
    if rx == 0.0 && ry == 0.0 {
        return dir;
    }
    normalize(dir.0 + rx * REPULSION_WEIGHT, dir.1 + ry * REPULSION_WEIGHT)
}

fn probe_blocked(world: &World, x: f32, y: f32, dir: (f32, f32)) -> bool {
    let px = x + dir.0 * WALL_LOOKAHEAD;
    let py = y + dir.1 * WALL_LOOKAHEAD;
    if px < KNIGHT_RADIUS || py < KNIGHT_RADIUS || px > world.width - KNIGHT_RADIUS || py > world.height - KNIGHT_RADIUS {
        return true;
    }
    world
        .terrain
        .walls
        .iter()
        .any(|w| w.rect.overlaps_inflated(px, py, KNIGHT_RADIUS))
}

/// Deflect a desired direction that would run into a wall within look-ahead
pub fn avoid_walls(world: &World, x: f32, y: f32, dir: (f32, f32)) -> (f32, f32) {
    if (dir.0 == 0.0 && dir.1 == 0.0) || !probe_blocked(world, x, y, dir) {
        return dir;
    }
    let left = (-dir.1, dir.0);
    let right = (dir.1, -dir.0);
    let diag_left = normalize(dir.0 + left.0, dir.1 + left.1);
    let diag_right = normalize(dir.0 + right.0, dir.1 + right.1);
    [diag_left, diag_right, left, right]
        .into_iter()
        .find(|d| !probe_blocked(world, x, y, *d))
        .unwrap_or((-dir.0, -dir.1))
}

pub fn smooth_velocity(current: (f32, f32), desired: (f32, f32)) -> (f32, f32) {
    (
        lerp(current.0, desired.0, MOVE_SMOOTHING),
        lerp(current.1, desired.1, MOVE_SMOOTHING),
    )
}

pub fn smooth_aim(current: f32, desired: f32) -> f32 {
    lerp_angle(current, desired, AIM_SMOOTHING)
}

pub fn aim_at(me: &Knight, tx: f32, ty: f32) -> f32 {
    angle_to(me.x, me.y, tx, ty)
}
