//! Utility scoring for enemies and powerups

use std::f32::consts::PI;

use crate::game::geometry::{angle_diff, angle_to, distance, segment_blocked};
use crate::game::knight::{Knight, PlayerId};
use crate::game::powerup::Powerup;
use crate::game::weapon::WeaponKind;
use crate::game::world::World;

/// Bots ignore anything further than this
pub const VISION_RANGE: f32 = 1000.0;
/// Powerups beyond this are not worth a detour
pub const PICKUP_REACH: f32 = 900.0;
/// An unshielded foe this close is a melee finish, not a reason to detour
const KILLABLE_RANGE: f32 = 90.0;
const LOS_STEP: f32 = 10.0;

pub fn is_ranged(kind: WeaponKind) -> bool {
    !matches!(kind, WeaponKind::Sword | WeaponKind::Shield | WeaponKind::Mine)
}

pub fn has_line_of_sight(world: &World, ax: f32, ay: f32, bx: f32, by: f32) -> bool {
    !segment_blocked(ax, ay, bx, by, LOS_STEP, world.terrain.rects())
}

/// Living enemies the bot can see
pub fn visible_enemies<'a>(world: &'a World, me: &'a Knight) -> impl Iterator<Item = &'a Knight> + 'a {
    world.living().filter(move |k| {
        k.id != me.id
            && world.can_damage(me.id, k.id)
            && distance(me.x, me.y, k.x, k.y) <= VISION_RANGE
            && has_line_of_sight(world, me.x, me.y, k.x, k.y)
    })
}

/// Higher is a better target
pub fn score_enemy(me: &Knight, enemy: &Knight, now: u64) -> f32 {
    let d = distance(me.x, me.y, enemy.x, enemy.y);
    let proximity = 1.0 - d.min(VISION_RANGE) / VISION_RANGE;
    let facing = 1.0 - angle_diff(me.angle, angle_to(me.x, me.y, enemy.x, enemy.y)).abs() / PI;

    let matchup = match (is_ranged(me.weapon.kind), is_ranged(enemy.weapon.kind)) {
        (true, false) => 0.3,
        (false, true) => -0.2,
        _ => 0.0,
    };

    let mut score = proximity + facing * 0.3 + matchup;
    if enemy.is_lunging(now) {
        score -= 0.4;
    }
    if enemy.shield_blocks() {
        score -= 0.5;
    }
    score
}

/// Whether a nearby enemy could be finished in melee right now
pub fn killable_enemy_near(world: &World, me: &Knight, now: u64) -> bool {
    visible_enemies(world, me).any(|k| {
        distance(me.x, me.y, k.x, k.y) <= KILLABLE_RANGE && !k.shield_blocks() && !k.is_invulnerable(now)
    })
}

pub fn score_powerup(me: &Knight, powerup: &Powerup, killable_nearby: bool) -> f32 {
    if powerup.kind == WeaponKind::Shield && me.has_shield {
        return 0.0;
    }
    let d = distance(me.x, me.y, powerup.x, powerup.y);
    if d > PICKUP_REACH {
        return 0.0;
    }
    let proximity = 1.0 - d / PICKUP_REACH;
    let mut score = proximity * 0.8 + powerup.kind.value() * 0.6;
    if me.weapon.kind == WeaponKind::Sword {
        score *= 2.0;
    }
    if killable_nearby {
        score *= 0.2;
    }
    score
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Enemy(PlayerId),
    Powerup(u64),
}

/// Best enemy and best powerup by utility, enemies winning ties
pub fn best_target(world: &World, me: &Knight, now: u64) -> Option<Target> {
    let enemy = visible_enemies(world, me)
        .map(|k| (k.id, score_enemy(me, k, now)))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let killable = killable_enemy_near(world, me, now);
    let pickup = world
        .powerups
        .iter()
        .map(|p| (p.id, score_powerup(me, p, killable)))
        .filter(|(_, s)| *s > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match (enemy, pickup) {
        (Some((id, es)), Some((pid, ps))) => {
            if ps > es {
                Some(Target::Powerup(pid))
            } else {
                Some(Target::Enemy(id))
            }
        }
        (Some((id, _)), None) => Some(Target::Enemy(id)),
        (None, Some((pid, _))) => Some(Target::Powerup(pid)),
        (None, None) => None,
    }
}

/// Best reachable powerup, if any is worth it
pub fn best_powerup(world: &World, me: &Knight, now: u64) -> Option<u64> {
    let killable = killable_enemy_near(world, me, now);
    world
        .powerups
        .iter()
        .map(|p| (p.id, score_powerup(me, p, killable)))
        .filter(|(_, s)| *s > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
