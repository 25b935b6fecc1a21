//! Weapon engine - attack input, projectiles, beams, slashes, mines, hit resolution

use rand::Rng;

use super::geometry::{angle_diff, angle_to, distance, distance_sq};
use super::knight::{PlayerId, KNIGHT_RADIUS};
use super::weapon::{AttackShape, ChargeParams, WeaponKind, WeaponParams};
use super::world::World;

/// Projectile hitbox radius
pub const PROJECTILE_RADIUS: f32 = 4.0;
/// Maximum distance a projectile moves between collision checks
const SUBSTEP: f32 = 8.0;
pub const BEAM_VISIBLE_MS: u64 = 200;
pub const EXPLOSION_VISIBLE_MS: u64 = 350;
const PROJECTILE_WALL_DAMAGE: i32 = 1;
const SLASH_WALL_DAMAGE: i32 = 1;
const LASER_WALL_DAMAGE: i32 = 1;
const EXPLOSION_WALL_DAMAGE: i32 = 2;

/// Active projectile (arrow, pellet, minigun round or grenade)
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: u64,
    pub owner_id: PlayerId,
    pub kind: WeaponKind,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub travelled: f32,
    pub max_range: f32,
    /// Grenades detonate at this time wherever they are
    pub fuse_at: Option<u64>,
}

impl Projectile {
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// A sword swing sweeping an arc in front of its owner
#[derive(Debug, Clone, PartialEq)]
pub struct SwordSlash {
    pub id: u64,
    pub owner_id: PlayerId,
    pub angle: f32,
    pub arc: f32,
    pub range: f32,
    pub started_at: u64,
    pub ends_at: u64,
    pub hit_knights: Vec<PlayerId>,
    /// Walls already damaged by this swing
    pub hit_walls: Vec<u32>,
}

/// Visual record of a fired laser
#[derive(Debug, Clone, PartialEq)]
pub struct LaserBeam {
    pub owner_id: PlayerId,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mine {
    pub id: u64,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub placed_at: u64,
    pub armed_at: u64,
    pub explode_at: Option<u64>,
    /// Set once the owner has stepped out of the trigger radius
    pub owner_clear: bool,
}

impl Mine {
    pub fn is_armed(&self, now: u64) -> bool {
        now >= self.armed_at
    }
}

/// Visual record of a blast
#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    pub id: u64,
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub created_at: u64,
}

/// Outcome of a single damaging effect on a knight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strike {
    Killed,
    Invulnerable,
    Shielded,
    Parried,
    Friendly,
    Missed,
}

/// A death produced during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kill {
    pub victim: PlayerId,
    /// `None` for self-inflicted deaths
    pub killer: Option<PlayerId>,
    pub cause: WeaponKind,
}

/// Stateless weapon engine operating on a room's world
pub struct CombatSystem;

impl CombatSystem {
    /// Apply one damaging effect. `from` is the point the effect arrives
    /// from, used for parrying; melee and blasts pass `None`.
    pub fn strike(
        world: &mut World,
        target: PlayerId,
        attacker: PlayerId,
        now: u64,
        from: Option<(f32, f32)>,
    ) -> Strike {
        if !world.can_damage(attacker, target) {
            return Strike::Friendly;
        }
        let Some(knight) = world.knights.get_mut(&target) else {
            return Strike::Missed;
        };
        if !knight.is_alive {
            return Strike::Missed;
        }
        if knight.is_invulnerable(now) {
            return Strike::Invulnerable;
        }
        if knight.shield_blocks() {
            return Strike::Shielded;
        }
        if let Some((fx, fy)) = from {
            if knight.is_parrying(now) {
                let arc = match WeaponKind::Sword.params() {
                    WeaponParams::Sword(p) => p.arc,
                    _ => 0.0,
                };
                let incoming = angle_to(knight.x, knight.y, fx, fy);
                if angle_diff(knight.parry_angle, incoming).abs() <= arc / 2.0 {
                    return Strike::Parried;
                }
            }
        }
        knight.die();
        Strike::Killed
    }

    fn record(kills: &mut Vec<Kill>, victim: PlayerId, attacker: PlayerId, cause: WeaponKind) {
        kills.push(Kill {
            victim,
            killer: (victim != attacker).then_some(attacker),
            cause,
        });
    }

    /// Fire lasers whose channel time has elapsed
    pub fn resolve_channels(world: &mut World, now: u64, kills: &mut Vec<Kill>) {
        let due: Vec<PlayerId> = world
            .living()
            .filter(|k| k.laser_fire_at.is_some_and(|t| now >= t))
            .map(|k| k.id)
            .collect();
        for id in due {
            Self::fire_laser(world, id, now, kills);
        }
    }

    /// Turn this tick's attack intents into attacks
    pub fn process_attacks(world: &mut World, now: u64, kills: &mut Vec<Kill>) {
        let ids: Vec<PlayerId> = world.knights.keys().copied().collect();
        for id in ids {
            let Some(knight) = world.knights.get_mut(&id) else {
                continue;
            };
            let pressed = std::mem::take(&mut knight.intent.attack_pressed);
            let released = std::mem::take(&mut knight.intent.attack_released);
            let held = knight.intent.attack_held;
            if !knight.is_alive {
                continue;
            }
            if knight.shield_active {
                knight.charge_started_at = None;
                continue;
            }

            let ready = now >= knight.cooldown_until && knight.weapon.has_ammo();
            let kind = knight.weapon.kind;
            match kind.attack_shape() {
                AttackShape::Instant => {
                    if pressed && ready {
                        Self::fire_instant(world, id, now, kills);
                    }
                }
                AttackShape::Automatic => {
                    if (pressed || held) && ready {
                        Self::fire_instant(world, id, now, kills);
                    }
                }
                AttackShape::ChargeRelease => {
                    if pressed && ready && knight.charge_started_at.is_none() {
                        knight.charge_started_at = Some(now);
                    }
                    if released {
                        if let Some(started) = knight.charge_started_at.take() {
                            Self::fire_charged(world, id, now, now.saturating_sub(started));
                        }
                    }
                }
                AttackShape::Channel => {
                    if pressed && ready && knight.laser_fire_at.is_none() {
                        if let WeaponParams::Laser(p) = kind.params() {
                            knight.laser_fire_at = Some(now + p.channel_ms);
                            knight.cooldown_until = now + kind.cooldown_ms();
                        }
                    }
                }
                AttackShape::Passive => {}
            }
        }
    }

    /// Spend one round and start the cooldown
    fn spend_ammo(world: &mut World, id: PlayerId, now: u64) {
        if let Some(knight) = world.knights.get_mut(&id) {
            knight.cooldown_until = now + knight.weapon.kind.cooldown_ms();
        }
        Self::consume_round(world, id);
    }

    /// An emptied weapon reverts to the sword at once
    fn consume_round(world: &mut World, id: PlayerId) {
        if let Some(knight) = world.knights.get_mut(&id) {
            if knight.weapon.consume() {
                knight.equip(WeaponKind::Sword);
            }
        }
    }

    fn muzzle(world: &World, id: PlayerId) -> Option<(f32, f32, f32)> {
        world.knights.get(&id).map(|k| {
            let offset = KNIGHT_RADIUS + PROJECTILE_RADIUS;
            (k.x + k.angle.cos() * offset, k.y + k.angle.sin() * offset, k.angle)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn launch(
        world: &mut World,
        owner: PlayerId,
        kind: WeaponKind,
        x: f32,
        y: f32,
        angle: f32,
        speed: f32,
        max_range: f32,
        fuse_at: Option<u64>,
    ) {
        let id = world.next_id();
        world.projectiles.push(Projectile {
            id,
            owner_id: owner,
            kind,
            x,
            y,
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
            travelled: 0.0,
            max_range,
            fuse_at,
        });
    }

    fn fire_instant(world: &mut World, id: PlayerId, now: u64, kills: &mut Vec<Kill>) {
        let Some((mx, my, angle)) = Self::muzzle(world, id) else {
            return;
        };
        let Some(kind) = world.knights.get(&id).map(|k| k.weapon.kind) else {
            return;
        };

        match kind.params() {
            WeaponParams::Sword(p) => {
                let slash_id = world.next_id();
                world.slashes.push(SwordSlash {
                    id: slash_id,
                    owner_id: id,
                    angle,
                    arc: p.arc,
                    range: p.range,
                    started_at: now,
                    ends_at: now + p.slash_duration_ms,
                    hit_knights: Vec::new(),
                    hit_walls: Vec::new(),
                });
                if let Some(knight) = world.knights.get_mut(&id) {
                    knight.parry_until = now + p.parry_window_ms;
                    knight.parry_angle = angle;
                }
                // Resolve the opening frame of the swing straight away
                let index = world.slashes.len() - 1;
                Self::sweep_slash(world, index, now, kills);
            }
            WeaponParams::Shotgun(p) => {
                for _ in 0..p.pellets {
                    let jitter = world.rng.gen_range(-p.spread / 2.0..=p.spread / 2.0);
                    Self::launch(world, id, kind, mx, my, angle + jitter, p.speed, p.range, None);
                }
                let walls = &world.terrain.walls;
                let (w, h) = (world.width, world.height);
                if let Some(knight) = world.knights.get_mut(&id) {
                    knight.move_by(-angle.cos() * p.recoil, -angle.sin() * p.recoil, walls, w, h);
                }
            }
            WeaponParams::Minigun(p) => {
                let jitter = world.rng.gen_range(-p.spread / 2.0..=p.spread / 2.0);
                Self::launch(world, id, kind, mx, my, angle + jitter, p.speed, p.range, None);
            }
            WeaponParams::Mine(p) => {
                let Some((kx, ky)) = world.knights.get(&id).map(|k| (k.x, k.y)) else {
                    return;
                };
                let (mut px, mut py) = (kx + angle.cos() * p.place_offset, ky + angle.sin() * p.place_offset);
                if !world.in_bounds(px, py) || world.terrain.wall_at(px, py).is_some() {
                    px = kx;
                    py = ky;
                }
                let mine_id = world.next_id();
                world.mines.push(Mine {
                    id: mine_id,
                    owner_id: id,
                    x: px,
                    y: py,
                    placed_at: now,
                    armed_at: now + p.arm_ms,
                    explode_at: None,
                    owner_clear: false,
                });
            }
            WeaponParams::Bow(_)
            | WeaponParams::Grenade(_)
            | WeaponParams::Laser(_)
            | WeaponParams::Shield => return,
        }
        Self::spend_ammo(world, id, now);
    }

    fn fire_charged(world: &mut World, id: PlayerId, now: u64, held_ms: u64) {
        let Some((mx, my, angle)) = Self::muzzle(world, id) else {
            return;
        };
        let Some(kind) = world.knights.get(&id).map(|k| k.weapon.kind) else {
            return;
        };
        let (params, fuse_at): (ChargeParams, Option<u64>) = match kind.params() {
            WeaponParams::Bow(p) => (p, None),
            WeaponParams::Grenade(p) => (p.throw, Some(now + p.fuse_ms)),
            _ => return,
        };
        let speed = params.release_speed(held_ms);
        Self::launch(world, id, kind, mx, my, angle, speed, params.range, fuse_at);
        Self::spend_ammo(world, id, now);
    }

    /// Ray-march a laser from the knight and resolve the first thing it meets
    fn fire_laser(world: &mut World, id: PlayerId, now: u64, kills: &mut Vec<Kill>) {
        let Some((x, y, angle, kind)) = world.knights.get_mut(&id).map(|k| {
            k.laser_fire_at = None;
            (k.x, k.y, k.angle, k.weapon.kind)
        }) else {
            return;
        };
        let WeaponParams::Laser(p) = kind.params() else {
            return;
        };

        let (dx, dy) = (angle.cos(), angle.sin());
        let mut travelled = KNIGHT_RADIUS;
        let (mut end_x, mut end_y) = (x + dx * travelled, y + dy * travelled);

        while travelled <= p.max_distance {
            let px = x + dx * travelled;
            let py = y + dy * travelled;
            end_x = px;
            end_y = py;
            if !world.in_bounds(px, py) {
                break;
            }
            if let Some(wall_id) = world.terrain.wall_at(px, py) {
                world
                    .terrain
                    .damage_wall(wall_id, LASER_WALL_DAMAGE, now, &mut world.rng);
                break;
            }
            let target = world
                .living()
                .find(|k| {
                    k.id != id
                        && world.can_damage(id, k.id)
                        && distance_sq(px, py, k.x, k.y) <= KNIGHT_RADIUS * KNIGHT_RADIUS
                })
                .map(|k| k.id);
            if let Some(target) = target {
                if Self::strike(world, target, id, now, Some((x, y))) == Strike::Killed {
                    Self::record(kills, target, id, WeaponKind::Laser);
                }
                break;
            }
            travelled += p.step;
        }

        world.beams.push(LaserBeam {
            owner_id: id,
            x1: x,
            y1: y,
            x2: end_x,
            y2: end_y,
            created_at: now,
        });
        // Cooldown was stamped when the channel started
        Self::consume_round(world, id);
    }

    /// Resolve live sword swings against knights and walls
    pub fn update_slashes(world: &mut World, now: u64, kills: &mut Vec<Kill>) {
        world.slashes.retain(|s| now < s.ends_at);
        for index in 0..world.slashes.len() {
            Self::sweep_slash(world, index, now, kills);
        }
    }

    fn sweep_slash(world: &mut World, index: usize, now: u64, kills: &mut Vec<Kill>) {
        let Some(slash) = world.slashes.get(index) else {
            return;
        };
        let owner = slash.owner_id;
        let Some((ox, oy)) = world
            .knights
            .get(&owner)
            .filter(|k| k.is_alive)
            .map(|k| (k.x, k.y))
        else {
            return;
        };
        let (angle, half_arc, range) = (slash.angle, slash.arc / 2.0, slash.range);
        let in_arc = |px: f32, py: f32| angle_diff(angle, angle_to(ox, oy, px, py)).abs() <= half_arc;

        let victims: Vec<PlayerId> = world
            .living()
            .filter(|k| k.id != owner && !slash.hit_knights.contains(&k.id))
            .filter(|k| distance(ox, oy, k.x, k.y) <= range + KNIGHT_RADIUS && in_arc(k.x, k.y))
            .map(|k| k.id)
            .collect();
        let walls: Vec<u32> = world
            .terrain
            .walls
            .iter()
            .filter(|w| w.is_destructible() && !slash.hit_walls.contains(&w.id))
            .filter(|w| {
                let (cx, cy) = w.rect.center();
                w.rect.intersects_circle(ox, oy, range) && in_arc(cx, cy)
            })
            .map(|w| w.id)
            .collect();

        for &victim in &victims {
            if Self::strike(world, victim, owner, now, None) == Strike::Killed {
                Self::record(kills, victim, owner, WeaponKind::Sword);
            }
        }
        for &wall_id in &walls {
            world
                .terrain
                .damage_wall(wall_id, SLASH_WALL_DAMAGE, now, &mut world.rng);
        }

        if let Some(slash) = world.slashes.get_mut(index) {
            slash.hit_knights.extend(victims);
            slash.hit_walls.extend(walls);
        }
    }

    /// Move projectiles and resolve their first collision
    pub fn update_projectiles(world: &mut World, now: u64, dt_ms: u64, kills: &mut Vec<Kill>) {
        let dt = dt_ms as f32 / 1000.0;
        let mut detonations: Vec<(f32, f32, PlayerId)> = Vec::new();
        let mut survivors = Vec::with_capacity(world.projectiles.len());
        let in_flight = std::mem::take(&mut world.projectiles);

        'projectiles: for mut p in in_flight {
            let is_grenade = p.kind == WeaponKind::Grenade;
            if p.fuse_at.is_some_and(|t| now >= t) {
                detonations.push((p.x, p.y, p.owner_id));
                continue;
            }

            let step_len = p.speed() * dt;
            let steps = (step_len / SUBSTEP).ceil().max(1.0) as usize;
            let (sx, sy) = (p.vx * dt / steps as f32, p.vy * dt / steps as f32);

            for _ in 0..steps {
                if step_len <= 0.0 {
                    break;
                }
                p.x += sx;
                p.y += sy;
                p.travelled += step_len / steps as f32;

                if !world.in_bounds(p.x, p.y) {
                    continue 'projectiles;
                }
                if let Some(wall_id) = world.terrain.wall_at(p.x, p.y) {
                    if is_grenade {
                        detonations.push((p.x - sx, p.y - sy, p.owner_id));
                    } else {
                        world
                            .terrain
                            .damage_wall(wall_id, PROJECTILE_WALL_DAMAGE, now, &mut world.rng);
                    }
                    continue 'projectiles;
                }

                let reach = KNIGHT_RADIUS + PROJECTILE_RADIUS;
                let target = world
                    .living()
                    .find(|k| {
                        k.id != p.owner_id
                            && world.can_damage(p.owner_id, k.id)
                            && distance_sq(p.x, p.y, k.x, k.y) <= reach * reach
                    })
                    .map(|k| k.id);
                if let Some(target) = target {
                    if is_grenade {
                        detonations.push((p.x, p.y, p.owner_id));
                    } else if Self::strike(world, target, p.owner_id, now, Some((p.x, p.y)))
                        == Strike::Killed
                    {
                        Self::record(kills, target, p.owner_id, p.kind);
                    }
                    continue 'projectiles;
                }

                if p.travelled >= p.max_range {
                    if is_grenade {
                        // Grenades land and wait for their fuse
                        p.vx = 0.0;
                        p.vy = 0.0;
                        break;
                    }
                    continue 'projectiles;
                }
            }
            survivors.push(p);
        }

        // Anything launched during resolution stays in flight
        survivors.append(&mut world.projectiles);
        world.projectiles = survivors;

        let blast = match WeaponKind::Grenade.params() {
            WeaponParams::Grenade(p) => p.blast_radius,
            _ => 0.0,
        };
        for (x, y, owner) in detonations {
            Self::explode(world, x, y, blast, owner, WeaponKind::Grenade, now, kills);
        }
    }

    /// Arm, trigger and detonate mines
    pub fn update_mines(world: &mut World, now: u64, kills: &mut Vec<Kill>) {
        let WeaponParams::Mine(params) = WeaponKind::Mine.params() else {
            return;
        };
        let trigger_sq = params.trigger_radius * params.trigger_radius;
        let mut detonations = Vec::new();
        let mut remaining = Vec::with_capacity(world.mines.len());

        for mut mine in std::mem::take(&mut world.mines) {
            if !mine.owner_clear {
                mine.owner_clear = world
                    .knights
                    .get(&mine.owner_id)
                    .map_or(true, |k| distance_sq(mine.x, mine.y, k.x, k.y) > trigger_sq);
            }
            if mine.is_armed(now) && mine.explode_at.is_none() {
                let stepped_on = world
                    .living()
                    .filter(|k| mine.owner_clear || k.id != mine.owner_id)
                    .any(|k| distance_sq(mine.x, mine.y, k.x, k.y) <= trigger_sq);
                if stepped_on {
                    mine.explode_at = Some(now + params.fuse_ms);
                }
            }
            if mine.explode_at.is_some_and(|t| now >= t) {
                detonations.push((mine.x, mine.y, mine.owner_id));
            } else {
                remaining.push(mine);
            }
        }
        world.mines = remaining;

        for (x, y, owner) in detonations {
            Self::explode(world, x, y, params.blast_radius, owner, WeaponKind::Mine, now, kills);
        }
    }

    /// Blast damage to every knight and wall in radius. The owner can die
    /// to their own blast but is never credited for it.
    #[allow(clippy::too_many_arguments)]
    pub fn explode(
        world: &mut World,
        x: f32,
        y: f32,
        radius: f32,
        owner: PlayerId,
        cause: WeaponKind,
        now: u64,
        kills: &mut Vec<Kill>,
    ) {
        let id = world.next_id();
        world.explosions.push(Explosion {
            id,
            owner_id: owner,
            x,
            y,
            radius,
            created_at: now,
        });

        let reach = radius + KNIGHT_RADIUS;
        let victims: Vec<PlayerId> = world
            .living()
            .filter(|k| distance_sq(x, y, k.x, k.y) <= reach * reach)
            .map(|k| k.id)
            .collect();
        for victim in victims {
            if Self::strike(world, victim, owner, now, None) == Strike::Killed {
                Self::record(kills, victim, owner, cause);
            }
        }

        let walls: Vec<u32> = world
            .terrain
            .walls
            .iter()
            .filter(|w| w.rect.intersects_circle(x, y, radius))
            .map(|w| w.id)
            .collect();
        for wall_id in walls {
            world
                .terrain
                .damage_wall(wall_id, EXPLOSION_WALL_DAMAGE, now, &mut world.rng);
        }
    }

    /// Drop visual records that have run their course
    pub fn expire_effects(world: &mut World, now: u64) {
        world
            .beams
            .retain(|b| now.saturating_sub(b.created_at) < BEAM_VISIBLE_MS);
        world
            .explosions
            .retain(|e| now.saturating_sub(e.created_at) < EXPLOSION_VISIBLE_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::Rect;
    use crate::game::terrain::{Terrain, Wall};
    use crate::game::weapon::Weapon;
    use crate::game::world::test_support::{add_knight, open_world};

    fn press(world: &mut World, id: PlayerId, angle: f32) {
        let k = world.knights.get_mut(&id).expect("knight");
        k.angle = angle;
        k.set_intent(0.0, 0.0, angle, true, false, false);
    }

    fn release(world: &mut World, id: PlayerId, angle: f32) {
        let k = world.knights.get_mut(&id).expect("knight");
        k.set_intent(0.0, 0.0, angle, false, false, false);
    }

    fn run_projectiles(world: &mut World, from: u64, ticks: u64, kills: &mut Vec<Kill>) -> u64 {
        let mut now = from;
        for _ in 0..ticks {
            now += 33;
            CombatSystem::update_projectiles(world, now, 33, kills);
        }
        now
    }

    #[test]
    fn sword_kills_in_arc_only() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0);
        add_knight(&mut w, 2, 140.0, 100.0);
        add_knight(&mut w, 3, 60.0, 100.0);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);

        assert_eq!(kills, vec![Kill { victim: 2, killer: Some(1), cause: WeaponKind::Sword }]);
        assert!(w.knights[&3].is_alive);
        assert!(w.knights[&1].is_parrying(1_100));
    }

    #[test]
    fn sword_damages_each_wall_once_per_swing() {
        let mut w = open_world();
        w.terrain = Terrain::new(vec![Wall::destructible(7, 2, 3, Rect::new(120.0, 80.0, 40.0, 40.0))]);
        add_knight(&mut w, 1, 100.0, 100.0);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);
        CombatSystem::update_slashes(&mut w, 1_033, &mut kills);
        CombatSystem::update_slashes(&mut w, 1_066, &mut kills);
        assert_eq!(w.terrain.walls[0].hp, Some(2));
    }

    #[test]
    fn invulnerable_and_shielded_knights_survive() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0);
        add_knight(&mut w, 2, 140.0, 100.0).invulnerable_until = 5_000;
        assert_eq!(CombatSystem::strike(&mut w, 2, 1, 1_000, None), Strike::Invulnerable);

        let k = w.knights.get_mut(&2).expect("knight");
        k.invulnerable_until = 0;
        k.equip(WeaponKind::Shield);
        k.shield_active = true;
        assert_eq!(CombatSystem::strike(&mut w, 2, 1, 1_000, None), Strike::Shielded);
        assert!(w.knights[&2].is_alive);
    }

    #[test]
    fn parry_negates_projectile_from_the_front() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0);
        add_knight(&mut w, 2, 300.0, 100.0);
        let defender = w.knights.get_mut(&2).expect("knight");
        defender.parry_until = 2_000;
        defender.parry_angle = std::f32::consts::PI;

        // Arrow coming from the left, the side the defender faces
        assert_eq!(CombatSystem::strike(&mut w, 2, 1, 1_000, Some((280.0, 100.0))), Strike::Parried);
        // From behind the parry does nothing
        assert_eq!(CombatSystem::strike(&mut w, 2, 1, 1_000, Some((320.0, 100.0))), Strike::Killed);
    }

    #[test]
    fn bow_release_speed_scales_with_charge() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Bow);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);
        assert_eq!(w.knights[&1].charge_started_at, Some(1_000));
        assert!(w.projectiles.is_empty());

        release(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_500, &mut kills);
        let WeaponParams::Bow(bow) = WeaponKind::Bow.params() else {
            panic!("bow");
        };
        assert_eq!(w.projectiles.len(), 1);
        assert!((w.projectiles[0].speed() - bow.release_speed(500)).abs() < 0.5);
        assert_eq!(w.knights[&1].weapon.ammo_count(), Some(bow.ammo - 1));
    }

    #[test]
    fn arrow_kills_first_knight_in_path() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Bow);
        add_knight(&mut w, 2, 300.0, 100.0);
        add_knight(&mut w, 3, 400.0, 100.0);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        release(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);
        run_projectiles(&mut w, 1_000, 20, &mut kills);

        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].victim, 2);
        assert!(w.knights[&3].is_alive);
        assert!(w.projectiles.is_empty());
    }

    #[test]
    fn projectile_chips_wall_and_stops() {
        let mut w = open_world();
        w.terrain = Terrain::new(vec![Wall::destructible(5, 2, 5, Rect::new(200.0, 80.0, 40.0, 40.0))]);
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Minigun);
        add_knight(&mut w, 2, 400.0, 100.0);
        let mut kills = Vec::new();
        let k = w.knights.get_mut(&1).expect("knight");
        k.angle = 0.0;
        k.set_intent(0.0, 0.0, 0.0, true, false, false);
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        run_projectiles(&mut w, 0, 10, &mut kills);
        assert_eq!(w.terrain.walls[0].hp, Some(2));
        assert!(kills.is_empty());
    }

    #[test]
    fn minigun_keeps_firing_while_held() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Minigun);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        let mut now = 0;
        for _ in 0..10 {
            CombatSystem::process_attacks(&mut w, now, &mut kills);
            now += 100;
        }
        assert_eq!(w.projectiles.len(), 10);
    }

    #[test]
    fn shotgun_fires_pellets_and_recoils() {
        let mut w = open_world();
        add_knight(&mut w, 1, 400.0, 300.0).equip(WeaponKind::Shotgun);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        let WeaponParams::Shotgun(p) = WeaponKind::Shotgun.params() else {
            panic!("shotgun");
        };
        assert_eq!(w.projectiles.len(), p.pellets as usize);
        assert!((w.knights[&1].x - (400.0 - p.recoil)).abs() < 0.01);
    }

    #[test]
    fn depleted_weapon_reverts_to_sword_immediately() {
        let mut w = open_world();
        let k = add_knight(&mut w, 1, 100.0, 100.0);
        k.weapon = Weapon::new(WeaponKind::Shotgun);
        k.weapon.ammo = crate::game::weapon::Ammo::Limited(1);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        assert_eq!(w.knights[&1].weapon.kind, WeaponKind::Sword);
    }

    #[test]
    fn laser_fires_after_channel_and_not_if_dead() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Laser);
        add_knight(&mut w, 2, 600.0, 100.0);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);
        let fire_at = w.knights[&1].laser_fire_at.expect("channeling");

        CombatSystem::resolve_channels(&mut w, fire_at - 1, &mut kills);
        assert!(w.beams.is_empty());
        CombatSystem::resolve_channels(&mut w, fire_at, &mut kills);
        assert_eq!(w.beams.len(), 1);
        assert_eq!(kills.len(), 1);
        assert!(!w.knights[&2].is_alive);

        // Second shot: the shooter dies while channeling
        let k = w.knights.get_mut(&1).expect("knight");
        k.cooldown_until = 0;
        k.set_intent(0.0, 0.0, 0.0, false, false, false);
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 5_000, &mut kills);
        w.knights.get_mut(&1).expect("knight").die();
        CombatSystem::resolve_channels(&mut w, 10_000, &mut kills);
        assert_eq!(w.beams.len(), 1);
    }

    #[test]
    fn laser_cooldown_starts_when_the_channel_starts() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Laser);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000, &mut kills);
        let WeaponParams::Laser(p) = WeaponKind::Laser.params() else {
            panic!("laser");
        };
        let cooldown = WeaponKind::Laser.cooldown_ms();
        assert_eq!(w.knights[&1].laser_fire_at, Some(1_000 + p.channel_ms));
        assert_eq!(w.knights[&1].cooldown_until, 1_000 + cooldown);

        // Resolving the beam spends ammo but leaves the cooldown alone
        let ammo = w.knights[&1].weapon.ammo_count();
        CombatSystem::resolve_channels(&mut w, 1_000 + p.channel_ms, &mut kills);
        assert_eq!(w.knights[&1].cooldown_until, 1_000 + cooldown);
        assert_eq!(w.knights[&1].weapon.ammo_count(), ammo.map(|n| n - 1));

        release(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000 + cooldown - 1, &mut kills);
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000 + cooldown - 1, &mut kills);
        assert!(w.knights[&1].laser_fire_at.is_none());
        release(&mut w, 1, 0.0);
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 1_000 + cooldown, &mut kills);
        assert!(w.knights[&1].laser_fire_at.is_some());
    }

    #[test]
    fn laser_stops_at_wall() {
        let mut w = open_world();
        w.terrain = Terrain::new(vec![Wall::indestructible(1, 0, 0, Rect::new(200.0, 0.0, 40.0, 600.0))]);
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Laser);
        add_knight(&mut w, 2, 400.0, 100.0);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        CombatSystem::resolve_channels(&mut w, 10_000, &mut kills);
        assert!(kills.is_empty());
        assert!(w.beams[0].x2 <= 205.0);
    }

    #[test]
    fn mine_ignores_owner_until_they_step_away() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Mine);
        add_knight(&mut w, 2, 600.0, 500.0);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        assert_eq!(w.mines.len(), 1);
        let WeaponParams::Mine(p) = WeaponKind::Mine.params() else {
            panic!("mine");
        };

        // Owner never moves off the mine it just placed
        CombatSystem::update_mines(&mut w, p.arm_ms, &mut kills);
        CombatSystem::update_mines(&mut w, p.arm_ms + p.fuse_ms, &mut kills);
        assert!(w.mines[0].explode_at.is_none());
        assert!(kills.is_empty());

        w.knights.get_mut(&1).expect("knight").x = 300.0;
        CombatSystem::update_mines(&mut w, 2_000, &mut kills);
        assert!(w.mines[0].owner_clear);
        assert!(w.mines[0].explode_at.is_none());

        // Walking back onto it sets it off
        w.knights.get_mut(&1).expect("knight").x = 120.0;
        CombatSystem::update_mines(&mut w, 2_100, &mut kills);
        assert_eq!(w.mines[0].explode_at, Some(2_100 + p.fuse_ms));
        CombatSystem::update_mines(&mut w, 2_100 + p.fuse_ms, &mut kills);

        assert!(w.mines.is_empty());
        assert_eq!(w.explosions.len(), 1);
        assert_eq!(kills, vec![Kill { victim: 1, killer: None, cause: WeaponKind::Mine }]);
    }

    #[test]
    fn armed_mine_triggers_on_enemy() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0).equip(WeaponKind::Mine);
        add_knight(&mut w, 2, 600.0, 500.0);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        let WeaponParams::Mine(p) = WeaponKind::Mine.params() else {
            panic!("mine");
        };
        let (mx, my) = (w.mines[0].x, w.mines[0].y);
        w.knights.get_mut(&1).expect("knight").x = 400.0;

        // Not armed yet: an enemy on top does nothing
        let enemy = w.knights.get_mut(&2).expect("knight");
        enemy.x = mx;
        enemy.y = my;
        CombatSystem::update_mines(&mut w, p.arm_ms - 1, &mut kills);
        assert!(w.mines[0].explode_at.is_none());

        CombatSystem::update_mines(&mut w, p.arm_ms, &mut kills);
        CombatSystem::update_mines(&mut w, p.arm_ms + p.fuse_ms, &mut kills);
        assert_eq!(kills, vec![Kill { victim: 2, killer: Some(1), cause: WeaponKind::Mine }]);
    }

    #[test]
    fn grenade_lands_then_explodes_on_fuse() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 300.0).equip(WeaponKind::Grenade);
        add_knight(&mut w, 2, 380.0, 520.0);
        let mut kills = Vec::new();
        press(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        release(&mut w, 1, 0.0);
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        assert!(w.projectiles[0].fuse_at.is_some());

        let now = run_projectiles(&mut w, 0, 60, &mut kills);
        assert!(now > 1_400);
        assert!(w.projectiles.is_empty());
        assert_eq!(w.explosions.len(), 1);
        // Nobody stands inside the blast
        assert!(kills.is_empty());
    }

    #[test]
    fn teammates_are_spared_without_friendly_fire() {
        let mut w = open_world();
        w.rules.team_mode = true;
        add_knight(&mut w, 1, 100.0, 100.0).team_id = Some(1);
        add_knight(&mut w, 2, 140.0, 100.0).team_id = Some(1);
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        assert!(kills.is_empty());
        assert!(w.knights[&2].is_alive);
    }

    #[test]
    fn shield_blocks_attack_input() {
        let mut w = open_world();
        let k = add_knight(&mut w, 1, 100.0, 100.0);
        k.equip(WeaponKind::Bow);
        k.equip(WeaponKind::Shield);
        k.shield_active = true;
        press(&mut w, 1, 0.0);
        let mut kills = Vec::new();
        CombatSystem::process_attacks(&mut w, 0, &mut kills);
        assert!(w.knights[&1].charge_started_at.is_none());
    }
}
