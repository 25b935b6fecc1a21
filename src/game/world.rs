//! Entity container shared by the per-tick systems of one room

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::combat::{Explosion, LaserBeam, Mine, Projectile, SwordSlash};
use super::geometry::distance_sq;
use super::knight::{Knight, PlayerId};
use super::map::MapLayout;
use super::powerup::Powerup;
use super::terrain::Terrain;

/// Room-wide rules the combat systems consult on every hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatRules {
    pub team_mode: bool,
    pub friendly_fire: bool,
    pub speed_pct: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            team_mode: false,
            friendly_fire: false,
            speed_pct: 100,
        }
    }
}

pub struct World {
    pub width: f32,
    pub height: f32,
    /// Keyed by id; ids are allocated in join order so iteration is join order
    pub knights: BTreeMap<PlayerId, Knight>,
    pub terrain: Terrain,
    pub projectiles: Vec<Projectile>,
    pub slashes: Vec<SwordSlash>,
    pub beams: Vec<LaserBeam>,
    pub mines: Vec<Mine>,
    pub explosions: Vec<Explosion>,
    pub powerups: Vec<Powerup>,
    pub powerup_spots: Vec<(f32, f32)>,
    pub spawn_points: Vec<(f32, f32)>,
    pub rules: CombatRules,
    pub rng: ChaCha8Rng,
    next_entity_id: u64,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            knights: BTreeMap::new(),
            terrain: Terrain::default(),
            projectiles: Vec::new(),
            slashes: Vec::new(),
            beams: Vec::new(),
            mines: Vec::new(),
            explosions: Vec::new(),
            powerups: Vec::new(),
            powerup_spots: Vec::new(),
            spawn_points: Vec::new(),
            rules: CombatRules::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_entity_id: 1,
        }
    }

    /// Fresh id for projectiles, slashes, mines and powerups
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Install a freshly decoded map and drop every transient entity
    pub fn load_layout(&mut self, layout: MapLayout) {
        self.width = layout.width;
        self.height = layout.height;
        self.terrain = Terrain::new(layout.walls);
        self.powerup_spots = layout.powerup_spots;
        self.spawn_points = layout.spawn_points;
        self.clear_transients();
        self.powerups.clear();
    }

    pub fn clear_transients(&mut self) {
        self.projectiles.clear();
        self.slashes.clear();
        self.beams.clear();
        self.mines.clear();
        self.explosions.clear();
    }

    pub fn in_bounds(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.width && y <= self.height
    }

    pub fn living(&self) -> impl Iterator<Item = &Knight> + Clone {
        self.knights.values().filter(|k| k.is_alive)
    }

    pub fn living_positions(&self) -> Vec<(f32, f32)> {
        self.living().map(|k| (k.x, k.y)).collect()
    }

    pub fn mine_positions(&self) -> Vec<(f32, f32)> {
        self.mines.iter().map(|m| (m.x, m.y)).collect()
    }

    /// Whether two knights are on the same team in team mode
    pub fn are_allies(&self, a: PlayerId, b: PlayerId) -> bool {
        if !self.rules.team_mode || a == b {
            return false;
        }
        match (
            self.knights.get(&a).and_then(|k| k.team_id),
            self.knights.get(&b).and_then(|k| k.team_id),
        ) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        }
    }

    /// Whether an attack from `attacker` can affect `target` at all
    pub fn can_damage(&self, attacker: PlayerId, target: PlayerId) -> bool {
        self.rules.friendly_fire || !self.are_allies(attacker, target)
    }

    /// Nearest living knight to a point that `attacker` could damage
    pub fn nearest_enemy_of(&self, attacker: PlayerId, x: f32, y: f32) -> Option<&Knight> {
        self.living()
            .filter(|k| k.id != attacker && self.can_damage(attacker, k.id))
            .min_by(|a, b| {
                distance_sq(x, y, a.x, a.y).total_cmp(&distance_sq(x, y, b.x, b.y))
            })
    }

    /// Drop everything a departed knight would still cause
    pub fn remove_owned_by(&mut self, owner: PlayerId) {
        self.projectiles.retain(|p| p.owner_id != owner);
        self.slashes.retain(|s| s.owner_id != owner);
        self.mines.retain(|m| m.owner_id != owner);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn allies_only_in_team_mode() {
        let mut w = open_world();
        add_knight(&mut w, 1, 0.0, 0.0).team_id = Some(1);
        add_knight(&mut w, 2, 0.0, 0.0).team_id = Some(1);
        add_knight(&mut w, 3, 0.0, 0.0).team_id = Some(2);
        assert!(!w.are_allies(1, 2));

        w.rules.team_mode = true;
        assert!(w.are_allies(1, 2));
        assert!(!w.are_allies(1, 3));
        assert!(!w.can_damage(1, 2));

        w.rules.friendly_fire = true;
        assert!(w.can_damage(1, 2));
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut w = World::new(1);
        let a = w.next_id();
        let b = w.next_id();
        assert!(b > a);
    }

    #[test]
    fn nearest_enemy_skips_self_and_dead() {
        let mut w = open_world();
        add_knight(&mut w, 1, 100.0, 100.0);
        add_knight(&mut w, 2, 110.0, 100.0).is_alive = false;
        add_knight(&mut w, 3, 300.0, 100.0);
        assert_eq!(w.nearest_enemy_of(1, 100.0, 100.0).map(|k| k.id), Some(3));
    }
}
