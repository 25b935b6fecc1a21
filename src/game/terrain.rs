//! Destructible terrain: wall damage, timed respawn with preview and
//! proximity deferral

use rand::Rng;

use super::geometry::{distance_sq, Rect};

pub const DESTRUCTIBLE_WALL_HP: i32 = 3;
/// Respawn delay is drawn uniformly from [MIN, MAX)
pub const RESPAWN_MIN_MS: u64 = 10_000;
pub const RESPAWN_MAX_MS: u64 = 15_000;
/// How long before respawn the wall starts blinking on clients
pub const PREVIEW_WINDOW_MS: u64 = 3_000;
pub const BLINK_INTERVAL_MS: u64 = 250;
/// Living knights closer than this to the wall centre hold the respawn back
pub const RESPAWN_PROXIMITY_RADIUS: f32 = 70.0;
/// The footprint must stay clear this long before the wall returns
pub const PROXIMITY_CLEAR_MS: u64 = 1_500;
const MINE_FOOTPRINT_RADIUS: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub rect: Rect,
    /// `None` for indestructible walls
    pub hp: Option<i32>,
}

impl Wall {
    pub fn destructible(id: u32, row: usize, col: usize, rect: Rect) -> Self {
        Self {
            id,
            row,
            col,
            rect,
            hp: Some(DESTRUCTIBLE_WALL_HP),
        }
    }

    pub fn indestructible(id: u32, row: usize, col: usize, rect: Rect) -> Self {
        Self {
            id,
            row,
            col,
            rect,
            hp: None,
        }
    }

    pub fn is_destructible(&self) -> bool {
        self.hp.is_some()
    }
}

/// A destructible wall waiting to come back
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyedWall {
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub rect: Rect,
    pub destroyed_at: u64,
    pub respawn_at: u64,
    pub preview_at: u64,
    pub last_nearby_at: Option<u64>,
}

impl DestroyedWall {
    pub fn in_preview(&self, now: u64) -> bool {
        now >= self.preview_at
    }

    /// Blink phase during the preview window
    pub fn preview_visible(&self, now: u64) -> bool {
        self.in_preview(now) && ((now - self.preview_at) / BLINK_INTERVAL_MS) % 2 == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Terrain {
    pub walls: Vec<Wall>,
    pub destroyed: Vec<DestroyedWall>,
}

impl Terrain {
    pub fn new(walls: Vec<Wall>) -> Self {
        Self {
            walls,
            destroyed: Vec::new(),
        }
    }

    pub fn rects(&self) -> impl Iterator<Item = &Rect> + Clone {
        self.walls.iter().map(|w| &w.rect)
    }

    /// Id of the standing wall containing the point, if any
    pub fn wall_at(&self, x: f32, y: f32) -> Option<u32> {
        self.walls
            .iter()
            .find(|w| w.rect.contains_point(x, y))
            .map(|w| w.id)
    }

    /// Apply damage to a wall. Returns true if it was destroyed by this hit.
    /// Indestructible or unknown walls are ignored.
    pub fn damage_wall<R: Rng>(&mut self, wall_id: u32, amount: i32, now: u64, rng: &mut R) -> bool {
        let Some(index) = self.walls.iter().position(|w| w.id == wall_id) else {
            return false;
        };
        let Some(hp) = self.walls[index].hp.as_mut() else {
            return false;
        };
        *hp -= amount;
        if *hp > 0 {
            return false;
        }

        let wall = self.walls.remove(index);
        let respawn_at = now + rng.gen_range(RESPAWN_MIN_MS..RESPAWN_MAX_MS);
        self.destroyed.push(DestroyedWall {
            id: wall.id,
            row: wall.row,
            col: wall.col,
            rect: wall.rect,
            destroyed_at: now,
            respawn_at,
            preview_at: respawn_at.saturating_sub(PREVIEW_WINDOW_MS),
            last_nearby_at: None,
        });
        true
    }

    /// Bring back walls whose time has come. A wall in its preview window
    /// waits while a mine sits on its footprint or a living knight is close;
    /// after the area clears it needs a further `PROXIMITY_CLEAR_MS`.
    /// Returns the ids of respawned walls.
    pub fn update_respawns(&mut self, now: u64, living: &[(f32, f32)], mines: &[(f32, f32)]) -> Vec<u32> {
        let mut respawned = Vec::new();
        let mut still_down = Vec::with_capacity(self.destroyed.len());

        for mut pending in self.destroyed.drain(..) {
            if pending.in_preview(now) {
                let mined = mines
                    .iter()
                    .any(|&(mx, my)| pending.rect.overlaps_inflated(mx, my, MINE_FOOTPRINT_RADIUS));
                if mined {
                    still_down.push(pending);
                    continue;
                }

                let (cx, cy) = pending.rect.center();
                let crowded = living.iter().any(|&(kx, ky)| {
                    distance_sq(cx, cy, kx, ky) <= RESPAWN_PROXIMITY_RADIUS * RESPAWN_PROXIMITY_RADIUS
                });
                if crowded {
                    pending.last_nearby_at = Some(now);
                    still_down.push(pending);
                    continue;
                }
            }

            let clear = pending
                .last_nearby_at
                .map_or(true, |t| now.saturating_sub(t) >= PROXIMITY_CLEAR_MS);
            if now >= pending.respawn_at && clear {
                respawned.push(pending.id);
                self.walls
                    .push(Wall::destructible(pending.id, pending.row, pending.col, pending.rect));
            } else {
                still_down.push(pending);
            }
        }

        self.destroyed = still_down;
        respawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn terrain() -> Terrain {
        Terrain::new(vec![
            Wall::destructible(1, 2, 2, Rect::new(80.0, 80.0, 40.0, 40.0)),
            Wall::indestructible(2, 0, 0, Rect::new(0.0, 0.0, 40.0, 40.0)),
        ])
    }

    fn destroy(t: &mut Terrain, now: u64, rng: &mut ChaCha8Rng) {
        for _ in 0..DESTRUCTIBLE_WALL_HP {
            t.damage_wall(1, 1, now, rng);
        }
    }

    #[test]
    fn destroyed_wall_respawn_window() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for seed_time in [0u64, 5_000, 123_456] {
            let mut t = terrain();
            destroy(&mut t, seed_time, &mut rng);
            assert!(t.walls.iter().all(|w| w.id != 1));
            let d = &t.destroyed[0];
            assert!(d.respawn_at >= seed_time + RESPAWN_MIN_MS);
            assert!(d.respawn_at < seed_time + RESPAWN_MAX_MS);
            assert_eq!(d.preview_at, d.respawn_at - PREVIEW_WINDOW_MS);
        }
    }

    #[test]
    fn wall_survives_until_hp_exhausted() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut t = terrain();
        assert!(!t.damage_wall(1, 1, 0, &mut rng));
        assert!(!t.damage_wall(1, 1, 0, &mut rng));
        assert!(t.damage_wall(1, 1, 0, &mut rng));
    }

    #[test]
    fn indestructible_walls_ignore_damage() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut t = terrain();
        assert!(!t.damage_wall(2, 100, 0, &mut rng));
        assert_eq!(t.walls.len(), 2);
    }

    #[test]
    fn wall_respawns_once_due_with_nobody_around() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut t = terrain();
        destroy(&mut t, 0, &mut rng);
        let respawn_at = t.destroyed[0].respawn_at;

        assert!(t.update_respawns(respawn_at - 1, &[], &[]).is_empty());
        assert_eq!(t.update_respawns(respawn_at, &[], &[]), vec![1]);
        assert!(t.destroyed.is_empty());
        assert_eq!(t.walls.iter().find(|w| w.id == 1).and_then(|w| w.hp), Some(DESTRUCTIBLE_WALL_HP));
    }

    #[test]
    fn nearby_knight_defers_respawn_until_area_clears() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut t = terrain();
        destroy(&mut t, 0, &mut rng);
        let respawn_at = t.destroyed[0].respawn_at;
        let preview_at = t.destroyed[0].preview_at;
        let standing = [(100.0, 100.0)];

        // Knight camps on the footprint from preview until well past the respawn time
        let leave_at = respawn_at + 4_000;
        let mut now = preview_at;
        while now < leave_at {
            assert!(t.update_respawns(now, &standing, &[]).is_empty());
            now += 33;
        }

        let mut respawned_at = None;
        while respawned_at.is_none() {
            if !t.update_respawns(now, &[], &[]).is_empty() {
                respawned_at = Some(now);
            }
            now += 33;
        }
        let respawned_at = respawned_at.unwrap_or_default();
        assert!(respawned_at >= respawn_at.max(leave_at - 33 + PROXIMITY_CLEAR_MS));
    }

    #[test]
    fn mine_on_footprint_blocks_respawn() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut t = terrain();
        destroy(&mut t, 0, &mut rng);
        let respawn_at = t.destroyed[0].respawn_at;
        assert!(t.update_respawns(respawn_at + 10, &[], &[(95.0, 95.0)]).is_empty());
        assert_eq!(t.update_respawns(respawn_at + 20, &[], &[]), vec![1]);
    }

    #[test]
    fn blink_alternates_during_preview() {
        let d = DestroyedWall {
            id: 1,
            row: 0,
            col: 0,
            rect: Rect::new(0.0, 0.0, 40.0, 40.0),
            destroyed_at: 0,
            respawn_at: 13_000,
            preview_at: 10_000,
            last_nearby_at: None,
        };
        assert!(!d.preview_visible(9_999));
        assert!(d.preview_visible(10_000));
        assert!(!d.preview_visible(10_000 + BLINK_INTERVAL_MS));
        assert!(d.preview_visible(10_000 + 2 * BLINK_INTERVAL_MS));
    }
}
