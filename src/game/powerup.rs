//! Powerup economy: where and what to drop, with scarcity rules

use rand::seq::SliceRandom;
use rand::Rng;

use super::geometry::distance_sq;
use super::knight::Knight;
use super::map::CELL_SIZE;
use super::weapon::{WeaponKind, DROP_TABLE};

/// Spawn interval at 100% spawn rate
pub const BASE_SPAWN_INTERVAL_MS: u64 = 7_000;

/// A pickup lying on the arena floor
#[derive(Debug, Clone, PartialEq)]
pub struct Powerup {
    pub id: u64,
    pub kind: WeaponKind,
    pub x: f32,
    pub y: f32,
    pub spawned_at: u64,
}

impl Powerup {
    pub fn new(id: u64, kind: WeaponKind, x: f32, y: f32, spawned_at: u64) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            spawned_at,
        }
    }
}

/// Interval between spawn attempts for a spawn-rate percentage
pub fn spawn_interval_ms(rate_pct: u32) -> u64 {
    BASE_SPAWN_INTERVAL_MS * 100 / rate_pct.max(1) as u64
}

/// Powerup spots that have no live powerup within half a cell
pub fn free_spots(spots: &[(f32, f32)], existing: &[Powerup]) -> Vec<(f32, f32)> {
    let min_gap = CELL_SIZE / 2.0;
    spots
        .iter()
        .copied()
        .filter(|&(sx, sy)| {
            existing
                .iter()
                .all(|p| distance_sq(sx, sy, p.x, p.y) > min_gap * min_gap)
        })
        .collect()
}

/// Weighted kinds that may drop right now
pub fn eligible_kinds<'a, I>(enabled: &[WeaponKind], knights: I, existing: &[Powerup]) -> Vec<(WeaponKind, u32)>
where
    I: IntoIterator<Item = &'a Knight>,
{
    let mut players = 0usize;
    let mut shielded = 0usize;
    let mut held = Vec::new();
    for knight in knights {
        players += 1;
        if knight.has_shield {
            shielded += 1;
        }
        held.push(knight.weapon.kind);
    }
    let shield_cap = players.div_ceil(2);

    DROP_TABLE
        .iter()
        .copied()
        .filter(|(kind, _)| enabled.contains(kind))
        .filter(|(kind, _)| *kind != WeaponKind::Shield || shielded < shield_cap)
        .filter(|(kind, _)| {
            !kind.is_scarce() || (!held.contains(kind) && existing.iter().all(|p| p.kind != *kind))
        })
        .collect()
}

/// Decides when the next powerup attempt happens
#[derive(Debug, Clone)]
pub struct PowerupSpawner {
    pub next_attempt_at: u64,
}

impl PowerupSpawner {
    pub fn new(now: u64, rate_pct: u32) -> Self {
        Self {
            next_attempt_at: now + spawn_interval_ms(rate_pct),
        }
    }

    /// Attempt a spawn if the interval elapsed. Location and kind are drawn
    /// independently; an empty set on either side skips this attempt.
    #[allow(clippy::too_many_arguments)]
    pub fn update<'a, R, I>(
        &mut self,
        now: u64,
        rate_pct: u32,
        id: u64,
        spots: &[(f32, f32)],
        existing: &[Powerup],
        knights: I,
        enabled: &[WeaponKind],
        rng: &mut R,
    ) -> Option<Powerup>
    where
        R: Rng,
        I: IntoIterator<Item = &'a Knight>,
    {
        if now < self.next_attempt_at {
            return None;
        }
        self.next_attempt_at = now + spawn_interval_ms(rate_pct);

        let spots = free_spots(spots, existing);
        let kinds = eligible_kinds(enabled, knights, existing);
        let &(x, y) = spots.choose(rng)?;
        let &(kind, _) = kinds.choose_weighted(rng, |(_, weight)| *weight).ok()?;
        Some(Powerup::new(id, kind, x, y, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn knights(n: usize, shielded: usize) -> Vec<Knight> {
        (0..n)
            .map(|i| {
                let mut k = Knight::new(i as u64 + 1, format!("k{i}"), "#fff".into(), false);
                if i < shielded {
                    k.equip(WeaponKind::Shield);
                }
                k
            })
            .collect()
    }

    fn all_enabled() -> Vec<WeaponKind> {
        WeaponKind::ALL.to_vec()
    }

    #[test]
    fn shield_spawn_cap_excludes_shield_at_half_the_room() {
        for n in 1..=8usize {
            let cap = n.div_ceil(2);
            let below = eligible_kinds(&all_enabled(), &knights(n, cap - 1), &[]);
            assert!(below.iter().any(|(k, _)| *k == WeaponKind::Shield), "n={n}");
            let at = eligible_kinds(&all_enabled(), &knights(n, cap), &[]);
            assert!(at.iter().all(|(k, _)| *k != WeaponKind::Shield), "n={n}");
        }
    }

    #[test]
    fn scarce_kinds_excluded_while_held_or_on_field() {
        let mut ks = knights(3, 0);
        ks[0].equip(WeaponKind::Laser);
        let on_field = [Powerup::new(9, WeaponKind::Grenade, 0.0, 0.0, 0)];
        let kinds = eligible_kinds(&all_enabled(), &ks, &on_field);
        assert!(kinds.iter().all(|(k, _)| *k != WeaponKind::Laser && *k != WeaponKind::Grenade));
        assert!(kinds.iter().any(|(k, _)| *k == WeaponKind::Minigun));
        // Non-scarce kinds are unaffected by being held
        ks[1].equip(WeaponKind::Bow);
        let kinds = eligible_kinds(&all_enabled(), &ks, &[]);
        assert!(kinds.iter().any(|(k, _)| *k == WeaponKind::Bow));
    }

    #[test]
    fn interval_scales_with_rate() {
        assert_eq!(spawn_interval_ms(100), BASE_SPAWN_INTERVAL_MS);
        assert_eq!(spawn_interval_ms(200), BASE_SPAWN_INTERVAL_MS / 2);
    }

    #[test]
    fn occupied_spots_are_skipped() {
        let spots = [(20.0, 20.0), (220.0, 220.0)];
        let existing = [Powerup::new(1, WeaponKind::Bow, 25.0, 20.0, 0)];
        assert_eq!(free_spots(&spots, &existing), vec![(220.0, 220.0)]);
    }

    #[test]
    fn no_spawn_without_spot_or_kind() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let ks = knights(2, 0);

        let mut spawner = PowerupSpawner::new(0, 100);
        let at = spawner.next_attempt_at;
        assert!(spawner
            .update(at, 100, 1, &[], &[], &ks, &all_enabled(), &mut rng)
            .is_none());

        let mut spawner = PowerupSpawner::new(0, 100);
        let sword_only = [WeaponKind::Sword];
        assert!(spawner
            .update(at, 100, 1, &[(60.0, 60.0)], &[], &ks, &sword_only, &mut rng)
            .is_none());
    }

    #[test]
    fn spawns_enabled_kind_on_free_spot_when_due() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let ks = knights(2, 0);
        let mut spawner = PowerupSpawner::new(1_000, 100);
        let enabled = [WeaponKind::Sword, WeaponKind::Bow];
        assert!(spawner
            .update(1_500, 100, 1, &[(60.0, 60.0)], &[], &ks, &enabled, &mut rng)
            .is_none());
        let due = spawner.next_attempt_at;
        let p = spawner
            .update(due, 100, 1, &[(60.0, 60.0)], &[], &ks, &enabled, &mut rng)
            .expect("powerup spawned");
        assert_eq!(p.kind, WeaponKind::Bow);
        assert_eq!((p.x, p.y), (60.0, 60.0));
        assert_eq!(spawner.next_attempt_at, due + BASE_SPAWN_INTERVAL_MS);
    }
}
