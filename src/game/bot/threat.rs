//! Threat memory: danger zones and incoming projectiles

use crate::game::combat::Projectile;
use crate::game::geometry::{distance, distance_sq, normalize};
use crate::game::knight::Knight;
use crate::game::weapon::{WeaponKind, WeaponParams};
use crate::game::world::World;
use crate::util::time::SIMULATION_TPS;

/// Max angle between a projectile's heading and the bot for it to count as incoming
pub const INCOMING_ANGLE_TOLERANCE: f32 = 0.35;
/// Projectiles passing further than this are ignored
pub const CLOSEST_APPROACH_THRESHOLD: f32 = 45.0;
/// Emergency dodge fires at or below this many ticks to impact
pub const DODGE_TIME_TO_IMPACT_TICKS: f32 = 15.0;
/// and at or below this perpendicular miss distance
pub const DODGE_PERPENDICULAR_DISTANCE: f32 = 35.0;
const GRENADE_ZONE_MARGIN: f32 = 20.0;
const MINE_ZONE_MARGIN: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangerZone {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomingThreat {
    pub projectile_id: u64,
    /// Ticks until the projectile reaches its closest approach
    pub time_to_impact: f32,
    pub perpendicular_distance: f32,
    /// Unit heading of the projectile
    pub heading: (f32, f32),
    /// +1 or -1: which side of the flight path the bot is on
    pub side: f32,
}

impl IncomingThreat {
    /// Unit vector perpendicular to the flight path, pointing away from it
    pub fn escape_direction(&self) -> (f32, f32) {
        let (hx, hy) = self.heading;
        (-hy * self.side, hx * self.side)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreatAssessment {
    pub zones: Vec<DangerZone>,
    /// Most urgent first
    pub incoming: Vec<IncomingThreat>,
}

impl ThreatAssessment {
    pub fn in_danger_zone(&self, x: f32, y: f32) -> bool {
        self.zones
            .iter()
            .any(|z| distance_sq(x, y, z.x, z.y) <= z.radius * z.radius)
    }

    pub fn most_urgent(&self) -> Option<&IncomingThreat> {
        self.incoming.first()
    }

    /// Push vector away from nearby zones, stronger closer to the centre
    pub fn repulsion(&self, x: f32, y: f32) -> (f32, f32) {
        let mut push = (0.0, 0.0);
        for zone in &self.zones {
            let reach = zone.radius + 30.0;
            let d = distance(x, y, zone.x, zone.y);
            if d >= reach {
                continue;
            }
            let (ax, ay) = if d < 1e-3 { (1.0, 0.0) } else { normalize(x - zone.x, y - zone.y) };
            let weight = 1.0 - d / reach;
            push.0 += ax * weight;
            push.1 += ay * weight;
        }
        push
    }
}

/// Unconditional dash trigger for an incoming projectile
pub fn should_emergency_dodge(threat: &IncomingThreat) -> bool {
    threat.time_to_impact <= DODGE_TIME_TO_IMPACT_TICKS
        && threat.perpendicular_distance <= DODGE_PERPENDICULAR_DISTANCE
}

/// Project a projectile's path against a bot position
pub fn incoming_threat(p: &Projectile, bx: f32, by: f32) -> Option<IncomingThreat> {
    let speed = p.speed();
    if speed <= 0.0 {
        return None;
    }
    let (hx, hy) = (p.vx / speed, p.vy / speed);
    let (rx, ry) = (bx - p.x, by - p.y);
    let along = rx * hx + ry * hy;
    if along <= 0.0 {
        return None;
    }
    let cross = hx * ry - hy * rx;
    let perpendicular = cross.abs();
    let off_axis = perpendicular.atan2(along);
    if off_axis > INCOMING_ANGLE_TOLERANCE || perpendicular >= CLOSEST_APPROACH_THRESHOLD {
        return None;
    }
    let per_tick = speed / SIMULATION_TPS as f32;
    Some(IncomingThreat {
        projectile_id: p.id,
        time_to_impact: along / per_tick,
        perpendicular_distance: perpendicular,
        heading: (hx, hy),
        side: if cross >= 0.0 { 1.0 } else { -1.0 },
    })
}

fn incoming<'a>(world: &'a World, me: &'a Knight) -> impl Iterator<Item = IncomingThreat> + 'a {
    world
        .projectiles
        .iter()
        .filter(move |p| p.kind != WeaponKind::Grenade && p.owner_id != me.id)
        .filter(move |p| world.can_damage(p.owner_id, me.id))
        .filter_map(move |p| incoming_threat(p, me.x, me.y))
}

/// Soonest incoming projectile, without a full reassessment
pub fn most_urgent_incoming(world: &World, me: &Knight) -> Option<IncomingThreat> {
    incoming(world, me).min_by(|a, b| a.time_to_impact.total_cmp(&b.time_to_impact))
}

/// Recompute the bot's view of danger
pub fn assess(world: &World, me: &Knight, now: u64) -> ThreatAssessment {
    let mut assessment = ThreatAssessment::default();

    let grenade_blast = match WeaponKind::Grenade.params() {
        WeaponParams::Grenade(p) => p.blast_radius,
        _ => 0.0,
    };
    let mine_trigger = match WeaponKind::Mine.params() {
        WeaponParams::Mine(p) => p.trigger_radius,
        _ => 0.0,
    };

    for p in world.projectiles.iter().filter(|p| p.kind == WeaponKind::Grenade) {
        assessment.zones.push(DangerZone {
            x: p.x,
            y: p.y,
            radius: grenade_blast + GRENADE_ZONE_MARGIN,
        });
    }

    for mine in world.mines.iter().filter(|m| m.is_armed(now)) {
        assessment.zones.push(DangerZone {
            x: mine.x,
            y: mine.y,
            radius: mine_trigger + MINE_ZONE_MARGIN,
        });
    }

    assessment.incoming.extend(incoming(world, me));
    assessment
        .incoming
        .sort_by(|a, b| a.time_to_impact.total_cmp(&b.time_to_impact));
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threat(tti: f32, perp: f32) -> IncomingThreat {
        IncomingThreat {
            projectile_id: 1,
            time_to_impact: tti,
            perpendicular_distance: perp,
            heading: (1.0, 0.0),
            side: 1.0,
        }
    }

    fn arrow(x: f32, y: f32, vx: f32, vy: f32) -> Projectile {
        Projectile {
            id: 9,
            owner_id: 2,
            kind: WeaponKind::Bow,
            x,
            y,
            vx,
            vy,
            travelled: 0.0,
            max_range: 900.0,
            fuse_at: None,
        }
    }

    #[test]
    fn emergency_dodge_thresholds() {
        assert!(should_emergency_dodge(&threat(10.0, 20.0)));
        assert!(!should_emergency_dodge(&threat(30.0, 20.0)));
        assert!(!should_emergency_dodge(&threat(10.0, 40.0)));
    }

    #[test]
    fn arrow_heading_at_bot_is_incoming() {
        // 600 u/s is 20 units per tick; 200 units away is 10 ticks
        let p = arrow(100.0, 120.0, 600.0, 0.0);
        let t = incoming_threat(&p, 300.0, 100.0).expect("incoming");
        assert!((t.time_to_impact - 10.0).abs() < 0.01);
        assert!((t.perpendicular_distance - 20.0).abs() < 0.01);
        // Bot sits above the path (smaller y), so escape goes further up
        assert!(t.escape_direction().1 < 0.0);
    }

    #[test]
    fn receding_or_wide_projectiles_are_ignored() {
        assert!(incoming_threat(&arrow(300.0, 100.0, 600.0, 0.0), 100.0, 100.0).is_none());
        assert!(incoming_threat(&arrow(100.0, 100.0, 600.0, 0.0), 300.0, 160.0).is_none());
        assert!(incoming_threat(&arrow(100.0, 100.0, 0.0, 0.0), 300.0, 100.0).is_none());
    }

    #[test]
    fn repulsion_points_away_from_zone() {
        let a = ThreatAssessment {
            zones: vec![DangerZone { x: 100.0, y: 100.0, radius: 50.0 }],
            incoming: Vec::new(),
        };
        let (px, _) = a.repulsion(120.0, 100.0);
        assert!(px > 0.0);
        assert_eq!(a.repulsion(400.0, 100.0), (0.0, 0.0));
        assert!(a.in_danger_zone(120.0, 100.0));
    }
}
