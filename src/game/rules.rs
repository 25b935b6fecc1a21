//! Win-condition evaluation, kill credit and respawns

use serde::{Deserialize, Serialize};

use super::combat::Kill;
use super::geometry::distance_sq;
use super::knight::{PlayerId, TeamId};
use super::room::Team;
use super::settings::{MatchSettings, WinType};
use super::world::World;

/// Respawn delay in kill-based matches
pub const KILL_RESPAWN_DELAY_MS: u64 = 3_000;
/// Base respawn delay in time-based matches
pub const TIME_RESPAWN_DELAY_MS: u64 = 3_000;
/// Shaved off the smaller team's respawn per missing member
pub const TEAM_BALANCE_STEP_MS: u64 = 1_000;
pub const MIN_RESPAWN_DELAY_MS: u64 = 1_000;
pub const TIMER_UPDATE_INTERVAL_MS: u64 = 1_000;

/// Final or per-round line for one knight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_bot: bool,
    pub team_id: Option<TeamId>,
    pub is_alive: bool,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
}

/// A knight in free-for-all, a team in team mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// `None` winner is a draw
    RoundOver(Option<Winner>),
    MatchOver(Option<Winner>),
}

/// Stateless evaluator for the three win types
pub struct WinEvaluator;

impl WinEvaluator {
    /// Credit kills and schedule respawns for the modes that have them
    pub fn credit_kills(
        world: &mut World,
        teams: &mut [Team],
        settings: &MatchSettings,
        kills: &[Kill],
        now: u64,
    ) {
        let scores_kills = settings.win_type != WinType::LastKnightStanding;

        for kill in kills {
            let credited = kill
                .killer
                .filter(|&killer| killer != kill.victim && !world.are_allies(killer, kill.victim));

            if let Some(killer_id) = credited {
                let mut team = None;
                if let Some(killer) = world.knights.get_mut(&killer_id) {
                    killer.kills += 1;
                    if scores_kills {
                        killer.score += 1;
                    }
                    team = killer.team_id;
                }
                if scores_kills && world.rules.team_mode {
                    if let Some(t) = team.and_then(|id| teams.iter_mut().find(|t| t.id == id)) {
                        t.score += 1;
                    }
                }
            }

            if let Some(delay) = Self::respawn_delay(world, settings.win_type, kill.victim) {
                if let Some(victim) = world.knights.get_mut(&kill.victim) {
                    victim.respawn_at = Some(now + delay);
                }
            }
        }
    }

    /// `None` when the win type does not respawn
    pub fn respawn_delay(world: &World, win_type: WinType, victim: PlayerId) -> Option<u64> {
        match win_type {
            WinType::LastKnightStanding => None,
            WinType::KillBased => Some(KILL_RESPAWN_DELAY_MS),
            WinType::TimeBased => {
                let team = world
                    .knights
                    .get(&victim)
                    .and_then(|k| k.team_id)
                    .filter(|_| world.rules.team_mode);
                let Some(team) = team else {
                    return Some(TIME_RESPAWN_DELAY_MS);
                };
                let own = world.knights.values().filter(|k| k.team_id == Some(team)).count() as u64;
                let other = world
                    .knights
                    .values()
                    .filter(|k| k.team_id.is_some_and(|t| t != team))
                    .count() as u64;
                let shortfall = other.saturating_sub(own);
                Some(
                    TIME_RESPAWN_DELAY_MS
                        .saturating_sub(shortfall * TEAM_BALANCE_STEP_MS)
                        .max(MIN_RESPAWN_DELAY_MS),
                )
            }
        }
    }

    /// Bring back dead knights whose respawn time has come, at the spawn point
    /// furthest from everyone still standing
    pub fn respawn_due(world: &mut World, now: u64) -> Vec<PlayerId> {
        let due: Vec<PlayerId> = world
            .knights
            .values()
            .filter(|k| !k.is_alive && k.respawn_at.is_some_and(|t| t <= now))
            .map(|k| k.id)
            .collect();

        for id in &due {
            let living = world.living_positions();
            let spot = world.spawn_points.iter().copied().max_by(|a, b| {
                let da = nearest_sq(&living, *a);
                let db = nearest_sq(&living, *b);
                da.total_cmp(&db)
            });
            let Some((x, y)) = spot else {
                continue;
            };
            if let Some(knight) = world.knights.get_mut(id) {
                knight.spawn_at(x, y, now);
                let facing = knight.angle;
                if let Some(memory) = knight.bot.as_mut() {
                    memory.reset(now, facing);
                }
            }
        }
        due
    }

    /// Remaining time, at most once per interval, for time-based matches
    pub fn timer_update(
        settings: &MatchSettings,
        match_end_time: Option<u64>,
        last_emit: &mut u64,
        now: u64,
    ) -> Option<u64> {
        if settings.win_type != WinType::TimeBased {
            return None;
        }
        let end = match_end_time?;
        if now.saturating_sub(*last_emit) < TIMER_UPDATE_INTERVAL_MS {
            return None;
        }
        *last_emit = now;
        Some(end.saturating_sub(now))
    }

    pub fn evaluate(
        world: &mut World,
        teams: &mut [Team],
        settings: &MatchSettings,
        match_end_time: Option<u64>,
        now: u64,
    ) -> Verdict {
        match settings.win_type {
            WinType::LastKnightStanding => {
                if world.rules.team_mode {
                    Self::last_team_standing(world, teams, settings)
                } else {
                    Self::last_knight_standing(world, settings)
                }
            }
            WinType::KillBased => {
                let reached = if world.rules.team_mode {
                    teams.iter().any(|t| t.score >= settings.score_target)
                } else {
                    world.knights.values().any(|k| k.score >= settings.score_target)
                };
                if reached {
                    Verdict::MatchOver(Self::leader(world, teams))
                } else {
                    Verdict::Continue
                }
            }
            WinType::TimeBased => match match_end_time {
                Some(end) if now >= end => Verdict::MatchOver(Self::leader(world, teams)),
                _ => Verdict::Continue,
            },
        }
    }

    fn last_knight_standing(world: &mut World, settings: &MatchSettings) -> Verdict {
        if world.knights.is_empty() || world.living().count() > 1 {
            return Verdict::Continue;
        }
        let Some(survivor) = world.knights.values_mut().find(|k| k.is_alive) else {
            return Verdict::RoundOver(None);
        };
        survivor.score += 1;
        let winner = Winner {
            id: survivor.id,
            name: survivor.name.clone(),
        };
        if survivor.score >= settings.score_target {
            Verdict::MatchOver(Some(winner))
        } else {
            Verdict::RoundOver(Some(winner))
        }
    }

    fn last_team_standing(world: &World, teams: &mut [Team], settings: &MatchSettings) -> Verdict {
        let alive_on = |team: TeamId| world.living().filter(|k| k.team_id == Some(team)).count();
        let standing: Vec<usize> = teams
            .iter()
            .enumerate()
            .filter(|(_, t)| alive_on(t.id) > 0)
            .map(|(i, _)| i)
            .collect();

        match standing.as_slice() {
            [] => Verdict::RoundOver(None),
            [only] => {
                let team = &mut teams[*only];
                team.score += 1;
                let winner = Winner {
                    id: team.id as u64,
                    name: team.name.clone(),
                };
                if team.score >= settings.score_target {
                    Verdict::MatchOver(Some(winner))
                } else {
                    Verdict::RoundOver(Some(winner))
                }
            }
            _ => Verdict::Continue,
        }
    }

    /// Highest knight or team score; a shared top score is a draw
    pub fn leader(world: &World, teams: &[Team]) -> Option<Winner> {
        if world.rules.team_mode {
            let best = teams.iter().map(|t| t.score).max()?;
            let mut top = teams.iter().filter(|t| t.score == best);
            let team = top.next()?;
            if top.next().is_some() {
                return None;
            }
            return Some(Winner {
                id: team.id as u64,
                name: team.name.clone(),
            });
        }

        let best = world.knights.values().map(|k| k.score).max()?;
        let mut top = world.knights.values().filter(|k| k.score == best);
        let knight = top.next()?;
        if top.next().is_some() {
            return None;
        }
        Some(Winner {
            id: knight.id,
            name: knight.name.clone(),
        })
    }

    /// Knights ordered by score, then kills, then join order
    pub fn standings(world: &World) -> Vec<Standing> {
        let mut standings: Vec<Standing> = world
            .knights
            .values()
            .map(|k| Standing {
                id: k.id,
                name: k.name.clone(),
                color: k.color.clone(),
                is_bot: k.is_bot,
                team_id: k.team_id,
                is_alive: k.is_alive,
                score: k.score,
                kills: k.kills,
                deaths: k.deaths,
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then(b.kills.cmp(&a.kills)));
        standings
    }
}

fn nearest_sq(points: &[(f32, f32)], (x, y): (f32, f32)) -> f32 {
    points
        .iter()
        .map(|&(px, py)| distance_sq(x, y, px, py))
        .fold(f32::INFINITY, f32::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room::Team;
    use crate::game::weapon::WeaponKind;
    use crate::game::world::test_support::{add_knight, open_world};

    fn settings(win_type: WinType, target: u32) -> MatchSettings {
        MatchSettings {
            win_type,
            score_target: target,
            ..MatchSettings::with_map("arena")
        }
    }

    fn kill(victim: PlayerId, killer: Option<PlayerId>) -> Kill {
        Kill {
            victim,
            killer,
            cause: WeaponKind::Sword,
        }
    }

    fn four_knights() -> World {
        let mut w = open_world();
        for id in 1..=4 {
            add_knight(&mut w, id, 100.0 * id as f32, 100.0);
        }
        w
    }

    #[test]
    fn last_knight_standing_scores_survivor_then_ends_match() {
        let mut w = four_knights();
        let mut teams = Team::defaults();
        let s = settings(WinType::LastKnightStanding, 2);

        w.knights.get_mut(&3).expect("k3").die();
        w.knights.get_mut(&4).expect("k4").die();
        assert_eq!(WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0), Verdict::Continue);

        w.knights.get_mut(&2).expect("k2").die();
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0);
        assert_eq!(
            verdict,
            Verdict::RoundOver(Some(Winner {
                id: 1,
                name: "Knight 1".into()
            }))
        );
        assert_eq!(w.knights[&1].score, 1);

        // A second round win reaches the target and ends the match outright
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0);
        assert!(matches!(verdict, Verdict::MatchOver(Some(ref winner)) if winner.id == 1));
        assert_eq!(w.knights[&1].score, 2);
    }

    #[test]
    fn everyone_dead_is_a_draw() {
        let mut w = four_knights();
        let mut teams = Team::defaults();
        for k in w.knights.values_mut() {
            k.die();
        }
        let s = settings(WinType::LastKnightStanding, 3);
        assert_eq!(
            WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0),
            Verdict::RoundOver(None)
        );
        assert!(w.knights.values().all(|k| k.score == 0));
    }

    #[test]
    fn team_round_goes_to_surviving_team() {
        let mut w = four_knights();
        w.rules.team_mode = true;
        for (id, team) in [(1, 1), (2, 1), (3, 2), (4, 2)] {
            w.knights.get_mut(&id).expect("knight").team_id = Some(team);
        }
        let mut teams = Team::defaults();
        let s = settings(WinType::LastKnightStanding, 5);

        w.knights.get_mut(&3).expect("k3").die();
        assert_eq!(WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0), Verdict::Continue);
        w.knights.get_mut(&4).expect("k4").die();
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 0);
        assert!(matches!(verdict, Verdict::RoundOver(Some(ref winner)) if winner.id == 1));
        assert_eq!(teams[0].score, 1);
        assert_eq!(teams[1].score, 0);
    }

    #[test]
    fn kill_based_credits_killer_and_ends_at_target() {
        let mut w = four_knights();
        let mut teams = Team::defaults();
        let s = settings(WinType::KillBased, 2);

        w.knights.get_mut(&2).expect("k2").die();
        WinEvaluator::credit_kills(&mut w, &mut teams, &s, &[kill(2, Some(1))], 1_000);
        assert_eq!(w.knights[&1].score, 1);
        assert_eq!(w.knights[&1].kills, 1);
        assert_eq!(w.knights[&2].respawn_at, Some(1_000 + KILL_RESPAWN_DELAY_MS));
        assert_eq!(WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 1_000), Verdict::Continue);

        w.knights.get_mut(&3).expect("k3").die();
        WinEvaluator::credit_kills(&mut w, &mut teams, &s, &[kill(3, Some(1))], 2_000);
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 2_000);
        assert!(matches!(verdict, Verdict::MatchOver(Some(ref winner)) if winner.id == 1));
    }

    #[test]
    fn kill_based_team_reaches_target_ends_match() {
        let mut w = four_knights();
        w.rules.team_mode = true;
        for (id, team) in [(1, 1), (2, 1), (3, 2), (4, 2)] {
            w.knights.get_mut(&id).expect("knight").team_id = Some(team);
        }
        let mut teams = Team::defaults();
        let s = settings(WinType::KillBased, 2);

        WinEvaluator::credit_kills(&mut w, &mut teams, &s, &[kill(3, Some(1))], 1_000);
        assert_eq!(teams[0].score, 1);
        assert_eq!(WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 1_000), Verdict::Continue);

        // No single knight is at the target, the team total is
        WinEvaluator::credit_kills(&mut w, &mut teams, &s, &[kill(4, Some(2))], 2_000);
        assert!(w.knights.values().all(|k| k.score < 2));
        assert_eq!(teams[0].score, 2);
        assert_eq!(teams[1].score, 0);
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, None, 2_000);
        assert_eq!(
            verdict,
            Verdict::MatchOver(Some(Winner {
                id: 1,
                name: "Red".into()
            }))
        );
    }

    #[test]
    fn self_kills_credit_nobody() {
        let mut w = four_knights();
        let mut teams = Team::defaults();
        let s = settings(WinType::KillBased, 5);
        WinEvaluator::credit_kills(&mut w, &mut teams, &s, &[kill(1, Some(1)), kill(2, None)], 0);
        assert!(w.knights.values().all(|k| k.score == 0 && k.kills == 0));
    }

    #[test]
    fn time_based_end_and_timer_cadence() {
        let mut w = four_knights();
        let mut teams = Team::defaults();
        let mut s = settings(WinType::TimeBased, 5);
        s.time_limit_minutes = 5;
        let start = 10_000;
        let end = start + s.time_limit_ms();
        assert_eq!(end, start + 300_000);

        let mut last_emit = start;
        assert_eq!(WinEvaluator::timer_update(&s, Some(end), &mut last_emit, start + 500), None);
        assert_eq!(
            WinEvaluator::timer_update(&s, Some(end), &mut last_emit, start + 1_000),
            Some(299_000)
        );
        assert_eq!(WinEvaluator::timer_update(&s, Some(end), &mut last_emit, start + 1_999), None);
        assert!(WinEvaluator::timer_update(&s, Some(end), &mut last_emit, start + 2_000).is_some());

        assert_eq!(
            WinEvaluator::evaluate(&mut w, &mut teams, &s, Some(end), end - 1),
            Verdict::Continue
        );
        w.knights.get_mut(&2).expect("k2").score = 3;
        let verdict = WinEvaluator::evaluate(&mut w, &mut teams, &s, Some(end), end);
        assert!(matches!(verdict, Verdict::MatchOver(Some(ref winner)) if winner.id == 2));
    }

    #[test]
    fn tied_leaders_draw() {
        let mut w = four_knights();
        w.knights.get_mut(&1).expect("k1").score = 2;
        w.knights.get_mut(&3).expect("k3").score = 2;
        assert_eq!(WinEvaluator::leader(&w, &Team::defaults()), None);
    }

    #[test]
    fn smaller_team_respawns_sooner() {
        let mut w = open_world();
        w.rules.team_mode = true;
        for (id, team) in [(1, 1), (2, 2), (3, 2), (4, 2)] {
            add_knight(&mut w, id, 0.0, 0.0).team_id = Some(team);
        }
        // Team 1 is two short: 3000 - 2000
        assert_eq!(WinEvaluator::respawn_delay(&w, WinType::TimeBased, 1), Some(1_000));
        assert_eq!(
            WinEvaluator::respawn_delay(&w, WinType::TimeBased, 2),
            Some(TIME_RESPAWN_DELAY_MS)
        );

        add_knight(&mut w, 5, 0.0, 0.0).team_id = Some(2);
        // Never below the floor
        assert_eq!(WinEvaluator::respawn_delay(&w, WinType::TimeBased, 1), Some(MIN_RESPAWN_DELAY_MS));
        assert_eq!(WinEvaluator::respawn_delay(&w, WinType::LastKnightStanding, 1), None);
    }

    #[test]
    fn due_knights_respawn_away_from_others() {
        let mut w = open_world();
        add_knight(&mut w, 1, 110.0, 110.0);
        let k2 = add_knight(&mut w, 2, 0.0, 0.0);
        k2.die();
        k2.respawn_at = Some(5_000);

        assert!(WinEvaluator::respawn_due(&mut w, 4_999).is_empty());
        assert_eq!(WinEvaluator::respawn_due(&mut w, 5_000), vec![2]);
        let k2 = &w.knights[&2];
        assert!(k2.is_alive);
        assert_eq!((k2.x, k2.y), (700.0, 500.0));
        assert!(k2.is_invulnerable(5_000));
    }
}
