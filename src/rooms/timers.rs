//! Per-room countdown and round-restart timers
//!
//! Kept beside the rooms rather than inside them so that cancelling a timer
//! is just removing its entry; nothing can fire into a room that is gone.

use std::collections::HashMap;

use crate::game::room::{Room, RoomState, COUNTDOWN_START, ROUND_RESTART_DELAY_MS};
use crate::ws::protocol::ServerMsg;

pub const COUNTDOWN_STEP_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomTimer {
    Countdown { remaining: u32, next_at: u64 },
    RoundRestart { at: u64 },
}

#[derive(Debug, Default)]
pub struct RoomTimers {
    timers: HashMap<String, RoomTimer>,
}

impl RoomTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start the countdown; returns the first count to broadcast
    pub fn start_countdown(&mut self, code: &str, now: u64) -> ServerMsg {
        self.timers.insert(
            code.to_string(),
            RoomTimer::Countdown {
                remaining: COUNTDOWN_START,
                next_at: now + COUNTDOWN_STEP_MS,
            },
        );
        ServerMsg::Countdown {
            count: COUNTDOWN_START,
        }
    }

    pub fn schedule_restart(&mut self, code: &str, now: u64) {
        self.timers.insert(
            code.to_string(),
            RoomTimer::RoundRestart {
                at: now + ROUND_RESTART_DELAY_MS,
            },
        );
    }

    pub fn cancel(&mut self, code: &str) {
        self.timers.remove(code);
    }

    pub fn get(&self, code: &str) -> Option<RoomTimer> {
        self.timers.get(code).copied()
    }

    /// Fire whatever is due for `room`
    pub fn advance(&mut self, room: &mut Room, now: u64) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        let Some(timer) = self.timers.get(&room.code).copied() else {
            return out;
        };

        match timer {
            RoomTimer::Countdown { remaining, next_at } => match room.state {
                // No decrement while paused; a full step follows the resume
                RoomState::Paused => {
                    self.timers.insert(
                        room.code.clone(),
                        RoomTimer::Countdown {
                            remaining,
                            next_at: now + COUNTDOWN_STEP_MS,
                        },
                    );
                }
                RoomState::Countdown if now >= next_at => {
                    let remaining = remaining.saturating_sub(1);
                    out.push(ServerMsg::Countdown { count: remaining });
                    if remaining == 0 {
                        self.timers.remove(&room.code);
                        out.extend(room.begin_play(now));
                    } else {
                        self.timers.insert(
                            room.code.clone(),
                            RoomTimer::Countdown {
                                remaining,
                                next_at: next_at + COUNTDOWN_STEP_MS,
                            },
                        );
                    }
                }
                RoomState::Countdown => {}
                _ => {
                    self.timers.remove(&room.code);
                }
            },
            RoomTimer::RoundRestart { at } => {
                if room.state != RoomState::RoundOver {
                    self.timers.remove(&room.code);
                } else if now >= at {
                    room.reset_round(now);
                    out.push(self.start_countdown(&room.code, now));
                }
            }
        }
        out
    }
}
