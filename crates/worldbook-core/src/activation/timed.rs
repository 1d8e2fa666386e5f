//! Timed effects: sticky, cooldown and delay.
//!
//! Every entry goes through the same ordered gate each pass:
//!
//! 1. sticky-active: fire, skipping every gate below
//! 2. cooldown-active: skip
//! 3. keyword match (constant entries always match): skip on miss
//! 4. delay: arm on first match, skip until the armed turn is reached
//! 5. probability roll: skip on a failed roll
//! 6. fire and commit the new state
//!
//! The gate never touches the store; it returns the state to persist.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::matcher::MatchOutcome;
use crate::types::WorldbookEntry;

/// Persisted per (session, entry) counters. All turns are session turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEffectState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_turn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_until_turn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until_turn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_until_turn: Option<u64>,
}

impl TimedEffectState {
    /// Sticky window still covers `turn`.
    pub fn is_sticky_active(&self, turn: u64) -> bool {
        self.sticky_until_turn.is_some_and(|until| turn <= until)
    }

    /// Cooldown window still covers `turn`.
    pub fn is_cooldown_active(&self, turn: u64) -> bool {
        self.cooldown_until_turn.is_some_and(|until| turn <= until)
    }
}

/// Why an entry did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMatch,
    Cooldown { until: u64 },
    DelayArmed { until: u64 },
    DelayPending { until: u64 },
    ProbabilityRoll,
}

/// Outcome of the gate for one entry in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Fire {
        trigger_score: f64,
        sticky_override: bool,
    },
    Skip(SkipReason),
}

/// Verdict plus the state to persist, if it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub verdict: Verdict,
    pub new_state: Option<TimedEffectState>,
}

impl GateOutcome {
    fn skip(reason: SkipReason) -> Self {
        Self {
            verdict: Verdict::Skip(reason),
            new_state: None,
        }
    }

    /// Whether the entry fired.
    pub fn fired(&self) -> bool {
        matches!(self.verdict, Verdict::Fire { .. })
    }
}

/// Run the ordered gate for `entry` at `turn`.
///
/// `keyword_match` is only called when the entry is neither sticky-active,
/// cooling down, nor constant.
pub fn decide<R, F>(
    entry: &WorldbookEntry,
    turn: u64,
    state: &TimedEffectState,
    keyword_match: F,
    rng: &mut R,
) -> GateOutcome
where
    R: Rng,
    F: FnOnce() -> MatchOutcome,
{
    let constant_bonus = if entry.constant { 1.0 } else { 0.0 };

    if state.is_sticky_active(turn) {
        let mut next = state.clone();
        next.delay_until_turn = None;
        next.last_triggered_turn = Some(turn);
        return GateOutcome {
            verdict: Verdict::Fire {
                trigger_score: constant_bonus + 0.5,
                sticky_override: true,
            },
            new_state: Some(next),
        };
    }

    if let Some(until) = state.cooldown_until_turn.filter(|_| state.is_cooldown_active(turn)) {
        return GateOutcome::skip(SkipReason::Cooldown { until });
    }

    let outcome = if entry.constant {
        MatchOutcome {
            matched: true,
            score: 0.0,
        }
    } else {
        keyword_match()
    };
    if !outcome.matched {
        return GateOutcome::skip(SkipReason::NoMatch);
    }

    if let Some(delay) = entry.delay.filter(|d| *d > 0) {
        match state.delay_until_turn {
            None => {
                let until = turn.saturating_add(delay);
                let mut next = state.clone();
                next.delay_until_turn = Some(until);
                return GateOutcome {
                    verdict: Verdict::Skip(SkipReason::DelayArmed { until }),
                    new_state: Some(next),
                };
            }
            Some(until) if turn < until => {
                return GateOutcome::skip(SkipReason::DelayPending { until });
            }
            Some(_) => {}
        }
    }

    if entry.use_probability {
        let roll: f64 = rng.gen_range(0.0..100.0);
        if roll > entry.clamped_probability() {
            return GateOutcome::skip(SkipReason::ProbabilityRoll);
        }
    }

    let mut next = state.clone();
    next.delay_until_turn = None;
    next.last_triggered_turn = Some(turn);
    if let Some(sticky) = entry.sticky.filter(|s| *s > 0) {
        next.sticky_until_turn = Some(turn.saturating_add(sticky));
    }
    if let Some(cooldown) = entry.cooldown.filter(|c| *c > 0) {
        next.cooldown_until_turn = Some(turn.saturating_add(cooldown));
    }

    GateOutcome {
        verdict: Verdict::Fire {
            trigger_score: outcome.score + constant_bonus,
            sticky_override: false,
        },
        new_state: Some(next),
    }
}
