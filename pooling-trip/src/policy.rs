use serde::{Deserialize, Serialize};

use crate::models::Decision;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Cancel only with strictly more cancel than continue votes.
    #[default]
    Majority,
    /// Cancel only if every cast vote is cancel.
    UnanimousCancel,
}

/// How decision votes under partial payment are resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionPolicy {
    #[serde(default)]
    pub rule: DecisionRule,
    /// Share of the paying pool that must vote before anything is decided.
    #[serde(default = "default_turnout")]
    pub min_turnout_percent: u32,
    #[serde(default = "default_tie_break")]
    pub tie_break: Decision,
}

fn default_turnout() -> u32 {
    50
}

fn default_tie_break() -> Decision {
    Decision::Continue
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            rule: DecisionRule::default(),
            min_turnout_percent: default_turnout(),
            tie_break: default_tie_break(),
        }
    }
}

impl DecisionPolicy {
    /// Votes needed before the outcome is evaluated, never fewer than one.
    pub fn turnout_needed(&self, pool_size: usize) -> usize {
        let percent = self.min_turnout_percent.min(100) as usize;
        (percent * pool_size).div_ceil(100).max(1)
    }

    /// `None` while turnout is too low to decide.
    pub fn evaluate(&self, continue_votes: usize, cancel_votes: usize, pool_size: usize) -> Option<Decision> {
        let cast = continue_votes + cancel_votes;
        if cast == 0 || (cast < self.turnout_needed(pool_size) && cast < pool_size) {
            return None;
        }

        let outcome = match self.rule {
            DecisionRule::Majority if cancel_votes > continue_votes => Decision::Cancel,
            DecisionRule::Majority if continue_votes > cancel_votes => Decision::Continue,
            DecisionRule::Majority => self.tie_break,
            DecisionRule::UnanimousCancel if cancel_votes == cast => Decision::Cancel,
            DecisionRule::UnanimousCancel => Decision::Continue,
        };
        Some(outcome)
    }
}

/// Share of a withdrawing member's recorded payments that is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyPolicy {
    pub percent: u32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self { percent: 20 }
    }
}

impl PenaltyPolicy {
    /// Returns `(penalty, refund)` for one recorded payment, in minor units.
    pub fn split(&self, amount: i64) -> (i64, i64) {
        let percent = i128::from(self.percent.min(100));
        // |penalty| <= |amount|, so narrowing back cannot fail
        let penalty = i64::try_from(i128::from(amount) * percent / 100).unwrap_or(amount);
        (penalty, amount - penalty)
    }
}
