//! Pluggable per-step reward rules.

use crate::engine::{EngineCommand, PlayerCommon};

/// Inputs available to a reward rule after one exchange.
#[derive(Debug, Clone, Copy)]
pub struct RewardContext<'a> {
    /// Player slot.
    pub slot: usize,
    /// Engine frame counter.
    pub step: u64,
    /// Player totals of the frame the exchange ran on.
    pub player: &'a PlayerCommon,
    /// Score recorded before this step.
    pub previous_score: f64,
    /// Command submitted this step, if any.
    pub command: Option<&'a EngineCommand>,
    /// Width of the reward vector.
    pub dims: usize,
}

/// Computes the reward vector for one step.
pub trait RewardFn: Send + Sync {
    /// Reward for the step described by `ctx`.
    fn reward(&self, ctx: &RewardContext<'_>) -> Vec<f64>;
}

/// Zero reward every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroReward;

impl RewardFn for ZeroReward {
    fn reward(&self, ctx: &RewardContext<'_>) -> Vec<f64> {
        vec![0.0; ctx.dims]
    }
}

/// Change in engine score since the previous step, in the first component.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreDelta;

impl RewardFn for ScoreDelta {
    fn reward(&self, ctx: &RewardContext<'_>) -> Vec<f64> {
        let mut reward = vec![0.0; ctx.dims];
        if let (Some(first), Some(score)) = (reward.first_mut(), ctx.player.score) {
            *first = score - ctx.previous_score;
        }
        reward
    }
}
