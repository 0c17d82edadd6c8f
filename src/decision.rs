//! Unified decision envelope for learner outputs.
//!
//! Every learner returns the same small record from `decide`, so the control loop and
//! observers can log "why this suspect" without knowing which learner ran.

use serde::{Deserialize, Serialize};

/// Which learner produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionPolicy {
    LinUcb,
    LinTs,
    Random,
    EpsilonGreedy,
    Thompson,
    BootstrapThompson,
    BootstrapUcb,
    Softmax,
    Ucb1,
}

/// Audit notes attached to a decision.
///
/// Notes are small, typed, and stable. Prefer adding new variants over changing
/// existing semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionNote {
    /// Warm-up: the learner picked the first arm it has never updated.
    ExploreFirst,

    /// Uniform random pick (random learner, or the epsilon branch of epsilon-greedy).
    UniformExplore,

    /// Sampled from a probability distribution over arms.
    SampledFromDistribution,

    /// Sampled per-arm posteriors and chose the max.
    SampledPosteriorMax,

    /// Argmax over deterministic scores.
    DeterministicChoice,

    /// Several arms tied within tolerance; one was drawn uniformly among them.
    RandomTieBreak { tied: Vec<usize> },

    /// The context contained non-finite values that were replaced by zero.
    SanitizedContext,

    /// CDF fallthrough forced the last arm.
    NumericalFallbackToLastArm,
}

/// A single learner decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub policy: DecisionPolicy,
    /// Selected arm (trailing-unit index).
    pub chosen: usize,
    /// Per-arm scores the choice was made from, when the learner has them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f64>>,
    /// Per-arm probabilities, when the learner samples from a distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probs: Option<Vec<f64>>,
    pub notes: Vec<DecisionNote>,
}

impl Decision {
    pub(crate) fn new(policy: DecisionPolicy, chosen: usize) -> Self {
        Self {
            policy,
            chosen,
            scores: None,
            probs: None,
            notes: Vec::new(),
        }
    }

    pub(crate) fn explore_first(policy: DecisionPolicy, chosen: usize) -> Self {
        let mut d = Self::new(policy, chosen);
        d.notes.push(DecisionNote::ExploreFirst);
        d
    }

    pub fn is_explore_first(&self) -> bool {
        self.notes.contains(&DecisionNote::ExploreFirst)
    }
}
