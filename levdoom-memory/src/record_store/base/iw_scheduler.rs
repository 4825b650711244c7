//! Scheduling the exponent of importance weight for PER.
use serde::{Deserialize, Serialize};

/// Scheduler of the exponent of importance weight for PER.
///
/// $\beta$ starts at `beta_0` and grows by `beta_increment` on every
/// prioritized batch, saturating at 1.0 (full bias correction).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Initial value of $\beta$.
    pub beta_0: f32,

    /// Increment of $\beta$ per sampled batch.
    pub beta_increment: f32,

    /// Current value of $\beta$.
    pub beta: f32,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(beta_0: f32, beta_increment: f32) -> Self {
        Self {
            beta_0,
            beta_increment,
            beta: beta_0.min(1.0),
        }
    }

    /// Gets the exponent of importance sampling weight.
    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Advances $\beta$ by one batch.
    pub fn step(&mut self) {
        self.beta = (self.beta + self.beta_increment).min(1.0);
    }
}
