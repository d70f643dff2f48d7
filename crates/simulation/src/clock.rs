//! Simulated time.
//!
//! The scheduler owns the only [`SimulationClock`]. Node handlers never see
//! it directly; they get a [`NodeContext`] snapshot of the current time.

use scpsim_scp::NodeContext;

/// Monotonic simulated clock measured in abstract time units.
#[derive(Debug, Clone, Default)]
pub struct SimulationClock {
    now: f64,
}

impl SimulationClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move the clock forward by `delay`.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or not finite; simulated time never
    /// runs backwards.
    pub fn advance(&mut self, delay: f64) -> f64 {
        assert!(
            delay.is_finite() && delay >= 0.0,
            "clock cannot advance by {delay}"
        );
        self.now += delay;
        self.now
    }

    /// Read-only view handed to node operations.
    pub fn context(&self, round_duration: f64) -> NodeContext {
        NodeContext::new(self.now, round_duration)
    }
}
