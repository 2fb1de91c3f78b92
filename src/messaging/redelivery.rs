//! Redelivery delay policy.
//!
//! Computes the delay before a rolled-back or negatively-acknowledged
//! message is presented again: fixed, exponential backoff, and optional
//! collision-avoidance jitter so concurrently-redelivering consumers
//! desynchronize. The policy only computes delays; enforcing the redelivery
//! cap is the caller's job.

use rand::Rng;

/// Configuration and delay computation for message redelivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RedeliveryPolicy {
    /// Delay before the first redelivery, in milliseconds.
    pub initial_redelivery_delay: i64,
    /// Redelivery attempts allowed before a message is poisoned. Carried for
    /// the consumer layer; `next_redelivery_delay` does not cap attempts.
    pub maximum_redeliveries: i32,
    /// Multiplier applied per attempt when exponential backoff is enabled.
    pub backoff_multiplier: f64,
    pub use_exponential_backoff: bool,
    pub use_collision_avoidance: bool,
    collision_avoidance_factor: f64,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            initial_redelivery_delay: 1000,
            maximum_redeliveries: 6,
            backoff_multiplier: 5.0,
            use_exponential_backoff: false,
            use_collision_avoidance: false,
            collision_avoidance_factor: 0.15,
        }
    }
}

impl RedeliveryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_redelivery_delay(mut self, millis: i64) -> Self {
        self.initial_redelivery_delay = millis;
        self
    }

    pub fn with_maximum_redeliveries(mut self, maximum: i32) -> Self {
        self.maximum_redeliveries = maximum;
        self
    }

    pub fn with_exponential_backoff(mut self, multiplier: f64) -> Self {
        self.use_exponential_backoff = true;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_collision_avoidance(mut self, factor: f64) -> Self {
        self.use_collision_avoidance = true;
        self.collision_avoidance_factor = factor;
        self
    }

    pub fn collision_avoidance_factor(&self) -> f64 {
        self.collision_avoidance_factor
    }

    pub fn set_collision_avoidance_factor(&mut self, factor: f64) {
        self.collision_avoidance_factor = factor;
    }

    /// Collision-avoidance expressed as an integer percent.
    pub fn collision_avoidance_percent(&self) -> i16 {
        (self.collision_avoidance_factor * 100.0).round() as i16
    }

    pub fn set_collision_avoidance_percent(&mut self, percent: i16) {
        self.collision_avoidance_factor = f64::from(percent) / 100.0;
    }

    /// Delay before the next redelivery, given the previous delay.
    ///
    /// A previous delay of zero means "first redelivery" and yields the
    /// configured initial delay.
    pub fn next_redelivery_delay(&self, previous_delay_millis: i64) -> i64 {
        let mut next = if previous_delay_millis == 0 {
            self.initial_redelivery_delay
        } else if self.use_exponential_backoff && self.backoff_multiplier > 1.0 {
            (previous_delay_millis as f64 * self.backoff_multiplier) as i64
        } else {
            previous_delay_millis
        };

        if self.use_collision_avoidance {
            let mut rng = rand::rng();
            let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            let variance = direction * self.collision_avoidance_factor * rng.random::<f64>();
            next += (next as f64 * variance) as i64;
        }

        next
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
