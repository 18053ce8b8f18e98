//! Fade-in animation for newly completed tiles.
//!
//! Opacity follows a critically damped spring towards its target, so a tile
//! eases in without overshoot instead of popping. The animation only moves
//! when [`FadeIn::advance`] is called from the frame loop.

use std::time::Duration;

use crate::config::FadeConfig;

/// Critically damped opacity animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeIn {
    value: f64,
    velocity: f64,
    target: f64,
    angular_frequency: f64,
    settle_epsilon: f64,
}

impl FadeIn {
    /// Start at rest at `value`.
    pub fn at(value: f64, config: &FadeConfig) -> Self {
        Self {
            value,
            velocity: 0.0,
            target: value,
            angular_frequency: config.angular_frequency,
            settle_epsilon: config.settle_epsilon,
        }
    }

    /// Current opacity.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Opacity the animation is heading to.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Returns true once the value rests on its target.
    pub fn is_settled(&self) -> bool {
        self.value == self.target && self.velocity == 0.0
    }

    /// Aim for a new opacity, keeping the current velocity.
    pub fn retarget(&mut self, target: f64) {
        self.target = target;
    }

    /// Jump to `value` with no animation.
    pub fn snap_to(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.velocity = 0.0;
    }

    /// Step the animation forward by `dt`.
    ///
    /// Returns true if the value changed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.is_settled() {
            return false;
        }
        let t = dt.as_secs_f64();
        let omega = self.angular_frequency;

        // x(t) = target + (c1 + c2 t) e^(-omega t)
        let c1 = self.value - self.target;
        let c2 = self.velocity + omega * c1;
        let decay = (-omega * t).exp();
        let offset = (c1 + c2 * t) * decay;
        let velocity = (c2 - omega * (c1 + c2 * t)) * decay;

        let before = self.value;
        if offset.abs() < self.settle_epsilon && velocity.abs() < self.settle_epsilon * omega {
            self.snap_to(self.target);
        } else {
            self.value = self.target + offset;
            self.velocity = velocity;
        }
        self.value != before
    }
}
