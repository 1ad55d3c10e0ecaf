//! Discrete-time synapses and the evidence accumulator.
//!
//! Everything here is an explicit update function of `(state, input, dt)`, so
//! any host loop can drive it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::memory::Recall;

/// One Euler step of `dx/dt = (input - x) / tau`.
#[inline]
pub fn leaky_step(value: f32, input: f32, dt: f32, tau: f32) -> f32 {
    value + dt * (input - value) / tau
}

pub(crate) fn check_tau(tau: f32, dt: f32) -> Result<()> {
    if !tau.is_finite() || tau <= 0.0 || tau < dt {
        return Err(Error::InvalidTimeConstant(tau));
    }
    Ok(())
}

/// First-order low-pass synapse on a scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lowpass {
    pub tau: f32,
    pub value: f32,
}

impl Lowpass {
    pub fn new(tau: f32) -> Self {
        Self { tau, value: 0.0 }
    }

    #[inline]
    pub fn step(&mut self, input: f32, dt: f32) -> f32 {
        self.value = leaky_step(self.value, input, dt, self.tau);
        self.value
    }
}

/// Low-pass every element of `state` toward `input`.
pub fn lowpass_into(state: &[f32], input: &[f32], dt: f32, tau: f32, out: &mut [f32]) {
    for ((o, s), i) in out.iter_mut().zip(state).zip(input) {
        *o = leaky_step(*s, *i, dt, tau);
    }
}

/// Evidence input for one step: `+scale` when the memory recognized its input,
/// `-scale` otherwise (including "no stimulus").
#[inline]
pub fn evidence_drive(recall: &Recall, scale: f32) -> f32 {
    if recall.recognized {
        scale
    } else {
        -scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccumulatorParams {
    /// Synaptic time constant of the recurrent loop (s).
    pub tau: f32,
    /// Recurrent gain. 1.0 integrates; 0.0 is a plain leaky follower.
    pub feedback: f32,
    /// Saturation bound on `|value|`.
    pub radius: f32,
    /// Strength of the inhibitory reset.
    pub reset_gain: f32,
    /// Time constant of the reset synapse (s).
    pub reset_tau: f32,
}

impl Default for AccumulatorParams {
    fn default() -> Self {
        Self {
            tau: 0.1,
            feedback: 1.0,
            radius: 1.0,
            reset_gain: 20.0,
            reset_tau: 0.1,
        }
    }
}

impl AccumulatorParams {
    pub fn validate(&self, dt: f32) -> Result<()> {
        check_tau(self.tau, dt)?;
        check_tau(self.reset_tau, dt)?;
        if !self.feedback.is_finite() {
            return Err(Error::Config("accumulator feedback must be finite"));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::Config("accumulator radius must be finite and > 0"));
        }
        if !self.reset_gain.is_finite() || self.reset_gain < 0.0 {
            return Err(Error::Config("accumulator reset_gain must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Scalar leaky integrator with an inhibitory reset input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator {
    params: AccumulatorParams,
    value: f32,
    inhibition: Lowpass,
}

impl Accumulator {
    pub fn new(params: AccumulatorParams) -> Self {
        Self {
            params,
            value: 0.0,
            inhibition: Lowpass::new(params.reset_tau),
        }
    }

    pub fn params(&self) -> &AccumulatorParams {
        &self.params
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Current (filtered) reset inhibition.
    pub fn inhibition(&self) -> f32 {
        self.inhibition.value
    }

    pub fn clear(&mut self) {
        self.value = 0.0;
        self.inhibition.value = 0.0;
    }

    /// Advance by `dt`. The value update reads the inhibition from before this
    /// step, so the order of the two writes does not matter.
    ///
    /// The reset shrinks the value by an exact exponential factor, so no gain
    /// can make it overshoot zero.
    pub fn step(&mut self, drive: f32, reset: f32, dt: f32) -> f32 {
        let p = &self.params;
        let total = p.feedback * self.value + drive;
        let decay = (-dt * p.reset_gain * self.inhibition.value.max(0.0) / p.tau).exp();
        let next = leaky_step(self.value, total, dt, p.tau) - self.value * (1.0 - decay);

        self.inhibition.step(reset, dt);
        self.value = next.clamp(-p.radius, p.radius);
        self.value
    }
}
