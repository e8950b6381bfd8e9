use std::f32::consts::{FRAC_PI_4, TAU};

use crate::config::Partial;

/// Phase accumulator for sine rendering. Frequency is expressed as a
/// per-sample phase increment so callers can precompute it per block.
#[derive(Debug, Clone)]
pub struct PhaseOsc {
    phase: f32,
}

impl PhaseOsc {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    pub fn with_phase(phase: f32) -> Self {
        Self { phase: phase.rem_euclid(TAU) }
    }

    #[inline]
    pub fn next(&mut self, phase_inc: f32) -> f32 {
        let s = self.phase.sin();
        self.phase += phase_inc;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        s
    }

    /// Sum the given harmonic partials at the current phase, then step.
    /// Integer multiples keep every partial continuous across wrap.
    #[inline]
    pub fn next_harmonics(&mut self, phase_inc: f32, partials: &[Partial]) -> f32 {
        let mut s = 0.0;
        for p in partials {
            s += (self.phase * p.multiple as f32).sin() * p.amplitude;
        }
        self.phase += phase_inc;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        s
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}

impl Default for PhaseOsc {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn phase_increment(frequency: f32, sample_rate: f32) -> f32 {
    TAU * frequency / sample_rate
}

/// Constant-power pan law. `pan` in [-1, 1] maps to (left, right) gains
/// whose squares sum to 1, so a voice keeps perceived loudness while it
/// drifts across the field.
#[inline]
pub fn constant_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}
