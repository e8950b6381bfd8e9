//! Control-rate modulation.
//!
//! All of this advances once per block. Voices read the results as
//! plain getters; nothing here touches the audio buffers directly.

use std::f32::consts::{PI, TAU};

use crate::config::{HabituationConfig, ModulationConfig};
use crate::rng::RandomSource;

struct Lfo {
    phase: f32,
    rate: f32,
    depth: f32,
}

impl Lfo {
    fn advance(&mut self, dt: f32) {
        self.phase += TAU * self.rate * dt;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
    }

    /// Unipolar output centred just below 1: `1 - depth + depth * sin`.
    fn level(&self) -> f32 {
        1.0 - self.depth + self.depth * (0.5 + 0.5 * self.phase.sin())
    }
}

/// Fatigue tracker for one voice. Starts fresh; the layer advances it
/// every block the voice is audible.
#[derive(Debug, Clone, Copy, Default)]
pub struct HabituationState {
    active_time: f32,
    fatigue: f32,
}

pub struct ModulationSystem {
    cfg: ModulationConfig,
    global: Vec<Lfo>,
    global_level: f32,
    peristalsis_phase: f32,
    activity_phase: f32,
    activity: f32,
    pan_positions: Vec<f32>,
    pan_homes: Vec<f32>,
    pan_wave_phases: Vec<f32>,
}

impl ModulationSystem {
    pub fn new(cfg: ModulationConfig, category_count: usize, rng: &mut dyn RandomSource) -> Self {
        let global = cfg
            .global_lfos
            .iter()
            .map(|l| Lfo {
                phase: rng.range(0.0, TAU),
                rate: l.rate.max(0.0),
                depth: l.depth.clamp(0.0, 0.5),
            })
            .collect();
        let mut sys = Self {
            cfg,
            global,
            global_level: 1.0,
            peristalsis_phase: 0.0,
            activity_phase: rng.range(0.0, TAU),
            activity: 0.5,
            pan_positions: Vec::new(),
            pan_homes: Vec::new(),
            pan_wave_phases: Vec::new(),
        };
        sys.reset_categories(category_count);
        sys
    }

    /// Rebuild the per-category pan tables for a new dataset. Homes are
    /// spread evenly across the field so categories separate spatially.
    pub fn reset_categories(&mut self, category_count: usize) {
        self.pan_positions.clear();
        self.pan_homes.clear();
        self.pan_wave_phases.clear();
        for i in 0..category_count {
            let home = if category_count > 1 {
                -0.5 + i as f32 / (category_count - 1) as f32
            } else {
                0.0
            };
            self.pan_homes.push(home);
            self.pan_positions.push(home);
            self.pan_wave_phases.push(i as f32 * 0.4 * PI);
        }
    }

    pub fn advance(&mut self, dt: f32) {
        let mut level = 1.0;
        for lfo in &mut self.global {
            lfo.advance(dt);
            level *= lfo.level();
        }
        self.global_level = level;

        self.peristalsis_phase += TAU * self.cfg.peristalsis_rate * dt;
        if self.peristalsis_phase >= TAU {
            self.peristalsis_phase -= TAU;
        }

        self.activity_phase += TAU * self.cfg.activity_rate * dt;
        if self.activity_phase >= TAU {
            self.activity_phase -= TAU;
        }
        self.activity = 0.5 + 0.45 * self.activity_phase.sin();

        let smooth = 1.0 - (-dt / self.cfg.pan_smoothing_tau.max(1e-3)).exp();
        for i in 0..self.pan_positions.len() {
            self.pan_wave_phases[i] += TAU * self.cfg.pan_drift_rate * dt;
            if self.pan_wave_phases[i] >= TAU {
                self.pan_wave_phases[i] -= TAU;
            }
            let target =
                self.pan_homes[i] + self.pan_wave_phases[i].sin() * self.cfg.pan_range * 0.5;
            self.pan_positions[i] += (target - self.pan_positions[i]) * smooth;
        }
    }

    /// Product of the global breathing LFOs, in (0, 1].
    #[inline]
    pub fn global_level(&self) -> f32 {
        self.global_level
    }

    /// Slow activity cycle in roughly [0.05, 0.95]. Scales ripple
    /// probability and effect wetness.
    #[inline]
    pub fn activity(&self) -> f32 {
        self.activity
    }

    /// Traveling amplitude wave across pitch space: voices at different
    /// log-ratios sit at different points of the wave, so swells move
    /// through the texture instead of pumping it.
    #[inline]
    pub fn traveling_wave(&self, log_ratio: f32) -> f32 {
        let phase = self.peristalsis_phase + log_ratio * self.cfg.wave_spread;
        1.0 + phase.sin() * self.cfg.peristalsis_depth
    }

    #[inline]
    pub fn category_pan(&self, category: usize) -> f32 {
        self.pan_positions.get(category).copied().unwrap_or(0.0)
    }

    /// Gain multiplier for a voice under fatigue, in
    /// `[1 - max_reduction, 1]`. Consonant pathways fatigue less.
    #[inline]
    pub fn habituation_gain(&self, state: &HabituationState, consonance: f32) -> f32 {
        let cfg = &self.cfg.habituation;
        let resistance = 1.0 - cfg.consonance_bias * consonance.clamp(0.0, 1.0);
        1.0 - state.fatigue * cfg.max_reduction * resistance
    }

    /// Advance one voice's fatigue. `audible` is whether the voice
    /// produced signal this block.
    pub fn advance_habituation(&self, state: &mut HabituationState, dt: f32, audible: bool) {
        let cfg = &self.cfg.habituation;
        if audible {
            state.active_time += dt;
            if state.active_time > cfg.onset_time {
                state.fatigue = (state.fatigue + cfg.rate * dt).min(1.0);
            }
        } else {
            state.fatigue = (state.fatigue - cfg.recovery_rate * dt).max(0.0);
        }
    }

    pub fn habituation_config(&self) -> &HabituationConfig {
        &self.cfg.habituation
    }
}
