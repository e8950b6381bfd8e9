//! Shared per-block state.
//!
//! One [`SharedContext`] is owned by the engine and handed to every
//! subsystem each block: the clock, the fundamental, master and
//! per-category gains, the focus boost/duck envelope and the fairness
//! ledger all live here so the subsystems agree on them within a block.

use crate::config::{FairnessConfig, FocusConfig};
use crate::MIN_TIME;

pub struct SharedContext {
    time: f64,
    sample_rate: f32,
    block_size: usize,
    dt: f32,
    fundamental: f32,
    master_volume: f32,
    category_gains: Vec<f32>,
    emphasis: Vec<f32>,
    focus: FocusState,
    fairness: FairnessState,
}

struct FocusState {
    cfg: FocusConfig,
    /// Pathway the envelope is steering toward, kept while the envelope
    /// decays after focus is cleared so the duck releases smoothly.
    active: Option<usize>,
    target: f32,
    envelope: f32,
}

struct FairnessState {
    cfg: FairnessConfig,
    last_sounded: Vec<f64>,
}

impl SharedContext {
    pub fn new(
        sample_rate: f32,
        fundamental: f32,
        master_volume: f32,
        focus: FocusConfig,
        fairness: FairnessConfig,
    ) -> Self {
        Self {
            time: 0.0,
            sample_rate: sample_rate.max(1.0),
            block_size: 0,
            dt: 0.0,
            fundamental: fundamental.max(1.0),
            master_volume: master_volume.clamp(0.0, 2.0),
            category_gains: Vec::new(),
            emphasis: Vec::new(),
            focus: FocusState { cfg: focus, active: None, target: 0.0, envelope: 0.0 },
            fairness: FairnessState { cfg: fairness, last_sounded: Vec::new() },
        }
    }

    /// Resize the per-pathway and per-category tables for a new dataset.
    /// Allocates; only called from dataset loads, never mid-block.
    pub fn reset_for_set(&mut self, pathway_count: usize, category_count: usize) {
        self.category_gains.clear();
        self.category_gains.resize(category_count, 1.0);
        self.emphasis.clear();
        self.emphasis.resize(pathway_count, 1.0);
        self.fairness.last_sounded.clear();
        self.fairness.last_sounded.resize(pathway_count, 0.0);
        self.focus.active = None;
        self.focus.target = 0.0;
        self.focus.envelope = 0.0;
    }

    /// Advance the clock by one block and settle the focus envelope.
    pub fn advance(&mut self, block_size: usize) {
        self.block_size = block_size;
        self.dt = block_size as f32 / self.sample_rate;
        self.time += self.dt as f64;

        let f = &mut self.focus;
        let time = if f.target > f.envelope { f.cfg.attack_time } else { f.cfg.release_time };
        let k = (self.dt / time.max(MIN_TIME)).min(1.0);
        f.envelope += (f.target - f.envelope) * k;
        f.envelope = f.envelope.clamp(0.0, 1.0);
        if f.target <= 0.0 && f.envelope < 1e-3 {
            f.active = None;
            f.envelope = 0.0;
        }
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn dt(&self) -> f32 {
        self.dt
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn fundamental(&self) -> f32 {
        self.fundamental
    }

    pub fn set_fundamental(&mut self, hz: f32) {
        if hz.is_finite() && hz > 0.0 {
            self.fundamental = hz.clamp(20.0, 2000.0);
        }
    }

    #[inline]
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, gain: f32) {
        if gain.is_finite() {
            self.master_volume = gain.clamp(0.0, 2.0);
        }
    }

    #[inline]
    pub fn category_gain(&self, category: usize) -> f32 {
        self.category_gains.get(category).copied().unwrap_or(1.0)
    }

    pub fn set_category_gain(&mut self, category: usize, gain: f32) {
        if let Some(slot) = self.category_gains.get_mut(category) {
            if gain.is_finite() {
                *slot = gain.clamp(0.0, 2.0);
            }
        }
    }

    /// Host-supplied per-pathway emphasis, 1.0 when absent.
    #[inline]
    pub fn emphasis(&self, pathway: usize) -> f32 {
        self.emphasis.get(pathway).copied().unwrap_or(1.0)
    }

    pub fn set_emphasis(&mut self, table: &[f32]) {
        for (slot, &v) in self.emphasis.iter_mut().zip(table) {
            *slot = if v.is_finite() { v.clamp(0.0, 4.0) } else { 1.0 };
        }
    }

    pub fn set_focus(&mut self, pathway: Option<usize>) {
        match pathway {
            Some(idx) => {
                self.focus.active = Some(idx);
                self.focus.target = 1.0;
            }
            None => {
                self.focus.target = 0.0;
            }
        }
    }

    pub fn focused(&self) -> Option<usize> {
        self.focus.active
    }

    pub fn focus_envelope(&self) -> f32 {
        self.focus.envelope
    }

    /// Gain multiplier for a pathway under the current focus state:
    /// boost for the focused pathway, duck for the rest, crossfaded by
    /// the focus envelope.
    #[inline]
    pub fn focus_multiplier(&self, pathway: usize) -> f32 {
        let f = &self.focus;
        let Some(active) = f.active else { return 1.0 };
        if f.envelope < 1e-4 {
            return 1.0;
        }
        if pathway == active {
            1.0 + (f.cfg.boost - 1.0) * f.envelope
        } else {
            1.0 + (f.cfg.duck - 1.0) * f.envelope
        }
    }

    pub fn mark_sounded(&mut self, pathway: usize) {
        if let Some(slot) = self.fairness.last_sounded.get_mut(pathway) {
            *slot = self.time;
        }
    }

    /// Selection bonus that grows the longer a pathway has been silent,
    /// saturating at the configured weight.
    #[inline]
    pub fn fairness_bonus(&self, pathway: usize) -> f32 {
        let Some(&last) = self.fairness.last_sounded.get(pathway) else { return 0.0 };
        let silent = (self.time - last) as f32;
        (silent / self.fairness.cfg.saturation_time.max(MIN_TIME)).min(1.0)
    }

    pub fn fairness_weight(&self) -> f32 {
        self.fairness.cfg.weight
    }
}
