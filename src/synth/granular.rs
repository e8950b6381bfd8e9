use std::f32::consts::PI;

use crate::config::GranularConfig;
use crate::context::SharedContext;
use crate::dsp::{constant_power_pan, phase_increment, PhaseOsc};
use crate::fx::BusBuffers;
use crate::modulation::ModulationSystem;
use crate::pathway::PathwaySet;
use crate::rng::RandomSource;
use crate::synth::select_pathway;

struct Grain {
    pathway: usize,
    osc: PhaseOsc,
    frequency: f32,
    amplitude: f32,
    pan: f32,
    elapsed: f32,
    duration: f32,
}

/// Shimmering micro-grain texture over the dataset.
///
/// Grains are spawned from a density accumulator (grains per second,
/// scaled by the activity cycle), live for a few milliseconds under a
/// cosine-shaped window and pan according to their pitch relative to a
/// drifting "cloud center". The center wanders under a random current,
/// pulled home toward the fundamental, so the texture slowly leans
/// across the stereo field and back.
pub struct GranularEngine {
    cfg: GranularConfig,
    grains: Vec<Grain>,
    accumulator: f32,
    cloud_center: f32,
    momentum: f32,
    current_angle: f32,
}

impl GranularEngine {
    pub fn new(cfg: GranularConfig) -> Self {
        let cfg = sanitize(cfg);
        let grains = Vec::with_capacity(cfg.max_grains);
        Self {
            cfg,
            grains,
            accumulator: 0.0,
            cloud_center: 1.0,
            momentum: 0.0,
            current_angle: 0.0,
        }
    }

    pub fn grain_count(&self) -> usize {
        self.grains.len()
    }

    pub fn cloud_center(&self) -> f32 {
        self.cloud_center
    }

    pub fn set_density(&mut self, min: f32, max: f32) {
        self.cfg.min_density = min.clamp(0.0, 2000.0);
        self.cfg.max_density = max.clamp(self.cfg.min_density, 2000.0);
    }

    pub fn clear(&mut self) {
        self.grains.clear();
        self.accumulator = 0.0;
    }

    /// One control-rate step: drift the cloud, retire dead grains,
    /// spawn this block's quota.
    pub fn update(
        &mut self,
        ctx: &mut SharedContext,
        set: &PathwaySet,
        modsys: &ModulationSystem,
        rng: &mut dyn RandomSource,
    ) {
        let dt = ctx.dt();
        self.drift_cloud(dt, rng);

        for grain in &mut self.grains {
            grain.elapsed += dt;
        }
        self.grains.retain(|g| g.elapsed < g.duration);

        if set.is_empty() {
            return;
        }
        let density = self.cfg.min_density
            + (self.cfg.max_density - self.cfg.min_density) * modsys.activity();
        self.accumulator += density * dt;
        while self.accumulator >= 1.0 {
            self.accumulator -= 1.0;
            if self.grains.len() >= self.cfg.max_grains {
                continue;
            }
            self.spawn_grain(ctx, set, rng);
        }
    }

    fn drift_cloud(&mut self, dt: f32, rng: &mut dyn RandomSource) {
        // Random current steering, home gravity, light damping.
        self.current_angle += (rng.next_f32() - 0.5) * self.cfg.current_change_rate;
        self.momentum += self.current_angle.sin() * self.cfg.current_strength * dt;
        self.momentum -= self.cloud_center.log2() * self.cfg.home_gravity * dt * 0.5;
        self.momentum *= 0.98;
        self.cloud_center *= (self.momentum * self.cfg.drift_speed).exp2();
        self.cloud_center = self
            .cloud_center
            .clamp(self.cfg.center_bounds.0, self.cfg.center_bounds.1);
    }

    fn spawn_grain(
        &mut self,
        ctx: &mut SharedContext,
        set: &PathwaySet,
        rng: &mut dyn RandomSource,
    ) {
        let Some(idx) = select_pathway(set, ctx, &self.cfg.weights, |_| false, rng) else {
            return;
        };
        let p = set.get(idx);
        let detune = 1.0 + (rng.next_f32() - 0.5) * 2.0 * self.cfg.detune;
        let frequency = ctx.fundamental() * p.ratio * detune;
        // Pan by pitch offset from the cloud center.
        let offset = (p.ratio / self.cloud_center).log2();
        let pan = (offset * 2.0).tanh() * self.cfg.stereo_width;
        let amplitude =
            p.base_volume * rng.range(self.cfg.amplitude.0, self.cfg.amplitude.1);
        self.grains.push(Grain {
            pathway: idx,
            osc: PhaseOsc::with_phase(rng.range(0.0, std::f32::consts::TAU)),
            frequency,
            amplitude,
            pan,
            elapsed: 0.0,
            duration: rng.range(self.cfg.duration.0, self.cfg.duration.1),
        });
    }

    pub fn render(
        &mut self,
        ctx: &SharedContext,
        set: &PathwaySet,
        modsys: &ModulationSystem,
        buses: &mut BusBuffers,
        frames: usize,
    ) {
        let sample_rate = ctx.sample_rate();
        let inv_sr = 1.0 / sample_rate;
        let reverb_send = self.cfg.reverb_send;

        for grain in &mut self.grains {
            let p = set.get(grain.pathway);
            let gain = grain.amplitude
                * self.cfg.mix_level
                * modsys.global_level()
                * ctx.category_gain(p.category)
                * ctx.focus_multiplier(grain.pathway)
                * ctx.emphasis(grain.pathway)
                * ctx.master_volume();
            if gain <= 1e-5 {
                continue;
            }
            let (gain_l, gain_r) = constant_power_pan(grain.pan);
            let inc = phase_increment(grain.frequency, sample_rate);
            let inv_dur = 1.0 / grain.duration;
            let mut t = grain.elapsed;
            for i in 0..frames {
                let progress = (t * inv_dur).min(1.0);
                let env = window(progress, self.cfg.attack_frac, self.cfg.release_frac);
                let s = grain.osc.next(inc) * env * gain;
                buses.dry_l[i] += s * gain_l;
                buses.dry_r[i] += s * gain_r;
                buses.reverb_l[i] += s * gain_l * reverb_send;
                buses.reverb_r[i] += s * gain_r * reverb_send;
                t += inv_sr;
            }
        }
    }
}

/// Linear attack/release window reshaped by a half-cosine, zero at both
/// ends and maximally smooth in the middle.
#[inline]
fn window(progress: f32, attack_frac: f32, release_frac: f32) -> f32 {
    let linear = if progress < attack_frac {
        progress / attack_frac
    } else if progress > 1.0 - release_frac {
        (1.0 - progress) / release_frac
    } else {
        1.0
    };
    0.5 - 0.5 * (linear.clamp(0.0, 1.0) * PI).cos()
}

fn sanitize(mut cfg: GranularConfig) -> GranularConfig {
    cfg.max_grains = cfg.max_grains.max(1);
    cfg.min_density = cfg.min_density.max(0.0);
    cfg.max_density = cfg.max_density.max(cfg.min_density);
    cfg.duration.0 = cfg.duration.0.max(0.0005);
    cfg.duration.1 = cfg.duration.1.max(cfg.duration.0);
    cfg.attack_frac = cfg.attack_frac.clamp(0.01, 0.5);
    cfg.release_frac = cfg.release_frac.clamp(0.01, 0.5);
    cfg.stereo_width = cfg.stereo_width.clamp(0.0, 1.0);
    cfg.mix_level = cfg.mix_level.clamp(0.0, 1.0);
    cfg.reverb_send = cfg.reverb_send.clamp(0.0, 1.0);
    cfg.center_bounds.0 = cfg.center_bounds.0.max(0.01);
    cfg.center_bounds.1 = cfg.center_bounds.1.max(cfg.center_bounds.0);
    cfg
}
