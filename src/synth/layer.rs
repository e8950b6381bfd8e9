use std::f32::consts::TAU;

use crate::config::LayerConfig;
use crate::context::SharedContext;
use crate::dsp::{constant_power_pan, phase_increment, VoiceEnvelope};
use crate::fx::BusBuffers;
use crate::modulation::ModulationSystem;
use crate::pathway::PathwaySet;
use crate::rng::RandomSource;
use crate::synth::voice::Voice;
use crate::synth::select_pathway;

/// Amplitudes below this are treated as silence: the voice still ages
/// but its oscillator is skipped.
const AUDIBLE_THRESHOLD: f32 = 1e-4;

const AMP_SMOOTHING_TAU: f32 = 0.12;
const PAN_SMOOTHING_TAU: f32 = 0.25;

/// One population of voices sharing envelope character and mix levels.
///
/// A layer spawns organically from its accumulator (or not at all, for
/// the ripple-fed layer), advances every voice at control rate, retires
/// the finished ones and renders the rest into the shared buses. The
/// voice pool is bounded by `max_voices`; a full layer silently
/// declines to spawn.
pub struct VoiceLayer {
    cfg: LayerConfig,
    voices: Vec<Voice>,
    spawn_accumulator: f32,
}

impl VoiceLayer {
    pub fn new(cfg: LayerConfig) -> Self {
        let cfg = sanitize(cfg);
        let voices = Vec::with_capacity(cfg.max_voices);
        Self { cfg, voices, spawn_accumulator: 0.0 }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.cfg
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn is_voiced(&self, pathway: usize) -> bool {
        self.voices.iter().any(|v| v.pathway == pathway)
    }

    /// Advance envelopes, retire finished voices, then run this block's
    /// spawn attempts. Spawned pathway indices are appended to
    /// `spawned` so the engine can seed the ripple cascade.
    pub fn update(
        &mut self,
        ctx: &mut SharedContext,
        set: &PathwaySet,
        rng: &mut dyn RandomSource,
        spawned: &mut Vec<usize>,
    ) {
        let dt = ctx.dt();
        for voice in &mut self.voices {
            voice.envelope.advance(dt);
        }
        self.voices.retain(|v| !v.is_finished());

        if self.cfg.spawn_rate <= 0.0 || set.is_empty() {
            return;
        }
        let jitter = 1.0 + self.cfg.spawn_variation * (rng.next_f32() - 0.5) * 2.0;
        self.spawn_accumulator += self.cfg.spawn_rate * jitter.max(0.0) * dt;
        while self.spawn_accumulator >= 1.0 {
            self.spawn_accumulator -= 1.0;
            if self.voices.len() >= self.cfg.max_voices {
                continue;
            }
            let focused = ctx.focused();
            let pick = select_pathway(
                set,
                ctx,
                &self.cfg.weights,
                |idx| self.is_voiced(idx) || focused == Some(idx),
                rng,
            );
            if let Some(idx) = pick {
                if self.spawn_pathway(idx, 1.0, 0.0, ctx, set, rng) {
                    spawned.push(idx);
                }
            }
        }
    }

    /// Start a voice on a specific pathway. Declines (returning false)
    /// when the pool is full or the pathway already sounds here.
    pub fn spawn_pathway(
        &mut self,
        pathway: usize,
        strength: f32,
        start_delay: f32,
        ctx: &mut SharedContext,
        set: &PathwaySet,
        rng: &mut dyn RandomSource,
    ) -> bool {
        if self.voices.len() >= self.cfg.max_voices || self.is_voiced(pathway) {
            return false;
        }
        let p = set.get(pathway);

        let attack = rng.range(self.cfg.attack.0, self.cfg.attack.1);
        let mut sustain = rng.range(self.cfg.sustain.0, self.cfg.sustain.1);
        sustain *= 1.0 + p.consonance.min(1.0) * self.cfg.sustain_consonance_bonus;
        let release = rng.range(self.cfg.release.0, self.cfg.release.1);

        let b = &self.cfg.breath;
        let breath_rate = rng.range(b.min_rate, b.max_rate);
        // Stable (abundant) pathways breathe shallower.
        let stability = p.abundance.sqrt();
        let breath_depth = b.min_depth + (1.0 - stability) * (b.max_depth - b.min_depth);

        let envelope = VoiceEnvelope::new(
            attack,
            sustain,
            release,
            self.cfg.attack_curve,
            self.cfg.release_curve,
        )
        .with_start_delay(start_delay)
        .with_breathing(breath_rate, breath_depth, rng.range(0.0, TAU));

        let pan_offset = rng.range(-self.cfg.pan_spread * 0.5, self.cfg.pan_spread * 0.5);
        let frequency = ctx.fundamental() * p.ratio;
        self.voices.push(Voice::new(
            pathway,
            frequency,
            rng.range(0.0, TAU),
            pan_offset,
            strength.clamp(0.0, 1.0),
            envelope,
        ));
        ctx.mark_sounded(pathway);
        true
    }

    /// Render every voice into the buses. Amplitude and pan are
    /// computed once per block and smoothed; inner loops are pure
    /// oscillator math.
    pub fn render(
        &mut self,
        ctx: &SharedContext,
        set: &PathwaySet,
        modsys: &ModulationSystem,
        buses: &mut BusBuffers,
        frames: usize,
    ) {
        let dt = ctx.dt();
        let sample_rate = ctx.sample_rate();
        let k_amp = 1.0 - (-dt / AMP_SMOOTHING_TAU).exp();
        let k_pan = 1.0 - (-dt / PAN_SMOOTHING_TAU).exp();
        let sends = self.cfg.sends;

        for voice in &mut self.voices {
            let p = set.get(voice.pathway);
            let target_amp = p.base_volume
                * voice.strength
                * voice.envelope.level()
                * modsys.global_level()
                * modsys.traveling_wave(p.log_ratio)
                * modsys.habituation_gain(&voice.habituation, p.consonance)
                * ctx.category_gain(p.category)
                * ctx.focus_multiplier(voice.pathway)
                * ctx.emphasis(voice.pathway)
                * self.cfg.mix_level
                * ctx.master_volume();

            voice.smoothed_amp += (target_amp - voice.smoothed_amp) * k_amp;
            let pan_target =
                (modsys.category_pan(p.category) + voice.pan_offset).clamp(-1.0, 1.0);
            voice.smoothed_pan += (pan_target - voice.smoothed_pan) * k_pan;

            let audible = target_amp > AUDIBLE_THRESHOLD;
            modsys.advance_habituation(&mut voice.habituation, dt, audible);
            if !audible && voice.smoothed_amp <= AUDIBLE_THRESHOLD {
                continue;
            }

            let amp = voice.smoothed_amp;
            let (gain_l, gain_r) = constant_power_pan(voice.smoothed_pan);
            let inc = phase_increment(voice.frequency, sample_rate);
            for i in 0..frames {
                let s = voice.osc.next_harmonics(inc, &self.cfg.harmonics) * amp;
                let l = s * gain_l;
                let r = s * gain_r;
                buses.dry_l[i] += l;
                buses.dry_r[i] += r;
                buses.chorus_l[i] += l * sends.chorus;
                buses.chorus_r[i] += r * sends.chorus;
                buses.delay_l[i] += l * sends.delay;
                buses.delay_r[i] += r * sends.delay;
                buses.reverb_l[i] += l * sends.reverb;
                buses.reverb_r[i] += r * sends.reverb;
            }
        }
    }

    /// Retune active voices after a fundamental change.
    pub fn refresh_frequencies(&mut self, ctx: &SharedContext, set: &PathwaySet) {
        for voice in &mut self.voices {
            voice.frequency = ctx.fundamental() * set.get(voice.pathway).ratio;
        }
    }

    /// Send everything into release, keeping tails click-free.
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.envelope.begin_release();
        }
    }

    /// Drop every voice immediately. Only for dataset swaps where the
    /// old pathway indices stop meaning anything.
    pub fn clear(&mut self) {
        self.voices.clear();
        self.spawn_accumulator = 0.0;
    }
}

fn sanitize(mut cfg: LayerConfig) -> LayerConfig {
    let order = |r: &mut (f32, f32)| {
        r.0 = r.0.max(0.0);
        r.1 = r.1.max(r.0);
    };
    order(&mut cfg.attack);
    order(&mut cfg.sustain);
    order(&mut cfg.release);
    cfg.max_voices = cfg.max_voices.max(1);
    cfg.spawn_rate = cfg.spawn_rate.max(0.0);
    cfg.spawn_variation = cfg.spawn_variation.clamp(0.0, 1.0);
    cfg.mix_level = cfg.mix_level.clamp(0.0, 1.0);
    cfg.pan_spread = cfg.pan_spread.clamp(0.0, 2.0);
    cfg.sends.chorus = cfg.sends.chorus.clamp(0.0, 1.0);
    cfg.sends.delay = cfg.sends.delay.clamp(0.0, 1.0);
    cfg.sends.reverb = cfg.sends.reverb.clamp(0.0, 1.0);
    if cfg.harmonics.is_empty() {
        cfg.harmonics = vec![crate::config::Partial { multiple: 1, amplitude: 1.0 }];
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FairnessConfig, FocusConfig, ModulationConfig, VolumeConfig};
    use crate::dsp::EnvelopeStage;
    use crate::pathway::{ConsonanceCurve, PathwayRecord};
    use crate::rng::{ConstSource, SmallRngSource};

    const BLOCK: usize = 128;

    fn record(id: &str, n: u32, d: u32, abundance: f32) -> PathwayRecord {
        PathwayRecord {
            id: id.into(),
            numerator: n,
            denominator: d,
            category: "core".into(),
            subcategory: None,
            abundance,
        }
    }

    struct Fixture {
        set: PathwaySet,
        ctx: SharedContext,
        modsys: ModulationSystem,
    }

    fn fixture(records: &[PathwayRecord]) -> Fixture {
        let set = PathwaySet::build(
            records,
            &VolumeConfig::default(),
            ConsonanceCurve::InverseLog,
        );
        let mut ctx = SharedContext::new(
            48_000.0,
            330.0,
            0.5,
            FocusConfig::default(),
            FairnessConfig::default(),
        );
        ctx.reset_for_set(set.len(), set.category_count());
        let mut rng = SmallRngSource::seeded(5);
        let modsys = ModulationSystem::new(
            ModulationConfig::default(),
            set.category_count(),
            &mut rng,
        );
        Fixture { set, ctx, modsys }
    }

    fn step(fx: &mut Fixture, layer: &mut VoiceLayer, rng: &mut dyn RandomSource) -> Vec<usize> {
        let mut spawned = Vec::new();
        fx.ctx.advance(BLOCK);
        fx.modsys.advance(fx.ctx.dt());
        layer.update(&mut fx.ctx, &fx.set, rng, &mut spawned);
        spawned
    }

    #[test]
    fn voice_count_never_exceeds_cap() {
        let mut fx = fixture(&[
            record("a", 1, 1, 1.0),
            record("b", 3, 2, 0.8),
            record("c", 5, 4, 0.6),
            record("d", 2, 1, 0.4),
        ]);
        let mut cfg = LayerConfig::midground();
        cfg.max_voices = 2;
        cfg.spawn_rate = 50.0;
        let mut layer = VoiceLayer::new(cfg);
        let mut rng = SmallRngSource::seeded(17);
        for _ in 0..2000 {
            step(&mut fx, &mut layer, &mut rng);
            assert!(layer.active_count() <= 2);
        }
        assert_eq!(layer.active_count(), 2);
    }

    #[test]
    fn no_duplicate_pathways_within_a_layer() {
        let mut fx = fixture(&[record("a", 1, 1, 1.0), record("b", 3, 2, 0.8)]);
        let mut cfg = LayerConfig::midground();
        cfg.spawn_rate = 50.0;
        cfg.sustain = (100.0, 100.0);
        let mut layer = VoiceLayer::new(cfg);
        let mut rng = SmallRngSource::seeded(23);
        for _ in 0..500 {
            step(&mut fx, &mut layer, &mut rng);
        }
        assert_eq!(layer.active_count(), 2);
        let mut seen = [0usize; 2];
        for v in layer.voices() {
            seen[v.pathway()] += 1;
        }
        assert_eq!(seen, [1, 1]);
    }

    #[test]
    fn deterministic_scheduling_prefers_the_weighted_winner() {
        // "a" is the unison with full abundance; with a draw pinned at
        // zero it must win, and with one slot "b" must never sound.
        let mut fx = fixture(&[record("a", 1, 1, 1.0), record("b", 7, 4, 0.1)]);
        let mut cfg = LayerConfig::midground();
        cfg.max_voices = 1;
        cfg.spawn_rate = 20.0;
        cfg.attack = (0.05, 0.05);
        cfg.sustain = (50.0, 50.0);
        let mut layer = VoiceLayer::new(cfg);
        let mut rng = ConstSource(0.0);
        let a = fx.set.index_of("a").unwrap();
        let b = fx.set.index_of("b").unwrap();
        for _ in 0..400 {
            step(&mut fx, &mut layer, &mut rng);
            assert!(!layer.is_voiced(b));
        }
        assert!(layer.is_voiced(a));
        assert_eq!(layer.voices()[0].stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn finished_voices_are_retired() {
        let mut fx = fixture(&[record("a", 1, 1, 1.0)]);
        let mut cfg = LayerConfig::sparkle();
        cfg.spawn_rate = 0.0;
        cfg.attack = (0.01, 0.01);
        cfg.sustain = (0.02, 0.02);
        cfg.release = (0.02, 0.02);
        cfg.sustain_consonance_bonus = 0.0;
        let mut layer = VoiceLayer::new(cfg);
        let mut rng = SmallRngSource::seeded(2);
        fx.ctx.advance(BLOCK);
        assert!(layer.spawn_pathway(0, 1.0, 0.0, &mut fx.ctx, &fx.set, &mut rng));
        assert_eq!(layer.active_count(), 1);
        for _ in 0..100 {
            step(&mut fx, &mut layer, &mut rng);
        }
        assert_eq!(layer.active_count(), 0);
    }

    #[test]
    fn spawning_marks_fairness() {
        let mut fx = fixture(&[record("a", 1, 1, 1.0), record("b", 3, 2, 0.5)]);
        let mut layer = VoiceLayer::new(LayerConfig::midground());
        let mut rng = SmallRngSource::seeded(2);
        for _ in 0..1000 {
            fx.ctx.advance(BLOCK);
        }
        let before = fx.ctx.fairness_bonus(0);
        assert!(before > 0.0);
        assert!(layer.spawn_pathway(0, 1.0, 0.0, &mut fx.ctx, &fx.set, &mut rng));
        assert_eq!(fx.ctx.fairness_bonus(0), 0.0);
    }

    #[test]
    fn render_mixes_into_all_buses() {
        let mut fx = fixture(&[record("a", 1, 1, 1.0)]);
        let mut cfg = LayerConfig::midground();
        cfg.attack = (0.01, 0.01);
        cfg.sends = crate::config::SendLevels { chorus: 0.5, delay: 0.5, reverb: 0.5 };
        let mut layer = VoiceLayer::new(cfg);
        let mut rng = SmallRngSource::seeded(31);
        fx.ctx.advance(BLOCK);
        assert!(layer.spawn_pathway(0, 1.0, 0.0, &mut fx.ctx, &fx.set, &mut rng));
        let mut buses = BusBuffers::new();
        // Let the attack and the amp smoother settle.
        for _ in 0..200 {
            step(&mut fx, &mut layer, &mut rng);
            buses.clear(BLOCK);
            layer.render(&fx.ctx, &fx.set, &fx.modsys, &mut buses, BLOCK);
        }
        let energy = |b: &[f32]| b[..BLOCK].iter().map(|s| s * s).sum::<f32>();
        assert!(energy(&buses.dry_l) > 0.0);
        assert!(energy(&buses.dry_r) > 0.0);
        assert!(energy(&buses.chorus_l) > 0.0);
        assert!(energy(&buses.delay_l) > 0.0);
        assert!(energy(&buses.reverb_l) > 0.0);
    }
}
