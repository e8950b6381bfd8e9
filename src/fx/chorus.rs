use std::f32::consts::TAU;

use crate::config::ChorusConfig;
use crate::dsp::DelayLine;
use crate::rng::RandomSource;

/// Stereo modulated-delay chorus.
///
/// Each voice reads the send bus through its own slowly wobbling delay
/// tap; left and right LFOs run in quadrature-ish offsets so the image
/// widens instead of vibrating. A touch of feedback thickens long
/// tones. Wet level breathes with the activity cycle.
pub struct StereoChorus {
    line_l: DelayLine,
    line_r: DelayLine,
    phases: Vec<(f32, f32)>,
    rates: Vec<f32>,
    base_delay: f32,
    mod_depth: f32,
    feedback: f32,
    wet_mix: f32,
    feedback_l: f32,
    feedback_r: f32,
    sample_rate: f32,
}

impl StereoChorus {
    pub fn new(cfg: &ChorusConfig, sample_rate: f32, rng: &mut dyn RandomSource) -> Self {
        let voices = cfg.voices.clamp(1, 8);
        let base_delay = cfg.base_delay_ms.clamp(1.0, 50.0) / 1000.0 * sample_rate;
        let mod_depth = cfg.mod_depth_ms.clamp(0.0, 20.0) / 1000.0 * sample_rate;
        let capacity_ms = cfg.base_delay_ms.clamp(1.0, 50.0) + cfg.mod_depth_ms.clamp(0.0, 20.0);
        let spread = cfg.stereo_spread.clamp(0.0, 1.0);

        let mut phases = Vec::with_capacity(voices);
        let mut rates = Vec::with_capacity(voices);
        for i in 0..voices {
            let phase = rng.range(0.0, TAU);
            phases.push((phase, phase + spread * TAU * 0.25));
            let rate = cfg.rates.get(i).copied().unwrap_or(0.1 + i as f32 * 0.07);
            rates.push(rate.clamp(0.01, 5.0));
        }

        Self {
            line_l: DelayLine::for_delay_ms(capacity_ms, sample_rate),
            line_r: DelayLine::for_delay_ms(capacity_ms, sample_rate),
            phases,
            rates,
            base_delay,
            mod_depth,
            feedback: cfg.feedback.clamp(0.0, 0.5),
            wet_mix: cfg.wet_mix.clamp(0.0, 1.0),
            feedback_l: 0.0,
            feedback_r: 0.0,
            sample_rate,
        }
    }

    /// Mix `dry` and the chorused send into `out`. `activity` in [0, 1]
    /// opens the wet mix up to its configured level.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        dry_l: &[f32],
        dry_r: &[f32],
        send_l: &[f32],
        send_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
        activity: f32,
    ) {
        let frames = out_l.len();
        let wet_mix = self.wet_mix * (0.5 + 0.5 * activity.clamp(0.0, 1.0));
        let dry_mix = 1.0 - wet_mix * 0.5;
        let voice_norm = 1.0 / self.phases.len() as f32;
        let inv_sr = 1.0 / self.sample_rate;

        for i in 0..frames {
            self.line_l.write(send_l[i] + self.feedback_l * self.feedback);
            self.line_r.write(send_r[i] + self.feedback_r * self.feedback);

            let mut wet_l = 0.0;
            let mut wet_r = 0.0;
            for (v, (phase_l, phase_r)) in self.phases.iter_mut().enumerate() {
                let step = TAU * self.rates[v] * inv_sr;
                *phase_l += step;
                if *phase_l >= TAU {
                    *phase_l -= TAU;
                }
                *phase_r += step;
                if *phase_r >= TAU {
                    *phase_r -= TAU;
                }
                let delay_l = self.base_delay + phase_l.sin() * self.mod_depth;
                let delay_r = self.base_delay + phase_r.sin() * self.mod_depth;
                wet_l += self.line_l.read_interpolated(delay_l.max(1.0));
                wet_r += self.line_r.read_interpolated(delay_r.max(1.0));
            }
            wet_l *= voice_norm;
            wet_r *= voice_norm;
            self.feedback_l = wet_l;
            self.feedback_r = wet_r;

            out_l[i] = dry_l[i] * dry_mix + wet_l * wet_mix;
            out_r[i] = dry_r[i] * dry_mix + wet_r * wet_mix;
        }
    }

    pub fn reset(&mut self) {
        self.line_l.reset();
        self.line_r.reset();
        self.feedback_l = 0.0;
        self.feedback_r = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SmallRngSource;

    const SR: f32 = 48_000.0;
    const BLOCK: usize = 128;

    fn chorus() -> StereoChorus {
        let mut rng = SmallRngSource::seeded(13);
        StereoChorus::new(&ChorusConfig::default(), SR, &mut rng)
    }

    fn run(chorus: &mut StereoChorus, blocks: usize, input: impl Fn(usize) -> f32) -> (f32, f32) {
        let mut peak = 0.0_f32;
        let mut energy = 0.0_f32;
        let mut n = 0usize;
        for _ in 0..blocks {
            let mut dry = [0.0; BLOCK];
            for (i, d) in dry.iter_mut().enumerate() {
                *d = input(n + i);
            }
            n += BLOCK;
            let send = dry;
            let mut out_l = [0.0; BLOCK];
            let mut out_r = [0.0; BLOCK];
            chorus.process(&dry, &dry, &send, &send, &mut out_l, &mut out_r, 1.0);
            for i in 0..BLOCK {
                assert!(out_l[i].is_finite() && out_r[i].is_finite());
                peak = peak.max(out_l[i].abs()).max(out_r[i].abs());
                energy += out_l[i] * out_l[i];
            }
        }
        (peak, energy)
    }

    #[test]
    fn passes_signal_and_stays_stable() {
        let mut c = chorus();
        let (peak, energy) = run(&mut c, 2000, |n| (n as f32 * 0.04).sin() * 0.5);
        assert!(energy > 0.0);
        // Dry + wet of a 0.5 sine must stay well below hard clip.
        assert!(peak < 1.5);
    }

    #[test]
    fn wet_tail_rings_after_input_stops() {
        let mut c = chorus();
        run(&mut c, 100, |n| (n as f32 * 0.04).sin() * 0.5);
        let (peak, _) = run(&mut c, 2, |_| 0.0);
        assert!(peak > 0.0, "delay lines should still hold signal");
    }

    #[test]
    fn silence_in_silence_out() {
        let mut c = chorus();
        let (peak, _) = run(&mut c, 50, |_| 0.0);
        assert_eq!(peak, 0.0);
    }
}
