use std::f32::consts::TAU;

use crate::config::MultiTapConfig;
use crate::dsp::{DelayLine, OnePoleHighpass, OnePoleLowpass};

struct Tap {
    delay_samples: f32,
    level: f32,
    gain_l: f32,
    gain_r: f32,
}

/// Multi-tap stereo delay with filtered, cross-fed feedback.
///
/// Each tap has its own time, level and pan weighting; tap times wobble
/// together under a slow LFO so repeats drift organically. The feedback
/// path runs through a lowpass and a DC-blocking highpass, and a slice
/// of each channel's feedback leaks into the opposite line to spread
/// the repeats.
pub struct MultiTapDelay {
    line_l: DelayLine,
    line_r: DelayLine,
    taps: Vec<Tap>,
    lp_l: OnePoleLowpass,
    lp_r: OnePoleLowpass,
    hp_l: OnePoleHighpass,
    hp_r: OnePoleHighpass,
    feedback: f32,
    cross_feedback: f32,
    wet_mix: f32,
    mod_phase: f32,
    mod_step: f32,
    mod_depth: f32,
    fb_l: f32,
    fb_r: f32,
}

impl MultiTapDelay {
    pub fn new(cfg: &MultiTapConfig, sample_rate: f32) -> Self {
        let mod_depth = cfg.mod_depth_ms.clamp(0.0, 10.0) / 1000.0 * sample_rate;
        let max_tap_ms = cfg
            .taps
            .iter()
            .map(|t| t.time_ms)
            .fold(0.0_f32, f32::max)
            .clamp(1.0, 5000.0);
        let taps = cfg
            .taps
            .iter()
            .map(|t| {
                let pan = t.pan.clamp(-1.0, 1.0);
                Tap {
                    delay_samples: t.time_ms.clamp(1.0, 5000.0) / 1000.0 * sample_rate,
                    level: t.level.clamp(0.0, 1.0),
                    gain_l: (1.0 - pan).min(1.0),
                    gain_r: (1.0 + pan).min(1.0),
                }
            })
            .collect();

        Self {
            line_l: DelayLine::for_delay_ms(max_tap_ms + cfg.mod_depth_ms.max(0.0), sample_rate),
            line_r: DelayLine::for_delay_ms(max_tap_ms + cfg.mod_depth_ms.max(0.0), sample_rate),
            taps,
            lp_l: OnePoleLowpass::new(cfg.highcut.clamp(0.01, 1.0)),
            lp_r: OnePoleLowpass::new(cfg.highcut.clamp(0.01, 1.0)),
            hp_l: OnePoleHighpass::new(cfg.lowcut.clamp(0.001, 0.5)),
            hp_r: OnePoleHighpass::new(cfg.lowcut.clamp(0.001, 0.5)),
            feedback: cfg.feedback.clamp(0.0, 0.6),
            cross_feedback: cfg.cross_feedback.clamp(0.0, 0.4),
            wet_mix: cfg.wet_mix.clamp(0.0, 1.0),
            mod_phase: 0.0,
            mod_step: TAU * cfg.mod_rate.clamp(0.0, 2.0) / sample_rate,
            mod_depth,
            fb_l: 0.0,
            fb_r: 0.0,
        }
    }

    /// Add the delayed send on top of `out` (which already carries the
    /// dry mix).
    pub fn process(
        &mut self,
        send_l: &[f32],
        send_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) {
        let frames = out_l.len();
        for i in 0..frames {
            self.line_l
                .write(send_l[i] + self.fb_l * self.feedback + self.fb_r * self.cross_feedback);
            self.line_r
                .write(send_r[i] + self.fb_r * self.feedback + self.fb_l * self.cross_feedback);

            self.mod_phase += self.mod_step;
            if self.mod_phase >= TAU {
                self.mod_phase -= TAU;
            }
            let wobble = self.mod_phase.sin() * self.mod_depth;

            let mut wet_l = 0.0;
            let mut wet_r = 0.0;
            for tap in &self.taps {
                let delay = (tap.delay_samples + wobble).max(1.0);
                wet_l += self.line_l.read_interpolated(delay) * tap.level * tap.gain_l;
                wet_r += self.line_r.read_interpolated(delay) * tap.level * tap.gain_r;
            }

            // Tone-shape the feedback path only; the wet output keeps
            // its top end.
            self.fb_l = self.hp_l.next(self.lp_l.next(wet_l));
            self.fb_r = self.hp_r.next(self.lp_r.next(wet_r));

            out_l[i] += wet_l * self.wet_mix;
            out_r[i] += wet_r * self.wet_mix;
        }
    }

    pub fn reset(&mut self) {
        self.line_l.reset();
        self.line_r.reset();
        self.lp_l.reset();
        self.lp_r.reset();
        self.hp_l.reset();
        self.hp_r.reset();
        self.fb_l = 0.0;
        self.fb_r = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;
    const BLOCK: usize = 256;

    #[test]
    fn first_echo_lands_at_the_tap_time() {
        let mut cfg = MultiTapConfig::default();
        cfg.taps.truncate(1);
        cfg.taps[0].time_ms = 100.0;
        cfg.taps[0].pan = 0.0;
        cfg.mod_depth_ms = 0.0;
        let mut delay = MultiTapDelay::new(&cfg, SR);

        let tap_samples = (0.1 * SR) as usize;
        let mut impulse_sent = false;
        let mut first_echo = None;
        let mut n = 0usize;
        'outer: for _ in 0..40 {
            let mut send = [0.0; BLOCK];
            if !impulse_sent {
                send[0] = 1.0;
                impulse_sent = true;
            }
            let mut out_l = [0.0; BLOCK];
            let mut out_r = [0.0; BLOCK];
            delay.process(&send, &send, &mut out_l, &mut out_r);
            for i in 0..BLOCK {
                if out_l[i].abs() > 1e-3 {
                    first_echo = Some(n + i);
                    break 'outer;
                }
            }
            n += BLOCK;
        }
        let echo = first_echo.expect("echo never arrived");
        assert!(
            (echo as i64 - tap_samples as i64).abs() <= 2,
            "echo at {echo}, expected ~{tap_samples}"
        );
    }

    #[test]
    fn feedback_decays_instead_of_running_away() {
        let mut delay = MultiTapDelay::new(&MultiTapConfig::default(), SR);
        // Ten seconds of silence after a loud burst.
        let mut send = [0.0; BLOCK];
        send.iter_mut().for_each(|s| *s = 1.0);
        let mut out_l = [0.0; BLOCK];
        let mut out_r = [0.0; BLOCK];
        delay.process(&send, &send, &mut out_l, &mut out_r);

        let silent = [0.0; BLOCK];
        let mut late_peak = 0.0_f32;
        let blocks = (10.0 * SR) as usize / BLOCK;
        for b in 0..blocks {
            out_l.fill(0.0);
            out_r.fill(0.0);
            delay.process(&silent, &silent, &mut out_l, &mut out_r);
            if b > blocks - 20 {
                for i in 0..BLOCK {
                    late_peak = late_peak.max(out_l[i].abs());
                }
            }
            for i in 0..BLOCK {
                assert!(out_l[i].is_finite());
            }
        }
        assert!(late_peak < 0.01, "late peak {late_peak}");
    }

    #[test]
    fn tap_pans_weight_the_channels() {
        let mut cfg = MultiTapConfig::default();
        cfg.taps.truncate(1);
        cfg.taps[0].pan = -1.0;
        cfg.mod_depth_ms = 0.0;
        cfg.feedback = 0.0;
        cfg.cross_feedback = 0.0;
        let mut delay = MultiTapDelay::new(&cfg, SR);
        let mut send = [0.0; BLOCK];
        send[0] = 1.0;
        let silent = [0.0; BLOCK];
        let mut energy_l = 0.0_f32;
        let mut energy_r = 0.0_f32;
        for b in 0..100 {
            let s = if b == 0 { &send } else { &silent };
            let mut out_l = [0.0; BLOCK];
            let mut out_r = [0.0; BLOCK];
            delay.process(s, s, &mut out_l, &mut out_r);
            energy_l += out_l.iter().map(|x| x * x).sum::<f32>();
            energy_r += out_r.iter().map(|x| x * x).sum::<f32>();
        }
        assert!(energy_l > 0.0);
        assert!(energy_r < energy_l * 1e-6);
    }
}
