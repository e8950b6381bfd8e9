use std::f32::consts::{PI, TAU};

use crate::config::{AttackCurve, ReleaseCurve};
use crate::MIN_TIME;

/// Lifecycle of a scheduled voice.
///
/// Unlike a keyboard ADSR there is no external gate: sustain length is
/// decided at spawn time, so a voice runs `Pending -> Attack -> Sustain
/// -> Release -> Done` on its own clock. `Pending` holds the voice
/// silent until its scheduled start, which is how ripple echoes arrive
/// late without the scheduler having to revisit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Pending,
    Attack,
    Sustain,
    Release,
    Done,
}

/// Control-rate envelope: advanced once per block, output held for the
/// block. During sustain a slow sine wobble breathes around 1.0; the
/// output is clamped to [0, 1.2] so a deep wobble can lean over unity
/// without running away.
#[derive(Debug, Clone)]
pub struct VoiceEnvelope {
    stage: EnvelopeStage,
    elapsed: f32,
    start_delay: f32,
    attack: f32,
    sustain: f32,
    release: f32,
    attack_curve: AttackCurve,
    release_curve: ReleaseCurve,
    breath_rate: f32,
    breath_depth: f32,
    breath_phase: f32,
    level: f32,
}

pub(crate) const MAX_LEVEL: f32 = 1.2;

impl VoiceEnvelope {
    pub fn new(
        attack: f32,
        sustain: f32,
        release: f32,
        attack_curve: AttackCurve,
        release_curve: ReleaseCurve,
    ) -> Self {
        Self {
            stage: EnvelopeStage::Pending,
            elapsed: 0.0,
            start_delay: 0.0,
            attack: attack.max(MIN_TIME),
            sustain: sustain.max(0.0),
            release: release.max(MIN_TIME),
            attack_curve,
            release_curve,
            breath_rate: 0.0,
            breath_depth: 0.0,
            breath_phase: 0.0,
            level: 0.0,
        }
    }

    pub fn with_start_delay(mut self, seconds: f32) -> Self {
        self.start_delay = seconds.max(0.0);
        self
    }

    pub fn with_breathing(mut self, rate: f32, depth: f32, phase: f32) -> Self {
        self.breath_rate = rate.max(0.0);
        self.breath_depth = depth.max(0.0);
        self.breath_phase = phase.rem_euclid(TAU);
        self
    }

    /// Advance by one block and return the level for that block.
    pub fn advance(&mut self, dt: f32) -> f32 {
        match self.stage {
            EnvelopeStage::Pending => {
                self.start_delay -= dt;
                if self.start_delay <= 0.0 {
                    self.stage = EnvelopeStage::Attack;
                    self.elapsed = 0.0;
                }
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.elapsed += dt;
                let t = (self.elapsed / self.attack).min(1.0);
                self.level = match self.attack_curve {
                    AttackCurve::Linear => t,
                    AttackCurve::SmoothStep => t * t * (3.0 - 2.0 * t),
                };
                if self.elapsed >= self.attack {
                    self.stage = EnvelopeStage::Sustain;
                    self.elapsed = 0.0;
                    self.level = 1.0;
                }
            }
            EnvelopeStage::Sustain => {
                self.elapsed += dt;
                self.breath_phase += TAU * self.breath_rate * dt;
                if self.breath_phase >= TAU {
                    self.breath_phase -= TAU;
                }
                self.level = 1.0 + self.breath_phase.sin() * self.breath_depth;
                if self.elapsed >= self.sustain {
                    self.stage = EnvelopeStage::Release;
                    self.elapsed = 0.0;
                }
            }
            EnvelopeStage::Release => {
                self.elapsed += dt;
                let t = (self.elapsed / self.release).min(1.0);
                self.level = match self.release_curve {
                    ReleaseCurve::Linear => 1.0 - t,
                    ReleaseCurve::Cosine => 0.5 + 0.5 * (t * PI).cos(),
                    ReleaseCurve::Quadratic => (1.0 - t) * (1.0 - t),
                };
                if self.elapsed >= self.release {
                    self.stage = EnvelopeStage::Done;
                    self.level = 0.0;
                }
            }
            EnvelopeStage::Done => {
                self.level = 0.0;
            }
        }
        self.level = self.level.clamp(0.0, MAX_LEVEL);
        self.level
    }

    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Done
    }

    /// Jump straight to release. Used when a dataset swap needs active
    /// voices gone quickly but without clicks.
    pub fn begin_release(&mut self) {
        match self.stage {
            EnvelopeStage::Pending => {
                self.stage = EnvelopeStage::Done;
                self.level = 0.0;
            }
            EnvelopeStage::Attack | EnvelopeStage::Sustain => {
                self.stage = EnvelopeStage::Release;
                self.elapsed = 0.0;
            }
            EnvelopeStage::Release | EnvelopeStage::Done => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 128.0 / 48_000.0;

    fn env(attack: f32, sustain: f32, release: f32) -> VoiceEnvelope {
        VoiceEnvelope::new(attack, sustain, release, AttackCurve::Linear, ReleaseCurve::Cosine)
    }

    fn run_until(env: &mut VoiceEnvelope, stage: EnvelopeStage, max_blocks: usize) {
        for _ in 0..max_blocks {
            env.advance(DT);
            if env.stage() == stage {
                return;
            }
        }
        panic!("stage {:?} not reached in {} blocks", stage, max_blocks);
    }

    #[test]
    fn walks_the_full_lifecycle_in_order() {
        let mut e = env(0.05, 0.1, 0.05);
        assert_eq!(e.stage(), EnvelopeStage::Pending);
        run_until(&mut e, EnvelopeStage::Attack, 4);
        run_until(&mut e, EnvelopeStage::Sustain, 100);
        run_until(&mut e, EnvelopeStage::Release, 100);
        run_until(&mut e, EnvelopeStage::Done, 100);
        assert_eq!(e.advance(DT), 0.0);
    }

    #[test]
    fn attack_is_monotonic_for_both_curves() {
        for curve in [AttackCurve::Linear, AttackCurve::SmoothStep] {
            let mut e = VoiceEnvelope::new(0.5, 10.0, 1.0, curve, ReleaseCurve::Linear);
            let mut last = 0.0;
            while e.stage() != EnvelopeStage::Sustain {
                let level = e.advance(DT);
                assert!(level >= last, "attack dipped: {} < {}", level, last);
                last = level;
            }
            assert_eq!(last, 1.0);
        }
    }

    #[test]
    fn release_is_monotonic_for_all_curves() {
        for curve in [ReleaseCurve::Linear, ReleaseCurve::Cosine, ReleaseCurve::Quadratic] {
            let mut e = VoiceEnvelope::new(0.01, 0.01, 0.5, AttackCurve::Linear, curve);
            while e.stage() != EnvelopeStage::Release {
                e.advance(DT);
            }
            let mut last = e.level();
            while e.stage() == EnvelopeStage::Release {
                let level = e.advance(DT);
                assert!(level <= last + 1e-6);
                last = level;
            }
            assert_eq!(e.level(), 0.0);
        }
    }

    #[test]
    fn start_delay_holds_the_voice_silent() {
        let mut e = env(0.01, 1.0, 0.1).with_start_delay(0.1);
        let blocks = (0.1 / DT) as usize;
        for _ in 0..blocks {
            assert_eq!(e.advance(DT), 0.0);
        }
        run_until(&mut e, EnvelopeStage::Attack, 4);
    }

    #[test]
    fn breathing_stays_within_the_clamp() {
        let mut e = env(0.01, 30.0, 0.1).with_breathing(0.5, 0.4, 0.0);
        while e.stage() != EnvelopeStage::Sustain {
            e.advance(DT);
        }
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..2000 {
            let level = e.advance(DT);
            min = min.min(level);
            max = max.max(level);
        }
        assert!(max <= MAX_LEVEL);
        assert!(min >= 0.0);
        assert!(max > 1.0 && min < 1.0, "wobble should straddle unity");
    }

    #[test]
    fn begin_release_skips_sustain() {
        let mut e = env(0.01, 100.0, 0.05);
        while e.stage() != EnvelopeStage::Sustain {
            e.advance(DT);
        }
        e.begin_release();
        assert_eq!(e.stage(), EnvelopeStage::Release);
        run_until(&mut e, EnvelopeStage::Done, 100);
    }
}
