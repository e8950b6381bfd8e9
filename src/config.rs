//! Engine configuration.
//!
//! Everything tunable lives here as plain data. Components copy (and
//! clamp) the values they need at construction time; nothing in the
//! render path reads config structs through shared references.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pathway::ConsonanceCurve;

/// Maps normalized abundance to a per-pathway base volume.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// Exponent applied to normalized abundance. Values above 1 push
    /// rare pathways down toward the floor; below 1 lifts them.
    pub exponent: f32,
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self { exponent: 1.5, floor: 0.02, ceiling: 1.0 }
    }
}

impl VolumeConfig {
    pub fn base_volume(&self, abundance: f32) -> f32 {
        let shaped = abundance.clamp(0.0, 1.0).powf(self.exponent.max(0.01));
        (self.floor + (self.ceiling - self.floor) * shaped).clamp(0.0, self.ceiling.max(self.floor))
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct FocusConfig {
    /// Linear gain applied to the focused pathway at full envelope.
    pub boost: f32,
    /// Linear gain applied to everything else at full envelope.
    pub duck: f32,
    pub attack_time: f32,
    pub release_time: f32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self { boost: 2.2, duck: 0.45, attack_time: 0.35, release_time: 0.7 }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct FairnessConfig {
    /// Weight of the fairness bonus in voice selection.
    pub weight: f32,
    /// Seconds of silence after which the bonus saturates at 1.
    pub saturation_time: f32,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self { weight: 0.3, saturation_time: 30.0 }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct LfoConfig {
    pub rate: f32,
    pub depth: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct HabituationConfig {
    /// Seconds of sustained activity before fatigue starts to build.
    pub onset_time: f32,
    /// Fatigue accumulation rate per second once past onset.
    pub rate: f32,
    /// Maximum gain reduction, in [0, 1).
    pub max_reduction: f32,
    /// How strongly consonant voices resist fatigue.
    pub consonance_bias: f32,
    /// Fatigue recovery rate per second while a pathway is silent.
    pub recovery_rate: f32,
}

impl Default for HabituationConfig {
    fn default() -> Self {
        Self {
            onset_time: 4.0,
            rate: 0.08,
            max_reduction: 0.45,
            consonance_bias: 0.6,
            recovery_rate: 0.15,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct ModulationConfig {
    /// Global breathing LFOs; their unipolar outputs multiply together.
    pub global_lfos: Vec<LfoConfig>,
    /// Traveling amplitude wave across pitch space.
    pub peristalsis_rate: f32,
    pub peristalsis_depth: f32,
    pub wave_spread: f32,
    /// Per-category pan drift.
    pub pan_range: f32,
    pub pan_drift_rate: f32,
    pub pan_smoothing_tau: f32,
    /// Slow activity cycle in [0, 1] that scales ripple probability and
    /// effect wetness.
    pub activity_rate: f32,
    pub habituation: HabituationConfig,
}

impl Default for ModulationConfig {
    fn default() -> Self {
        Self {
            global_lfos: vec![
                LfoConfig { rate: 0.02, depth: 0.03 },
                LfoConfig { rate: 0.067, depth: 0.04 },
                LfoConfig { rate: 0.15, depth: 0.02 },
            ],
            peristalsis_rate: 0.05,
            peristalsis_depth: 0.12,
            wave_spread: 1.5,
            pan_range: 0.5,
            pan_drift_rate: 0.012,
            pan_smoothing_tau: 0.35,
            activity_rate: 1.0 / 60.0,
            habituation: HabituationConfig::default(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub enum AttackCurve {
    Linear,
    SmoothStep,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub enum ReleaseCurve {
    Linear,
    Cosine,
    Quadratic,
}

/// Relative weights for the three voice-selection terms.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct SelectionWeights {
    pub consonance: f32,
    pub abundance: f32,
    pub fairness: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct BreathConfig {
    pub min_rate: f32,
    pub max_rate: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct SendLevels {
    pub chorus: f32,
    pub delay: f32,
    pub reverb: f32,
}

/// One additive partial of a voice's waveform. `multiple` is an integer
/// harmonic so the waveform stays continuous across phase wrap.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Partial {
    pub multiple: u32,
    pub amplitude: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub max_voices: usize,
    /// Spawn attempts per second; 0 means the layer is only fed
    /// externally (e.g. by the ripple cascade).
    pub spawn_rate: f32,
    pub spawn_variation: f32,
    pub attack: (f32, f32),
    pub sustain: (f32, f32),
    pub release: (f32, f32),
    pub attack_curve: AttackCurve,
    pub release_curve: ReleaseCurve,
    /// Fractional sustain extension at full consonance.
    pub sustain_consonance_bonus: f32,
    pub weights: SelectionWeights,
    pub breath: BreathConfig,
    pub harmonics: Vec<Partial>,
    pub mix_level: f32,
    pub pan_spread: f32,
    pub sends: SendLevels,
    /// Whether a spawn here seeds the ripple cascade.
    pub ripple_on_spawn: bool,
}

impl LayerConfig {
    /// Slow harmonic bed: long attacks, very long sustains.
    pub fn drone() -> Self {
        Self {
            name: "drone".into(),
            max_voices: 12,
            spawn_rate: 0.5,
            spawn_variation: 0.3,
            attack: (2.0, 6.0),
            sustain: (20.0, 60.0),
            release: (4.0, 10.0),
            attack_curve: AttackCurve::Linear,
            release_curve: ReleaseCurve::Cosine,
            sustain_consonance_bonus: 0.6,
            weights: SelectionWeights { consonance: 0.6, abundance: 0.3, fairness: 0.1 },
            breath: BreathConfig { min_rate: 0.05, max_rate: 0.15, min_depth: 0.02, max_depth: 0.08 },
            harmonics: vec![
                Partial { multiple: 1, amplitude: 1.0 },
                Partial { multiple: 2, amplitude: 0.15 },
            ],
            mix_level: 0.5,
            pan_spread: 0.3,
            sends: SendLevels { chorus: 0.35, delay: 0.1, reverb: 0.6 },
            ripple_on_spawn: false,
        }
    }

    /// Mid-length melodic activity; the main carrier of the dataset.
    pub fn midground() -> Self {
        Self {
            name: "midground".into(),
            max_voices: 25,
            spawn_rate: 0.45,
            spawn_variation: 0.5,
            attack: (1.5, 3.0),
            sustain: (4.0, 12.0),
            release: (2.0, 4.0),
            attack_curve: AttackCurve::Linear,
            release_curve: ReleaseCurve::Cosine,
            sustain_consonance_bonus: 0.5,
            weights: SelectionWeights { consonance: 0.35, abundance: 0.45, fairness: 0.2 },
            breath: BreathConfig { min_rate: 0.08, max_rate: 0.35, min_depth: 0.04, max_depth: 0.15 },
            harmonics: vec![Partial { multiple: 1, amplitude: 1.0 }],
            mix_level: 0.4,
            pan_spread: 0.6,
            sends: SendLevels { chorus: 0.45, delay: 0.3, reverb: 0.45 },
            ripple_on_spawn: true,
        }
    }

    /// Short bright events riding on top of the bed.
    pub fn sparkle() -> Self {
        Self {
            name: "sparkle".into(),
            max_voices: 15,
            spawn_rate: 1.2,
            spawn_variation: 0.7,
            attack: (0.05, 0.3),
            sustain: (0.2, 1.5),
            release: (0.1, 0.5),
            attack_curve: AttackCurve::SmoothStep,
            release_curve: ReleaseCurve::Quadratic,
            sustain_consonance_bonus: 0.3,
            weights: SelectionWeights { consonance: 0.25, abundance: 0.35, fairness: 0.4 },
            breath: BreathConfig { min_rate: 0.3, max_rate: 0.8, min_depth: 0.0, max_depth: 0.05 },
            harmonics: vec![Partial { multiple: 1, amplitude: 1.0 }],
            mix_level: 0.22,
            pan_spread: 0.9,
            sends: SendLevels { chorus: 0.25, delay: 0.55, reverb: 0.35 },
            ripple_on_spawn: true,
        }
    }

    /// Externally-fed layer for ripple echoes: fast envelopes, no
    /// spontaneous spawning.
    pub fn ripples() -> Self {
        Self {
            name: "ripples".into(),
            max_voices: 40,
            spawn_rate: 0.0,
            spawn_variation: 0.0,
            attack: (0.08, 0.16),
            sustain: (0.1, 0.3),
            release: (0.12, 0.55),
            attack_curve: AttackCurve::SmoothStep,
            release_curve: ReleaseCurve::Quadratic,
            sustain_consonance_bonus: 0.2,
            weights: SelectionWeights { consonance: 0.4, abundance: 0.4, fairness: 0.2 },
            breath: BreathConfig { min_rate: 0.0, max_rate: 0.0, min_depth: 0.0, max_depth: 0.0 },
            harmonics: vec![Partial { multiple: 1, amplitude: 1.0 }],
            mix_level: 0.18,
            pan_spread: 0.4,
            sends: SendLevels { chorus: 0.2, delay: 0.5, reverb: 0.55 },
            ripple_on_spawn: false,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct GranularConfig {
    pub max_grains: usize,
    /// Grains per second at activity 0 and 1 respectively.
    pub min_density: f32,
    pub max_density: f32,
    /// Grain length range in seconds.
    pub duration: (f32, f32),
    /// Fractions of grain progress spent in attack and release.
    pub attack_frac: f32,
    pub release_frac: f32,
    /// Per-grain random pitch offset, as a fraction of frequency.
    pub detune: f32,
    pub amplitude: (f32, f32),
    pub weights: SelectionWeights,
    pub stereo_width: f32,
    pub mix_level: f32,
    pub reverb_send: f32,
    /// Cloud-center drift dynamics.
    pub home_gravity: f32,
    pub drift_speed: f32,
    pub current_strength: f32,
    pub current_change_rate: f32,
    pub center_bounds: (f32, f32),
}

impl Default for GranularConfig {
    fn default() -> Self {
        Self {
            max_grains: 200,
            min_density: 50.0,
            max_density: 120.0,
            duration: (0.001, 0.02),
            attack_frac: 0.35,
            release_frac: 0.45,
            detune: 0.002,
            amplitude: (0.1, 0.7),
            weights: SelectionWeights { consonance: 0.35, abundance: 0.55, fairness: 0.1 },
            stereo_width: 0.6,
            mix_level: 0.25,
            reverb_send: 0.9,
            home_gravity: 0.15,
            drift_speed: 0.02,
            current_strength: 0.3,
            current_change_rate: 0.005,
            center_bounds: (0.25, 4.0),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct RippleConfig {
    /// Relations kept per source pathway, strongest first.
    pub max_relations: usize,
    pub strength_threshold: f32,
    pub subcategory_bond: f32,
    pub category_bond: f32,
    pub octave_bond: f32,
    /// Bonus for targets only a small consonance step away, capped.
    pub step_bonus_cap: f32,
    /// Extra strength toward very consonant targets (n*d <= 4 / <= 12).
    pub fundamental_bonus: f32,
    pub near_bonus: f32,
    pub max_generations: u32,
    pub generation_decay: f32,
    pub max_queue: usize,
    pub delay_jitter: f32,
}

impl Default for RippleConfig {
    fn default() -> Self {
        Self {
            max_relations: 10,
            strength_threshold: 0.2,
            subcategory_bond: 0.5,
            category_bond: 0.3,
            octave_bond: 0.35,
            step_bonus_cap: 0.5,
            fundamental_bonus: 0.25,
            near_bonus: 0.15,
            max_generations: 3,
            generation_decay: 0.6,
            max_queue: 256,
            delay_jitter: 0.05,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct ChorusConfig {
    pub voices: usize,
    pub base_delay_ms: f32,
    pub mod_depth_ms: f32,
    pub rates: Vec<f32>,
    pub feedback: f32,
    pub wet_mix: f32,
    pub stereo_spread: f32,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            voices: 3,
            base_delay_ms: 12.0,
            mod_depth_ms: 4.0,
            rates: vec![0.11, 0.17, 0.24],
            feedback: 0.08,
            wet_mix: 0.45,
            stereo_spread: 0.4,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct TapConfig {
    pub time_ms: f32,
    pub level: f32,
    pub pan: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct MultiTapConfig {
    pub taps: Vec<TapConfig>,
    pub feedback: f32,
    /// Fraction of feedback leaked into the opposite channel.
    pub cross_feedback: f32,
    /// One-pole coefficients for the feedback tone shaping.
    pub highcut: f32,
    pub lowcut: f32,
    pub mod_rate: f32,
    pub mod_depth_ms: f32,
    pub wet_mix: f32,
}

impl Default for MultiTapConfig {
    fn default() -> Self {
        Self {
            taps: vec![
                TapConfig { time_ms: 185.0, level: 0.5, pan: -0.2 },
                TapConfig { time_ms: 310.0, level: 0.35, pan: 0.25 },
                TapConfig { time_ms: 470.0, level: 0.2, pan: -0.1 },
                TapConfig { time_ms: 620.0, level: 0.12, pan: 0.15 },
            ],
            feedback: 0.28,
            cross_feedback: 0.12,
            highcut: 0.4,
            lowcut: 0.03,
            mod_rate: 0.25,
            mod_depth_ms: 2.0,
            wet_mix: 0.55,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct ReverbConfig {
    pub decay_time_ms: f32,
    pub damping: f32,
    pub diffusion: f32,
    pub predelay_ms: f32,
    pub wet_mix: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            decay_time_ms: 6500.0,
            damping: 0.4,
            diffusion: 0.7,
            predelay_ms: 20.0,
            wet_mix: 0.55,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub threshold: f32,
    /// Per-sample gain recovery coefficient.
    pub release: f32,
    pub drive: f32,
    pub post_gain: f32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self { threshold: 0.85, release: 0.0005, drive: 0.65, post_gain: 0.92 }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub fundamental: f32,
    pub master_volume: f32,
    pub volume: VolumeConfig,
    pub consonance: ConsonanceCurve,
    pub focus: FocusConfig,
    pub fairness: FairnessConfig,
    pub modulation: ModulationConfig,
    pub layers: Vec<LayerConfig>,
    /// Index into `layers` that receives ripple-cascade spawns.
    pub ripple_layer: Option<usize>,
    pub granular: GranularConfig,
    pub ripple: RippleConfig,
    pub chorus: ChorusConfig,
    pub delay: MultiTapConfig,
    pub reverb: ReverbConfig,
    pub limiter: LimiterConfig,
    /// Seconds between state snapshot refreshes.
    pub report_interval: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            fundamental: 330.0,
            master_volume: 0.4,
            volume: VolumeConfig::default(),
            consonance: ConsonanceCurve::InverseLog,
            focus: FocusConfig::default(),
            fairness: FairnessConfig::default(),
            modulation: ModulationConfig::default(),
            layers: vec![
                LayerConfig::drone(),
                LayerConfig::midground(),
                LayerConfig::sparkle(),
                LayerConfig::ripples(),
            ],
            ripple_layer: Some(3),
            granular: GranularConfig::default(),
            ripple: RippleConfig::default(),
            chorus: ChorusConfig::default(),
            delay: MultiTapConfig::default(),
            reverb: ReverbConfig::default(),
            limiter: LimiterConfig::default(),
            report_interval: 1.0 / 30.0,
        }
    }
}
