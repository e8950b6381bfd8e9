use crate::dsp::{PhaseOsc, VoiceEnvelope};
use crate::modulation::HabituationState;

/// One sounding pathway inside a layer.
///
/// Pitch and tone come from the pathway; the envelope owns the
/// lifecycle. Pan and amplitude targets are recomputed every block and
/// chased by the smoothed values so parameter jumps never click.
pub struct Voice {
    pub(crate) pathway: usize,
    pub(crate) osc: PhaseOsc,
    pub(crate) envelope: VoiceEnvelope,
    pub(crate) frequency: f32,
    /// Static pan offset within the layer's spread, added on top of the
    /// drifting category pan.
    pub(crate) pan_offset: f32,
    pub(crate) smoothed_pan: f32,
    pub(crate) smoothed_amp: f32,
    /// Spawn strength; ripple echoes arrive quieter each generation.
    pub(crate) strength: f32,
    pub(crate) habituation: HabituationState,
}

impl Voice {
    pub(crate) fn new(
        pathway: usize,
        frequency: f32,
        phase: f32,
        pan_offset: f32,
        strength: f32,
        envelope: VoiceEnvelope,
    ) -> Self {
        Self {
            pathway,
            osc: PhaseOsc::with_phase(phase),
            envelope,
            frequency,
            pan_offset,
            smoothed_pan: pan_offset,
            smoothed_amp: 0.0,
            strength,
            habituation: HabituationState::default(),
        }
    }

    pub fn pathway(&self) -> usize {
        self.pathway
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }

    pub fn stage(&self) -> crate::dsp::EnvelopeStage {
        self.envelope.stage()
    }

    pub fn pan(&self) -> f32 {
        self.smoothed_pan
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }
}
