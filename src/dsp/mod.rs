//! Low-level DSP primitives used by the voice layers and effect buses.
//!
//! These components are allocation-free after construction and
//! realtime-safe, making them safe to embed directly inside voice and
//! grain structs. They stay focused on the signal-processing math so
//! the synth modules can layer on orchestration and modulation.

/// Time-domain delay line with fractional reads.
pub mod delay;
/// Voice lifecycle envelope generator.
pub mod envelope;
/// One-pole tone-shaping filters.
pub mod filter;
/// Output-stage peak limiter.
pub mod limiter;
/// Sine/harmonic oscillator and panning helpers.
pub mod oscillator;

pub use delay::DelayLine;
pub use envelope::{EnvelopeStage, VoiceEnvelope};
pub use filter::{OnePoleHighpass, OnePoleLowpass};
pub use limiter::Limiter;
pub use oscillator::{constant_power_pan, phase_increment, PhaseOsc};
