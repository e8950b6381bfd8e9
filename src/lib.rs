pub mod config;
pub mod context;
pub mod dsp;
pub mod engine;
pub mod fx; // Shared stereo effect buses
pub mod modulation;
pub mod pathway;
pub mod rng;
pub mod synth; // Voice layers, grains, ripple cascade

pub use config::EngineConfig;
pub use engine::{Engine, EngineSnapshot};
pub use pathway::{ConsonanceCurve, PathwayRecord, PathwaySet};
pub use synth::message::{ControlMessage, MessageReceiver};

pub const MAX_BLOCK_SIZE: usize = 2048;
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
