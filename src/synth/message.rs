//! Control-plane messages.
//!
//! The UI/data thread sends [`ControlMessage`]s through a lock-free
//! queue; the engine drains the queue at block start and applies every
//! message before rendering, last value winning.

use crate::pathway::{ConsonanceCurve, PathwayRecord};

#[derive(Debug, Clone)]
pub enum ControlMessage {
    SetFundamental(f32),
    SetMasterVolume(f32),
    SetCategoryGain { category: usize, gain: f32 },
    /// Focus a pathway (boost it, duck the rest) or clear focus.
    SetFocus(Option<usize>),
    /// Per-pathway emphasis table, indexed like the loaded set.
    SetEmphasis(Vec<f32>),
    SetConsonanceCurve(ConsonanceCurve),
    SetGrainDensity { min: f32, max: f32 },
    SetReverbDecay(f32),
    /// Replace the dataset. Allocation happens on the sending side and
    /// inside the engine's load path, never per sample.
    LoadPathways(Vec<PathwayRecord>),
}

/// Anything the engine can drain control messages from.
pub trait MessageReceiver {
    fn pop_message(&mut self) -> Option<ControlMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for rtrb::Consumer<ControlMessage> {
    fn pop_message(&mut self) -> Option<ControlMessage> {
        self.pop().ok()
    }
}

impl MessageReceiver for std::collections::VecDeque<ControlMessage> {
    fn pop_message(&mut self) -> Option<ControlMessage> {
        self.pop_front()
    }
}
