//! Shared stereo effect buses.
//!
//! Sources render dry signal plus three aux sends into a
//! [`BusBuffers`]; the effect chain then runs chorus, multi-tap delay
//! and reverb off their sends and the limiter over the sum. Buffers are
//! sized for [`crate::MAX_BLOCK_SIZE`] once and reused forever.

pub mod chorus;
pub mod delay;
pub mod reverb;

pub use chorus::StereoChorus;
pub use delay::MultiTapDelay;
pub use reverb::Reverb;

use crate::MAX_BLOCK_SIZE;

pub struct BusBuffers {
    pub dry_l: Vec<f32>,
    pub dry_r: Vec<f32>,
    pub chorus_l: Vec<f32>,
    pub chorus_r: Vec<f32>,
    pub delay_l: Vec<f32>,
    pub delay_r: Vec<f32>,
    pub reverb_l: Vec<f32>,
    pub reverb_r: Vec<f32>,
}

impl BusBuffers {
    pub fn new() -> Self {
        let buf = || vec![0.0; MAX_BLOCK_SIZE];
        Self {
            dry_l: buf(),
            dry_r: buf(),
            chorus_l: buf(),
            chorus_r: buf(),
            delay_l: buf(),
            delay_r: buf(),
            reverb_l: buf(),
            reverb_r: buf(),
        }
    }

    pub fn clear(&mut self, frames: usize) {
        debug_assert!(frames <= MAX_BLOCK_SIZE);
        self.dry_l[..frames].fill(0.0);
        self.dry_r[..frames].fill(0.0);
        self.chorus_l[..frames].fill(0.0);
        self.chorus_r[..frames].fill(0.0);
        self.delay_l[..frames].fill(0.0);
        self.delay_r[..frames].fill(0.0);
        self.reverb_l[..frames].fill(0.0);
        self.reverb_r[..frames].fill(0.0);
    }
}

impl Default for BusBuffers {
    fn default() -> Self {
        Self::new()
    }
}
