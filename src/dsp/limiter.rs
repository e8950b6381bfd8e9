use crate::config::LimiterConfig;

/// Output-stage safety limiter.
///
/// A stereo-linked peak follower pulls gain down instantly when either
/// channel crosses the threshold and recovers it slowly afterwards;
/// a gentle tanh stage then rounds off whatever still gets through.
/// The post gain keeps the absolute ceiling below 1.0.
pub struct Limiter {
    gain: f32,
    threshold: f32,
    release: f32,
    drive: f32,
    post_gain: f32,
}

impl Limiter {
    pub fn new(cfg: &LimiterConfig) -> Self {
        Self {
            gain: 1.0,
            threshold: cfg.threshold.clamp(0.05, 1.0),
            release: cfg.release.clamp(0.0, 0.1),
            drive: cfg.drive.clamp(0.05, 2.0),
            post_gain: cfg.post_gain.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let peak = left.abs().max(right.abs());
        if peak * self.gain > self.threshold {
            self.gain = self.threshold / peak;
        } else {
            self.gain += (1.0 - self.gain) * self.release;
        }
        let l = (left * self.gain * self.drive).tanh() * self.post_gain;
        let r = (right * self.gain * self.drive).tanh() * self.post_gain;
        (l, r)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (ol, or) = self.process(*l, *r);
            *l = ol;
            *r = or;
        }
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }
}
