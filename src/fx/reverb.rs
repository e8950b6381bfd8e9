use crate::config::ReverbConfig;
use crate::dsp::{DelayLine, OnePoleLowpass};

/// Schroeder-style reverberator: predelay into four damped parallel
/// combs, summed through two series allpass diffusers.
///
/// Comb feedback is derived from the target decay time so that each
/// comb's recirculation loses 60 dB after `decay_time_ms`, regardless
/// of its delay length:
/// `feedback = 10^(-3 * delay_samples / (decay_seconds * sample_rate))`.

// Classic freeverb-family lengths, mutually prime to smear the modes.
const COMB_DELAYS: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_DELAYS: [usize; 2] = [225, 556];
// Right channel runs slightly longer lines to decorrelate the tail.
const STEREO_SPREAD: usize = 23;

struct Comb {
    buffer: Vec<f32>,
    idx: usize,
    damp: OnePoleLowpass,
    feedback: f32,
}

impl Comb {
    fn new(delay: usize, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            idx: 0,
            damp: OnePoleLowpass::new(1.0 - damping),
            feedback: 0.0,
        }
    }

    fn set_decay(&mut self, decay_seconds: f32, sample_rate: f32) {
        let exponent = -3.0 * self.buffer.len() as f32 / (decay_seconds * sample_rate);
        self.feedback = 10.0_f32.powf(exponent).clamp(0.0, 0.9995);
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.idx];
        let filtered = self.damp.next(out);
        self.buffer[self.idx] = input + filtered * self.feedback;
        self.idx += 1;
        if self.idx == self.buffer.len() {
            self.idx = 0;
        }
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.idx = 0;
        self.damp.reset();
    }
}

struct Allpass {
    buffer: Vec<f32>,
    idx: usize,
    diffusion: f32,
}

impl Allpass {
    fn new(delay: usize, diffusion: f32) -> Self {
        Self { buffer: vec![0.0; delay.max(1)], idx: 0, diffusion }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.idx];
        let out = -self.diffusion * input + delayed;
        self.buffer[self.idx] = input + delayed * self.diffusion;
        self.idx += 1;
        if self.idx == self.buffer.len() {
            self.idx = 0;
        }
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.idx = 0;
    }
}

pub struct Reverb {
    predelay_l: DelayLine,
    predelay_r: DelayLine,
    predelay_samples: usize,
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    allpass_l: Vec<Allpass>,
    allpass_r: Vec<Allpass>,
    wet_mix: f32,
    sample_rate: f32,
}

impl Reverb {
    pub fn new(cfg: &ReverbConfig, sample_rate: f32) -> Self {
        let damping = cfg.damping.clamp(0.0, 0.99);
        let diffusion = cfg.diffusion.clamp(0.0, 0.9);
        let predelay_ms = cfg.predelay_ms.clamp(0.0, 250.0);
        let predelay_samples = (predelay_ms / 1000.0 * sample_rate) as usize;

        // Scale the reference lengths (tuned at 44.1 kHz) to the
        // running rate so the tail density is rate-independent.
        let scale = sample_rate / 44_100.0;
        let stretched = |d: usize| ((d as f32 * scale) as usize).max(1);

        let mut reverb = Self {
            predelay_l: DelayLine::new(predelay_samples.max(1) + 8),
            predelay_r: DelayLine::new(predelay_samples.max(1) + 8),
            predelay_samples,
            combs_l: COMB_DELAYS.iter().map(|&d| Comb::new(stretched(d), damping)).collect(),
            combs_r: COMB_DELAYS
                .iter()
                .map(|&d| Comb::new(stretched(d + STEREO_SPREAD), damping))
                .collect(),
            allpass_l: ALLPASS_DELAYS
                .iter()
                .map(|&d| Allpass::new(stretched(d), diffusion))
                .collect(),
            allpass_r: ALLPASS_DELAYS
                .iter()
                .map(|&d| Allpass::new(stretched(d + STEREO_SPREAD), diffusion))
                .collect(),
            wet_mix: cfg.wet_mix.clamp(0.0, 1.0),
            sample_rate,
        };
        reverb.set_decay(cfg.decay_time_ms);
        reverb
    }

    pub fn set_decay(&mut self, decay_time_ms: f32) {
        let decay_seconds = (decay_time_ms / 1000.0).clamp(0.1, 30.0);
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.set_decay(decay_seconds, self.sample_rate);
        }
    }

    /// Add the reverberated send on top of `out`.
    pub fn process(
        &mut self,
        send_l: &[f32],
        send_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) {
        let frames = out_l.len();
        let comb_norm = 1.0 / self.combs_l.len() as f32;
        for i in 0..frames {
            self.predelay_l.write(send_l[i]);
            self.predelay_r.write(send_r[i]);
            let in_l = self.predelay_l.read(self.predelay_samples);
            let in_r = self.predelay_r.read(self.predelay_samples);

            let mut wet_l = 0.0;
            for comb in &mut self.combs_l {
                wet_l += comb.process(in_l);
            }
            wet_l *= comb_norm;
            for ap in &mut self.allpass_l {
                wet_l = ap.process(wet_l);
            }

            let mut wet_r = 0.0;
            for comb in &mut self.combs_r {
                wet_r += comb.process(in_r);
            }
            wet_r *= comb_norm;
            for ap in &mut self.allpass_r {
                wet_r = ap.process(wet_r);
            }

            out_l[i] += wet_l * self.wet_mix;
            out_r[i] += wet_r * self.wet_mix;
        }
    }

    pub fn reset(&mut self) {
        self.predelay_l.reset();
        self.predelay_r.reset();
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            ap.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;
    const BLOCK: usize = 256;

    fn impulse_response(reverb: &mut Reverb, seconds: f32) -> Vec<f32> {
        let total = (seconds * SR) as usize;
        let mut response = Vec::with_capacity(total);
        let mut sent = false;
        while response.len() < total {
            let mut send = [0.0; BLOCK];
            if !sent {
                send[0] = 1.0;
                sent = true;
            }
            let mut out_l = [0.0; BLOCK];
            let mut out_r = [0.0; BLOCK];
            reverb.process(&send, &send, &mut out_l, &mut out_r);
            response.extend_from_slice(&out_l);
        }
        response.truncate(total);
        response
    }

    fn peak(window: &[f32]) -> f32 {
        window.iter().fold(0.0_f32, |p, &s| p.max(s.abs()))
    }

    #[test]
    fn tail_appears_after_predelay() {
        let mut cfg = ReverbConfig::default();
        cfg.predelay_ms = 50.0;
        let mut reverb = Reverb::new(&cfg, SR);
        let response = impulse_response(&mut reverb, 0.5);
        let predelay = (0.05 * SR) as usize;
        // Shortest comb adds its own latency on top of the predelay.
        assert!(peak(&response[..predelay]) == 0.0, "tail leaked before predelay");
        assert!(peak(&response[predelay..]) > 0.0, "no tail at all");
    }

    #[test]
    fn tail_decays_60_db_by_the_configured_time() {
        for decay_s in [1.0_f32, 5.0, 10.0] {
            let mut cfg = ReverbConfig::default();
            cfg.decay_time_ms = decay_s * 1000.0;
            cfg.predelay_ms = 0.0;
            cfg.damping = 0.0; // isolate the feedback law
            let mut reverb = Reverb::new(&cfg, SR);
            let response = impulse_response(&mut reverb, decay_s + 1.0);

            let early = peak(&response[..(0.25 * SR) as usize]);
            let late_start = (decay_s * SR) as usize;
            let late = peak(&response[late_start..]);
            assert!(early > 0.0);
            let db = 20.0 * (late / early).log10();
            assert!(db <= -55.0, "decay {decay_s}s only reached {db:.1} dB");
        }
    }

    #[test]
    fn longer_decay_setting_rings_longer() {
        let mut short_cfg = ReverbConfig::default();
        short_cfg.decay_time_ms = 500.0;
        short_cfg.predelay_ms = 0.0;
        let mut long_cfg = short_cfg.clone();
        long_cfg.decay_time_ms = 8000.0;

        let mut short = Reverb::new(&short_cfg, SR);
        let mut long = Reverb::new(&long_cfg, SR);
        let short_ir = impulse_response(&mut short, 3.0);
        let long_ir = impulse_response(&mut long, 3.0);
        let window = (2.5 * SR) as usize;
        assert!(peak(&long_ir[window..]) > peak(&short_ir[window..]));
    }

    #[test]
    fn stays_finite_under_sustained_input() {
        let mut reverb = Reverb::new(&ReverbConfig::default(), SR);
        for n in 0..2000 {
            let mut send = [0.0; BLOCK];
            for (i, s) in send.iter_mut().enumerate() {
                *s = ((n * BLOCK + i) as f32 * 0.03).sin();
            }
            let mut out_l = [0.0; BLOCK];
            let mut out_r = [0.0; BLOCK];
            reverb.process(&send, &send, &mut out_l, &mut out_r);
            for i in 0..BLOCK {
                assert!(out_l[i].is_finite() && out_r[i].is_finite());
                assert!(out_l[i].abs() < 100.0);
            }
        }
    }
}
