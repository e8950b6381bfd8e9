/// Circular delay line with fractional-delay reads.
///
/// Capacity is fixed at construction; `write` advances the cursor and
/// `read_interpolated` reads relative to the most recently written
/// sample, so `write(x)` followed by `read_interpolated(0.0)` returns
/// exactly `x`.
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    /// Sized for a maximum delay in milliseconds at the given rate,
    /// with a little slack for modulation overshoot.
    pub fn for_delay_ms(max_delay_ms: f32, sample_rate: f32) -> Self {
        let samples = (max_delay_ms.max(0.0) / 1000.0 * sample_rate).ceil() as usize;
        Self::new(samples + 8)
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
    }

    /// Linearly interpolated read, `delay_samples` behind the most
    /// recent write. Delays beyond capacity wrap; callers size the line
    /// for their maximum delay.
    #[inline]
    pub fn read_interpolated(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let mut pos = (self.write_pos as f32 - 1.0 - delay_samples.max(0.0)).rem_euclid(len as f32);
        // rem_euclid of a tiny negative value can round up to exactly
        // `len`; re-wrap so the index stays in bounds.
        if pos >= len as f32 {
            pos = 0.0;
        }
        let idx = pos as usize;
        let frac = pos - idx as f32;
        let next = if idx + 1 == len { 0 } else { idx + 1 };
        self.buffer[idx] * (1.0 - frac) + self.buffer[next] * frac
    }

    /// Integer-delay read, same reference point as `read_interpolated`.
    #[inline]
    pub fn read(&self, delay_samples: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.min(len - 1);
        let pos = (self.write_pos + len - 1 - delay) % len;
        self.buffer[pos]
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
