/// One-pole lowpass smoother. `coeff` is the per-sample fraction moved
/// toward the input, so 1.0 passes through and 0.0 freezes the state.
#[derive(Debug, Clone)]
pub struct OnePoleLowpass {
    state: f32,
    coeff: f32,
}

impl OnePoleLowpass {
    pub fn new(coeff: f32) -> Self {
        Self { state: 0.0, coeff: coeff.clamp(0.0, 1.0) }
    }

    #[inline]
    pub fn next(&mut self, input: f32) -> f32 {
        self.state += (input - self.state) * self.coeff;
        self.state
    }

    pub fn set_coeff(&mut self, coeff: f32) {
        self.coeff = coeff.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// DC/rumble blocker: subtracts a slow lowpass of the signal. Small
/// coefficients give a low corner.
#[derive(Debug, Clone)]
pub struct OnePoleHighpass {
    lowpass: OnePoleLowpass,
}

impl OnePoleHighpass {
    pub fn new(coeff: f32) -> Self {
        Self { lowpass: OnePoleLowpass::new(coeff) }
    }

    #[inline]
    pub fn next(&mut self, input: f32) -> f32 {
        input - self.lowpass.next(input)
    }

    pub fn reset(&mut self) {
        self.lowpass.reset();
    }
}
