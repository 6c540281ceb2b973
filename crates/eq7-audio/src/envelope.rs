use eq7_core::config::EnvelopeConfig;
use eq7_core::frame::{BAND_COUNT, SpectrumFrame};

/// Decayed and peak-held versions of every band.
///
/// `decay` is an EMA of the gained magnitude; `peak` jumps up with `decay`
/// and otherwise sinks by `peak_decay` each tick. Renderers draw `decay`
/// directly and use `peak` as a normalization reference.
///
/// # Example
/// ```
/// use eq7_audio::envelope::SpectrumEnvelope;
/// use eq7_core::config::EnvelopeConfig;
/// use eq7_core::frame::SpectrumFrame;
///
/// let mut env = SpectrumEnvelope::new(EnvelopeConfig::default());
/// env.update(&SpectrumFrame::from([100; 7]));
/// assert!((env.decay()[0] - 10.0).abs() < 1e-4);
/// assert!((env.peak()[0] - 10.0).abs() < 1e-4);
/// ```
pub struct SpectrumEnvelope {
    smoothing: f32,
    peak_decay: f32,
    decay: [f32; BAND_COUNT],
    peak: [f32; BAND_COUNT],
}

impl SpectrumEnvelope {
    #[must_use]
    pub fn new(config: EnvelopeConfig) -> Self {
        Self {
            smoothing: config.smoothing,
            peak_decay: config.peak_decay,
            decay: [0.0; BAND_COUNT],
            peak: [0.0; BAND_COUNT],
        }
    }

    /// Fold one gained frame into both envelopes.
    pub fn update(&mut self, frame: &SpectrumFrame) {
        let beta = self.smoothing;
        for ((decay, peak), &value) in self
            .decay
            .iter_mut()
            .zip(self.peak.iter_mut())
            .zip(frame.bands.iter())
        {
            *decay = (1.0 - beta) * *decay + beta * f32::from(value);
            *peak = (*peak * self.peak_decay).max(*decay);
        }
    }

    #[inline]
    #[must_use]
    pub fn decay(&self) -> &[f32; BAND_COUNT] {
        &self.decay
    }

    #[inline]
    #[must_use]
    pub fn peak(&self) -> &[f32; BAND_COUNT] {
        &self.peak
    }

    /// Mean of the decayed bands.
    #[must_use]
    pub fn average_decay(&self) -> f32 {
        self.decay.iter().sum::<f32>() / BAND_COUNT as f32
    }

    /// Mean of the peak-hold bands.
    #[must_use]
    pub fn average_peak(&self) -> f32 {
        self.peak.iter().sum::<f32>() / BAND_COUNT as f32
    }

    pub fn set_config(&mut self, config: &EnvelopeConfig) {
        self.smoothing = config.smoothing;
        self.peak_decay = config.peak_decay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: u16) -> SpectrumFrame {
        SpectrumFrame::from([v; BAND_COUNT])
    }

    #[test]
    fn decay_converges_to_steady_input() {
        let mut env = SpectrumEnvelope::new(EnvelopeConfig::default());
        for _ in 0..200 {
            env.update(&frame(400));
        }
        assert!((env.decay()[3] - 400.0).abs() < 0.1);
        assert!((env.average_decay() - 400.0).abs() < 0.1);
    }

    #[test]
    fn peak_never_below_decay_after_update() {
        let mut env = SpectrumEnvelope::new(EnvelopeConfig::default());
        let input = [0u16, 900, 900, 50, 0, 0, 2000, 10, 10, 10, 0, 0, 0];
        for &v in &input {
            env.update(&frame(v));
            for i in 0..BAND_COUNT {
                assert!(env.peak()[i] >= env.decay()[i]);
            }
        }
    }

    #[test]
    fn peak_sinks_five_percent_per_tick_after_drop() {
        let mut env = SpectrumEnvelope::new(EnvelopeConfig {
            smoothing: 1.0,
            peak_decay: 0.95,
        });
        env.update(&frame(1000));
        assert!((env.peak()[0] - 1000.0).abs() < 1e-3);
        env.update(&frame(0));
        assert!((env.peak()[0] - 950.0).abs() < 1e-3);
        env.update(&frame(0));
        assert!((env.peak()[0] - 902.5).abs() < 1e-3);
        assert!(env.decay()[0].abs() < f32::EPSILON);
    }

    #[test]
    fn peak_jumps_to_a_rise_immediately() {
        let mut env = SpectrumEnvelope::new(EnvelopeConfig::default());
        env.update(&frame(100));
        let before = env.peak()[0];
        env.update(&frame(5000));
        assert!(env.peak()[0] > before);
        assert!((env.peak()[0] - env.decay()[0]).abs() < 1e-3);
        assert!((env.average_peak() - env.peak()[0]).abs() < 1e-3);
    }
}
