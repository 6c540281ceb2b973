use eq7_core::config::SamplerConfig;
use eq7_core::frame::{BAND_COUNT, SpectrumFrame};
use eq7_core::traits::SpectrumBus;

/// Reset pulse width, µs.
pub const RESET_PULSE_US: u32 = 5;
/// Settle after releasing reset, µs.
pub const RESET_SETTLE_US: u32 = 10;
/// Output settle after asserting strobe, µs.
pub const STROBE_SETTLE_US: u32 = 25;
/// Settle after releasing strobe, µs.
pub const STROBE_RELEASE_US: u32 = 30;

/// Drives the band sweep and produces a calibrated, gained frame.
///
/// # Example
/// ```
/// use eq7_audio::sampler::SpectrumSampler;
/// use eq7_core::config::SamplerConfig;
/// use eq7_core::traits::SpectrumBus;
///
/// struct Flat(u16);
/// impl SpectrumBus for Flat {
///     fn set_reset(&mut self, _: bool) {}
///     fn set_strobe(&mut self, _: bool) {}
///     fn delay_us(&mut self, _: u32) {}
///     fn read_analog(&mut self) -> u16 { self.0 }
/// }
///
/// let mut sampler = SpectrumSampler::new(SamplerConfig::default());
/// let sum = sampler.sample(&mut Flat(165), 1.0);
/// // (165 - 65) * 8 / 10 on band 0
/// assert_eq!(sampler.frame().bands[0], 80);
/// assert!(sum > 0);
/// ```
pub struct SpectrumSampler {
    config: SamplerConfig,
    frame: SpectrumFrame,
}

impl SpectrumSampler {
    #[must_use]
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            frame: SpectrumFrame::default(),
        }
    }

    /// Run one full sweep, overwrite the frame, and return the pre-gain sum.
    ///
    /// The pre-gain sum feeds the AGC; `gain` is the value it computed on
    /// the previous tick.
    pub fn sample<B: SpectrumBus>(&mut self, bus: &mut B, gain: f32) -> u32 {
        bus.set_reset(true);
        bus.delay_us(RESET_PULSE_US);
        bus.set_reset(false);
        bus.delay_us(RESET_SETTLE_US);

        let oversample = u32::from(self.config.oversample.max(1));
        let mut band_sum = 0u32;

        for i in 0..BAND_COUNT {
            bus.set_strobe(true);
            bus.delay_us(STROBE_SETTLE_US);

            let mut acc = 0u32;
            for _ in 0..oversample {
                acc += u32::from(bus.read_analog());
            }
            let reading = acc / oversample;

            bus.set_strobe(false);
            bus.delay_us(STROBE_RELEASE_US);

            let calibrated = self.calibrate(i, reading);
            band_sum += calibrated;
            self.frame.bands[i] = apply_gain(calibrated, gain);
        }

        band_sum
    }

    /// Noise floor then per-band factor, before gain.
    #[inline]
    fn calibrate(&self, band: usize, reading: u32) -> u32 {
        let floored = reading.saturating_sub(u32::from(self.config.noise_floor));
        floored * u32::from(self.config.band_factors[band]) / 10
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> &SpectrumFrame {
        &self.frame
    }

    pub fn set_config(&mut self, config: SamplerConfig) {
        self.config = config;
    }
}

#[inline(always)]
fn apply_gain(value: u32, gain: f32) -> u16 {
    (value as f32 * gain).clamp(0.0, f32::from(u16::MAX)) as u16
}
