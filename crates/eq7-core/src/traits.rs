/// Timed access to the spectrum analyzer chip.
///
/// The sampler drives the band-sweep handshake exclusively through this
/// trait, so the analysis pipeline can run against real pins or a fake.
/// Implementations are expected to be infallible: the chip is assumed
/// present.
///
/// Implémenté par : `SyntheticBus`, `ReplayBus`, et les pilotes matériels.
///
/// # Example
/// ```
/// use eq7_core::traits::SpectrumBus;
///
/// struct SilentBus;
/// impl SpectrumBus for SilentBus {
///     fn set_reset(&mut self, _high: bool) {}
///     fn set_strobe(&mut self, _active: bool) {}
///     fn delay_us(&mut self, _micros: u32) {}
///     fn read_analog(&mut self) -> u16 { 0 }
/// }
/// ```
pub trait SpectrumBus {
    /// Drive the reset line. `true` asserts reset (multiplexer back to band 0).
    fn set_reset(&mut self, high: bool);

    /// Drive the strobe line. `true` gates the current band onto the output;
    /// the chip moves to the next band when the strobe is released.
    fn set_strobe(&mut self, active: bool);

    /// Busy-wait for `micros` microseconds.
    fn delay_us(&mut self, micros: u32);

    /// One analog-to-digital conversion of the chip's output pin.
    fn read_analog(&mut self) -> u16;
}

impl<B: SpectrumBus + ?Sized> SpectrumBus for &mut B {
    fn set_reset(&mut self, high: bool) {
        (**self).set_reset(high);
    }

    fn set_strobe(&mut self, active: bool) {
        (**self).set_strobe(active);
    }

    fn delay_us(&mut self, micros: u32) {
        (**self).delay_us(micros);
    }

    fn read_analog(&mut self) -> u16 {
        (**self).read_analog()
    }
}
