use eq7_core::config::AgcConfig;
use eq7_core::frame::BAND_COUNT;

/// Loudness tracker and current gain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgcState {
    /// EMA of the pre-gain mean band magnitude.
    pub running_loudness: f32,
    /// Multiplier applied by the sampler on the next tick.
    pub gain: f32,
}

/// Automatic gain control.
///
/// Slow EMA of loudness, fast inverse gain. The long time constant keeps
/// transients from making the gain hunt.
///
/// # Example
/// ```
/// use eq7_audio::agc::AgcController;
/// use eq7_core::config::AgcConfig;
///
/// let mut agc = AgcController::new(AgcConfig::default());
/// let gain = agc.update(0);
/// assert!((0.1..=20.0).contains(&gain));
/// ```
pub struct AgcController {
    config: AgcConfig,
    state: AgcState,
}

impl AgcController {
    /// Create a controller at the configured initial loudness and unity gain.
    #[must_use]
    pub fn new(config: AgcConfig) -> Self {
        let state = AgcState {
            running_loudness: config.initial_loudness,
            gain: 1.0,
        };
        Self { config, state }
    }

    /// Fold one tick's pre-gain band sum into the loudness and recompute gain.
    ///
    /// Returns the new gain.
    pub fn update(&mut self, band_sum: u32) -> f32 {
        let alpha = self.config.smoothing;
        let mean = band_sum as f32 / BAND_COUNT as f32;
        self.state.running_loudness = self.state.running_loudness * (1.0 - alpha) + alpha * mean;

        let loudness = self.state.running_loudness.max(self.config.loudness_floor);
        self.state.gain =
            (self.config.target / loudness).clamp(self.config.gain_min, self.config.gain_max);
        self.state.gain
    }

    #[inline]
    #[must_use]
    pub fn gain(&self) -> f32 {
        self.state.gain
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> AgcState {
        self.state
    }

    /// Swap tuning without resetting the tracked loudness.
    pub fn set_config(&mut self, config: AgcConfig) {
        self.config = config;
        self.state.gain = self.state.gain.clamp(self.config.gain_min, self.config.gain_max);
    }
}
