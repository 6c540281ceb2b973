use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::frame::BAND_COUNT;
use crate::time::{Millis, TempoWindow};

/// Storage bound of the onset log. `tempo.log_capacity` is clamped to it.
pub const MAX_LOG_CAPACITY: usize = 64;

/// Storage bound of the windowed-threshold sample ring.
pub const WINDOW_CAPACITY: usize = 512;

/// Configuration complète du tracker, hot-rechargeable.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine, issue
/// de réglages empiriques sur le matériel.
///
/// # Example
/// ```
/// use eq7_core::config::BeatConfig;
/// let config = BeatConfig::default();
/// assert_eq!(config.tempo.log_capacity, 20);
/// assert_eq!(config.tempo_window().min, 480);
/// assert_eq!(config.refractory_ms(), 120);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct BeatConfig {
    pub sampler: SamplerConfig,
    pub agc: AgcConfig,
    pub envelope: EnvelopeConfig,
    pub onset: OnsetConfig,
    pub windowed: WindowedConfig,
    pub tempo: TempoConfig,
}

/// Band sweep and calibration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SamplerConfig {
    /// Raw ADC level subtracted from every band before calibration.
    pub noise_floor: u16,
    /// Per-band correction, applied as `value * factor / 10`.
    pub band_factors: [u8; BAND_COUNT],
    /// ADC reads averaged per band.
    pub oversample: u8,
}

/// Automatic gain control.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AgcConfig {
    /// EMA factor of the loudness tracker (0.004 ≈ 4 s at 60 Hz ticks).
    pub smoothing: f32,
    /// Loudness the gain steers towards.
    pub target: f32,
    pub gain_min: f32,
    pub gain_max: f32,
    /// Loudness assumed before the first tick.
    pub initial_loudness: f32,
    /// Lowest loudness used as a divisor.
    pub loudness_floor: f32,
}

/// Decay and peak-hold envelopes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EnvelopeConfig {
    /// EMA factor of the decayed signal.
    pub smoothing: f32,
    /// Multiplier applied to the peak-hold every tick.
    pub peak_decay: f32,
}

/// Onset detection strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetStrategy {
    /// Peak-ratio edge detection with a refractory gate, evaluated every tick.
    #[default]
    PeakRatio,
    /// Percentile/slope threshold over a sampled window, evaluated at analysis time.
    Windowed,
}

/// Level fed to the peak-ratio detector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetSignal {
    /// Gained magnitude of the bass band.
    #[default]
    Raw,
    /// Decayed envelope of the bass band.
    Decay,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OnsetConfig {
    pub strategy: OnsetStrategy,
    pub signal: OnsetSignal,
    /// Band index watched for onsets.
    pub bass_band: usize,
    /// The level must exceed `threshold_ratio * peak`.
    pub threshold_ratio: f32,
    /// Refractory interval is `MIN_MPB / refractory_divisor`.
    pub refractory_divisor: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WindowedConfig {
    /// Spacing between recorded samples.
    pub sample_interval_ms: Millis,
    /// Start of the slope search, as a percentile of the sorted window.
    pub percentile_low: u8,
    /// End of the slope search (exclusive).
    pub percentile_high: u8,
    /// Thresholds below this mean the window carries no usable signal.
    pub min_threshold: u8,
}

/// Tempo estimation and confidence gating.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TempoConfig {
    pub min_bpm: u16,
    pub max_bpm: u16,
    /// Histogram bucket width for folded gaps.
    pub bucket_ms: Millis,
    /// Period between two tempo analyses.
    pub analysis_period_ms: Millis,
    /// Onsets required before an analysis is attempted.
    pub min_onsets: usize,
    /// Minimum multiplicity of the most common gap.
    pub confidence_threshold: usize,
    /// Onsets kept in the log.
    pub log_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            noise_floor: 65,
            band_factors: [8, 8, 9, 8, 7, 4, 10],
            oversample: 3,
        }
    }
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.004,
            target: 300.0,
            gain_min: 0.1,
            gain_max: 20.0,
            initial_loudness: 300.0,
            loudness_floor: 1.0,
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            peak_decay: 0.95,
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            strategy: OnsetStrategy::PeakRatio,
            signal: OnsetSignal::Raw,
            bass_band: 1,
            threshold_ratio: 1.5,
            refractory_divisor: 4,
        }
    }
}

impl Default for WindowedConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 10,
            percentile_low: 90,
            percentile_high: 98,
            min_threshold: 5,
        }
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60,
            max_bpm: 125,
            bucket_ms: 15,
            analysis_period_ms: 2500,
            min_onsets: 8,
            confidence_threshold: 4,
            log_capacity: 20,
        }
    }
}

impl BeatConfig {
    /// Beat-length window `[MIN_MPB, MAX_MPB]` derived from the BPM bounds.
    #[must_use]
    pub fn tempo_window(&self) -> TempoWindow {
        TempoWindow::from_bpm(self.tempo.min_bpm, self.tempo.max_bpm)
    }

    /// Minimum spacing between two recorded onsets.
    #[must_use]
    pub fn refractory_ms(&self) -> Millis {
        self.tempo_window().min / self.onset.refractory_divisor.max(1)
    }

    /// Clamp all numeric fields to their valid ranges.
    /// Called after TOML deserialization to prevent out-of-range values.
    pub fn clamp_all(&mut self) {
        let s = &mut self.sampler;
        s.noise_floor = s.noise_floor.min(4095);
        for factor in &mut s.band_factors {
            *factor = (*factor).min(40);
        }
        s.oversample = s.oversample.clamp(1, 16);

        let a = &mut self.agc;
        a.smoothing = a.smoothing.clamp(0.0001, 1.0);
        a.target = a.target.clamp(1.0, 10_000.0);
        a.gain_min = a.gain_min.clamp(0.01, 100.0);
        a.gain_max = a.gain_max.clamp(a.gain_min, 100.0);
        a.initial_loudness = a.initial_loudness.clamp(0.0, 65_535.0);
        a.loudness_floor = a.loudness_floor.clamp(0.001, 1000.0);

        let e = &mut self.envelope;
        e.smoothing = e.smoothing.clamp(0.001, 1.0);
        e.peak_decay = e.peak_decay.clamp(0.0, 0.9999);

        let o = &mut self.onset;
        o.bass_band = o.bass_band.min(BAND_COUNT - 1);
        o.threshold_ratio = o.threshold_ratio.clamp(0.1, 10.0);
        o.refractory_divisor = o.refractory_divisor.clamp(1, 64);

        let t = &mut self.tempo;
        t.min_bpm = t.min_bpm.clamp(1, 600);
        t.max_bpm = t.max_bpm.clamp(1, 600);
        t.bucket_ms = t.bucket_ms.clamp(1, 1000);
        t.analysis_period_ms = t.analysis_period_ms.clamp(100, 60_000);
        t.min_onsets = t.min_onsets.clamp(2, MAX_LOG_CAPACITY);
        t.confidence_threshold = t.confidence_threshold.clamp(1, MAX_LOG_CAPACITY - 1);
        t.log_capacity = t.log_capacity.clamp(t.min_onsets, MAX_LOG_CAPACITY);

        // One analysis period of samples must fit the window buffer.
        let min_interval = t.analysis_period_ms.div_ceil(WINDOW_CAPACITY as Millis);
        let w = &mut self.windowed;
        w.sample_interval_ms = w.sample_interval_ms.clamp(1, 1000);
        if w.sample_interval_ms < min_interval {
            log::warn!(
                "windowed.sample_interval_ms relevé de {} à {min_interval} ms : {WINDOW_CAPACITY} échantillons max par période d'analyse",
                w.sample_interval_ms
            );
            w.sample_interval_ms = min_interval;
        }
        w.percentile_low = w.percentile_low.clamp(1, 99);
        w.percentile_high = w.percentile_high.clamp(w.percentile_low + 1, 100);
    }

    /// Check cross-field constraints that clamping cannot repair.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidBpmRange`] if `min_bpm >= max_bpm`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tempo.min_bpm >= self.tempo.max_bpm {
            return Err(CoreError::InvalidBpmRange {
                min_bpm: self.tempo.min_bpm,
                max_bpm: self.tempo.max_bpm,
            });
        }
        if self.tempo.max_bpm < self.tempo.min_bpm.saturating_mul(2) {
            log::warn!(
                "Plage BPM {}–{} plus étroite qu'une octave : certains écarts ne pourront pas être repliés",
                self.tempo.min_bpm,
                self.tempo.max_bpm
            );
        }
        if !self.onset_can_fire() {
            log::warn!(
                "onset.signal = \"decay\" avec threshold_ratio {} ≥ 1/peak_decay ({:.3}) : aucun onset ne sera détecté",
                self.onset.threshold_ratio,
                1.0 / self.envelope.peak_decay
            );
        }
        Ok(())
    }

    /// `false` when the peak-ratio detector is provably silent.
    ///
    /// The peak-hold never falls below `peak_decay` times the previous decay
    /// value, so a decayed level cannot exceed `1 / peak_decay` times the
    /// peak. A ratio at or above that bound never fires.
    #[must_use]
    pub fn onset_can_fire(&self) -> bool {
        self.onset.strategy != OnsetStrategy::PeakRatio
            || self.onset.signal != OnsetSignal::Decay
            || self.onset.threshold_ratio * self.envelope.peak_decay < 1.0
    }
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize)]
struct ConfigFile {
    sampler: Option<SamplerSection>,
    agc: Option<AgcSection>,
    envelope: Option<EnvelopeSection>,
    onset: Option<OnsetSection>,
    windowed: Option<WindowedSection>,
    tempo: Option<TempoSection>,
}

#[derive(Deserialize)]
struct SamplerSection {
    noise_floor: Option<u16>,
    band_factors: Option<[u8; BAND_COUNT]>,
    oversample: Option<u8>,
}

#[derive(Deserialize)]
struct AgcSection {
    smoothing: Option<f32>,
    target: Option<f32>,
    gain_min: Option<f32>,
    gain_max: Option<f32>,
    initial_loudness: Option<f32>,
    loudness_floor: Option<f32>,
}

#[derive(Deserialize)]
struct EnvelopeSection {
    smoothing: Option<f32>,
    peak_decay: Option<f32>,
}

#[derive(Deserialize)]
struct OnsetSection {
    strategy: Option<OnsetStrategy>,
    signal: Option<OnsetSignal>,
    bass_band: Option<usize>,
    threshold_ratio: Option<f32>,
    refractory_divisor: Option<u32>,
}

#[derive(Deserialize)]
struct WindowedSection {
    sample_interval_ms: Option<Millis>,
    percentile_low: Option<u8>,
    percentile_high: Option<u8>,
    min_threshold: Option<u8>,
}

#[derive(Deserialize)]
struct TempoSection {
    min_bpm: Option<u16>,
    max_bpm: Option<u16>,
    bucket_ms: Option<Millis>,
    analysis_period_ms: Option<Millis>,
    min_onsets: Option<usize>,
    confidence_threshold: Option<usize>,
    log_capacity: Option<usize>,
}

/// Parse TOML text and merge it over the defaults.
///
/// # Errors
/// Returns an error if the text is not valid TOML for this layout, or if the
/// resulting BPM window is empty.
///
/// # Example
/// ```
/// use eq7_core::config::parse_config;
/// let config = parse_config("[tempo]\nmax_bpm = 140\n").unwrap();
/// assert_eq!(config.tempo.max_bpm, 140);
/// assert_eq!(config.tempo.min_bpm, 60);
/// ```
pub fn parse_config(content: &str) -> Result<BeatConfig> {
    let file: ConfigFile = toml::from_str(content).context("Erreur de parsing TOML")?;

    let mut config = BeatConfig::default();

    if let Some(s) = file.sampler {
        let c = &mut config.sampler;
        if let Some(v) = s.noise_floor {
            c.noise_floor = v;
        }
        if let Some(v) = s.band_factors {
            c.band_factors = v;
        }
        if let Some(v) = s.oversample {
            c.oversample = v;
        }
    }

    if let Some(a) = file.agc {
        let c = &mut config.agc;
        if let Some(v) = a.smoothing {
            c.smoothing = v;
        }
        if let Some(v) = a.target {
            c.target = v;
        }
        if let Some(v) = a.gain_min {
            c.gain_min = v;
        }
        if let Some(v) = a.gain_max {
            c.gain_max = v;
        }
        if let Some(v) = a.initial_loudness {
            c.initial_loudness = v;
        }
        if let Some(v) = a.loudness_floor {
            c.loudness_floor = v;
        }
    }

    if let Some(e) = file.envelope {
        if let Some(v) = e.smoothing {
            config.envelope.smoothing = v;
        }
        if let Some(v) = e.peak_decay {
            config.envelope.peak_decay = v;
        }
    }

    if let Some(o) = file.onset {
        let c = &mut config.onset;
        if let Some(v) = o.strategy {
            c.strategy = v;
        }
        if let Some(v) = o.signal {
            c.signal = v;
        }
        if let Some(v) = o.bass_band {
            c.bass_band = v;
        }
        if let Some(v) = o.threshold_ratio {
            c.threshold_ratio = v;
        }
        if let Some(v) = o.refractory_divisor {
            c.refractory_divisor = v;
        }
    }

    if let Some(w) = file.windowed {
        let c = &mut config.windowed;
        if let Some(v) = w.sample_interval_ms {
            c.sample_interval_ms = v;
        }
        if let Some(v) = w.percentile_low {
            c.percentile_low = v;
        }
        if let Some(v) = w.percentile_high {
            c.percentile_high = v;
        }
        if let Some(v) = w.min_threshold {
            c.min_threshold = v;
        }
    }

    if let Some(t) = file.tempo {
        let c = &mut config.tempo;
        if let Some(v) = t.min_bpm {
            c.min_bpm = v;
        }
        if let Some(v) = t.max_bpm {
            c.max_bpm = v;
        }
        if let Some(v) = t.bucket_ms {
            c.bucket_ms = v;
        }
        if let Some(v) = t.analysis_period_ms {
            c.analysis_period_ms = v;
        }
        if let Some(v) = t.min_onsets {
            c.min_onsets = v;
        }
        if let Some(v) = t.confidence_threshold {
            c.confidence_threshold = v;
        }
        if let Some(v) = t.log_capacity {
            c.log_capacity = v;
        }
    }

    config.clamp_all();
    config.validate()?;
    Ok(config)
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use eq7_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<BeatConfig> {
    if !path.exists() {
        return Err(CoreError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Configuration invalide dans {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").expect("empty config parses");
        assert_eq!(config, BeatConfig::default());
    }

    #[test]
    fn partial_sections_override_defaults() {
        let text = r#"
[sampler]
noise_floor = 80

[onset]
strategy = "windowed"
signal = "decay"

[tempo]
confidence_threshold = 5
"#;
        let config = parse_config(text).expect("valid config");
        assert_eq!(config.sampler.noise_floor, 80);
        assert_eq!(config.sampler.band_factors, [8, 8, 9, 8, 7, 4, 10]);
        assert_eq!(config.onset.strategy, OnsetStrategy::Windowed);
        assert_eq!(config.onset.signal, OnsetSignal::Decay);
        assert_eq!(config.tempo.confidence_threshold, 5);
        assert_eq!(config.tempo.bucket_ms, 15);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let text = r"
[agc]
gain_min = 50.0
gain_max = 2.0

[onset]
bass_band = 12
refractory_divisor = 0

[tempo]
log_capacity = 500
min_onsets = 1
";
        let config = parse_config(text).expect("valid config");
        assert!((config.agc.gain_min - 50.0).abs() < f32::EPSILON);
        assert!(config.agc.gain_max >= config.agc.gain_min);
        assert_eq!(config.onset.bass_band, BAND_COUNT - 1);
        assert_eq!(config.onset.refractory_divisor, 1);
        assert_eq!(config.tempo.log_capacity, MAX_LOG_CAPACITY);
        assert_eq!(config.tempo.min_onsets, 2);
    }

    #[test]
    fn window_sampling_fits_one_analysis_period() {
        let config = parse_config("[tempo]\nanalysis_period_ms = 6000\n").expect("valid config");
        assert_eq!(config.windowed.sample_interval_ms, 12);

        let config = parse_config("[windowed]\nsample_interval_ms = 2\n").expect("valid config");
        assert_eq!(config.windowed.sample_interval_ms, 5);

        let config = parse_config("[tempo]\nanalysis_period_ms = 60000\n").expect("valid config");
        assert_eq!(config.windowed.sample_interval_ms, 118);
        assert!(60_000 / config.windowed.sample_interval_ms <= WINDOW_CAPACITY as Millis);

        let config = parse_config("").expect("empty config parses");
        assert_eq!(config.windowed.sample_interval_ms, 10);
    }

    #[test]
    fn decay_signal_is_silent_above_the_peak_hold_bound() {
        let mut config = BeatConfig::default();
        assert!(config.onset_can_fire());

        config.onset.signal = OnsetSignal::Decay;
        assert!(!config.onset_can_fire());
        // warns only
        assert!(config.validate().is_ok());

        config.onset.threshold_ratio = 0.9;
        assert!(config.onset_can_fire());

        config.onset.threshold_ratio = 1.5;
        config.onset.strategy = OnsetStrategy::Windowed;
        assert!(config.onset_can_fire());
    }

    #[test]
    fn inverted_bpm_range_is_rejected() {
        let err = parse_config("[tempo]\nmin_bpm = 140\nmax_bpm = 90\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[envelope]\npeak_decay = 0.9").expect("write temp config");
        let config = load_config(file.path()).expect("config loads");
        assert!((config.envelope.peak_decay - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml"));
        assert!(err.is_err());
    }

    #[test]
    fn refractory_follows_window() {
        let mut config = BeatConfig::default();
        config.tempo.max_bpm = 150;
        assert_eq!(config.tempo_window().min, 400);
        assert_eq!(config.refractory_ms(), 100);
    }
}
