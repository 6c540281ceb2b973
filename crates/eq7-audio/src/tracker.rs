use eq7_core::config::{BeatConfig, OnsetSignal, OnsetStrategy};
use eq7_core::frame::{BeatSignals, SpectrumFrame};
use eq7_core::time::{Millis, elapsed, millis_per_beat_to_bpm};
use eq7_core::traits::SpectrumBus;

use crate::agc::{AgcController, AgcState};
use crate::envelope::SpectrumEnvelope;
use crate::onset::BassPeakDetector;
use crate::peak_log::{PeakEventLog, new_peak_log, resize_peak_log};
use crate::phase::{BeatPhase, BeatPhasePredictor};
use crate::sampler::SpectrumSampler;
use crate::tempo::{AnalysisOutcome, BpmEstimator, TempoEstimate};
use crate::windowed::{WindowOutcome, WindowedThresholdDetector};

/// The onset strategy in use.
enum OnsetStage {
    PeakRatio(BassPeakDetector),
    Windowed(WindowedThresholdDetector),
}

impl OnsetStage {
    fn from_config(config: &BeatConfig) -> Self {
        match config.onset.strategy {
            OnsetStrategy::PeakRatio => Self::PeakRatio(BassPeakDetector::new(
                config.onset.threshold_ratio,
                config.refractory_ms(),
            )),
            OnsetStrategy::Windowed => {
                Self::Windowed(WindowedThresholdDetector::new(config.windowed.clone()))
            }
        }
    }
}

/// What happened during one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Onsets logged this tick. At most one with the peak-ratio strategy;
    /// the windowed strategy logs a whole window at analysis time.
    pub onsets: usize,
    /// A predicted beat instant was crossed.
    pub beat: bool,
    /// Set when the periodic tempo analysis ran this tick.
    pub analysis: Option<AnalysisOutcome>,
}

/// Per-tick pipeline: sampler → AGC → envelope → onset → log, plus the
/// periodic tempo analysis and beat prediction.
///
/// Single-threaded; every call runs to completion without allocating.
///
/// # Example
/// ```
/// use eq7_audio::bus::{SyntheticBus, TimedBus};
/// use eq7_audio::tracker::BeatTracker;
/// use eq7_core::config::BeatConfig;
///
/// let mut tracker = BeatTracker::new(BeatConfig::default());
/// let mut bus = SyntheticBus::new(120.0, 7);
/// for now in (1..=15_000).step_by(10) {
///     bus.advance_to(now);
///     tracker.tick(now, &mut bus);
/// }
/// assert!(tracker.has_predicted_beat());
/// ```
pub struct BeatTracker {
    config: BeatConfig,
    sampler: SpectrumSampler,
    agc: AgcController,
    envelope: SpectrumEnvelope,
    onset: OnsetStage,
    log: PeakEventLog,
    estimator: BpmEstimator,
    predictor: BeatPhasePredictor,
    now: Millis,
    last_analysis: Millis,
}

impl BeatTracker {
    #[must_use]
    pub fn new(config: BeatConfig) -> Self {
        Self {
            sampler: SpectrumSampler::new(config.sampler.clone()),
            agc: AgcController::new(config.agc.clone()),
            envelope: SpectrumEnvelope::new(config.envelope.clone()),
            onset: OnsetStage::from_config(&config),
            log: new_peak_log(&config.tempo),
            estimator: BpmEstimator::new(&config.tempo),
            predictor: BeatPhasePredictor::new(),
            now: 0,
            last_analysis: 0,
            config,
        }
    }

    /// Run one tick at timestamp `now`.
    pub fn tick<B: SpectrumBus>(&mut self, now: Millis, bus: &mut B) -> TickEvents {
        self.now = now;

        let band_sum = self.sampler.sample(bus, self.agc.gain());
        self.agc.update(band_sum);

        let frame = *self.sampler.frame();
        self.envelope.update(&frame);

        let band = self.config.onset.bass_band;
        let mut onsets = match &mut self.onset {
            OnsetStage::PeakRatio(detector) => {
                let level = match self.config.onset.signal {
                    OnsetSignal::Raw => f32::from(frame.band(band)),
                    OnsetSignal::Decay => self.envelope.decay()[band],
                };
                usize::from(detector.evaluate(now, level, self.envelope.peak()[band], &mut self.log))
            }
            OnsetStage::Windowed(detector) => {
                detector.record(now, frame.band(band));
                0
            }
        };

        let analysis = if elapsed(now, self.last_analysis) >= self.config.tempo.analysis_period_ms {
            self.last_analysis = now;
            let (outcome, window_onsets) = self.run_analysis();
            onsets += window_onsets;
            Some(outcome)
        } else {
            None
        };

        let beat = self.predictor.update(now, self.estimator.estimate());

        TickEvents {
            onsets,
            beat,
            analysis,
        }
    }

    /// Run the tempo analysis now, independent of the period.
    pub fn analyze(&mut self) -> AnalysisOutcome {
        self.run_analysis().0
    }

    /// Analysis outcome plus the onsets a windowed pass logged.
    fn run_analysis(&mut self) -> (AnalysisOutcome, usize) {
        let mut logged = 0;
        if let OnsetStage::Windowed(detector) = &mut self.onset {
            match detector.analyze(&mut self.log) {
                WindowOutcome::NoSignal { threshold } => {
                    log::debug!("Fenêtre sans signal (seuil {threshold})");
                    self.estimator.clear_confidence();
                    let outcome = AnalysisOutcome::NoConfidence {
                        candidate: 0,
                        multiplicity: 0,
                    };
                    return (outcome, 0);
                }
                WindowOutcome::Onsets { threshold, count } => {
                    log::debug!("Fenêtre : seuil {threshold}, {count} onsets");
                    logged = count;
                }
            }
        }

        let outcome = self.estimator.analyze(&self.log);
        log::debug!("Analyse @ {} ms : {outcome:?}", self.now);
        (outcome, logged)
    }

    /// Apply a new configuration, keeping learned state where it still fits.
    ///
    /// Switching onset strategy restarts that stage; the onset log, AGC
    /// loudness, envelopes, and tempo survive.
    pub fn set_config(&mut self, config: BeatConfig) {
        self.sampler.set_config(config.sampler.clone());
        self.agc.set_config(config.agc.clone());
        self.envelope.set_config(&config.envelope);
        self.estimator.set_config(&config.tempo);

        match (&mut self.onset, config.onset.strategy) {
            (OnsetStage::PeakRatio(detector), OnsetStrategy::PeakRatio) => {
                detector.set_tuning(config.onset.threshold_ratio, config.refractory_ms());
            }
            (OnsetStage::Windowed(detector), OnsetStrategy::Windowed) => {
                detector.set_config(config.windowed.clone());
            }
            _ => {
                log::info!("Stratégie d'onset : {:?}", config.onset.strategy);
                self.onset = OnsetStage::from_config(&config);
            }
        }

        if self.log.capacity() != config.tempo.log_capacity {
            self.log = resize_peak_log(&self.log, config.tempo.log_capacity);
        }

        self.config = config;
    }

    /// Snapshot of every renderer-facing signal.
    #[must_use]
    pub fn signals(&self) -> BeatSignals {
        let tempo = self.estimator.estimate();
        let phase = self.predictor.phase();
        let agc = self.agc.state();
        BeatSignals {
            now: self.now,
            raw: self.sampler.frame().bands,
            decay: *self.envelope.decay(),
            peak: *self.envelope.peak(),
            is_local_peak: self.is_local_peak(),
            gain: agc.gain,
            loudness: agc.running_loudness,
            millis_per_beat: tempo.millis_per_beat,
            bpm: millis_per_beat_to_bpm(tempo.millis_per_beat),
            has_predicted_beat: self.predictor.has_predicted_beat(),
            beat_counter: phase.beat_counter,
            last_predicted_beat: phase.last_predicted_beat_millis,
            next_predicted_beat: phase.next_predicted_beat_millis,
            beat_progress: self.predictor.beat_progress(self.now),
            last_onset: self.log.latest(),
            onset_count: self.log.len(),
        }
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> &SpectrumFrame {
        self.sampler.frame()
    }

    #[inline]
    #[must_use]
    pub fn envelope(&self) -> &SpectrumEnvelope {
        &self.envelope
    }

    /// `true` only on the tick a bass onset was recorded.
    #[must_use]
    pub fn is_local_peak(&self) -> bool {
        match &self.onset {
            OnsetStage::PeakRatio(detector) => detector.is_local_peak(),
            OnsetStage::Windowed(_) => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn tempo(&self) -> TempoEstimate {
        self.estimator.estimate()
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> BeatPhase {
        self.predictor.phase()
    }

    #[inline]
    #[must_use]
    pub fn has_predicted_beat(&self) -> bool {
        self.predictor.has_predicted_beat()
    }

    #[inline]
    #[must_use]
    pub fn agc(&self) -> AgcState {
        self.agc.state()
    }

    /// Logged onsets, oldest first.
    pub fn onsets(&self) -> impl Iterator<Item = Millis> + '_ {
        self.log.iter()
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &BeatConfig {
        &self.config
    }
}
