use eq7_core::config::{MAX_LOG_CAPACITY, TempoConfig};
use eq7_core::time::{Millis, TempoWindow, elapsed};
use serde::Serialize;

use crate::peak_log::PeakEventLog;

/// Doubling/halving steps allowed before a gap is given up on.
const MAX_FOLD_STEPS: u32 = 32;

/// Current tempo belief.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TempoEstimate {
    /// Beat length, 0 when there is no confidence.
    pub millis_per_beat: Millis,
    /// Timestamp of an onset known to fall on a beat, 0 if none yet.
    pub last_confident_beat_millis: Millis,
}

impl TempoEstimate {
    #[inline]
    #[must_use]
    pub fn is_confident(&self) -> bool {
        self.millis_per_beat != 0
    }
}

/// What one analysis cycle concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Not enough onsets logged; the estimate was left untouched.
    InsufficientOnsets { onsets: usize },
    /// The most common gap was too rare; confidence was reset.
    NoConfidence { candidate: Millis, multiplicity: usize },
    /// A tempo was accepted.
    Confident { millis_per_beat: Millis, multiplicity: usize },
}

/// Map a gap onto `window` by repeated doubling or halving.
///
/// Returns `None` for a zero gap, or when the window is narrower than an
/// octave and the gap keeps jumping over it.
///
/// # Example
/// ```
/// use eq7_audio::tempo::fold_gap;
/// use eq7_core::time::TempoWindow;
///
/// let window = TempoWindow::from_bpm(60, 125); // 480..=1000 ms
/// assert_eq!(fold_gap(250, window), Some(500));
/// assert_eq!(fold_gap(2000, window), Some(1000));
/// assert_eq!(fold_gap(0, window), None);
/// ```
#[must_use]
pub fn fold_gap(gap: Millis, window: TempoWindow) -> Option<Millis> {
    if gap == 0 || window.min == 0 || window.min > window.max {
        return None;
    }
    let mut folded = gap;
    for _ in 0..MAX_FOLD_STEPS {
        if window.contains(folded) {
            return Some(folded);
        }
        folded = if folded < window.min {
            folded.saturating_mul(2)
        } else {
            folded / 2
        };
        if folded == 0 {
            return None;
        }
    }
    window.contains(folded).then_some(folded)
}

/// Round to the nearest multiple of `bucket`, halves going up.
///
/// # Example
/// ```
/// use eq7_audio::tempo::bucket_gap;
/// assert_eq!(bucket_gap(500, 15), 495);
/// assert_eq!(bucket_gap(503, 15), 510);
/// ```
#[inline]
#[must_use]
pub fn bucket_gap(gap: Millis, bucket: Millis) -> Millis {
    if bucket == 0 {
        return gap;
    }
    (gap + bucket / 2) / bucket * bucket
}

/// Bucket a folded gap without letting the rounding leave `window`.
///
/// A gap rounded past either bound moves back by one bucket; windows
/// narrower than a bucket fall back to clamping.
#[must_use]
pub fn bucket_within(gap: Millis, bucket: Millis, window: TempoWindow) -> Millis {
    let mut rounded = bucket_gap(gap, bucket);
    if window.min > window.max {
        return rounded;
    }
    if rounded > window.max {
        rounded = rounded.saturating_sub(bucket);
    } else if rounded < window.min {
        rounded = rounded.saturating_add(bucket);
    }
    rounded.clamp(window.min, window.max)
}

/// Longest run of equal values in a sorted slice: `(value, multiplicity)`.
///
/// The first run wins ties. `None` for an empty slice.
#[must_use]
pub fn most_common(sorted: &[Millis]) -> Option<(Millis, usize)> {
    let mut best: Option<(Millis, usize)> = None;
    let mut run = 0usize;
    let mut last: Option<Millis> = None;
    for &value in sorted {
        run = if last == Some(value) { run + 1 } else { 1 };
        last = Some(value);
        if best.is_none_or(|(_, count)| run > count) {
            best = Some((value, run));
        }
    }
    best
}

/// Periodic tempo estimation over the onset log.
///
/// Gaps between consecutive onsets are folded into the tempo window,
/// bucketed, and the most common bucket wins if it occurs often enough.
/// Folding maps missed beats and double-time detections onto one canonical
/// beat length, which makes the mode robust without autocorrelation.
///
/// # Example
/// ```
/// use eq7_audio::peak_log::PeakEventLog;
/// use eq7_audio::tempo::BpmEstimator;
/// use eq7_core::config::TempoConfig;
///
/// let mut log = PeakEventLog::with_capacity(20);
/// for i in 0..10 {
///     log.push(1000 + i * 500);
/// }
/// let mut estimator = BpmEstimator::new(&TempoConfig::default());
/// estimator.analyze(&log);
/// assert_eq!(estimator.estimate().millis_per_beat, 495);
/// assert_eq!(estimator.estimate().last_confident_beat_millis, 5500);
/// ```
pub struct BpmEstimator {
    window: TempoWindow,
    bucket_ms: Millis,
    min_onsets: usize,
    confidence_threshold: usize,
    estimate: TempoEstimate,
}

impl BpmEstimator {
    #[must_use]
    pub fn new(config: &TempoConfig) -> Self {
        Self {
            window: TempoWindow::from_bpm(config.min_bpm, config.max_bpm),
            bucket_ms: config.bucket_ms,
            min_onsets: config.min_onsets,
            confidence_threshold: config.confidence_threshold,
            estimate: TempoEstimate::default(),
        }
    }

    /// Run one analysis cycle over `log`.
    pub fn analyze(&mut self, log: &PeakEventLog) -> AnalysisOutcome {
        let onsets = log.len();
        if onsets < self.min_onsets.max(2) {
            return AnalysisOutcome::InsufficientOnsets { onsets };
        }

        // (bucketed gap, timestamp ending it), original order
        let mut gaps: [(Millis, Millis); MAX_LOG_CAPACITY] = [(0, 0); MAX_LOG_CAPACITY];
        let mut n = 0;
        let mut previous: Option<Millis> = None;
        for t in log.iter() {
            if let Some(prev) = previous {
                let gap = elapsed(t, prev);
                if let Some(folded) = fold_gap(gap, self.window) {
                    gaps[n] = (bucket_within(folded, self.bucket_ms, self.window), t);
                    n += 1;
                }
            }
            previous = Some(t);
        }
        let gaps = &gaps[..n];

        let mut sorted: [Millis; MAX_LOG_CAPACITY] = [0; MAX_LOG_CAPACITY];
        for (slot, &(gap, _)) in sorted.iter_mut().zip(gaps) {
            *slot = gap;
        }
        let sorted = &mut sorted[..n];
        sorted.sort_unstable();

        let Some((candidate, multiplicity)) = most_common(sorted) else {
            self.estimate.millis_per_beat = 0;
            return AnalysisOutcome::NoConfidence {
                candidate: 0,
                multiplicity: 0,
            };
        };

        log::debug!("Écarts repliés : {sorted:?}");

        if multiplicity < self.confidence_threshold {
            if self.estimate.is_confident() {
                log::info!("Tempo perdu (meilleur écart {candidate} ms ×{multiplicity})");
            }
            self.estimate.millis_per_beat = 0;
            return AnalysisOutcome::NoConfidence {
                candidate,
                multiplicity,
            };
        }

        if self.estimate.millis_per_beat != candidate {
            log::info!(
                "Tempo : {:.1} BPM ({candidate} ms ×{multiplicity})",
                eq7_core::time::millis_per_beat_to_bpm(candidate)
            );
        }
        self.estimate.millis_per_beat = candidate;

        for &(gap, end) in gaps {
            if gap == candidate {
                self.estimate.last_confident_beat_millis = end;
            }
        }

        AnalysisOutcome::Confident {
            millis_per_beat: candidate,
            multiplicity,
        }
    }

    #[inline]
    #[must_use]
    pub fn estimate(&self) -> TempoEstimate {
        self.estimate
    }

    /// Forget the tempo (anchor kept, as after a low-confidence cycle).
    pub fn clear_confidence(&mut self) {
        self.estimate.millis_per_beat = 0;
    }

    /// Apply new tuning. A tempo outside the new window is dropped.
    pub fn set_config(&mut self, config: &TempoConfig) {
        self.window = TempoWindow::from_bpm(config.min_bpm, config.max_bpm);
        self.bucket_ms = config.bucket_ms;
        self.min_onsets = config.min_onsets;
        self.confidence_threshold = config.confidence_threshold;
        if self.estimate.is_confident() && !self.window.contains(self.estimate.millis_per_beat) {
            self.estimate.millis_per_beat = 0;
        }
    }
}
