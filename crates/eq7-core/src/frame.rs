use serde::{Deserialize, Serialize};

use crate::time::{Millis, elapsed};

/// Number of bands reported by the analyzer chip.
pub const BAND_COUNT: usize = 7;

/// Une mesure calibrée des 7 bandes. Réécrite à chaque tick.
///
/// # Example
/// ```
/// use eq7_core::frame::SpectrumFrame;
/// let frame = SpectrumFrame::from([10, 20, 30, 40, 50, 60, 70]);
/// assert_eq!(frame.max(), 70);
/// assert!((frame.average() - 40.0).abs() < f32::EPSILON);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Gained magnitude per band, lowest frequency first.
    pub bands: [u16; BAND_COUNT],
}

impl SpectrumFrame {
    /// Mean magnitude across all bands.
    #[inline]
    #[must_use]
    pub fn average(&self) -> f32 {
        let sum: u32 = self.bands.iter().map(|&b| u32::from(b)).sum();
        sum as f32 / BAND_COUNT as f32
    }

    /// Largest band magnitude.
    #[inline]
    #[must_use]
    pub fn max(&self) -> u16 {
        self.bands.iter().copied().max().unwrap_or(0)
    }

    /// Magnitude of one band, 0 if the index is out of range.
    #[inline]
    #[must_use]
    pub fn band(&self, index: usize) -> u16 {
        self.bands.get(index).copied().unwrap_or(0)
    }
}

impl From<[u16; BAND_COUNT]> for SpectrumFrame {
    fn from(bands: [u16; BAND_COUNT]) -> Self {
        Self { bands }
    }
}

/// Snapshot of everything the renderers may read after a tick.
///
/// `Copy` and allocation-free so it can travel through a triple buffer.
///
/// # Example
/// ```
/// use eq7_core::frame::BeatSignals;
/// let signals = BeatSignals::default();
/// assert!(!signals.has_predicted_beat);
/// assert_eq!(signals.millis_per_beat, 0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSignals {
    /// Timestamp of the tick that produced this snapshot.
    pub now: Millis,
    /// Gained magnitudes of the current tick.
    pub raw: [u16; BAND_COUNT],
    /// Exponentially smoothed magnitudes.
    pub decay: [f32; BAND_COUNT],
    /// Peak-hold envelope of `decay`.
    pub peak: [f32; BAND_COUNT],
    /// `true` only on the tick where a bass onset was recorded.
    pub is_local_peak: bool,
    /// Current AGC multiplier.
    pub gain: f32,
    /// Long-run pre-gain loudness tracked by the AGC.
    pub loudness: f32,
    /// Beat length in ms, 0 when there is no confident tempo.
    pub millis_per_beat: Millis,
    /// Tempo derived from `millis_per_beat`, 0.0 when unknown.
    pub bpm: f32,
    pub has_predicted_beat: bool,
    /// Incremented each time a predicted beat instant is crossed.
    pub beat_counter: u32,
    pub last_predicted_beat: Millis,
    pub next_predicted_beat: Millis,
    /// Position of `now` between the last and next predicted beat [0.0, 1.0].
    pub beat_progress: f32,
    /// Most recent onset timestamp, if any was logged.
    pub last_onset: Option<Millis>,
    /// Number of onsets currently held by the log.
    pub onset_count: usize,
}

impl BeatSignals {
    /// Milliseconds since the last logged onset, `None` before the first one.
    ///
    /// # Example
    /// ```
    /// use eq7_core::frame::BeatSignals;
    /// let signals = BeatSignals { now: 1500, last_onset: Some(1200), ..Default::default() };
    /// assert_eq!(signals.since_last_onset(), Some(300));
    /// ```
    #[inline]
    #[must_use]
    pub fn since_last_onset(&self) -> Option<Millis> {
        self.last_onset.map(|t| elapsed(self.now, t))
    }
}
