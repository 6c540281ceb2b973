use eq7_core::time::{Millis, elapsed, is_after};

use crate::tempo::TempoEstimate;

/// Predicted beat instants around the current time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BeatPhase {
    pub last_predicted_beat_millis: Millis,
    pub next_predicted_beat_millis: Millis,
    /// Wraps on overflow; renderers only use its parity.
    pub beat_counter: u32,
}

/// Beat instants bracketing `now` for a tempo, `None` without a prediction.
///
/// # Example
/// ```
/// use eq7_audio::phase::predict_beats;
/// use eq7_audio::tempo::TempoEstimate;
///
/// let tempo = TempoEstimate { millis_per_beat: 500, last_confident_beat_millis: 1000 };
/// assert_eq!(predict_beats(2300, tempo), Some((2000, 2500)));
/// ```
#[must_use]
pub fn predict_beats(now: Millis, tempo: TempoEstimate) -> Option<(Millis, Millis)> {
    let mpb = tempo.millis_per_beat;
    let anchor = tempo.last_confident_beat_millis;
    if mpb == 0 || anchor == 0 {
        return None;
    }
    let beats_elapsed = elapsed(now, anchor) / mpb;
    let last = anchor.wrapping_add(beats_elapsed * mpb);
    Some((last, last.wrapping_add(mpb)))
}

/// Extrapolates beats from the tempo anchor and counts crossings.
pub struct BeatPhasePredictor {
    tempo: TempoEstimate,
    phase: BeatPhase,
    synced: bool,
}

impl BeatPhasePredictor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tempo: TempoEstimate::default(),
            phase: BeatPhase::default(),
            synced: false,
        }
    }

    /// Advance to `now`. Returns `true` on the tick a predicted beat is crossed.
    ///
    /// Losing the tempo keeps the last stored pair and the counter.
    pub fn update(&mut self, now: Millis, tempo: TempoEstimate) -> bool {
        self.tempo = tempo;
        let Some((last, next)) = predict_beats(now, tempo) else {
            return false;
        };
        if self.synced && !is_after(now, self.phase.next_predicted_beat_millis) {
            return false;
        }
        self.synced = true;
        self.phase.last_predicted_beat_millis = last;
        self.phase.next_predicted_beat_millis = next;
        self.phase.beat_counter = self.phase.beat_counter.wrapping_add(1);
        true
    }

    #[inline]
    #[must_use]
    pub fn has_predicted_beat(&self) -> bool {
        self.tempo.millis_per_beat != 0 && self.tempo.last_confident_beat_millis != 0
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> BeatPhase {
        self.phase
    }

    /// Position of `now` between the stored last and next beat, in [0.0, 1.0].
    #[must_use]
    pub fn beat_progress(&self, now: Millis) -> f32 {
        let BeatPhase {
            last_predicted_beat_millis: last,
            next_predicted_beat_millis: next,
            ..
        } = self.phase;
        let span = elapsed(next, last);
        if span == 0 {
            return 0.0;
        }
        (elapsed(now, last) as f32 / span as f32).clamp(0.0, 1.0)
    }
}

impl Default for BeatPhasePredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(mpb: Millis, anchor: Millis) -> TempoEstimate {
        TempoEstimate {
            millis_per_beat: mpb,
            last_confident_beat_millis: anchor,
        }
    }

    #[test]
    fn brackets_now_between_beats() {
        assert_eq!(predict_beats(2300, tempo(500, 1000)), Some((2000, 2500)));
        assert_eq!(predict_beats(2500, tempo(500, 1000)), Some((2500, 3000)));
        assert_eq!(predict_beats(1000, tempo(500, 1000)), Some((1000, 1500)));
    }

    #[test]
    fn no_prediction_without_tempo_or_anchor() {
        assert_eq!(predict_beats(2300, tempo(0, 1000)), None);
        assert_eq!(predict_beats(2300, tempo(500, 0)), None);
        let mut predictor = BeatPhasePredictor::new();
        assert!(!predictor.update(2300, tempo(0, 1000)));
        assert!(!predictor.has_predicted_beat());
    }

    #[test]
    fn counter_advances_once_per_crossing() {
        let mut predictor = BeatPhasePredictor::new();
        let t = tempo(500, 1000);
        let mut crossings = 0;
        for now in (2300..=4100).step_by(10) {
            if predictor.update(now, t) {
                crossings += 1;
            }
        }
        // first sync at 2300, then 2510, 3010, 3510, 4010
        assert_eq!(crossings, 5);
        assert_eq!(predictor.phase().beat_counter, 5);
        assert_eq!(predictor.phase().last_predicted_beat_millis, 4000);
        assert_eq!(predictor.phase().next_predicted_beat_millis, 4500);
    }

    #[test]
    fn losing_tempo_keeps_phase() {
        let mut predictor = BeatPhasePredictor::new();
        predictor.update(2300, tempo(500, 1000));
        let before = predictor.phase();
        assert!(!predictor.update(9000, tempo(0, 1000)));
        assert_eq!(predictor.phase(), before);
        assert!(!predictor.has_predicted_beat());
    }

    #[test]
    fn counter_wraps() {
        let mut predictor = BeatPhasePredictor::new();
        predictor.phase.beat_counter = u32::MAX;
        predictor.update(2300, tempo(500, 1000));
        assert_eq!(predictor.phase().beat_counter, 0);
    }

    #[test]
    fn progress_runs_from_last_to_next() {
        let mut predictor = BeatPhasePredictor::new();
        assert!(predictor.beat_progress(100).abs() < f32::EPSILON);
        predictor.update(2300, tempo(500, 1000));
        assert!((predictor.beat_progress(2250) - 0.5).abs() < 1e-6);
        assert!((predictor.beat_progress(2600) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn beats_keep_coming_across_clock_wrap() {
        let mut predictor = BeatPhasePredictor::new();
        let anchor = u32::MAX - 1999;
        let t = tempo(500, anchor);
        let mut crossings = 0;
        let mut now = anchor.wrapping_add(300);
        for _ in 0..400 {
            if predictor.update(now, t) {
                crossings += 1;
            }
            now = now.wrapping_add(10);
        }
        // sync at anchor + 300, then a crossing every 500 ms through the wrap
        assert_eq!(crossings, 9);
        assert_eq!(predictor.phase().next_predicted_beat_millis, 2500);
        assert!((predictor.beat_progress(2250) - 0.5).abs() < 1e-6);
    }
}
