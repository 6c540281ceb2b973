use eq7_core::time::{Millis, elapsed};

use crate::peak_log::PeakEventLog;

/// Bass onset detection: falling edge above a peak ratio, with a refractory gate.
///
/// An onset is recorded on the tick where the bass level turns downward
/// (`previous > current`) while either value sits above
/// `threshold_ratio * peak`, and only if the newest logged onset is at least
/// `refractory_ms` old. A plain threshold crossing would fire several times
/// on one kick; the edge plus refractory gate fires once.
///
/// # Example
/// ```
/// use eq7_audio::onset::BassPeakDetector;
/// use eq7_audio::peak_log::PeakEventLog;
///
/// let mut log = PeakEventLog::with_capacity(20);
/// let mut detector = BassPeakDetector::new(1.5, 120);
/// assert!(!detector.evaluate(1000, 900.0, 100.0, &mut log)); // rising
/// assert!(detector.evaluate(1010, 500.0, 120.0, &mut log));  // turned down
/// assert_eq!(log.latest(), Some(1010));
/// ```
pub struct BassPeakDetector {
    threshold_ratio: f32,
    refractory_ms: Millis,
    previous: f32,
    is_local_peak: bool,
}

impl BassPeakDetector {
    #[must_use]
    pub fn new(threshold_ratio: f32, refractory_ms: Millis) -> Self {
        Self {
            threshold_ratio,
            refractory_ms,
            previous: 0.0,
            is_local_peak: false,
        }
    }

    /// Evaluate one tick. Pushes `now` into `log` and returns `true` on onset.
    ///
    /// `level` is this tick's bass level, `peak` the bass peak-hold envelope.
    pub fn evaluate(&mut self, now: Millis, level: f32, peak: f32, log: &mut PeakEventLog) -> bool {
        let previous = self.previous;
        self.previous = level;

        let turned_down = previous > level;
        let above = previous.max(level) > self.threshold_ratio * peak;
        let rested = log
            .latest()
            .is_none_or(|last| elapsed(now, last) >= self.refractory_ms);

        self.is_local_peak = turned_down && above && rested;
        if self.is_local_peak {
            log.push(now);
            log::trace!("Onset basse @ {now} ms (niveau {previous:.0}, pic {peak:.0})");
        }
        self.is_local_peak
    }

    /// `true` only for the tick on which an onset was recorded.
    #[inline]
    #[must_use]
    pub fn is_local_peak(&self) -> bool {
        self.is_local_peak
    }

    pub fn set_tuning(&mut self, threshold_ratio: f32, refractory_ms: Millis) {
        self.threshold_ratio = threshold_ratio;
        self.refractory_ms = refractory_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `(level, peak)` pairs at 10 ms spacing, return onset times.
    fn run(detector: &mut BassPeakDetector, log: &mut PeakEventLog, start: Millis, input: &[(f32, f32)]) -> Vec<Millis> {
        let mut fired = Vec::new();
        for (i, &(level, peak)) in input.iter().enumerate() {
            let now = start + i as Millis * 10;
            if detector.evaluate(now, level, peak, log) {
                fired.push(now);
            }
        }
        fired
    }

    #[test]
    fn fires_once_on_the_falling_edge() {
        let mut log = PeakEventLog::with_capacity(20);
        let mut detector = BassPeakDetector::new(1.5, 120);
        let kick = [
            (200.0, 200.0),
            (1500.0, 330.0),
            (1300.0, 420.0),
            (900.0, 460.0),
            (400.0, 450.0),
            (210.0, 430.0),
        ];
        let fired = run(&mut detector, &mut log, 1000, &kick);
        assert_eq!(fired, vec![1020]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn below_ratio_never_fires() {
        let mut log = PeakEventLog::with_capacity(20);
        let mut detector = BassPeakDetector::new(1.5, 120);
        let wobble = [(300.0, 250.0), (360.0, 260.0), (340.0, 265.0), (300.0, 262.0)];
        assert!(run(&mut detector, &mut log, 0, &wobble).is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn refractory_gate_blocks_close_onsets() {
        let mut log = PeakEventLog::with_capacity(20);
        let mut detector = BassPeakDetector::new(1.5, 120);
        // Two down-turns 40 ms apart, then one 150 ms after the first.
        let input = [
            (1000.0, 100.0),
            (800.0, 100.0),
            (1000.0, 100.0),
            (900.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
            (1000.0, 100.0),
            (800.0, 100.0),
        ];
        let fired = run(&mut detector, &mut log, 0, &input);
        assert_eq!(fired, vec![10, 150]);
    }

    #[test]
    fn refractory_gate_reopens_across_clock_wrap() {
        let mut log = PeakEventLog::with_capacity(20);
        let mut detector = BassPeakDetector::new(1.5, 120);
        let before_wrap = u32::MAX - 59;
        detector.evaluate(before_wrap - 10, 1000.0, 100.0, &mut log);
        assert!(detector.evaluate(before_wrap, 500.0, 100.0, &mut log));

        // 110 ms after the first onset, past the wrap
        detector.evaluate(40, 1000.0, 100.0, &mut log);
        assert!(!detector.evaluate(50, 500.0, 100.0, &mut log));
        detector.evaluate(60, 1000.0, 100.0, &mut log);
        assert!(detector.evaluate(70, 500.0, 100.0, &mut log));
        assert_eq!(log.latest(), Some(70));
    }

    #[test]
    fn flag_clears_on_next_tick() {
        let mut log = PeakEventLog::with_capacity(20);
        let mut detector = BassPeakDetector::new(1.5, 0);
        detector.evaluate(0, 1000.0, 100.0, &mut log);
        assert!(detector.evaluate(10, 500.0, 100.0, &mut log));
        assert!(detector.is_local_peak());
        detector.evaluate(20, 400.0, 500.0, &mut log);
        assert!(!detector.is_local_peak());
    }
}
