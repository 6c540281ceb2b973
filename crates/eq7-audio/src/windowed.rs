use eq7_core::config::{WINDOW_CAPACITY, WindowedConfig};
use eq7_core::ring::RingLog;
use eq7_core::time::{Millis, elapsed};

use crate::peak_log::PeakEventLog;

/// One recorded bass level, scaled to 0..=255 against the loudest level seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowSample {
    pub millis: Millis,
    pub value: u8,
}

/// Result of one window analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Threshold too low (or window too short): treat the tempo as unknown.
    NoSignal { threshold: u8 },
    /// Crossings above `threshold` were pushed to the onset log.
    Onsets { threshold: u8, count: usize },
}

/// Alternative onset strategy: pick a threshold from the sorted window.
///
/// The bass level is recorded on a fixed grid. At analysis time the window
/// is sorted and the steepest step between the low and high percentile
/// positions becomes the threshold; every rising crossing of it is an
/// onset. The window is cleared after each analysis.
pub struct WindowedThresholdDetector {
    config: WindowedConfig,
    samples: RingLog<WindowSample, WINDOW_CAPACITY>,
    max_level: u16,
    last_sample_at: Option<Millis>,
    /// Last value of the previous window, so a kick straddling two windows counts once.
    carry: u8,
}

impl WindowedThresholdDetector {
    #[must_use]
    pub fn new(config: WindowedConfig) -> Self {
        Self {
            config,
            samples: RingLog::new(),
            max_level: 0,
            last_sample_at: None,
            carry: 0,
        }
    }

    /// Record `level` if a sample interval has passed since the last record.
    pub fn record(&mut self, now: Millis, level: u16) {
        if let Some(last) = self.last_sample_at {
            if elapsed(now, last) < self.config.sample_interval_ms {
                return;
            }
        }
        self.last_sample_at = Some(now);
        self.max_level = self.max_level.max(level);
        let value = if self.max_level == 0 {
            0
        } else {
            (u32::from(level) * 255 / u32::from(self.max_level)) as u8
        };
        self.samples.push(WindowSample { millis: now, value });
    }

    /// Steepest step of the sorted window between the percentile bounds.
    ///
    /// `None` when fewer than two samples were recorded.
    ///
    /// # Example
    /// ```
    /// use eq7_audio::windowed::WindowedThresholdDetector;
    /// use eq7_core::config::WindowedConfig;
    ///
    /// let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
    /// for i in 0..100u32 {
    ///     let level = if i % 25 == 0 { 1000 } else { 100 };
    ///     det.record(i * 10, level);
    /// }
    /// assert_eq!(det.select_threshold(), Some(255));
    /// ```
    #[must_use]
    pub fn select_threshold(&self) -> Option<u8> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let mut sorted = [0u8; WINDOW_CAPACITY];
        for (slot, s) in sorted.iter_mut().zip(self.samples.iter()) {
            *slot = s.value;
        }
        let sorted = &mut sorted[..n];
        sorted.sort_unstable();

        let at = |percentile: u8| usize::from(percentile) * n / 100;
        let start = at(self.config.percentile_low).clamp(1, n - 1);
        let end = at(self.config.percentile_high).min(n);

        let step = |i: usize| sorted[i] - sorted[i - 1];
        let mut best = start;
        for i in start..end {
            if step(i) > step(best) {
                best = i;
            }
        }
        Some(sorted[best])
    }

    /// Analyze and clear the window, pushing onsets into `log`.
    pub fn analyze(&mut self, log: &mut PeakEventLog) -> WindowOutcome {
        let outcome = match self.select_threshold() {
            Some(threshold) if threshold >= self.config.min_threshold => {
                let mut last = self.carry;
                let mut count = 0;
                for sample in self.samples.iter() {
                    if last < threshold && sample.value >= threshold {
                        log.push(sample.millis);
                        count += 1;
                    }
                    last = sample.value;
                }
                WindowOutcome::Onsets { threshold, count }
            }
            Some(threshold) => WindowOutcome::NoSignal { threshold },
            None => WindowOutcome::NoSignal { threshold: 0 },
        };
        if let Some(latest) = self.samples.latest() {
            self.carry = latest.value;
        }
        self.samples.clear();
        outcome
    }

    /// Samples recorded since the last analysis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn set_config(&mut self, config: WindowedConfig) {
        self.config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_window(det: &mut WindowedThresholdDetector, period_samples: u32, count: u32) {
        for i in 0..count {
            // 50 ms pulses over a noisy floor
            let level = if i % period_samples < 5 { 900 } else { 80 + (i % 7) as u16 };
            det.record(i * 10, level);
        }
    }

    #[test]
    fn records_on_the_sample_grid() {
        let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
        for t in 0..100 {
            det.record(t, 50);
        }
        // 0, 10, 20, ... 90
        assert_eq!(det.len(), 10);
    }

    #[test]
    fn pulses_become_onsets() {
        let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
        // a 900 pulse every 500 ms over 2.5 s
        pulse_window(&mut det, 50, 250);
        let mut log = PeakEventLog::with_capacity(20);
        let outcome = det.analyze(&mut log);
        assert!(matches!(outcome, WindowOutcome::Onsets { count: 5, .. }), "{outcome:?}");
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![0, 500, 1000, 1500, 2000]);
        assert!(det.is_empty());
    }

    #[test]
    fn kick_straddling_windows_counts_once() {
        // 50 ms pulses centred on every 500 ms boundary
        let level = |i: u32| if i % 50 >= 47 || i % 50 < 2 { 900 } else { 80 };
        let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
        let mut log = PeakEventLog::with_capacity(20);
        for i in 0..250 {
            det.record(i * 10, level(i));
        }
        det.analyze(&mut log);
        for i in 250..500 {
            det.record(i * 10, level(i));
        }
        det.analyze(&mut log);

        let onsets: Vec<Millis> = log.iter().collect();
        assert!(!onsets.contains(&2500), "{onsets:?}");
        assert_eq!(onsets.iter().filter(|&&t| t > 2500).count(), 5);
    }

    #[test]
    fn silence_reports_no_signal() {
        let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
        for i in 0..200 {
            det.record(i * 10, 0);
        }
        let mut log = PeakEventLog::with_capacity(20);
        assert_eq!(det.analyze(&mut log), WindowOutcome::NoSignal { threshold: 0 });
        assert!(log.is_empty());
    }

    #[test]
    fn empty_window_reports_no_signal() {
        let mut det = WindowedThresholdDetector::new(WindowedConfig::default());
        let mut log = PeakEventLog::with_capacity(20);
        assert!(matches!(det.analyze(&mut log), WindowOutcome::NoSignal { .. }));
    }
}
