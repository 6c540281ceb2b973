use eq7_core::config::{MAX_LOG_CAPACITY, TempoConfig};
use eq7_core::ring::RingLog;
use eq7_core::time::Millis;

/// Onset timestamps, oldest first. Full logs silently drop the oldest onset.
pub type PeakEventLog = RingLog<Millis, MAX_LOG_CAPACITY>;

/// Empty log sized from the tempo configuration.
///
/// # Example
/// ```
/// use eq7_audio::peak_log::new_peak_log;
/// use eq7_core::config::TempoConfig;
/// let log = new_peak_log(&TempoConfig::default());
/// assert_eq!(log.capacity(), 20);
/// ```
#[must_use]
pub fn new_peak_log(config: &TempoConfig) -> PeakEventLog {
    PeakEventLog::with_capacity(config.log_capacity)
}

/// Rebuild a log with a new capacity, keeping the most recent onsets.
#[must_use]
pub fn resize_peak_log(log: &PeakEventLog, capacity: usize) -> PeakEventLog {
    let mut resized = PeakEventLog::with_capacity(capacity);
    for t in log.iter() {
        resized.push(t);
    }
    resized
}
