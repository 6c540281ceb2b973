/// Monotonic milliseconds supplied by the host loop.
pub type Millis = u32;

const MILLIS_PER_MINUTE: u32 = 60_000;

/// Convert a tempo to the length of one beat in milliseconds.
///
/// Returns 0 for a tempo of 0.
///
/// # Example
/// ```
/// use eq7_core::time::bpm_to_millis_per_beat;
/// assert_eq!(bpm_to_millis_per_beat(120), 500);
/// assert_eq!(bpm_to_millis_per_beat(125), 480);
/// ```
#[inline]
#[must_use]
pub fn bpm_to_millis_per_beat(bpm: u16) -> Millis {
    if bpm == 0 {
        return 0;
    }
    MILLIS_PER_MINUTE / u32::from(bpm)
}

/// Convert a beat length in milliseconds back to beats per minute.
///
/// Returns 0.0 for a beat length of 0 (no tempo).
///
/// # Example
/// ```
/// use eq7_core::time::millis_per_beat_to_bpm;
/// assert!((millis_per_beat_to_bpm(500) - 120.0).abs() < f32::EPSILON);
/// assert_eq!(millis_per_beat_to_bpm(0), 0.0);
/// ```
#[inline]
#[must_use]
pub fn millis_per_beat_to_bpm(millis_per_beat: Millis) -> f32 {
    if millis_per_beat == 0 {
        return 0.0;
    }
    MILLIS_PER_MINUTE as f32 / millis_per_beat as f32
}

/// Milliseconds elapsed from `since` to `now`.
///
/// The host clock is a free-running `u32` that wraps after about 49.7 days;
/// the difference stays correct across one wrap.
///
/// # Example
/// ```
/// use eq7_core::time::elapsed;
/// assert_eq!(elapsed(250, 100), 150);
/// assert_eq!(elapsed(5, u32::MAX - 4), 10);
/// ```
#[inline]
#[must_use]
pub fn elapsed(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

/// `true` when `now` lies strictly after `instant`, at most half the clock
/// range later.
#[inline]
#[must_use]
pub fn is_after(now: Millis, instant: Millis) -> bool {
    let delta = elapsed(now, instant);
    delta != 0 && delta < 1 << 31
}

/// Window of acceptable beat lengths derived from a BPM range.
///
/// `min` corresponds to the fastest tempo, `max` to the slowest.
///
/// # Example
/// ```
/// use eq7_core::time::TempoWindow;
/// let window = TempoWindow::from_bpm(60, 125);
/// assert_eq!(window.min, 480);
/// assert_eq!(window.max, 1000);
/// assert!(window.contains(500));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempoWindow {
    /// Shortest accepted beat, in milliseconds.
    pub min: Millis,
    /// Longest accepted beat, in milliseconds.
    pub max: Millis,
}

impl TempoWindow {
    /// Build the window from BPM bounds (`min_bpm` → longest beat).
    #[must_use]
    pub fn from_bpm(min_bpm: u16, max_bpm: u16) -> Self {
        Self {
            min: bpm_to_millis_per_beat(max_bpm),
            max: bpm_to_millis_per_beat(min_bpm),
        }
    }

    /// `true` if `millis` lies inside `[min, max]`.
    #[inline]
    #[must_use]
    pub fn contains(&self, millis: Millis) -> bool {
        (self.min..=self.max).contains(&millis)
    }
}
