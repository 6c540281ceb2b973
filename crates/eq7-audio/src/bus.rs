use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use eq7_core::frame::BAND_COUNT;
use eq7_core::time::Millis;
use eq7_core::traits::SpectrumBus;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::AudioError;

/// Highest reading of the 12-bit converter.
pub const ADC_MAX: u16 = 4095;

/// A bus whose readings depend on the current time.
///
/// The host advances the clock before each tick; [`SpectrumBus`] calls then
/// serve that instant.
pub trait TimedBus: SpectrumBus + Send {
    fn advance_to(&mut self, now: Millis);

    /// `true` once the source has nothing left to play at `now`.
    fn finished(&self, _now: Millis) -> bool {
        false
    }
}

/// Band index following the reset/strobe handshake.
#[derive(Default)]
struct BandCursor(usize);

impl BandCursor {
    fn reset(&mut self, high: bool) {
        if high {
            self.0 = 0;
        }
    }

    fn strobe(&mut self, active: bool) {
        if !active {
            self.0 = (self.0 + 1) % BAND_COUNT;
        }
    }
}

/// Bands carrying the synthetic kick.
const KICK_BANDS: usize = 2;
/// Length of a kick's linear decay.
const KICK_MS: Millis = 40;
/// Kick reading added at the start of each beat.
const KICK_LEVEL: u32 = 600;

/// Seeded stand-in for the analyzer chip: noisy floor plus a periodic kick.
///
/// # Example
/// ```
/// use eq7_audio::bus::{SyntheticBus, TimedBus};
/// use eq7_core::traits::SpectrumBus;
///
/// let mut bus = SyntheticBus::new(120.0, 1);
/// bus.advance_to(0);
/// bus.set_reset(true);
/// let kick = bus.read_analog();
/// bus.advance_to(250);
/// assert!(kick > bus.read_analog());
/// ```
pub struct SyntheticBus {
    rng: StdRng,
    period_ms: Option<Millis>,
    now: Millis,
    band: BandCursor,
    ambient: u16,
    jitter: u16,
}

impl SyntheticBus {
    /// A kick every `60000 / bpm` ms over a floor just above the noise gate.
    ///
    /// Non-positive or non-finite `bpm` gives no kick.
    #[must_use]
    pub fn new(bpm: f32, seed: u64) -> Self {
        let period_ms = (bpm.is_finite() && bpm > 0.0).then(|| (60_000.0 / bpm).round() as Millis);
        Self {
            rng: StdRng::seed_from_u64(seed),
            period_ms: period_ms.filter(|&p| p > 0),
            now: 0,
            band: BandCursor::default(),
            ambient: 115,
            jitter: 20,
        }
    }

    /// Readings stay under the default noise floor.
    #[must_use]
    pub fn silent(seed: u64) -> Self {
        Self {
            period_ms: None,
            ambient: 30,
            ..Self::new(0.0, seed)
        }
    }

    /// Checked constructor for user-supplied tempos.
    ///
    /// # Errors
    /// Returns [`AudioError::InvalidBpm`] outside `1.0..=600.0`.
    pub fn with_bpm(bpm: f32, seed: u64) -> Result<Self, AudioError> {
        if !(1.0..=600.0).contains(&bpm) {
            return Err(AudioError::InvalidBpm(bpm));
        }
        Ok(Self::new(bpm, seed))
    }

    #[must_use]
    pub fn period_ms(&self) -> Option<Millis> {
        self.period_ms
    }

    fn kick(&self) -> u32 {
        let Some(period) = self.period_ms else {
            return 0;
        };
        let phase = self.now % period;
        if self.band.0 >= KICK_BANDS || phase >= KICK_MS {
            return 0;
        }
        KICK_LEVEL * (KICK_MS - phase) / KICK_MS
    }
}

impl SpectrumBus for SyntheticBus {
    fn set_reset(&mut self, high: bool) {
        self.band.reset(high);
    }

    fn set_strobe(&mut self, active: bool) {
        self.band.strobe(active);
    }

    fn delay_us(&mut self, _micros: u32) {}

    fn read_analog(&mut self) -> u16 {
        let noise = self.rng.random_range(0..=self.jitter);
        let level = u32::from(self.ambient) + u32::from(noise) + self.kick();
        level.min(u32::from(ADC_MAX)) as u16
    }
}

impl TimedBus for SyntheticBus {
    fn advance_to(&mut self, now: Millis) {
        self.now = now;
    }
}

#[derive(Deserialize)]
struct ReplayRecord {
    t: Millis,
    bands: [u16; BAND_COUNT],
}

/// Recorded ADC readings, one frame per line, served by timestamp.
///
/// Each line is `{"t": <millis>, "bands": [7 readings]}`. Blank lines and
/// lines starting with `#` are skipped. The frame served at `now` is the
/// last one with `t <= now`; before the first frame every band reads 0.
pub struct ReplayBus {
    frames: Vec<(Millis, [u16; BAND_COUNT])>,
    cursor: Option<usize>,
    band: BandCursor,
}

impl ReplayBus {
    /// Parse a replay from any buffered reader.
    ///
    /// # Errors
    /// Returns an error on I/O failure, a malformed line, a timestamp going
    /// backwards, or an empty replay.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames: Vec<(Millis, [u16; BAND_COUNT])> = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.context("Lecture du replay impossible")?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(trimmed).map_err(|source| {
                AudioError::ReplayLine {
                    line: index + 1,
                    source,
                }
            })?;
            if let Some(&(previous, _)) = frames.last() {
                if record.t < previous {
                    return Err(AudioError::NonMonotonic {
                        line: index + 1,
                        t: record.t,
                        previous,
                    }
                    .into());
                }
            }
            frames.push((record.t, record.bands));
        }
        if frames.is_empty() {
            return Err(AudioError::EmptyReplay.into());
        }
        log::info!("Replay : {} trames sur {} ms", frames.len(), frames[frames.len() - 1].0);
        Ok(Self {
            frames,
            cursor: None,
            band: BandCursor::default(),
        })
    }

    /// Open and parse a JSONL replay file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Impossible d'ouvrir {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Replay invalide : {}", path.display()))
    }

    /// Timestamp of the last frame.
    #[must_use]
    pub fn duration_ms(&self) -> Millis {
        self.frames.last().map_or(0, |&(t, _)| t)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl SpectrumBus for ReplayBus {
    fn set_reset(&mut self, high: bool) {
        self.band.reset(high);
    }

    fn set_strobe(&mut self, active: bool) {
        self.band.strobe(active);
    }

    fn delay_us(&mut self, _micros: u32) {}

    fn read_analog(&mut self) -> u16 {
        self.cursor
            .and_then(|i| self.frames.get(i))
            .map_or(0, |(_, bands)| bands[self.band.0])
    }
}

impl TimedBus for ReplayBus {
    fn advance_to(&mut self, now: Millis) {
        let start = self.cursor.map_or(0, |i| i + 1);
        for i in start..self.frames.len() {
            if self.frames[i].0 > now {
                break;
            }
            self.cursor = Some(i);
        }
    }

    fn finished(&self, now: Millis) -> bool {
        now > self.duration_ms()
    }
}
