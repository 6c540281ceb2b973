use std::io::Write;

use anyhow::Result;
use eq7_audio::state::{RunSummary, TrackerEvent};
use eq7_audio::tempo::AnalysisOutcome;
use eq7_core::frame::BeatSignals;
use eq7_core::time::Millis;
use serde::Serialize;

/// Bar glyphs from empty to full.
const BARS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonLine<'a> {
    Onset {
        signals: &'a BeatSignals,
    },
    Beat {
        signals: &'a BeatSignals,
    },
    Analysis {
        now: Millis,
        outcome: &'a AnalysisOutcome,
    },
    Summary {
        ticks: u64,
        onsets: u64,
        beats: u64,
        millis_per_beat: Millis,
        bpm: f32,
    },
}

/// Write one event as text or as a JSON line.
///
/// # Errors
/// Returns an error if the writer fails.
pub fn write_event<W: Write>(out: &mut W, event: &TrackerEvent, json: bool) -> Result<()> {
    if json {
        let line = match event {
            TrackerEvent::Onset(signals) => JsonLine::Onset { signals },
            TrackerEvent::Beat(signals) => JsonLine::Beat { signals },
            TrackerEvent::Analysis { now, outcome } => JsonLine::Analysis { now: *now, outcome },
            TrackerEvent::Finished(summary) => summary_line(summary),
        };
        serde_json::to_writer(&mut *out, &line)?;
        writeln!(out)?;
        return Ok(());
    }

    match event {
        TrackerEvent::Onset(s) => {
            writeln!(out, "{:>8} ms  onset    gain {:>5.2}  log {}", s.now, s.gain, s.onset_count)?;
        }
        TrackerEvent::Beat(s) => {
            writeln!(
                out,
                "{:>8} ms  beat #{:<4} {:>6.1} BPM  prochain {} ms",
                s.now, s.beat_counter, s.bpm, s.next_predicted_beat
            )?;
        }
        TrackerEvent::Analysis { now, outcome } => {
            writeln!(out, "{now:>8} ms  analyse  {}", describe(outcome))?;
        }
        TrackerEvent::Finished(summary) => {
            let last = &summary.last;
            writeln!(
                out,
                "fin : {} ticks, {} onsets, {} beats, tempo {}",
                summary.ticks,
                summary.onsets,
                summary.beats,
                if last.millis_per_beat == 0 {
                    "inconnu".to_string()
                } else {
                    format!("{:.1} BPM ({} ms)", last.bpm, last.millis_per_beat)
                }
            )?;
        }
    }
    Ok(())
}

fn summary_line(summary: &RunSummary) -> JsonLine<'static> {
    JsonLine::Summary {
        ticks: summary.ticks,
        onsets: summary.onsets,
        beats: summary.beats,
        millis_per_beat: summary.last.millis_per_beat,
        bpm: summary.last.bpm,
    }
}

/// Human-readable analysis outcome.
#[must_use]
pub fn describe(outcome: &AnalysisOutcome) -> String {
    match *outcome {
        AnalysisOutcome::InsufficientOnsets { onsets } => format!("{onsets} onsets, pas assez"),
        AnalysisOutcome::NoConfidence {
            candidate,
            multiplicity,
        } => format!("pas de confiance (meilleur {candidate} ms ×{multiplicity})"),
        AnalysisOutcome::Confident {
            millis_per_beat,
            multiplicity,
        } => format!("{millis_per_beat} ms ×{multiplicity}"),
    }
}

/// One-line live view: seven bars scaled by their peak-hold, tempo, and a
/// beat marker near each predicted beat.
#[must_use]
pub fn status_line(signals: &BeatSignals) -> String {
    let bars: String = signals
        .decay
        .iter()
        .zip(signals.peak.iter())
        .map(|(&decay, &peak)| {
            let level = if peak > 0.0 { (decay / peak).clamp(0.0, 1.0) } else { 0.0 };
            BARS[(level * (BARS.len() - 1) as f32).round() as usize]
        })
        .collect();

    let tempo = if signals.millis_per_beat == 0 {
        "  ---.- BPM".to_string()
    } else {
        format!("{:>7.1} BPM", signals.bpm)
    };
    let marker = if signals.has_predicted_beat && signals.beat_progress < 0.15 {
        '●'
    } else {
        ' '
    };

    format!(
        "[{bars}] {tempo} {marker} gain {:>5.2}  t {:>7} ms",
        signals.gain, signals.now
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> BeatSignals {
        BeatSignals {
            now: 5010,
            decay: [0.0, 50.0, 100.0, 0.0, 0.0, 0.0, 0.0],
            peak: [0.0, 100.0, 100.0, 0.0, 0.0, 0.0, 0.0],
            millis_per_beat: 495,
            bpm: 121.2,
            has_predicted_beat: true,
            beat_counter: 3,
            beat_progress: 0.02,
            gain: 5.8,
            ..BeatSignals::default()
        }
    }

    #[test]
    fn status_line_scales_bars_by_peak() {
        let line = status_line(&signals());
        assert!(line.starts_with("[ ▄█    ]"), "{line}");
        assert!(line.contains("121.2 BPM"));
        assert!(line.contains('●'));
    }

    #[test]
    fn status_line_without_tempo() {
        let line = status_line(&BeatSignals::default());
        assert!(line.contains("---.- BPM"));
        assert!(!line.contains('●'));
    }

    #[test]
    fn json_lines_are_tagged() {
        let mut out = Vec::new();
        write_event(&mut out, &TrackerEvent::Beat(signals()), true).expect("write");
        let outcome = AnalysisOutcome::Confident {
            millis_per_beat: 495,
            multiplicity: 9,
        };
        write_event(&mut out, &TrackerEvent::Analysis { now: 5000, outcome }, true).expect("write");

        let text = String::from_utf8(out).expect("utf-8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid json"))
            .collect();
        assert_eq!(lines[0]["event"], "beat");
        assert_eq!(lines[0]["signals"]["beat_counter"], 3);
        assert_eq!(lines[1]["event"], "analysis");
        assert_eq!(lines[1]["outcome"]["kind"], "confident");
        assert_eq!(lines[1]["outcome"]["millis_per_beat"], 495);
    }

    #[test]
    fn text_summary_reports_unknown_tempo() {
        let mut out = Vec::new();
        let summary = RunSummary {
            ticks: 100,
            ..RunSummary::default()
        };
        write_event(&mut out, &TrackerEvent::Finished(summary), false).expect("write");
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("100 ticks"));
        assert!(text.contains("inconnu"));
    }
}
