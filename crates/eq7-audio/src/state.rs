use std::thread;
use std::time::{Duration, Instant};

use eq7_core::config::BeatConfig;
use eq7_core::frame::BeatSignals;
use eq7_core::time::Millis;
use triple_buffer::TripleBuffer;

use crate::bus::TimedBus;
use crate::tempo::AnalysisOutcome;
use crate::tracker::BeatTracker;

/// Commandes envoyées au thread du tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCommand {
    /// Appliquer une nouvelle configuration sans perdre l'état appris.
    Reconfigure(Box<BeatConfig>),
    Quit,
}

/// Discrete happenings published alongside the snapshot buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerEvent {
    /// One or more onsets were logged on this tick.
    Onset(BeatSignals),
    Beat(BeatSignals),
    Analysis { now: Millis, outcome: AnalysisOutcome },
    Finished(RunSummary),
}

/// Totals for one run of the tracker thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub onsets: u64,
    pub beats: u64,
    pub last: BeatSignals,
}

/// How the tracker thread paces its clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Clock step between two ticks.
    pub tick_ms: Millis,
    /// Stop after this much simulated time; `None` runs until the bus ends or `Quit`.
    pub duration_ms: Option<Millis>,
    /// Sleep so that simulated time follows the wall clock.
    pub realtime: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            duration_ms: None,
            realtime: false,
        }
    }
}

/// Handles returned by [`spawn_tracker_thread`].
pub struct TrackerHandles {
    /// Latest snapshot, overwritten every tick.
    pub signals: triple_buffer::Output<BeatSignals>,
    /// Onsets, beats, analyses, then one final `Finished`.
    pub events: flume::Receiver<TrackerEvent>,
    pub thread: thread::JoinHandle<RunSummary>,
}

/// Spawn the tracker on its own thread, driven by `bus`.
///
/// The first tick happens at `tick_ms`; timestamp 0 is reserved for "no
/// anchor". The thread exits on `Quit`, when the command channel closes,
/// when `duration_ms` is reached, or when the bus reports it is finished.
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn_tracker_thread<B: TimedBus + 'static>(
    bus: B,
    config: BeatConfig,
    settings: RunSettings,
    cmd_rx: flume::Receiver<TrackerCommand>,
) -> anyhow::Result<TrackerHandles> {
    let (mut buf_input, buf_output) = TripleBuffer::new(&BeatSignals::default()).split();
    let (event_tx, event_rx) = flume::unbounded();

    let thread = thread::Builder::new()
        .name("eq7-tracker".to_string())
        .spawn(move || {
            let mut tracker = BeatTracker::new(config);
            let mut bus = bus;
            let summary = run_tracker_loop(
                &mut tracker,
                &mut bus,
                settings,
                &cmd_rx,
                &mut |signals| buf_input.write(signals),
                &event_tx,
            );
            let _ = event_tx.send(TrackerEvent::Finished(summary));
            summary
        })?;

    Ok(TrackerHandles {
        signals: buf_output,
        events: event_rx,
        thread,
    })
}

/// Core tick loop, shared by the thread and by tests.
pub fn run_tracker_loop<B: TimedBus>(
    tracker: &mut BeatTracker,
    bus: &mut B,
    settings: RunSettings,
    cmd_rx: &flume::Receiver<TrackerCommand>,
    publish: &mut dyn FnMut(BeatSignals),
    event_tx: &flume::Sender<TrackerEvent>,
) -> RunSummary {
    let tick_ms = settings.tick_ms.max(1);
    let started = Instant::now();
    let mut summary = RunSummary::default();
    let mut now = tick_ms;

    loop {
        // Réception des commandes
        loop {
            match cmd_rx.try_recv() {
                Ok(TrackerCommand::Reconfigure(config)) => {
                    log::info!("Tracker reconfiguré @ {now} ms");
                    tracker.set_config(*config);
                }
                Ok(TrackerCommand::Quit) | Err(flume::TryRecvError::Disconnected) => {
                    summary.last = tracker.signals();
                    return summary;
                }
                Err(flume::TryRecvError::Empty) => break,
            }
        }

        if settings.duration_ms.is_some_and(|d| now > d) || bus.finished(now) {
            break;
        }

        bus.advance_to(now);
        let events = tracker.tick(now, bus);
        let signals = tracker.signals();
        publish(signals);
        summary.ticks += 1;

        let mut outgoing = [None; 3];
        if events.onsets > 0 {
            summary.onsets += events.onsets as u64;
            outgoing[0] = Some(TrackerEvent::Onset(signals));
        }
        if events.beat {
            summary.beats += 1;
            outgoing[1] = Some(TrackerEvent::Beat(signals));
        }
        if let Some(outcome) = events.analysis {
            outgoing[2] = Some(TrackerEvent::Analysis { now, outcome });
        }
        for event in outgoing.into_iter().flatten() {
            if event_tx.send(event).is_err() {
                summary.last = signals;
                return summary;
            }
        }

        if settings.realtime {
            let deadline = started + Duration::from_millis(u64::from(now));
            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }

        let Some(next) = now.checked_add(tick_ms) else {
            log::warn!("Horloge saturée, arrêt du tracker");
            break;
        };
        now = next;
    }

    summary.last = tracker.signals();
    summary
}

#[cfg(test)]
mod tests {
    use eq7_core::config::OnsetStrategy;

    use super::*;
    use crate::bus::{ReplayBus, SyntheticBus};

    fn settings(duration_ms: Millis) -> RunSettings {
        RunSettings {
            duration_ms: Some(duration_ms),
            ..RunSettings::default()
        }
    }

    #[test]
    fn thread_runs_to_duration_and_reports() {
        let (_cmd_tx, cmd_rx) = flume::unbounded();
        let handles = spawn_tracker_thread(
            SyntheticBus::new(120.0, 5),
            BeatConfig::default(),
            settings(12_000),
            cmd_rx,
        )
        .expect("tracker thread spawns");

        let summary = handles.thread.join().expect("tracker thread joins");
        assert_eq!(summary.ticks, 1200);
        assert!(summary.beats > 0);
        assert!(summary.last.has_predicted_beat);

        let events: Vec<_> = handles.events.drain().collect();
        assert!(matches!(events.last(), Some(TrackerEvent::Finished(_))));
        let onsets = events.iter().filter(|e| matches!(e, TrackerEvent::Onset(_))).count();
        assert_eq!(onsets as u64, summary.onsets);
        assert!(events.iter().any(|e| matches!(e, TrackerEvent::Beat(s) if s.beat_counter > 0)));
    }

    #[test]
    fn windowed_onsets_reach_the_summary() {
        let (_cmd_tx, cmd_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let mut config = BeatConfig::default();
        config.onset.strategy = OnsetStrategy::Windowed;
        let mut tracker = BeatTracker::new(config);
        let mut bus = SyntheticBus::new(120.0, 9);
        let summary = run_tracker_loop(
            &mut tracker,
            &mut bus,
            settings(12_000),
            &cmd_rx,
            &mut |_| {},
            &event_tx,
        );
        assert!(summary.onsets >= tracker.onsets().count() as u64);
        assert!(summary.onsets > 0);

        let events: Vec<_> = event_rx.drain().collect();
        let onset_events = events.iter().filter(|e| matches!(e, TrackerEvent::Onset(_))).count();
        let analyses = events.iter().filter(|e| matches!(e, TrackerEvent::Analysis { .. })).count();
        assert!(onset_events > 0);
        assert!(onset_events <= analyses);
    }

    #[test]
    fn quit_stops_the_loop() {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let (event_tx, _event_rx) = flume::unbounded();
        cmd_tx.send(TrackerCommand::Quit).expect("command sent");
        let mut tracker = BeatTracker::new(BeatConfig::default());
        let mut bus = SyntheticBus::new(120.0, 1);
        let summary = run_tracker_loop(
            &mut tracker,
            &mut bus,
            RunSettings::default(),
            &cmd_rx,
            &mut |_| {},
            &event_tx,
        );
        assert_eq!(summary.ticks, 0);
    }

    #[test]
    fn reconfigure_reaches_the_tracker() {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let (event_tx, _event_rx) = flume::unbounded();
        let mut config = BeatConfig::default();
        config.tempo.max_bpm = 140;
        cmd_tx
            .send(TrackerCommand::Reconfigure(Box::new(config)))
            .expect("command sent");
        let mut tracker = BeatTracker::new(BeatConfig::default());
        let mut bus = SyntheticBus::new(120.0, 1);
        run_tracker_loop(&mut tracker, &mut bus, settings(100), &cmd_rx, &mut |_| {}, &event_tx);
        assert_eq!(tracker.config().tempo.max_bpm, 140);
    }

    #[test]
    fn replay_end_stops_the_loop() {
        let replay = "{\"t\": 0, \"bands\": [0,0,0,0,0,0,0]}\n{\"t\": 95, \"bands\": [0,0,0,0,0,0,0]}\n";
        let mut bus = ReplayBus::from_reader(replay.as_bytes()).expect("valid replay");
        let (_cmd_tx, cmd_rx) = flume::unbounded();
        let (event_tx, _event_rx) = flume::unbounded();
        let mut tracker = BeatTracker::new(BeatConfig::default());
        let mut published = 0;
        let summary = run_tracker_loop(
            &mut tracker,
            &mut bus,
            RunSettings::default(),
            &cmd_rx,
            &mut |_| published += 1,
            &event_tx,
        );
        // ticks at 10, 20, ..., 90
        assert_eq!(summary.ticks, 9);
        assert_eq!(published, 9);
    }
}
