use eq7_audio::bus::{ReplayBus, SyntheticBus};
use eq7_audio::state::{RunSettings, TrackerCommand, TrackerHandles, spawn_tracker_thread};
use eq7_core::config::BeatConfig;

use crate::cli::Cli;

/// Start the tracker thread on the source selected by the CLI.
///
/// `--replay` plays a recorded file; otherwise a seeded synthetic kick at
/// `--bpm` drives the tracker.
///
/// # Errors
/// Returns an error if the replay cannot be loaded or the thread cannot start.
pub fn start_tracker(
    cli: &Cli,
    config: BeatConfig,
) -> anyhow::Result<(TrackerHandles, flume::Sender<TrackerCommand>)> {
    let settings = RunSettings {
        tick_ms: cli.tick_ms,
        duration_ms: cli.duration_ms(),
        realtime: cli.realtime,
    };
    let (cmd_tx, cmd_rx) = flume::bounded(10);

    let handles = if let Some(path) = cli.replay.as_deref() {
        let bus = ReplayBus::open(path)?;
        log::info!("Replay : {} ({} ms)", path.display(), bus.duration_ms());
        spawn_tracker_thread(bus, config, settings, cmd_rx)?
    } else {
        let bus = SyntheticBus::with_bpm(cli.bpm, cli.seed)?;
        log::info!("Kick synthétique : {} BPM, graine {}", cli.bpm, cli.seed);
        spawn_tracker_thread(bus, config, settings, cmd_rx)?
    };

    Ok((handles, cmd_tx))
}
