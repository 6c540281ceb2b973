use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arc_swap::ArcSwap;
use clap::Parser;
use eq7_audio::state::{TrackerCommand, TrackerEvent};
use eq7_core::config::BeatConfig;

pub mod cli;
pub mod display;
pub mod hotreload;
pub mod pipeline;

/// Période de rafraîchissement de la ligne d'état (mode temps réel).
const STATUS_PERIOD: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Valider les arguments
    cli.validate()?;

    // 4. Charger la config
    let config = Arc::new(ArcSwap::from_pointee(resolve_config(&cli)?));

    // 5. Hot-reload (seulement si le fichier existe)
    let _watcher = if cli.config.exists() {
        match hotreload::spawn_config_watcher(&cli.config, &config) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Hot-reload indisponible : {e}");
                None
            }
        }
    } else {
        None
    };

    // 6. Démarrer le tracker
    let (handles, cmd_tx) = pipeline::start_tracker(&cli, (**config.load()).clone())?;
    let mut signals = handles.signals;
    let events = handles.events;

    // 7. Boucle principale : événements, reconfiguration, ligne d'état
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let show_status = cli.realtime && !cli.json;
    let mut applied = config.load_full();

    loop {
        match events.recv_timeout(STATUS_PERIOD) {
            Ok(event) => {
                if show_status {
                    eprint!("\r\x1b[2K");
                }
                display::write_event(&mut out, &event, cli.json)?;
                if matches!(event, TrackerEvent::Finished(_)) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }

        let latest = config.load_full();
        if !Arc::ptr_eq(&latest, &applied) {
            if cmd_tx
                .send(TrackerCommand::Reconfigure(Box::new((*latest).clone())))
                .is_err()
            {
                log::warn!("Tracker arrêté, reconfiguration ignorée");
            }
            applied = latest;
        }

        if show_status {
            eprint!("\r{}", display::status_line(signals.read()));
        }
    }
    out.flush()?;

    let _ = cmd_tx.send(TrackerCommand::Quit);
    handles
        .thread
        .join()
        .map_err(|_| anyhow::anyhow!("Le thread du tracker a paniqué"))?;
    Ok(())
}

/// Resolve config: defaults when the file is absent.
fn resolve_config(cli: &cli::Cli) -> Result<BeatConfig> {
    if cli.config.exists() {
        eq7_core::config::load_config(&cli.config)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            cli.config.display()
        );
        Ok(BeatConfig::default())
    }
}
