use std::path::PathBuf;

use clap::Parser;
use eq7_core::time::Millis;

/// Durée simulée par défaut sans replay, en secondes.
const DEFAULT_SYNTHETIC_SECS: f32 = 30.0;

/// eq7beat — beat tracking on a 7-band spectrum analyzer, simulated or replayed.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Rejouer des lectures enregistrées (JSONL : {"t": ms, "bands": [7 valeurs]}).
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Tempo du kick synthétique (ignoré avec --replay).
    #[arg(long, default_value_t = 120.0)]
    pub bpm: f32,

    /// Durée simulée en secondes. Défaut : 30 s, ou toute la durée du replay.
    #[arg(long)]
    pub duration: Option<f32>,

    /// Pas d'horloge entre deux ticks, en ms.
    #[arg(long, default_value_t = 10)]
    pub tick_ms: Millis,

    /// Graine du bruit synthétique.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Caler l'horloge simulée sur le temps réel et afficher une ligne d'état.
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Une ligne JSON par événement au lieu du texte.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Check value ranges clap cannot express.
    ///
    /// # Errors
    /// Returns an error for a tempo, tick, or duration out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.replay.is_none() && !(1.0..=600.0).contains(&self.bpm) {
            anyhow::bail!("--bpm doit être entre 1 et 600 (reçu {})", self.bpm);
        }
        if !(1..=1000).contains(&self.tick_ms) {
            anyhow::bail!("--tick-ms doit être entre 1 et 1000 (reçu {})", self.tick_ms);
        }
        if let Some(secs) = self.duration {
            if !secs.is_finite() || secs <= 0.0 {
                anyhow::bail!("--duration doit être positive (reçu {secs})");
            }
        }
        Ok(())
    }

    /// Simulated run length in ms; `None` plays a replay to its end.
    #[must_use]
    pub fn duration_ms(&self) -> Option<Millis> {
        let secs = match (self.duration, &self.replay) {
            (Some(secs), _) => secs,
            (None, Some(_)) => return None,
            (None, None) => DEFAULT_SYNTHETIC_SECS,
        };
        Some((secs * 1000.0).clamp(1.0, Millis::MAX as f32) as Millis)
    }
}
