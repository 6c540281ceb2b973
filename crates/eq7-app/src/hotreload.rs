use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use eq7_core::config::BeatConfig;
use notify::{Event, EventKind, RecursiveMode, Watcher};

/// Lance un watcher qui recharge le fichier config dans l'ArcSwap.
///
/// Retourne le Watcher (doit rester vivant tant que l'app tourne). Une
/// config invalide est ignorée : la précédente reste active.
///
/// # Errors
/// Returns an error if the watcher cannot be created or the path cannot be watched.
pub fn spawn_config_watcher(
    config_path: &Path,
    config: &Arc<ArcSwap<BeatConfig>>,
) -> Result<impl Watcher + use<>> {
    let config = Arc::clone(config);
    let path = config_path.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else {
            return;
        };
        if !matches!(event.kind, EventKind::Modify(_)) {
            return;
        }
        match eq7_core::config::load_config(&path) {
            Ok(new_config) => {
                if **config.load() != new_config {
                    config.store(Arc::new(new_config));
                    log::info!("Config rechargée depuis {}", path.display());
                }
            }
            Err(e) => {
                log::warn!("Erreur de rechargement config : {e:#}");
            }
        }
    })?;

    watcher.watch(config_path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
