use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Referenced file does not exist.
    #[error("Fichier introuvable : {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// The BPM bounds do not describe a usable tempo window.
    #[error("Plage BPM invalide : {min_bpm}–{max_bpm}")]
    InvalidBpmRange {
        /// Lower bound in beats per minute.
        min_bpm: u16,
        /// Upper bound in beats per minute.
        max_bpm: u16,
    },
}
