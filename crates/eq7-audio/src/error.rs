use thiserror::Error;

/// Errors originating from the spectrum sources.
#[derive(Error, Debug)]
pub enum AudioError {
    /// A replay line is not a valid `{"t": .., "bands": [..]}` record.
    #[error("Ligne {line} du replay invalide : {source}")]
    ReplayLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Replay timestamps must not go backwards.
    #[error("Ligne {line} du replay : t = {t} ms antérieur à {previous} ms")]
    NonMonotonic { line: usize, t: u32, previous: u32 },

    /// The replay holds no frame.
    #[error("Replay vide")]
    EmptyReplay,

    /// BPM outside the synthetic source's range.
    #[error("BPM synthétique invalide : {0}")]
    InvalidBpm(f32),
}
