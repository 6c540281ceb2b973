// Spectrum sampling, gain control, onset detection, and beat tracking for eq7.

pub mod agc;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod onset;
pub mod peak_log;
pub mod phase;
pub mod sampler;
pub mod state;
pub mod tempo;
pub mod tracker;
pub mod windowed;
