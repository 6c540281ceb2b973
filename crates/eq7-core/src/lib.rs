//! Configuration, types, and shared structures for eq7.
//!
//! This crate contains the shared types, the timed-I/O trait, and the
//! configuration logic used across the eq7 workspace.

pub mod config;
pub mod error;
pub mod frame;
pub mod ring;
pub mod time;
pub mod traits;

pub use config::BeatConfig;
pub use error::CoreError;
pub use frame::{BAND_COUNT, BeatSignals, SpectrumFrame};
pub use ring::RingLog;
pub use time::Millis;
pub use traits::SpectrumBus;
