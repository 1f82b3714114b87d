//! vtrack - Real-time face and hand tracking for virtual avatars
//!
//! Captures camera frames, runs landmark detection, smooths the results
//! with per-landmark Kalman filters, and streams them to VMC-compatible
//! consumers over OSC/UDP. The `Tracker` coordinator ties the pieces
//! together behind pluggable `CameraSource` / `Processor` / `Sender`
//! traits, fanning each frame out to subscribers without ever blocking
//! on a slow one.

pub mod config;
pub mod error;
pub mod output;
pub mod tracking;

pub use config::Config;
pub use error::{Result, VtrackError};
pub use output::VmcSender;
pub use tracking::{Tracker, TrackerState, TrackingData};

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
