//! Protocol output
//!
//! Wire encoding and transport for publishing tracking data to external
//! VTuber applications:
//! - OSC message encoding (pure, transport-independent)
//! - VMC sender over connected UDP

pub mod osc;
pub mod vmc;

pub use vmc::VmcSender;
