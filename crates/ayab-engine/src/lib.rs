//! The knitting state machine: polls the controller over a [`SerialLink`],
//! asks `ayab-planner` for the next line plan and frame, and reports
//! progress through a [`ProgressSink`].

mod fsm;
mod progress;
mod serial;

pub use fsm::{FsmOutcome, KnitFsm};
pub use progress::{ChannelProgressSink, ProgressEvent, ProgressEvents, ProgressSink};
pub use serial::{MockSerialLink, SerialLink, SerialPortLink};

use thiserror::Error;

/// The single error type every fallible engine operation returns.
/// Variants are non-overlapping by construction; `Malformed` exists
/// purely to keep wire parsing total.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("could not open serial port: {0}")]
    SerialOpen(String),
    #[error("serial I/O error: {0}")]
    SerialIo(String),
    #[error("device reports api {got}, expected {expected}")]
    WrongApi { expected: u8, got: u8 },
    #[error("device not ready (cnfStart ok=0)")]
    DeviceNotReady,
    #[error("line number {0} out of range")]
    LineOutOfRange(u8),
    #[error("malformed device message: {0}")]
    Malformed(String),
}

impl From<ayab_machine::ConfigError> for EngineError {
    fn from(err: ayab_machine::ConfigError) -> Self {
        EngineError::InvalidSettings(err.to_string())
    }
}

impl From<ayab_image::ImageError> for EngineError {
    fn from(err: ayab_image::ImageError) -> Self {
        EngineError::InvalidSettings(err.to_string())
    }
}

impl From<ayab_protocol::ProtocolError> for EngineError {
    fn from(err: ayab_protocol::ProtocolError) -> Self {
        EngineError::Malformed(err.to_string())
    }
}
