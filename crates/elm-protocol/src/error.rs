//! ELM Adapter Error Types

use thiserror::Error;

/// Exit code used when the adapter reports the wrong firmware version
pub const EXIT_WRONG_FIRMWARE: i32 = 1;
/// Exit code used when the adapter does not answer a reset
pub const EXIT_NO_CONTACT: i32 = 2;
/// Exit code used when the serial device cannot be opened or used
pub const EXIT_IO: i32 = 3;
/// Exit code used when the settings cannot be loaded
pub const EXIT_CONFIG: i32 = 4;
/// Exit code used when the run was interrupted
pub const EXIT_CANCELLED: i32 = 130;

/// Errors inside a single ISO-TP or monitor exchange.
///
/// All of these leave the adapter in an unknown flow-control state; the
/// caller is expected to reset the adapter and move on to the next request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The target ECU did not answer
    #[error("NO DATA from target")]
    NoData,

    /// The adapter reported a bus fault
    #[error("CAN ERROR reported by adapter")]
    BusError,

    /// The reply does not echo the request as a positive response
    #[error("unexpected reply to {sent}: {reply}")]
    UnexpectedReply { sent: String, reply: String },

    /// A consecutive frame arrived out of order
    #[error("expected consecutive frame {expected:X}, got {line}")]
    SequenceError { expected: u8, line: String },

    /// The frame could not be decoded or has an unexpected type
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The declared message length exceeds the receive buffer
    #[error("declared length {declared} exceeds buffer capacity {capacity}")]
    MessageTooLong { declared: usize, capacity: usize },
}

/// Errors that can occur while talking to an ELM-style adapter
#[derive(Debug, Error)]
pub enum ElmError {
    /// Serial port could not be opened, read or written
    #[error("Serial port error: {0}")]
    Io(String),

    /// Adapter stayed silent after a reset
    #[error("No contact with adapter")]
    NoContact,

    /// Cold reset reply did not carry the expected firmware marker
    #[error("Wrong adapter firmware: expected {expected}, got {reply:?}")]
    WrongFirmwareVersion { expected: String, reply: String },

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request payload is not a valid single-frame payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// CAN identifier does not fit 11 bits
    #[error("Invalid 11-bit CAN identifier: {0:#X}")]
    InvalidTarget(u32),

    /// Exchange failed; adapter must be reset
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Cancellation was requested while waiting on the adapter
    #[error("Operation cancelled")]
    Cancelled,
}

impl ElmError {
    /// Whether this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ElmError::Io(_)
                | ElmError::NoContact
                | ElmError::WrongFirmwareVersion { .. }
                | ElmError::Config(_)
                | ElmError::Cancelled
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ElmError::WrongFirmwareVersion { .. } => EXIT_WRONG_FIRMWARE,
            ElmError::NoContact => EXIT_NO_CONTACT,
            ElmError::Io(_) => EXIT_IO,
            ElmError::Config(_) => EXIT_CONFIG,
            ElmError::Cancelled => EXIT_CANCELLED,
            ElmError::InvalidPayload(_)
            | ElmError::InvalidTarget(_)
            | ElmError::Protocol(_) => 0,
        }
    }
}

impl From<std::io::Error> for ElmError {
    fn from(err: std::io::Error) -> Self {
        ElmError::Io(err.to_string())
    }
}

impl From<tokio_serial::Error> for ElmError {
    fn from(err: tokio_serial::Error) -> Self {
        ElmError::Io(err.to_string())
    }
}

/// A configuration command that was not acknowledged with `OK`.
///
/// Reported and collected, never propagated: the adapter keeps running in
/// a possibly degraded state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command {command} failed: {reply:?}")]
pub struct ConfigCommandFailed {
    pub command: String,
    pub reply: String,
}

/// Errors from signal extraction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// End bit lies before start bit
    #[error("end bit {end} precedes start bit {start}")]
    ReversedRange { start: usize, end: usize },

    /// Range is wider than the 64-bit accumulator
    #[error("bit range {start}..={end} is wider than 64 bits")]
    TooWide { start: usize, end: usize },

    /// Range extends past the end of the buffer
    #[error("bit {end} is outside a {len}-byte buffer")]
    OutOfBounds { end: usize, len: usize },

    /// Divisor is zero
    #[error("divisor must not be zero")]
    ZeroDivisor,

    /// Scaled value does not fit an i64
    #[error("scaled value overflows i64")]
    Overflow,
}
