//! ELM Adapter Protocol Engine
//!
//! This crate provides async serial communication with ELM-style USB-to-CAN
//! adapters: AT command handling, adapter bring-up, single-frame ISO-TP
//! requests with manual flow control and multi-frame reassembly, raw frame
//! monitoring, and bit-level signal extraction.

mod cancel;
mod client;
mod command;
mod config;
mod configurator;
mod error;
mod frame;
mod isotp;
mod monitor;
mod protocol;
mod signal;
mod transport;

#[cfg(test)]
mod mock;

pub use cancel::CancelToken;
pub use client::ElmClient;
pub use command::{CommandChannel, CommandReply};
pub use config::{ElmConfig, RetryPolicy};
pub use configurator::{AdapterConfigurator, ConfiguratorState, ResetKind};
pub use error::{ConfigCommandFailed, ElmError, ProtocolError, SignalError};
pub use frame::{CanFrame, IsoTpMessage, Pci, RequestPayload, TargetId};
pub use isotp::IsoTpSession;
pub use monitor::RawMonitorSession;
pub use protocol::ElmProtocol;
pub use signal::{extract, extract_raw, SignalSpec};
pub use transport::SerialTransport;

/// Process exit codes for fatal errors
pub mod exit {
    pub use crate::error::{
        EXIT_CANCELLED as CANCELLED, EXIT_CONFIG as CONFIG, EXIT_IO as IO,
        EXIT_NO_CONTACT as NO_CONTACT, EXIT_WRONG_FIRMWARE as WRONG_FIRMWARE,
    };
}
