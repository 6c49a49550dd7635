//! Adapter bring-up and reset handling

use crate::command::CommandChannel;
use crate::config::ElmConfig;
use crate::error::{ConfigCommandFailed, ElmError};
use crate::protocol::ElmProtocol;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Probe sent to wake the adapter; any reply (usually `?`) will do
const CONTACT_PROBE: &str = "x";

/// Reset flavours supported by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Restore defaults without rebooting (`atd`)
    Default,
    /// Soft reboot (`atws`)
    Warm,
    /// Full reboot (`atz`), firmware banner is checked
    Cold,
}

impl ResetKind {
    /// AT command performing this reset
    pub fn command(&self) -> &'static str {
        match self {
            ResetKind::Default => "atd",
            ResetKind::Warm => "atws",
            ResetKind::Cold => "atz",
        }
    }
}

/// Where the adapter is in its bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfiguratorState {
    Unknown,
    AwaitingContact,
    Reset(ResetKind),
    Configured,
}

/// Drives the adapter from an unknown state into a known configuration
pub struct AdapterConfigurator {
    state: ConfiguratorState,
    protocol: ElmProtocol,
    expected_firmware: String,
    settle: Duration,
    quiet: Duration,
}

impl AdapterConfigurator {
    /// Create a configurator from adapter settings
    pub fn new(config: &ElmConfig) -> Self {
        Self {
            state: ConfiguratorState::Unknown,
            protocol: config.protocol,
            expected_firmware: config.expected_firmware.clone(),
            settle: config.reset_settle(),
            quiet: config.quiet(),
        }
    }

    /// Current bring-up state
    pub fn state(&self) -> ConfiguratorState {
        self.state
    }

    /// Poke the adapter; the reply is only logged
    pub async fn establish_contact<S>(
        &mut self,
        channel: &mut CommandChannel<S>,
    ) -> Result<(), ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = channel.timeout();
        let reply = channel.send_once(CONTACT_PROBE, timeout).await?;
        debug!("Contact probe answered {:?}", reply.text);
        self.state = ConfiguratorState::AwaitingContact;
        Ok(())
    }

    /// Reset the adapter and return its version banner.
    ///
    /// The reset is issued twice with a settle pause and a drain between;
    /// the second reply is the one checked. No reply at all is fatal, as is
    /// a cold-reset banner without the expected firmware marker.
    pub async fn reset<S>(
        &mut self,
        channel: &mut CommandChannel<S>,
        kind: ResetKind,
    ) -> Result<String, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = channel.timeout();
        info!("Resetting adapter ({:?})", kind);

        let first = channel.send_once(kind.command(), timeout).await?;
        debug!("First {} reply {:?}", kind.command(), first.text);

        tokio::time::sleep(self.settle).await;
        channel.transport_mut().drain_quiet(self.quiet).await?;

        let reply = channel.send_once(kind.command(), timeout).await?;
        if reply.text.is_empty() {
            error!("No contact with adapter after {}", kind.command());
            return Err(ElmError::NoContact);
        }

        if kind == ResetKind::Cold && !reply.text.contains(&self.expected_firmware) {
            error!(
                "Wrong adapter firmware: {:?} does not contain {}",
                reply.text, self.expected_firmware
            );
            return Err(ElmError::WrongFirmwareVersion {
                expected: self.expected_firmware.clone(),
                reply: reply.text,
            });
        }

        info!("Adapter reports {:?}", reply.text);
        self.state = ConfiguratorState::Reset(kind);
        Ok(reply.text)
    }

    /// Apply the fixed configuration sequence.
    ///
    /// Every command is sent regardless of earlier failures; the failures
    /// are logged and returned.
    pub async fn apply_config<S>(
        &mut self,
        channel: &mut CommandChannel<S>,
    ) -> Result<Vec<ConfigCommandFailed>, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let commands = [
            "ate0",                         // no echo
            "ats0",                         // no spaces
            self.protocol.to_elm_command(), // bus speed and addressing
            "atat1",                        // adaptive timing
            "atcaf0",                       // raw frames, PCI included
        ];

        let mut failures = Vec::new();
        for command in commands {
            let reply = channel.send_command(command).await?;
            if !reply.ok {
                let failure = ConfigCommandFailed {
                    command: command.to_string(),
                    reply: reply.text,
                };
                warn!("{}", failure);
                failures.push(failure);
            }
        }

        self.state = ConfiguratorState::Configured;
        Ok(failures)
    }

    /// Contact, reset and configure in one go
    pub async fn restore<S>(
        &mut self,
        channel: &mut CommandChannel<S>,
        kind: ResetKind,
    ) -> Result<String, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.establish_contact(channel).await?;
        let version = self.reset(channel, kind).await?;
        self.apply_config(channel).await?;
        Ok(version)
    }
}
