//! ELM Client
//!
//! Owns the adapter link for the lifetime of the process and ties the
//! pieces together: bring-up, ISO-TP requests, raw monitoring, and the
//! reset that follows every failed exchange.

use crate::cancel::CancelToken;
use crate::command::CommandChannel;
use crate::config::ElmConfig;
use crate::configurator::{AdapterConfigurator, ConfiguratorState, ResetKind};
use crate::error::ElmError;
use crate::frame::{CanFrame, IsoTpMessage, RequestPayload, TargetId};
use crate::isotp::IsoTpSession;
use crate::monitor::RawMonitorSession;
use crate::transport::SerialTransport;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use tracing::{info, warn};

/// Client for an ELM-style CAN adapter
pub struct ElmClient<S> {
    channel: CommandChannel<S>,
    configurator: AdapterConfigurator,
    session: IsoTpSession,
    monitor: RawMonitorSession,
    cancel: CancelToken,
    firmware: Option<String>,
}

impl ElmClient<SerialStream> {
    /// Open the configured serial device
    pub fn open(config: &ElmConfig, cancel: CancelToken) -> Result<Self, ElmError> {
        config.validate()?;
        let transport = SerialTransport::open(&config.device, config.baud_rate, cancel)?;
        Self::new(transport, config)
    }
}

impl<S> ElmClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a client over an open transport.
    ///
    /// Fails with a configuration error for protocols without 11-bit
    /// identifiers.
    pub fn new(transport: SerialTransport<S>, config: &ElmConfig) -> Result<Self, ElmError> {
        config.validate()?;
        let cancel = transport.cancel_token().clone();
        Ok(Self {
            channel: CommandChannel::new(transport, config),
            configurator: AdapterConfigurator::new(config),
            session: IsoTpSession::new(config),
            monitor: RawMonitorSession::new(config),
            cancel,
            firmware: None,
        })
    }

    /// Cold-reset and configure the adapter, returning its version banner.
    ///
    /// Fails with a fatal error if the adapter is silent or runs the wrong
    /// firmware.
    pub async fn initialize(&mut self) -> Result<String, ElmError> {
        let version = self
            .configurator
            .restore(&mut self.channel, ResetKind::Cold)
            .await?;
        info!("Adapter ready: {}", version);
        self.firmware = Some(version.clone());
        Ok(version)
    }

    /// Perform one ISO-TP request.
    ///
    /// A protocol error resets the adapter to defaults and reapplies the
    /// configuration before the error is returned, so the next request
    /// starts clean. There is no retry.
    pub async fn request(
        &mut self,
        target: TargetId,
        payload: &RequestPayload,
        verify_echo: bool,
        timeout: Duration,
    ) -> Result<IsoTpMessage, ElmError> {
        let result = self
            .session
            .request(&mut self.channel, target, payload, verify_echo, timeout)
            .await;
        self.recover_on_protocol_error(result).await
    }

    /// Capture one raw frame broadcast with identifier `filter`
    pub async fn monitor(
        &mut self,
        filter: TargetId,
        timeout: Duration,
    ) -> Result<CanFrame, ElmError> {
        let result = self
            .monitor
            .monitor(&mut self.channel, filter, timeout)
            .await;
        self.recover_on_protocol_error(result).await
    }

    async fn recover_on_protocol_error<T>(
        &mut self,
        result: Result<T, ElmError>,
    ) -> Result<T, ElmError> {
        if let Err(ElmError::Protocol(err)) = &result {
            warn!("Exchange failed ({}), resetting adapter", err);
            self.configurator
                .restore(&mut self.channel, ResetKind::Default)
                .await?;
        }
        result
    }

    /// Bring-up state of the adapter
    pub fn state(&self) -> ConfiguratorState {
        self.configurator.state()
    }

    /// Version banner captured by `initialize`
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    /// Token that stops the client at its next check point
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}
