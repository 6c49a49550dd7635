//! Raw frame capture with the adapter's monitor mode

use crate::command::CommandChannel;
use crate::config::ElmConfig;
use crate::error::{ElmError, ProtocolError};
use crate::frame::{CanFrame, TargetId};
use crate::transport::{CR, PROMPT};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Captures single broadcast frames without any ISO-TP handling
pub struct RawMonitorSession {
    settle: Duration,
    quiet: Duration,
}

impl RawMonitorSession {
    /// Create a monitor session using the adapter settings
    pub fn new(config: &ElmConfig) -> Self {
        Self {
            settle: config.monitor_settle(),
            quiet: config.quiet(),
        }
    }

    /// Wait for the next frame with identifier `filter`.
    ///
    /// Monitoring is always stopped and automatic receive restored before
    /// returning, whether or not a frame was captured.
    pub async fn monitor<S>(
        &self,
        channel: &mut CommandChannel<S>,
        filter: TargetId,
        timeout: Duration,
    ) -> Result<CanFrame, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let command = format!("atcra{}", filter);
        let reply = channel.send_command(&command).await?;
        if !reply.ok {
            warn!("{} failed: {:?}", command, reply.text);
        }

        tokio::time::sleep(self.settle).await;

        let capacity = channel.reply_capacity();
        let prompt_timeout = channel.timeout();
        let transport = channel.transport_mut();
        transport.drain_quiet(self.quiet).await?;

        transport.write_bytes(b"atma\r").await?;
        let line = transport.read_line(CR, timeout, capacity).await?;
        debug!("Monitor {} -> {:?}", filter, line);

        // Any byte stops monitor mode; the adapter then prints its prompt
        transport.write_bytes(b" ").await?;
        transport.read_line(PROMPT, prompt_timeout, capacity).await?;

        let reply = channel.send_command("atar").await?;
        if !reply.ok {
            warn!("atar failed: {:?}", reply.text);
        }

        if line.is_empty() {
            return Err(ProtocolError::NoData.into());
        }
        Ok(CanFrame::from_hex(&line)?)
    }
}
