//! AT Command Channel

use crate::config::{ElmConfig, RetryPolicy};
use crate::error::ElmError;
use crate::transport::{SerialTransport, PROMPT};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Reply to one AT command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// Reply text with control bytes stripped
    pub text: String,
    /// Whether the reply acknowledged with `OK`
    pub ok: bool,
}

/// Sends text commands and collects prompt-terminated replies
pub struct CommandChannel<S> {
    transport: SerialTransport<S>,
    timeout: Duration,
    quiet: Duration,
    reply_capacity: usize,
    retry: RetryPolicy,
}

impl<S> CommandChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a channel over an open transport
    pub fn new(transport: SerialTransport<S>, config: &ElmConfig) -> Self {
        Self {
            transport,
            timeout: config.command_timeout(),
            quiet: config.quiet(),
            reply_capacity: config.reply_capacity,
            retry: config.retry,
        }
    }

    /// Underlying transport, for raw frame traffic
    pub fn transport_mut(&mut self) -> &mut SerialTransport<S> {
        &mut self.transport
    }

    /// Default per-byte reply timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest reply kept per line
    pub fn reply_capacity(&self) -> usize {
        self.reply_capacity
    }

    /// Send a command that acknowledges with `OK`.
    ///
    /// A reply without `OK` is retried according to the retry policy;
    /// the last reply is returned either way.
    pub async fn send_command(&mut self, text: &str) -> Result<CommandReply, ElmError> {
        let mut reply = self.send_once(text, self.timeout).await?;

        let mut attempt = 0;
        while !reply.ok && attempt < self.retry.max_retries {
            attempt += 1;
            debug!(
                "Retrying {} (attempt {} of {}) after reply {:?}",
                text, attempt, self.retry.max_retries, reply.text
            );
            tokio::time::sleep(self.retry.backoff(attempt)).await;
            self.transport.drain_quiet(self.quiet).await?;
            reply = self.send_once(text, self.timeout).await?;
        }

        if !reply.ok && self.retry.max_retries > 0 {
            warn!("{} still failing after {} retries", text, attempt);
        }
        Ok(reply)
    }

    /// Send a command once and read the reply up to the prompt
    pub async fn send_once(
        &mut self,
        text: &str,
        timeout: Duration,
    ) -> Result<CommandReply, ElmError> {
        debug!("> {}", text);
        self.transport.write_bytes(text.as_bytes()).await?;
        self.transport.write_bytes(b"\r").await?;

        let reply = self
            .transport
            .read_line(PROMPT, timeout, self.reply_capacity)
            .await?;
        debug!("< {:?}", reply);

        Ok(CommandReply {
            ok: reply.contains("OK"),
            text: reply,
        })
    }
}
