//! ISO-TP Request/Response Session
//!
//! Sends a single-frame request through the adapter and reassembles the
//! (possibly segmented) response. Flow control is manual: the adapter is
//! pre-programmed to answer a first frame with one clear-to-send frame, so
//! the consecutive frames simply stream in as separate lines.
//!
//! Nothing is kept between requests; every call reprograms the header and
//! flow-control registers.

use crate::command::CommandChannel;
use crate::config::ElmConfig;
use crate::error::{ElmError, ProtocolError};
use crate::frame::{CanFrame, IsoTpMessage, Pci, RequestPayload, TargetId, MAX_MESSAGE_LEN};
use crate::transport::{SerialTransport, CR};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Flow control reply data: clear to send, no block limit, 16 ms spacing
const FLOW_CONTROL_DATA: &str = "atfcsd300010";
/// Manual flow control, header and data supplied by us
const FLOW_CONTROL_MANUAL: &str = "atfcsm1";
/// Back to the adapter's automatic flow control
const FLOW_CONTROL_AUTO: &str = "atfcsm0";
/// Offset a positive UDS response adds to the service id
const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// One-shot ISO-TP exchanges over the command channel
pub struct IsoTpSession {
    max_message_len: usize,
    quiet: Duration,
}

impl IsoTpSession {
    /// Create a session using the adapter settings
    pub fn new(config: &ElmConfig) -> Self {
        Self {
            max_message_len: config.max_message_len.min(MAX_MESSAGE_LEN),
            quiet: config.quiet(),
        }
    }

    /// Send `payload` to `target` and return the reassembled response.
    ///
    /// With `verify_echo`, the reply must be a positive response echoing
    /// the request from frame byte 1 on. A first frame keeps its length in
    /// that byte, so segmented replies fail the check. On any protocol
    /// error the adapter is left as is; the caller is expected to reset it.
    pub async fn request<S>(
        &self,
        channel: &mut CommandChannel<S>,
        target: TargetId,
        payload: &RequestPayload,
        verify_echo: bool,
        timeout: Duration,
    ) -> Result<IsoTpMessage, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        program_flow_control(channel, target).await?;

        let capacity = channel.reply_capacity();
        let frame_text = payload.to_frame_text();
        debug!("{} <- {}", target, frame_text);

        let transport = channel.transport_mut();
        transport.write_bytes(frame_text.as_bytes()).await?;
        transport.write_bytes(b"\r").await?;

        let line = transport.read_line(CR, timeout, capacity).await?;
        debug!("{} -> {}", target, line);
        check_status(&line)?;

        let first = CanFrame::from_hex(&line)?;
        if verify_echo {
            verify_positive_response(payload, &first, &line)?;
        }

        let message = self
            .reassemble(transport, first, &line, timeout, capacity)
            .await?;

        // The adapter prints one more line once the exchange is over
        transport.read_line(CR, timeout, capacity).await?;
        transport.drain_quiet(self.quiet).await?;
        let reply = channel.send_command(FLOW_CONTROL_AUTO).await?;
        if !reply.ok {
            warn!("{} failed: {:?}", FLOW_CONTROL_AUTO, reply.text);
        }

        Ok(message)
    }

    async fn reassemble<S>(
        &self,
        transport: &mut SerialTransport<S>,
        first: CanFrame,
        line: &str,
        timeout: Duration,
        capacity: usize,
    ) -> Result<IsoTpMessage, ElmError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match first.pci() {
            Pci::Single { len } => {
                let mut message = IsoTpMessage::new(len as usize, self.max_message_len)?;
                message.fill(&first.data()[1..]);
                Ok(message)
            }
            Pci::First { len } => {
                let mut message = IsoTpMessage::new(len as usize, self.max_message_len)?;
                message.fill(&first.data()[2..]);

                let mut seq: u8 = 1;
                while !message.is_complete() {
                    let line = transport.read_line(CR, timeout, capacity).await?;
                    let frame = match CanFrame::from_hex(&line) {
                        Ok(frame) if frame.pci() == (Pci::Consecutive { seq }) => frame,
                        _ => {
                            return Err(ProtocolError::SequenceError {
                                expected: seq,
                                line,
                            }
                            .into())
                        }
                    };
                    message.fill(&frame.data()[1..]);
                    seq = (seq + 1) & 0x0F;
                }
                debug!("Reassembled {} bytes", message.len());
                Ok(message)
            }
            Pci::Consecutive { .. } | Pci::Invalid { .. } => {
                Err(ProtocolError::MalformedFrame(line.to_string()).into())
            }
        }
    }
}

/// Program header, flow-control template and manual flow-control mode.
///
/// The template data must be set before the template header.
async fn program_flow_control<S>(
    channel: &mut CommandChannel<S>,
    target: TargetId,
) -> Result<(), ElmError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let commands = [
        format!("atsh{}", target),
        FLOW_CONTROL_DATA.to_string(),
        format!("atfcsh{}", target),
        FLOW_CONTROL_MANUAL.to_string(),
    ];
    for command in &commands {
        let reply = channel.send_command(command).await?;
        if !reply.ok {
            warn!("{} failed: {:?}", command, reply.text);
        }
    }
    Ok(())
}

fn check_status(line: &str) -> Result<(), ProtocolError> {
    if line.is_empty() || line.starts_with("NO DATA") {
        return Err(ProtocolError::NoData);
    }
    if line.starts_with("CAN ERROR") {
        return Err(ProtocolError::BusError);
    }
    Ok(())
}

/// The response starting at frame byte 1 must repeat the request, with the
/// service id raised by the positive response offset.
fn verify_positive_response(
    payload: &RequestPayload,
    frame: &CanFrame,
    line: &str,
) -> Result<(), ProtocolError> {
    let echoed = &frame.data()[1..];
    let matches = payload.bytes().iter().enumerate().all(|(i, &byte)| {
        let expected = if i == 0 {
            byte.wrapping_add(POSITIVE_RESPONSE_OFFSET)
        } else {
            byte
        };
        echoed.get(i) == Some(&expected)
    });

    if matches {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedReply {
            sent: payload.to_string(),
            reply: line.to_string(),
        })
    }
}
