//! Serial Transport for ELM Adapters
//!
//! Byte-level access to the adapter link. All reads are bounded by a
//! timeout; nothing here blocks indefinitely once the port is open.

use crate::cancel::CancelToken;
use crate::error::ElmError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits,
};
use tracing::{debug, info, trace};

/// Carriage return, terminates commands and raw data lines
pub const CR: u8 = b'\r';
/// Prompt the adapter prints when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Owned, configured byte channel to the adapter
pub struct SerialTransport<S> {
    /// Underlying stream (serial port or in-memory pipe)
    stream: S,
    /// Checked between polling iterations
    cancel: CancelToken,
}

impl SerialTransport<SerialStream> {
    /// Open and configure a serial device: 8 data bits, no parity, one
    /// stop bit, no flow control, raw mode.
    pub fn open(device: &str, baud_rate: u32, cancel: CancelToken) -> Result<Self, ElmError> {
        info!("Opening serial device {} at {} baud", device, baud_rate);

        let builder = tokio_serial::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);

        let stream = SerialStream::open(&builder)
            .map_err(|e| ElmError::Io(format!("cannot open {}: {}", device, e)))?;
        stream.clear(ClearBuffer::Input)?;

        Ok(Self::new(stream, cancel))
    }
}

impl<S> SerialTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already configured stream
    pub fn new(stream: S, cancel: CancelToken) -> Self {
        Self { stream, cancel }
    }

    /// Token checked by the polling loops
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn check_cancelled(&self) -> Result<(), ElmError> {
        if self.cancel.is_cancelled() {
            Err(ElmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Write bytes and wait until the OS has accepted them
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ElmError> {
        trace!("tx {:?}", String::from_utf8_lossy(bytes));
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait up to `wait` for a single byte.
    ///
    /// Returns `None` on timeout. A closed link is an I/O error.
    pub async fn byte_ready(&mut self, wait: Duration) -> Result<Option<u8>, ElmError> {
        match tokio::time::timeout(wait, self.stream.read_u8()).await {
            Ok(Ok(byte)) => Ok(Some(byte)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    /// Collect one reply line.
    ///
    /// Ends when `stop` arrives, when no byte arrives within `wait`
    /// (partial data is kept), or once `max_len - 1` bytes are stored.
    /// NUL, CR, LF and the prompt are never stored; the stop byte is
    /// matched before that filter so `>` can terminate a reply.
    pub async fn read_line(
        &mut self,
        stop: u8,
        wait: Duration,
        max_len: usize,
    ) -> Result<String, ElmError> {
        let mut line = Vec::with_capacity(max_len);

        while line.len() + 1 < max_len {
            self.check_cancelled()?;
            let byte = match self.byte_ready(wait).await? {
                Some(byte) => byte,
                None => {
                    trace!("read_line timed out after {} bytes", line.len());
                    break;
                }
            };

            if byte == stop {
                break;
            }

            match byte {
                0 | b'\r' | b'\n' | PROMPT => {}
                _ => line.push(byte),
            }
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Discard input until a full `quiet` window passes without a byte.
    ///
    /// Returns the number of discarded bytes.
    pub async fn drain_quiet(&mut self, quiet: Duration) -> Result<usize, ElmError> {
        let mut drained = 0;
        loop {
            self.check_cancelled()?;
            match self.byte_ready(quiet).await? {
                Some(_) => drained += 1,
                None => break,
            }
        }
        if drained > 0 {
            debug!("Drained {} stale bytes", drained);
        }
        Ok(drained)
    }
}
