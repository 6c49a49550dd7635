//! CAN Frames, ISO-TP PCI and request payloads

use crate::error::{ElmError, ProtocolError};
use std::fmt;

/// Bytes in one classic CAN frame
pub const FRAME_LEN: usize = 8;
/// Largest payload carried by a single frame
pub const MAX_SINGLE_FRAME_PAYLOAD: usize = 7;
/// Largest length a first frame can declare (12 bits)
pub const MAX_MESSAGE_LEN: usize = 0xFFF;

/// One 8-byte CAN frame as exchanged with the adapter (headers stripped)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanFrame([u8; FRAME_LEN]);

impl CanFrame {
    /// Wrap raw frame bytes
    pub fn new(data: [u8; FRAME_LEN]) -> Self {
        Self(data)
    }

    /// Parse a hex line as printed by the adapter.
    ///
    /// Short lines are zero padded to 8 bytes.
    pub fn from_hex(line: &str) -> Result<Self, ProtocolError> {
        let digits = line.trim();
        if digits.is_empty() || digits.len() % 2 != 0 || digits.len() > FRAME_LEN * 2 {
            return Err(ProtocolError::MalformedFrame(line.to_string()));
        }

        let bytes = hex::decode(digits)
            .map_err(|e| ProtocolError::MalformedFrame(format!("{:?}: {}", line, e)))?;
        let mut data = [0u8; FRAME_LEN];
        data[..bytes.len()].copy_from_slice(&bytes);
        Ok(Self(data))
    }

    /// Frame bytes
    pub fn data(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Decode the protocol control information in byte 0
    pub fn pci(&self) -> Pci {
        Pci::decode(self)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// ISO-TP frame type, decoded once from the first frame byte(s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pci {
    /// Complete message of `len` bytes (0-7)
    Single { len: u8 },
    /// Start of a segmented message of `len` bytes
    First { len: u16 },
    /// Continuation with sequence number 0-15
    Consecutive { seq: u8 },
    /// Flow control or an unknown frame type
    Invalid { pci: u8 },
}

impl Pci {
    /// Decode the PCI of a frame
    pub fn decode(frame: &CanFrame) -> Self {
        let data = frame.data();
        let low = data[0] & 0x0F;
        match data[0] >> 4 {
            0x0 if (low as usize) <= MAX_SINGLE_FRAME_PAYLOAD => Pci::Single { len: low },
            0x1 => Pci::First {
                len: ((low as u16) << 8) | data[1] as u16,
            },
            0x2 => Pci::Consecutive { seq: low },
            _ => Pci::Invalid { pci: data[0] },
        }
    }
}

/// 11-bit CAN arbitration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u16);

impl TargetId {
    /// Largest standard identifier
    pub const MAX: u16 = 0x7FF;

    /// Create an identifier, rejecting anything wider than 11 bits
    pub fn new(id: u32) -> Result<Self, ElmError> {
        if id > Self::MAX as u32 {
            return Err(ElmError::InvalidTarget(id));
        }
        Ok(Self(id as u16))
    }

    /// Raw identifier value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Three lower-case hex digits, the form header registers expect
impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03x}", self.0)
    }
}

/// Application payload sent as one single frame (1-7 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload(Vec<u8>);

impl RequestPayload {
    /// Wrap payload bytes
    pub fn new(bytes: &[u8]) -> Result<Self, ElmError> {
        if bytes.is_empty() || bytes.len() > MAX_SINGLE_FRAME_PAYLOAD {
            return Err(ElmError::InvalidPayload(format!(
                "{} bytes, single frames carry 1 to {}",
                bytes.len(),
                MAX_SINGLE_FRAME_PAYLOAD
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parse an even-length hex string of at most 14 digits
    pub fn from_hex(text: &str) -> Result<Self, ElmError> {
        if text.len() % 2 != 0 {
            return Err(ElmError::InvalidPayload(format!("odd-length hex {:?}", text)));
        }
        let bytes = hex::decode(text)
            .map_err(|e| ElmError::InvalidPayload(format!("{:?}: {}", text, e)))?;
        Self::new(&bytes)
    }

    /// Payload bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Single frame carrying this payload, zero padded
    pub fn to_frame(&self) -> CanFrame {
        let mut data = [0u8; FRAME_LEN];
        data[0] = self.0.len() as u8;
        data[1..=self.0.len()].copy_from_slice(&self.0);
        CanFrame::new(data)
    }

    /// Text written to the adapter: PCI nibble pair then payload hex
    pub fn to_frame_text(&self) -> String {
        hex::encode_upper(&self.to_frame().data()[..=self.0.len()])
    }
}

impl fmt::Display for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

/// Reassembled ISO-TP message with a length fixed by its first frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoTpMessage {
    data: Vec<u8>,
    declared: usize,
}

impl IsoTpMessage {
    /// Start a message of `declared` bytes, refusing lengths over `capacity`
    pub fn new(declared: usize, capacity: usize) -> Result<Self, ProtocolError> {
        if declared > capacity {
            return Err(ProtocolError::MessageTooLong { declared, capacity });
        }
        Ok(Self {
            data: Vec::with_capacity(declared),
            declared,
        })
    }

    /// Copy as much of `chunk` as the declared length still allows
    pub fn fill(&mut self, chunk: &[u8]) -> usize {
        let take = self.remaining().min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        take
    }

    /// Bytes still missing
    pub fn remaining(&self) -> usize {
        self.declared - self.data.len()
    }

    /// Whether the declared length has been reached
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes collected so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no bytes were collected
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Message bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the message bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
