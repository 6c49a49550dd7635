//! Adapter Bus Protocol Selection

use serde::{Deserialize, Serialize};

/// Bus protocols selectable on the adapter with `atsp<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElmProtocol {
    /// Automatic protocol detection
    Auto,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ElmProtocol {
    /// Get the AT command selecting this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ElmProtocol::Auto => "atsp0",
            ElmProtocol::Iso15765_4Can11bit500 => "atsp6",
            ElmProtocol::Iso15765_4Can29bit500 => "atsp7",
            ElmProtocol::Iso15765_4Can11bit250 => "atsp8",
            ElmProtocol::Iso15765_4Can29bit250 => "atsp9",
        }
    }

    /// Whether the protocol uses 11-bit identifiers.
    ///
    /// Header registers are programmed with 3 hex digits, so only these
    /// protocols work with the ISO-TP session.
    pub fn is_standard_id(&self) -> bool {
        matches!(
            self,
            ElmProtocol::Iso15765_4Can11bit500 | ElmProtocol::Iso15765_4Can11bit250
        )
    }
}

impl Default for ElmProtocol {
    fn default() -> Self {
        ElmProtocol::Iso15765_4Can11bit500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_can_500k_11bit() {
        let protocol = ElmProtocol::default();
        assert_eq!(protocol.to_elm_command(), "atsp6");
        assert!(protocol.is_standard_id());
    }

    #[test]
    fn test_extended_ids_not_standard() {
        assert!(!ElmProtocol::Iso15765_4Can29bit500.is_standard_id());
        assert!(!ElmProtocol::Auto.is_standard_id());
    }
}
