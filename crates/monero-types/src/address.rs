//! Monero address parsing, validation, and creation.
//!
//! Covers standard, integrated and subaddress variants on mainnet, testnet
//! and stagenet, plus payment-id helpers.

use crate::base58::{self, ALPHABET};
use crate::constants::{
    address_data_size, prefix_info, AddressType, Network, INTEGRATED_ADDRESS_LENGTH, KEY_SIZE,
    PAYMENT_ID_SIZE, STANDARD_ADDRESS_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must be a non-empty string")]
    Empty,

    #[error("invalid address length ({0}), expected 95 or 106 characters")]
    InvalidLength(usize),

    #[error("invalid address character '{0}' at position {1}")]
    InvalidCharacter(char, usize),

    #[error("base58 decode error: {0}")]
    Base58(#[from] base58::Base58Error),

    #[error("unknown address prefix: {0}")]
    UnknownPrefix(u64),

    #[error("address belongs to {actual}, expected {expected}")]
    WrongNetwork { expected: Network, actual: Network },

    #[error("invalid data length: expected {expected} bytes, got {actual}")]
    InvalidDataLength { expected: usize, actual: usize },

    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("paymentId is required for integrated addresses")]
    MissingPaymentId,

    #[error("invalid payment id: {0}")]
    InvalidPaymentId(String),

    #[error("address must be a standard address, got {0:?}")]
    NotStandard(AddressType),

    #[error("address must be an integrated address, got {0:?}")]
    NotIntegrated(AddressType),
}

impl AddressError {
    /// True when the failure came from the Base58 layer rather than address rules.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            AddressError::Base58(
                base58::Base58Error::Overflow(_)
                    | base58::Base58Error::InvalidLength(..)
                    | base58::Base58Error::InvalidCharacter(..)
                    | base58::Base58Error::VarintError
            )
        )
    }
}

/// Result of parsing an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub network: Network,
    pub address_type: AddressType,
    pub spend_public_key: [u8; KEY_SIZE],
    pub view_public_key: [u8; KEY_SIZE],
    pub payment_id: Option<[u8; PAYMENT_ID_SIZE]>,
}

impl ParsedAddress {
    pub fn is_integrated(&self) -> bool {
        self.address_type == AddressType::Integrated
    }

    pub fn is_subaddress(&self) -> bool {
        self.address_type == AddressType::Subaddress
    }

    /// Re-encode this parsed address back to a Base58 string.
    pub fn to_address_string(&self) -> String {
        let mut data = Vec::with_capacity(address_data_size(self.address_type));
        data.extend_from_slice(&self.spend_public_key);
        data.extend_from_slice(&self.view_public_key);
        if let Some(pid) = &self.payment_id {
            data.extend_from_slice(pid);
        }
        base58::encode_address(self.network.prefix(self.address_type) as u64, &data)
    }

    /// The standard address sharing this address's keys.
    ///
    /// Only meaningful for standard and integrated addresses; a subaddress
    /// has no recoverable primary address.
    pub fn standard(&self) -> ParsedAddress {
        ParsedAddress {
            address_type: AddressType::Standard,
            payment_id: None,
            ..self.clone()
        }
    }
}

/// Address value object: a standard address, optionally bound to a payment id.
///
/// `integrated()` holds exactly when a payment id is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    standard_address: String,
    payment_id: Option<String>,
}

impl Address {
    /// Parse any address string into its standard form and payment id.
    pub fn parse(address: &str, network: Option<Network>) -> Result<Self, AddressError> {
        let parsed = validate_address(address, network)?;
        Ok(Self {
            standard_address: if parsed.is_integrated() {
                parsed.standard().to_address_string()
            } else {
                address.trim().to_string()
            },
            payment_id: parsed.payment_id.map(hex::encode),
        })
    }

    pub fn standard_address(&self) -> &str {
        &self.standard_address
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn integrated(&self) -> bool {
        self.payment_id.is_some()
    }

    /// The address as it would be written on the wire.
    pub fn encoded(&self) -> Result<String, AddressError> {
        match &self.payment_id {
            Some(pid) => make_integrated_address(&self.standard_address, pid),
            None => Ok(self.standard_address.clone()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoded() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str(&self.standard_address),
        }
    }
}

/// Parse and checksum-verify an address string of any network.
pub fn parse_address(address: &str) -> Result<ParsedAddress, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    if address.len() != STANDARD_ADDRESS_LENGTH && address.len() != INTEGRATED_ADDRESS_LENGTH {
        return Err(AddressError::InvalidLength(address.len()));
    }
    if let Some((pos, ch)) = address.char_indices().find(|(_, c)| !c.is_ascii() || !ALPHABET.contains(&(*c as u8))) {
        return Err(AddressError::InvalidCharacter(ch, pos));
    }

    let (tag, data) = base58::decode_address(address)?;
    let (network, address_type) = prefix_info(tag).ok_or(AddressError::UnknownPrefix(tag))?;

    let expected_size = address_data_size(address_type);
    if data.len() != expected_size {
        return Err(AddressError::InvalidDataLength {
            expected: expected_size,
            actual: data.len(),
        });
    }

    let mut spend_public_key = [0u8; KEY_SIZE];
    spend_public_key.copy_from_slice(&data[..KEY_SIZE]);

    let mut view_public_key = [0u8; KEY_SIZE];
    view_public_key.copy_from_slice(&data[KEY_SIZE..KEY_SIZE * 2]);

    let payment_id = (address_type == AddressType::Integrated).then(|| {
        let mut pid = [0u8; PAYMENT_ID_SIZE];
        pid.copy_from_slice(&data[KEY_SIZE * 2..]);
        pid
    });

    Ok(ParsedAddress {
        network,
        address_type,
        spend_public_key,
        view_public_key,
        payment_id,
    })
}

/// Parse an address and, when `network` is given, require it to match.
pub fn validate_address(address: &str, network: Option<Network>) -> Result<ParsedAddress, AddressError> {
    let parsed = parse_address(address)?;
    match network {
        Some(expected) if expected != parsed.network => Err(AddressError::WrongNetwork {
            expected,
            actual: parsed.network,
        }),
        _ => Ok(parsed),
    }
}

pub fn is_valid_address(address: &str, network: Option<Network>) -> bool {
    validate_address(address, network).is_ok()
}

/// Create an address string from its public keys.
pub fn create_address_raw(
    network: Network,
    addr_type: AddressType,
    spend_public_key: &[u8],
    view_public_key: &[u8],
    payment_id: Option<&[u8]>,
) -> Result<String, AddressError> {
    for key in [spend_public_key, view_public_key] {
        if key.len() != KEY_SIZE {
            return Err(AddressError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }
    }

    let mut data = Vec::with_capacity(address_data_size(addr_type));
    data.extend_from_slice(spend_public_key);
    data.extend_from_slice(view_public_key);

    if addr_type == AddressType::Integrated {
        let pid = payment_id.ok_or(AddressError::MissingPaymentId)?;
        if pid.len() != PAYMENT_ID_SIZE {
            return Err(AddressError::InvalidPaymentId(format!(
                "expected {} bytes, got {}",
                PAYMENT_ID_SIZE,
                pid.len()
            )));
        }
        data.extend_from_slice(pid);
    }

    Ok(base58::encode_address(network.prefix(addr_type) as u64, &data))
}

/// Bind a 16-hex payment id to a standard address.
pub fn make_integrated_address(standard_address: &str, payment_id: &str) -> Result<String, AddressError> {
    let parsed = parse_address(standard_address)?;
    if parsed.address_type != AddressType::Standard {
        return Err(AddressError::NotStandard(parsed.address_type));
    }
    if payment_id.len() != PAYMENT_ID_SIZE * 2 {
        return Err(AddressError::InvalidPaymentId(format!(
            "integrated addresses take a 16 character payment id, got {}",
            payment_id.len()
        )));
    }
    let pid = hex::decode(payment_id).map_err(|e| AddressError::InvalidPaymentId(e.to_string()))?;

    create_address_raw(
        parsed.network,
        AddressType::Integrated,
        &parsed.spend_public_key,
        &parsed.view_public_key,
        Some(&pid),
    )
}

/// Split an integrated address into its standard address and payment id.
pub fn decode_integrated_address(integrated_address: &str) -> Result<Address, AddressError> {
    let parsed = parse_address(integrated_address)?;
    if !parsed.is_integrated() {
        return Err(AddressError::NotIntegrated(parsed.address_type));
    }
    Address::parse(integrated_address, None)
}

/// Accepts a short (16 hex) or long (64 hex) payment id.
pub fn validate_payment_id(payment_id: &str) -> Result<(), AddressError> {
    if payment_id.len() != 16 && payment_id.len() != 64 {
        return Err(AddressError::InvalidPaymentId(format!(
            "length must be 16 or 64, got {}",
            payment_id.len()
        )));
    }
    if !payment_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidPaymentId(format!("not hex: {payment_id}")));
    }
    Ok(())
}

/// Compare payment ids, treating the shorter one as zero-padded to the
/// length of the longer one.
pub fn payment_ids_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let len = a.len().max(b.len());
    (0..len).all(|i| {
        let ca = a.get(i).copied().unwrap_or(b'0');
        let cb = b.get(i).copied().unwrap_or(b'0');
        ca.eq_ignore_ascii_case(&cb)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET_ADDRESS: &str = "4AYjQM9HoAFNUeC3cvSfgeAN9c3Z8nS3dLM2dCA8shsiQEB3jbxQUEjRmKDoZZG2ubXsxtiE9vZGiu5wPpSV9YSE3FVZcSu";

    #[test]
    fn test_known_mainnet_address() {
        assert_eq!(MAINNET_ADDRESS.len(), 95);
        let parsed = validate_address(MAINNET_ADDRESS, Some(Network::Mainnet)).unwrap();
        assert_eq!(parsed.network, Network::Mainnet);
        assert_eq!(parsed.address_type, AddressType::Standard);
        assert_eq!(parsed.to_address_string(), MAINNET_ADDRESS);

        let address = Address::parse(MAINNET_ADDRESS, None).unwrap();
        assert!(!address.integrated());
        assert_eq!(address.standard_address(), MAINNET_ADDRESS);
    }

    #[test]
    fn test_network_mismatch() {
        assert!(matches!(
            validate_address(MAINNET_ADDRESS, Some(Network::Testnet)),
            Err(AddressError::WrongNetwork { expected: Network::Testnet, actual: Network::Mainnet })
        ));
        assert!(is_valid_address(MAINNET_ADDRESS, None));
        assert!(!is_valid_address(MAINNET_ADDRESS, Some(Network::Stagenet)));
    }

    #[test]
    fn test_bad_lengths() {
        assert_eq!(parse_address(""), Err(AddressError::Empty));
        assert_eq!(parse_address(&MAINNET_ADDRESS[..94]), Err(AddressError::InvalidLength(94)));
        let long = format!("{}1", MAINNET_ADDRESS);
        assert_eq!(parse_address(&long), Err(AddressError::InvalidLength(96)));
    }

    #[test]
    fn test_checksum_mismatch() {
        let corrupted = format!("{}t", &MAINNET_ADDRESS[..94]);
        assert_eq!(
            parse_address(&corrupted),
            Err(AddressError::Base58(base58::Base58Error::ChecksumMismatch))
        );
    }

    #[test]
    fn test_bad_character() {
        let corrupted = format!("0{}", &MAINNET_ADDRESS[1..]);
        assert_eq!(parse_address(&corrupted), Err(AddressError::InvalidCharacter('0', 0)));
    }

    #[test]
    fn test_integrated_address() {
        let integrated = make_integrated_address(MAINNET_ADDRESS, "03284e41c342f032").unwrap();
        assert_eq!(integrated.len(), 106);

        let parsed = validate_address(&integrated, Some(Network::Mainnet)).unwrap();
        assert_eq!(parsed.address_type, AddressType::Integrated);

        let decoded = decode_integrated_address(&integrated).unwrap();
        assert!(decoded.integrated());
        assert_eq!(decoded.standard_address(), MAINNET_ADDRESS);
        assert_eq!(decoded.payment_id(), Some("03284e41c342f032"));
        assert_eq!(decoded.encoded().unwrap(), integrated);
        assert_eq!(decoded.to_string(), integrated);
    }

    #[test]
    fn test_integrated_rejects_bad_payment_id() {
        assert!(matches!(
            make_integrated_address(MAINNET_ADDRESS, "03284e41c342f03"),
            Err(AddressError::InvalidPaymentId(_))
        ));
        assert!(matches!(
            make_integrated_address(MAINNET_ADDRESS, "zz284e41c342f032"),
            Err(AddressError::InvalidPaymentId(_))
        ));
        assert!(matches!(
            decode_integrated_address(MAINNET_ADDRESS),
            Err(AddressError::NotIntegrated(AddressType::Standard))
        ));
    }

    #[test]
    fn test_create_roundtrip_all_networks() {
        for network in Network::ALL {
            for t in [AddressType::Standard, AddressType::Subaddress] {
                let address = create_address_raw(network, t, &[0x11; 32], &[0x22; 32], None).unwrap();
                assert_eq!(address.len(), 95);
                let parsed = validate_address(&address, Some(network)).unwrap();
                assert_eq!(parsed.address_type, t);
                assert_eq!(parsed.to_address_string(), address);
            }
        }
    }

    #[test]
    fn test_payment_ids_equal() {
        assert!(payment_ids_equal(
            "03284e41c342f032",
            "03284e41c342f032000000000000000000000000000000000000000000000000"
        ));
        assert!(!payment_ids_equal("03284e41c342f032", "03284e41c342f033"));
        assert!(!payment_ids_equal(
            "03284e41c342f032",
            "03284e41c342f032000000000000000000000000000000000000000000000001"
        ));
        assert!(payment_ids_equal("", "0000000000000000"));
    }

    #[test]
    fn test_validate_payment_id() {
        assert!(validate_payment_id("03284e41c342f032").is_ok());
        assert!(validate_payment_id(&"ab".repeat(32)).is_ok());
        assert!(validate_payment_id("03284e41c342f03").is_err());
        assert!(validate_payment_id("g3284e41c342f032").is_err());
    }

    #[test]
    fn test_overflow_is_encoding_error() {
        let overflowing = format!("zzzzzzzzzzz{}", &MAINNET_ADDRESS[11..]);
        let err = parse_address(&overflowing).unwrap_err();
        assert!(err.is_encoding(), "{err:?}");
    }
}
