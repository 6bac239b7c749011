//! Monero network constants, address prefixes, and amount helpers.
//!
//! Reference: monero/src/cryptonote_config.h

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Network Types
// =============================================================================

/// Network type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Stagenet,
}

/// Address variant within a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    Standard,
    Integrated,
    Subaddress,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Stagenet];

    /// Single-byte prefix of a standard address.
    pub fn regular_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 18,
            Network::Testnet => 53,
            Network::Stagenet => 24,
        }
    }

    /// Single-byte prefix of an integrated address.
    pub fn integrated_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 19,
            Network::Testnet => 54,
            Network::Stagenet => 25,
        }
    }

    pub fn subaddress_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 42,
            Network::Testnet => 63,
            Network::Stagenet => 36,
        }
    }

    pub fn prefix(self, address_type: AddressType) -> u8 {
        match address_type {
            AddressType::Standard => self.regular_prefix(),
            AddressType::Integrated => self.integrated_prefix(),
            AddressType::Subaddress => self.subaddress_prefix(),
        }
    }

    /// Default daemon RPC port.
    pub fn daemon_port(self) -> u16 {
        match self {
            Network::Mainnet => 18081,
            Network::Testnet => 28081,
            Network::Stagenet => 38081,
        }
    }

    /// Network name as reported by the daemon's `nettype` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Stagenet => "stagenet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "stagenet" | "stage" => Ok(Network::Stagenet),
            other => Err(format!("unknown network type: {other}")),
        }
    }
}

/// Look up which network and variant a prefix byte belongs to.
pub fn prefix_info(prefix: u64) -> Option<(Network, AddressType)> {
    Network::ALL.iter().find_map(|&network| {
        [AddressType::Standard, AddressType::Integrated, AddressType::Subaddress]
            .into_iter()
            .find(|&t| network.prefix(t) as u64 == prefix)
            .map(|t| (network, t))
    })
}

// =============================================================================
// Key and Data Sizes
// =============================================================================

/// Size of a public/private key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the address checksum in bytes.
pub const CHECKSUM_SIZE: usize = 4;

/// Size of the payment ID embedded in an integrated address.
pub const PAYMENT_ID_SIZE: usize = 8;

/// Length of a standard or subaddress in Base58 characters.
pub const STANDARD_ADDRESS_LENGTH: usize = 95;

/// Length of an integrated address in Base58 characters.
pub const INTEGRATED_ADDRESS_LENGTH: usize = 106;

/// Address data sizes (without prefix), indexed by address type.
pub fn address_data_size(addr_type: AddressType) -> usize {
    match addr_type {
        AddressType::Standard | AddressType::Subaddress => KEY_SIZE * 2,
        AddressType::Integrated => KEY_SIZE * 2 + PAYMENT_ID_SIZE,
    }
}

// =============================================================================
// Transaction Defaults
// =============================================================================

/// Smallest ring size accepted by the wallet service.
pub const MIN_RING_SIZE: u32 = 7;

/// Ring size used when a send request does not specify one.
pub const DEFAULT_RING_SIZE: u32 = 16;

/// Blocks before a received output becomes spendable.
pub const DEFAULT_SPENDABLE_AGE: u64 = 10;

// =============================================================================
// Amounts
// =============================================================================

/// Atomic units per coin.
pub const COIN: u64 = 1_000_000_000_000;

/// Number of decimal places when displaying amounts.
pub const DISPLAY_DECIMAL_POINT: u32 = 12;

/// Format atomic units as a decimal string (e.g. `1.5`).
pub fn format_amount(atomic: u64) -> String {
    let whole = atomic / COIN;
    let frac = atomic % COIN;
    if frac == 0 {
        format!("{}.0", whole)
    } else {
        let frac_str = format!("{:012}", frac);
        format!("{}.{}", whole, frac_str.trim_end_matches('0'))
    }
}

/// Parse a decimal coin string into atomic units.
pub fn parse_amount(s: &str) -> Option<u64> {
    let s = s.trim();
    let (whole_str, frac_str) = s.split_once('.').unwrap_or((s, ""));

    let whole: u64 = whole_str.parse().ok()?;
    let frac: u64 = if frac_str.is_empty() {
        0
    } else {
        if frac_str.len() > DISPLAY_DECIMAL_POINT as usize || !frac_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        format!("{:0<12}", frac_str).parse().ok()?
    };

    whole.checked_mul(COIN)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_unique() {
        let mut seen = std::collections::HashSet::new();
        for network in Network::ALL {
            for t in [AddressType::Standard, AddressType::Integrated, AddressType::Subaddress] {
                assert!(seen.insert(network.prefix(t)));
                assert_eq!(prefix_info(network.prefix(t) as u64), Some((network, t)));
            }
        }
        assert_eq!(prefix_info(0), None);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0.0");
        assert_eq!(format_amount(COIN), "1.0");
        assert_eq!(format_amount(1_500_000_000_000), "1.5");
        assert_eq!(format_amount(1), "0.000000000001");
        assert_eq!(format_amount(u64::MAX), "18446744.073709551615");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.5"), Some(1_500_000_000_000));
        assert_eq!(parse_amount("0.000000000001"), Some(1));
        assert_eq!(parse_amount("42"), Some(42 * COIN));
        assert_eq!(parse_amount("0.0000000000001"), None);
        assert_eq!(parse_amount("1.-5"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("18446745"), None);
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("Stagenet".parse::<Network>(), Ok(Network::Stagenet));
        assert!("regtest".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.to_string(), "testnet");
    }
}
