//! Core types and constants for Monero clients.
//!
//! This crate provides the pieces every other crate needs when it touches an
//! address or an amount: CryptoNote Base58, network prefixes, address
//! validation, integrated addresses and payment-id comparison.

pub mod address;
pub mod base58;
pub mod constants;

pub use address::{
    create_address_raw, decode_integrated_address, is_valid_address, make_integrated_address, parse_address,
    payment_ids_equal, validate_address, validate_payment_id, Address, AddressError, ParsedAddress,
};
pub use constants::{AddressType, Network};

/// Amount in atomic units (10^12 per coin).
///
/// The full supply fits in an unsigned 64-bit integer, so values above
/// 2^63 are carried without loss.
pub type Amount = u64;
