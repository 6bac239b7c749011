//! CryptoNote Base58 encoding/decoding.
//!
//! Monero does not use Bitcoin's Base58Check. Data is split into 8-byte
//! blocks, each encoding to exactly 11 Base58 characters, and the final
//! partial block is sized through a fixed lookup table.
//!
//! Reference: monero/src/common/base58.cpp

use crate::constants::CHECKSUM_SIZE;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

/// Keccak-256 (original padding, not SHA3) as used for address checksums.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

/// Base58 alphabet.
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Full block size: 8 bytes of data.
const FULL_BLOCK_SIZE: usize = 8;

/// Full encoded block size: 11 Base58 characters.
const FULL_ENCODED_BLOCK_SIZE: usize = 11;

/// Encoded block sizes for partial blocks (index = byte count, value = char count).
const ENCODED_BLOCK_SIZES: [usize; 9] = [0, 2, 3, 5, 6, 7, 9, 10, 11];

/// Reverse lookup: encoded char count -> decoded byte count. -1 = invalid.
const DECODED_BLOCK_SIZES: [i8; 12] = [0, -1, 1, 2, -1, 3, 4, 5, -1, 6, 7, 8];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Base58Error {
    #[error("invalid character '{0}' at position {1}")]
    InvalidCharacter(char, usize),

    #[error("invalid encoded length {0} (last block size {1} is invalid)")]
    InvalidLength(usize, usize),

    #[error("Overflow in block {0}")]
    Overflow(usize),

    #[error("address too short ({0} bytes, need >4)")]
    AddressTooShort(usize),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("varint incomplete or too long")]
    VarintError,
}

const fn build_reverse_alphabet() -> [u8; 128] {
    let mut table = [0xFFu8; 128];
    let mut i = 0;
    while i < 58 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static REVERSE_ALPHABET: [u8; 128] = build_reverse_alphabet();

/// Encode a single block of at most 8 bytes.
fn encode_block(block: &[u8], out: &mut String) {
    let encoded_size = ENCODED_BLOCK_SIZES[block.len()];
    let mut chars = [ALPHABET[0]; FULL_ENCODED_BLOCK_SIZE];

    let mut num = be_bytes_to_u64(block);
    let mut i = encoded_size;
    while num > 0 {
        i -= 1;
        chars[i] = ALPHABET[(num % 58) as usize];
        num /= 58;
    }

    out.extend(chars[..encoded_size].iter().map(|&c| c as char));
}

/// Decode a single Base58 block. `block_index` only feeds error reporting.
fn decode_block(block: &[u8], block_index: usize, out: &mut Vec<u8>) -> Result<(), Base58Error> {
    let decoded_size = DECODED_BLOCK_SIZES
        .get(block.len())
        .copied()
        .filter(|&size| size >= 0)
        .ok_or(Base58Error::InvalidLength(0, block.len()))? as usize;

    if decoded_size == 0 {
        return Ok(());
    }

    let mut num: u64 = 0;
    for (i, &ch) in block.iter().enumerate() {
        let position = block_index * FULL_ENCODED_BLOCK_SIZE + i;
        let digit = REVERSE_ALPHABET
            .get(ch as usize)
            .copied()
            .filter(|&d| d != 0xFF)
            .ok_or(Base58Error::InvalidCharacter(ch as char, position))?;
        num = num
            .checked_mul(58)
            .and_then(|n| n.checked_add(digit as u64))
            .ok_or(Base58Error::Overflow(block_index))?;
    }

    if decoded_size < FULL_BLOCK_SIZE && num >= (1u64 << (8 * decoded_size)) {
        return Err(Base58Error::Overflow(block_index));
    }

    out.extend_from_slice(&num.to_be_bytes()[FULL_BLOCK_SIZE - decoded_size..]);
    Ok(())
}

/// Interpret up to 8 bytes as a big-endian integer.
fn be_bytes_to_u64(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
}

/// Length of the Base58 string produced for `len` input bytes.
pub fn encoded_len(len: usize) -> usize {
    (len / FULL_BLOCK_SIZE) * FULL_ENCODED_BLOCK_SIZE + ENCODED_BLOCK_SIZES[len % FULL_BLOCK_SIZE]
}

/// Encode binary data to CryptoNote Base58.
pub fn encode(data: &[u8]) -> String {
    let mut result = String::with_capacity(encoded_len(data.len()));
    for block in data.chunks(FULL_BLOCK_SIZE) {
        encode_block(block, &mut result);
    }
    result
}

/// Decode a CryptoNote Base58 string to binary data.
pub fn decode(encoded: &str) -> Result<Vec<u8>, Base58Error> {
    let bytes = encoded.as_bytes();
    let last_block_size = bytes.len() % FULL_ENCODED_BLOCK_SIZE;
    if DECODED_BLOCK_SIZES[last_block_size] < 0 {
        return Err(Base58Error::InvalidLength(encoded.len(), last_block_size));
    }

    let mut result = Vec::with_capacity(bytes.len() / FULL_ENCODED_BLOCK_SIZE * FULL_BLOCK_SIZE + FULL_BLOCK_SIZE);
    for (i, block) in bytes.chunks(FULL_ENCODED_BLOCK_SIZE).enumerate() {
        decode_block(block, i, &mut result)?;
    }
    Ok(result)
}

/// Decode a Base58 string and return the bytes as lowercase hex.
pub fn decode_to_hex(encoded: &str) -> Result<String, Base58Error> {
    decode(encoded).map(hex::encode)
}

/// Encode a varint (LEB128 unsigned).
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if value == 0 {
            break;
        }
    }
    bytes
}

/// Decode a varint from the start of data. Returns (value, bytes_read).
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), Base58Error> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in data.iter().enumerate().take(10) {
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }

    Err(Base58Error::VarintError)
}

/// Encode an address payload with its varint prefix and Keccak-256 checksum.
pub fn encode_address(tag: u64, data: &[u8]) -> String {
    let mut combined = encode_varint(tag);
    combined.extend_from_slice(data);

    let hash = keccak256(&combined);
    combined.extend_from_slice(&hash[..CHECKSUM_SIZE]);

    encode(&combined)
}

/// Decode an address, verifying the checksum and splitting off the prefix.
pub fn decode_address(address: &str) -> Result<(u64, Vec<u8>), Base58Error> {
    let decoded = decode(address)?;
    if decoded.len() <= CHECKSUM_SIZE {
        return Err(Base58Error::AddressTooShort(decoded.len()));
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - CHECKSUM_SIZE);
    let hash = keccak256(payload);
    if &hash[..CHECKSUM_SIZE] != checksum {
        return Err(Base58Error::ChecksumMismatch);
    }

    let (tag, bytes_read) = decode_varint(payload)?;
    Ok((tag, payload[bytes_read..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        for &val in &[0u64, 1, 18, 127, 128, 255, 16384, u64::MAX] {
            let encoded = encode_varint(val);
            let (decoded, bytes_read) = decode_varint(&encoded).unwrap();
            assert_eq!(decoded, val);
            assert_eq!(bytes_read, encoded.len());
        }
    }

    #[test]
    fn test_block_size_table() {
        for (bytes, chars) in [(0, 0), (1, 2), (2, 3), (3, 5), (4, 6), (5, 7), (6, 9), (7, 10), (8, 11)] {
            assert_eq!(encode(&vec![0xFF; bytes]).len(), chars, "{bytes} bytes");
        }
        assert_eq!(encoded_len(69), 95);
        assert_eq!(encoded_len(77), 106);
    }

    #[test]
    fn test_base58_roundtrip() {
        for len in 0..40usize {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            assert_eq!(decode(&encode(&data)).unwrap(), data, "len {len}");
        }
        let ones = vec![0xFFu8; 16];
        assert_eq!(decode(&encode(&ones)).unwrap(), ones);
    }

    #[test]
    fn test_base58_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_full_block_overflow() {
        // "zzzzzzzzzzz" is 58^11 - 1, well above 2^64.
        assert_eq!(decode("zzzzzzzzzzz"), Err(Base58Error::Overflow(0)));
        assert!(decode("11111111111zzzzzzzzzzz").unwrap_err().to_string().starts_with("Overflow"));
    }

    #[test]
    fn test_partial_block_overflow() {
        // Two characters decode to one byte; "zz" = 3363 > 255.
        assert_eq!(decode("zz"), Err(Base58Error::Overflow(0)));
        assert_eq!(decode("5Q").unwrap(), vec![0xFF]);
    }

    #[test]
    fn test_invalid_length_and_character() {
        assert!(matches!(decode("1"), Err(Base58Error::InvalidLength(1, 1))));
        assert!(matches!(decode("0O"), Err(Base58Error::InvalidCharacter('0', 0))));
        assert!(matches!(decode("1l"), Err(Base58Error::InvalidCharacter('l', 1))));
    }

    #[test]
    fn test_address_roundtrip() {
        let data = vec![0xAB; 64];
        let encoded = encode_address(18, &data);
        assert_eq!(encoded.len(), 95);
        let (tag, decoded) = decode_address(&encoded).unwrap();
        assert_eq!(tag, 18);
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_checksum_mismatch() {
        let encoded = encode_address(18, &[0xAB; 64]);
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '2' } else { '1' };
        let corrupted: String = chars.into_iter().collect();
        assert!(decode_address(&corrupted).is_err());
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
