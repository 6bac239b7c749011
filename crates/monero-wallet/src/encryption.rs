//! Wallet file encryption.
//!
//! Wallet files are sealed with Argon2id key derivation + AES-256-GCM.
//! The sealed format is self-contained with all parameters needed for
//! opening it again (except the password).

use crate::error::WalletError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

/// Magic bytes identifying a sealed wallet file.
const MAGIC: &[u8; 4] = b"XMRW";

/// Current wallet file format version.
const VERSION: u8 = 1;

/// Header size: 4 (magic) + 1 (version) + 32 (salt) + 12 (nonce) = 49 bytes.
const HEADER_SIZE: usize = 49;

/// Argon2id parameters (OWASP second recommended profile).
const ARGON2_T_COST: u32 = 2;
const ARGON2_M_COST: u32 = 19456; // 19 MiB
const ARGON2_PARALLELISM: u32 = 1;

fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; 32], WalletError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_PARALLELISM, Some(32))
        .map_err(|e| WalletError::Encryption(format!("invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| WalletError::Encryption(format!("Argon2id failed: {}", e)))?;
    Ok(output)
}

/// Seal wallet data with a password.
///
/// Returns the complete file contents (header + ciphertext).
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn encrypt_wallet_data(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; 32];
    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let key_bytes = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.push(VERSION);
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Check if data is a sealed wallet file (has the magic and a full header).
pub fn is_encrypted_wallet(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && &data[0..4] == MAGIC
}

/// Re-seal wallet data under a new password.
pub fn reencrypt_wallet_data(
    encrypted: &[u8],
    old_password: &[u8],
    new_password: &[u8],
) -> Result<Vec<u8>, WalletError> {
    let plaintext = decrypt_wallet_data(encrypted, old_password)?;
    encrypt_wallet_data(&plaintext, new_password)
}

/// Open sealed wallet data with a password.
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn decrypt_wallet_data(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < HEADER_SIZE {
        return Err(WalletError::InvalidFile("file too short".into()));
    }
    if &encrypted[0..4] != MAGIC {
        return Err(WalletError::InvalidFile("invalid magic bytes".into()));
    }
    let version = encrypted[4];
    if version != VERSION {
        return Err(WalletError::InvalidFile(format!("unsupported version: {}", version)));
    }

    let salt = &encrypted[5..37];
    let nonce_bytes = &encrypted[37..49];
    let ciphertext = &encrypted[49..];
    if ciphertext.is_empty() {
        return Err(WalletError::InvalidFile("no ciphertext".into()));
    }

    let key_bytes = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| WalletError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data = b"monero wallet cache";
        let password = b"test_password_123";

        let encrypted = encrypt_wallet_data(data, password).unwrap();
        assert!(encrypted.len() > HEADER_SIZE);
        assert_eq!(&encrypted[0..4], MAGIC);
        assert_eq!(encrypted[4], VERSION);

        let decrypted = decrypt_wallet_data(&encrypted, password).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn test_wrong_password_fails() {
        let encrypted = encrypt_wallet_data(b"secret data", b"correct_password").unwrap();
        let result = decrypt_wallet_data(&encrypted, b"wrong_password");
        assert!(matches!(result, Err(WalletError::DecryptionFailed)));
    }

    #[test]
    fn test_invalid_magic_fails() {
        let mut bad = vec![0u8; 100];
        bad[0..4].copy_from_slice(b"XXXX");
        let result = decrypt_wallet_data(&bad, b"password");
        assert!(matches!(result, Err(WalletError::InvalidFile(_))));
    }

    #[test]
    fn test_truncated_file_fails() {
        let result = decrypt_wallet_data(&[0u8; 10], b"password");
        assert!(matches!(result, Err(WalletError::InvalidFile(_))));
    }

    #[test]
    fn test_different_encryptions_differ() {
        let e1 = encrypt_wallet_data(b"same data", b"pass").unwrap();
        let e2 = encrypt_wallet_data(b"same data", b"pass").unwrap();
        assert_ne!(e1, e2);
    }

    #[test]
    fn test_empty_password_and_plaintext() {
        let encrypted = encrypt_wallet_data(b"", b"").unwrap();
        assert!(decrypt_wallet_data(&encrypted, b"").unwrap().is_empty());
    }

    #[test]
    fn test_is_encrypted_wallet() {
        let encrypted = encrypt_wallet_data(b"some wallet data", b"password").unwrap();
        assert!(is_encrypted_wallet(&encrypted));
        assert!(!is_encrypted_wallet(b"XMRW"));
        assert!(!is_encrypted_wallet(&[0xDE, 0xAD, 0xBE, 0xEF]));
        assert!(!is_encrypted_wallet(&[]));
    }

    #[test]
    fn test_reencrypt_wallet_data() {
        let data = b"wallet secrets here";
        let encrypted = encrypt_wallet_data(data, b"old_password").unwrap();
        let reencrypted = reencrypt_wallet_data(&encrypted, b"old_password", b"new_password").unwrap();

        assert!(decrypt_wallet_data(&reencrypted, b"old_password").is_err());
        assert_eq!(decrypt_wallet_data(&reencrypted, b"new_password").unwrap(), data);
        assert!(reencrypt_wallet_data(&encrypted, b"wrong", b"new").is_err());
    }
}
