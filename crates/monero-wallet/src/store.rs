//! On-disk wallet files.
//!
//! A wallet at `path` is three files:
//!
//! - `path`             sealed wallet cache (JSON of [`WalletCache`])
//! - `path.keys`        sealed keys document (JSON of [`KeysDocument`])
//! - `path.address.txt` primary address in clear
//!
//! Both sealed files use [`crate::encryption`]. Every save writes a temp
//! file next to the target and renames it into place.

use crate::account::{AccountTag, AddressBookEntry};
use crate::encryption::{decrypt_wallet_data, encrypt_wallet_data};
use crate::error::WalletError;
use crate::output::Output;
use crate::tx::Tx;
use log::debug;
use monero_types::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Identity of the wallet: what the keys file holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysDocument {
    pub network: Network,
    pub primary_address: String,
    /// Engine key material, hex.
    pub key_material: String,
}

/// A subaddress the wallet has handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubaddressRecord {
    pub account_index: u32,
    pub subaddress_index: u32,
    pub address: String,
    pub label: Option<String>,
}

/// Everything the wallet remembers between sessions. The restore height is
/// deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCache {
    /// Number of blocks scanned; the next block to scan.
    pub synced_height: u64,
    pub subaddresses: Vec<SubaddressRecord>,
    pub txs: Vec<Tx>,
    pub outputs: Vec<Output>,
    pub tx_notes: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    pub address_book: Vec<AddressBookEntry>,
    pub next_address_book_index: u64,
    pub account_tags: Vec<AccountTag>,
    /// Account index -> tag.
    pub account_tag_of: BTreeMap<u32, String>,
    /// Key images exported or imported at the last key image sync.
    pub last_key_image_import: Vec<String>,
}

/// Paths of a wallet's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletFiles {
    path: PathBuf,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn write_atomic(target: &Path, data: &[u8]) -> Result<(), WalletError> {
    let tmp = with_suffix(target, ".tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, target)?;
    Ok(())
}

impl WalletFiles {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys_path(&self) -> PathBuf {
        with_suffix(&self.path, ".keys")
    }

    pub fn address_path(&self) -> PathBuf {
        with_suffix(&self.path, ".address.txt")
    }

    /// True iff both the cache and the keys file exist.
    pub fn exists(&self) -> bool {
        self.path.is_file() && self.keys_path().is_file()
    }

    pub fn load(&self, password: &str) -> Result<(KeysDocument, WalletCache), WalletError> {
        if !self.exists() {
            return Err(WalletError::WalletNotFound(self.path.display().to_string()));
        }
        let keys = decrypt_wallet_data(&fs::read(self.keys_path())?, password.as_bytes())?;
        let cache = decrypt_wallet_data(&fs::read(&self.path)?, password.as_bytes())?;
        Ok((serde_json::from_slice(&keys)?, serde_json::from_slice(&cache)?))
    }

    pub fn save(&self, password: &str, keys: &KeysDocument, cache: &WalletCache) -> Result<(), WalletError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let keys_blob = encrypt_wallet_data(&serde_json::to_vec(keys)?, password.as_bytes())?;
        let cache_blob = encrypt_wallet_data(&serde_json::to_vec(cache)?, password.as_bytes())?;
        write_atomic(&self.keys_path(), &keys_blob)?;
        write_atomic(&self.path, &cache_blob)?;
        write_atomic(&self.address_path(), keys.primary_address.as_bytes())?;
        debug!("saved wallet files at {}", self.path.display());
        Ok(())
    }

    /// Remove all three files. Missing files are ignored.
    pub fn remove(&self) -> Result<(), WalletError> {
        for p in [self.path.clone(), self.keys_path(), self.address_path()] {
            match fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeysDocument {
        KeysDocument {
            network: Network::Stagenet,
            primary_address: "5primary".into(),
            key_material: "00ff".into(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = WalletFiles::new(dir.path().join("w1"));
        assert!(!files.exists());
        assert!(matches!(files.load("pw"), Err(WalletError::WalletNotFound(_))));

        let cache = WalletCache {
            synced_height: 1234,
            ..Default::default()
        };
        files.save("pw", &keys(), &cache).unwrap();
        assert!(files.exists());
        assert_eq!(fs::read_to_string(files.address_path()).unwrap(), "5primary");
        assert!(!with_suffix(files.path(), ".tmp").exists());

        let (k, c) = files.load("pw").unwrap();
        assert_eq!(k, keys());
        assert_eq!(c.synced_height, 1234);
        assert!(matches!(files.load("nope"), Err(WalletError::DecryptionFailed)));
    }

    #[test]
    fn test_exists_needs_keys_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = WalletFiles::new(dir.path().join("w2"));
        fs::write(files.path(), b"x").unwrap();
        assert!(!files.exists());
        fs::write(files.keys_path(), b"x").unwrap();
        assert!(files.exists());
        files.remove().unwrap();
        assert!(!files.exists());
    }
}
