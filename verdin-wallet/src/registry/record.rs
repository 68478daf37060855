//! On-disk wallet records.
//!
//! One JSON file per wallet under the `wallets` directory of the data
//! directory, named by the wallet id. Records never hold key material,
//! only the server-encrypted PIN data blob.

use std::io;
use std::path::Path;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::datadir::DataDirectory;

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub version: u32,
    pub id: String,
    pub name: String,
    /// Network identifier, e.g. "mainnet" or "liquid".
    pub network: String,
    pub login_attempts_remaining: u8,
    /// Server-encrypted PIN data, base64-encoded.
    pub pin_data: String,
    pub proxy: String,
    pub use_tor: bool,
}

impl WalletRecord {
    pub fn pin_data_bytes(&self) -> Result<Vec<u8>, RecordError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.pin_data)
            .map_err(|e| RecordError::Malformed(format!("pin_data: {}", e)))
    }

    pub fn encode_pin_data(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let content = std::fs::read(path)?;
        let record: Self = serde_json::from_slice(&content)
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        if record.version > RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(record.version));
        }
        Ok(record)
    }

    pub fn save(&self, data_dir: &DataDirectory) -> Result<(), RecordError> {
        debug_assert!(!self.id.is_empty());
        let path = data_dir.wallet_file_path(&self.id);
        let content =
            serde_json::to_vec_pretty(self).map_err(|e| RecordError::Malformed(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn delete(data_dir: &DataDirectory, id: &str) -> Result<(), RecordError> {
        std::fs::remove_file(data_dir.wallet_file_path(id))?;
        Ok(())
    }

    /// Load every parsable record in the wallets directory. Unparsable
    /// files are skipped with a warning, never fatal.
    pub fn load_all(data_dir: &DataDirectory) -> Result<Vec<Self>, RecordError> {
        let dir = data_dir.wallets_dir_path();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match Self::load(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("Skipping wallet record '{}': {}", path.display(), e);
                }
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

#[derive(Debug)]
pub enum RecordError {
    Io(io::Error),
    Malformed(String),
    UnsupportedVersion(u32),
    /// Inserting a wallet whose record file already exists.
    AlreadyExists(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Malformed(e) => write!(f, "Malformed record: {}", e),
            Self::UnsupportedVersion(v) => write!(f, "Unsupported record version: {}", v),
            Self::AlreadyExists(id) => write!(f, "A record for wallet '{}' already exists", id),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<io::Error> for RecordError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_datadir() -> (tempfile::TempDir, DataDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDirectory::new(tmp.path().to_path_buf());
        dir.init().unwrap();
        (tmp, dir)
    }

    #[test]
    fn record_roundtrip() {
        let (_tmp, dir) = temp_datadir();
        let record = WalletRecord {
            version: RECORD_VERSION,
            id: "11111111-2222-3333-4444-555555555555".to_string(),
            name: "My Mainnet Wallet".to_string(),
            network: "mainnet".to_string(),
            login_attempts_remaining: 3,
            pin_data: WalletRecord::encode_pin_data(b"blob"),
            proxy: String::new(),
            use_tor: false,
        };
        record.save(&dir).unwrap();

        let loaded = WalletRecord::load(&dir.wallet_file_path(&record.id)).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.pin_data_bytes().unwrap(), b"blob");
    }

    #[test]
    fn load_all_skips_malformed() {
        let (_tmp, dir) = temp_datadir();
        let record = WalletRecord {
            version: RECORD_VERSION,
            id: "good".to_string(),
            name: "Good".to_string(),
            network: "testnet".to_string(),
            login_attempts_remaining: 2,
            pin_data: WalletRecord::encode_pin_data(b"x"),
            proxy: String::new(),
            use_tor: false,
        };
        record.save(&dir).unwrap();
        std::fs::write(dir.wallet_file_path("bad"), b"{not json").unwrap();
        std::fs::write(dir.wallets_dir_path().join("notes.txt"), b"ignored").unwrap();

        let records = WalletRecord::load_all(&dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "good");
    }

    #[test]
    fn future_version_rejected() {
        let (_tmp, dir) = temp_datadir();
        let mut record = WalletRecord {
            version: RECORD_VERSION + 1,
            id: "future".to_string(),
            name: "Future".to_string(),
            network: "mainnet".to_string(),
            login_attempts_remaining: 3,
            pin_data: String::new(),
            proxy: String::new(),
            use_tor: false,
        };
        record.pin_data = WalletRecord::encode_pin_data(b"x");
        // Bypass save()'s version to simulate a newer writer.
        record.save(&dir).unwrap();
        assert!(matches!(
            WalletRecord::load(&dir.wallet_file_path("future")),
            Err(RecordError::UnsupportedVersion(_))
        ));
        // And load_all skips it rather than failing.
        assert!(WalletRecord::load_all(&dir).unwrap().is_empty());
    }
}
