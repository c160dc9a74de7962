use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{self, KdfCost};
use crate::models::UserData;

const DATA_DIR: &str = "cyclecast";
const DATA_FILE: &str = "data.cyclecast";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
}

/// Encrypted single-file store for one user's data.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
    cost: KdfCost,
}

impl Storage {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cost: KdfCost::default(),
        }
    }

    /// Key-derivation cost used for future saves. Existing files keep the
    /// cost they were written with until the next save.
    pub fn with_kdf_cost(mut self, cost: KdfCost) -> Self {
        self.cost = cost;
        self
    }

    /// `<platform data dir>/cyclecast/data.cyclecast`
    pub fn default_location() -> Result<Self, StorageError> {
        let dir = dirs::data_local_dir()
            .ok_or(StorageError::NoDataDir)?
            .join(DATA_DIR);
        Ok(Self::at(dir.join(DATA_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, passphrase: &str, data: &UserData) -> Result<(), StorageError> {
        let json = zeroize::Zeroizing::new(serde_json::to_vec(data)?);
        let sealed = crypto::seal(passphrase, &json, self.cost)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        // write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "data saved");
        Ok(())
    }

    pub fn load(&self, passphrase: &str) -> Result<UserData, StorageError> {
        let sealed = fs::read(&self.path)?;
        let json = crypto::open(passphrase, &sealed)?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn wipe(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            tracing::info!(path = %self.path.display(), "data file removed");
        }
        Ok(())
    }
}
