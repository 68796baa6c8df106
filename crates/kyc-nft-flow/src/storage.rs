//! Durable storage of the mint attempt in flight.
//!
//! Wallets that sign through a redirect leave the current execution context.
//! The attempt is written here before leaving and read back on return.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use rand::{Rng, distr::Alphanumeric};

use kyc_nft_core::{Error, ErrorCode, types::PendingMint};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::internal(
            ErrorCode::Internal,
            format!("Pending mint storage failed: {err}"),
        )
        .with_source(err)
    }
}

/// Holds at most one pending mint.
pub trait PendingMintStore {
    fn save(&self, pending: &PendingMint) -> Result<(), StoreError>;

    fn load(&self) -> Result<Option<PendingMint>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// A fresh id for a mint attempt.
pub fn new_attempt_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Keeps the pending mint for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pending: Mutex<Option<PendingMint>>,
}

impl PendingMintStore for InMemoryStore {
    fn save(&self, pending: &PendingMint) -> Result<(), StoreError> {
        *self.pending.lock().map_err(|_| StoreError::Poisoned)? = Some(pending.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PendingMint>, StoreError> {
        Ok(self
            .pending
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.pending.lock().map_err(|_| StoreError::Poisoned)? = None;
        Ok(())
    }
}

/// Stores the pending mint as a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub const FILE_NAME: &'static str = "pending_mint.json";

    /// Store in `pending_mint.json` below `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        FileStore {
            path: base_dir.as_ref().join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingMintStore for FileStore {
    fn save(&self, pending: &PendingMint) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(pending)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<PendingMint>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
