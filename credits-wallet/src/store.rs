//! Proof Storage
//!
//! The persistence boundary of the wallet. A store holds one proof set and,
//! optionally, a list of sealed history entries. Writes are whole-set
//! replacements so a reader never observes a partial update.
//!
//! Two backends live here:
//! - [`MemoryStore`], which keeps independent copies in process memory
//! - [`FileStore`], a single encrypted file written by temp file + rename
//!
//! Corrupt stored data degrades to an empty set with a warning. Data that
//! fails authenticated decryption is an error, never silently replaced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{SealError, StoreError};
use crate::proof::{dedupe_by_secret, Proof};
use crate::seal::{generate_salt, SealingKey};
use crate::sink::{default_sink, DiagnosticSink};

/// Current proof file format version
const STORE_VERSION: u32 = 1;

/// Persistence contract for the held proof set
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Stored proofs, or an empty set when nothing is stored
    async fn load(&self) -> Result<Vec<Proof>, StoreError>;

    /// Replace the stored set
    async fn save(&self, proofs: &[Proof]) -> Result<(), StoreError>;

    /// Remove the stored set
    async fn clear(&self) -> Result<(), StoreError>;

    /// Sealed history entries, oldest first
    async fn load_history(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    /// Replace the stored history entries
    async fn save_history(&self, _entries: &[String]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        Ok(())
    }}

// ============================================================================
// In-memory backend
// ============================================================================

/// Store backed by process memory.
///
/// `load` returns an independent copy; later changes to the returned vector
/// do not reach the store and vice versa.
#[derive(Debug, Default)]
pub struct MemoryStore {
    proofs: Mutex<Vec<Proof>>,
    history: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `proofs`
    pub fn with_proofs(proofs: Vec<Proof>) -> Self {
        Self {
            proofs: Mutex::new(proofs),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Current contents, for inspection
    pub fn snapshot(&self) -> Vec<Proof> {
        self.proofs.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::Other, "store lock poisoned"))
}

#[async_trait]
impl ProofStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Proof>, StoreError> {
        let proofs = self.proofs.lock().map_err(|_| poisoned())?;
        Ok(proofs.clone())
    }

    async fn save(&self, proofs: &[Proof]) -> Result<(), StoreError> {
        let mut stored = self.proofs.lock().map_err(|_| poisoned())?;
        if stored.as_slice() != proofs {
            *stored = proofs.to_vec();
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.proofs.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<String>, StoreError> {
        let history = self.history.lock().map_err(|_| poisoned())?;
        Ok(history.clone())
    }

    async fn save_history(&self, entries: &[String]) -> Result<(), StoreError> {
        *self.history.lock().map_err(|_| poisoned())? = entries.to_vec();
        Ok(())
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        self.history.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }}

// ============================================================================
// Encrypted file backend
// ============================================================================

/// On-disk proof file structure
#[derive(Serialize, Deserialize)]
struct ProofFile {
    /// File format version
    version: u32,

    /// Argon2 salt, present when the key was derived from a password
    #[serde(default)]
    salt: Option<String>,

    /// Sealed JSON array of proofs
    proofs: String,
}

/// Store backed by one encrypted file plus a history file next to it
pub struct FileStore {
    path: PathBuf,
    history_path: PathBuf,
    key: SealingKey,
    salt: Option<String>,
    sink: Arc<dyn DiagnosticSink>,
    /// Fingerprint of the set last loaded from or written to disk
    fingerprint: Mutex<Option<[u8; 32]>>,
}

impl FileStore {
    /// Open (or prepare to create) the store at `path`, deriving the key
    /// from `password` and the salt recorded in the file
    pub async fn open(path: impl Into<PathBuf>, password: &str) -> Result<Self, StoreError> {
        let path = path.into();

        let existing_salt = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<ProofFile>(&bytes)
                .ok()
                .and_then(|file| file.salt),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let salt = existing_salt.unwrap_or_else(generate_salt);

        let password = password.to_string();
        let derive_salt = salt.clone();
        let key = tokio::task::spawn_blocking(move || SealingKey::derive(&password, &derive_salt))
            .await
            .map_err(|e| SealError::KeyDerivation(e.to_string()))??;

        let mut store = Self::with_key(path, key);
        store.salt = Some(salt);
        Ok(store)
    }

    /// Use an already-derived key
    pub fn with_key(path: impl Into<PathBuf>, key: SealingKey) -> Self {
        let path = path.into();
        let history_path = path.with_extension("history.json");
        Self {
            path,
            history_path,
            key,
            salt: None,
            sink: default_sink(),
            fingerprint: Mutex::new(None),
        }
    }

    /// Route corruption warnings to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key protecting this store, for sealing related data (history)
    pub fn sealing_key(&self) -> &SealingKey {
        &self.key
    }

    /// Check if a store file exists
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    fn remember(&self, fingerprint: [u8; 32]) {
        if let Ok(mut guard) = self.fingerprint.lock() {
            *guard = Some(fingerprint);
        }
    }

    fn is_unchanged(&self, fingerprint: &[u8; 32]) -> bool {
        self.fingerprint
            .lock()
            .map(|guard| guard.as_ref() == Some(fingerprint))
            .unwrap_or(false)
    }

    /// Move an unreadable file aside so the next save cannot destroy it
    async fn quarantine(&self, path: &Path, reason: &str) {
        let backup = path.with_extension("corrupt");
        let moved = tokio::fs::rename(path, &backup).await.is_ok();
        let message = if moved {
            format!(
                "{}: {}; moved to {} and continuing with an empty set",
                path.display(),
                reason,
                backup.display()
            )
        } else {
            format!("{}: {}; continuing with an empty set", path.display(), reason)
        };
        self.sink.warn("file-store", &message);
    }
}

fn fingerprint(proofs: &[Proof]) -> Result<[u8; 32], StoreError> {
    let bytes = serde_json::to_vec(proofs)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Write `bytes` to `path` via a temp file and rename
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}

#[async_trait]
impl ProofStore for FileStore {
    async fn load(&self) -> Result<Vec<Proof>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remember(fingerprint(&[])?);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: ProofFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                self.quarantine(&self.path, &format!("unreadable proof file ({})", e))
                    .await;
                return Ok(Vec::new());
            }
        };

        if file.version != STORE_VERSION {
            return Err(StoreError::Version {
                found: file.version,
                expected: STORE_VERSION,
            });
        }

        let plaintext = match self.key.open(&file.proofs) {
            Ok(plaintext) => plaintext,
            Err(SealError::Malformed(reason)) => {
                self.quarantine(&self.path, &format!("malformed sealed proofs ({})", reason))
                    .await;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let proofs: Vec<Proof> = match serde_json::from_slice(&plaintext) {
            Ok(proofs) => proofs,
            Err(e) => {
                self.quarantine(&self.path, &format!("invalid proof list ({})", e))
                    .await;
                return Ok(Vec::new());
            }
        };

        let (proofs, dropped) = dedupe_by_secret(proofs);
        if dropped > 0 {
            self.sink.warn(
                "file-store",
                &format!("dropped {} stored proofs with duplicate secrets", dropped),
            );
        }

        self.remember(fingerprint(&proofs)?);
        debug!("Loaded {} proofs from {}", proofs.len(), self.path.display());
        Ok(proofs)
    }

    async fn save(&self, proofs: &[Proof]) -> Result<(), StoreError> {
        let print = fingerprint(proofs)?;
        if self.is_unchanged(&print) {
            return Ok(());
        }

        let plaintext = serde_json::to_vec(proofs)?;
        let file = ProofFile {
            version: STORE_VERSION,
            salt: self.salt.clone(),
            proofs: self.key.seal(&plaintext)?,
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.path, json.as_bytes()).await?;

        self.remember(print);
        debug!("Saved {} proofs to {}", proofs.len(), self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.remember(fingerprint(&[])?);
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<String>, StoreError> {
        let bytes = match tokio::fs::read(&self.history_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                self.quarantine(&self.history_path, &format!("unreadable history file ({})", e))
                    .await;
                Ok(Vec::new())
            }
        }
    }

    async fn save_history(&self, entries: &[String]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.history_path, json.as_bytes()).await?;
        Ok(())
    }

    async fn clear_history(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.history_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use tempfile::TempDir;

    fn proofs() -> Vec<Proof> {
        vec![
            Proof::new("00", 1, "secret-a", "02aa"),
            Proof::new("00", 4, "secret-b", "02bb"),
        ]
    }

    #[tokio::test]
    async fn test_memory_store_returns_independent_copy() {
        let store = MemoryStore::with_proofs(proofs());
        let mut loaded = store.load().await.unwrap();
        loaded.clear();

        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_save_load_clear() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&proofs()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), proofs());

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_key(dir.path().join("proofs.json"), SealingKey::generate());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");
        let key = SealingKey::generate();

        let store = FileStore::with_key(&path, key.clone());
        store.save(&proofs()).await.unwrap();

        let reopened = FileStore::with_key(&path, key);
        assert_eq!(reopened.load().await.unwrap(), proofs());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret-a"));
    }

    #[tokio::test]
    async fn test_file_store_resave_of_loaded_set_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");
        let key = SealingKey::generate();

        FileStore::with_key(&path, key.clone())
            .save(&proofs())
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let store = FileStore::with_key(&path, key);
        let loaded = store.load().await.unwrap();
        store.save(&loaded).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");
        std::fs::write(&path, "this is not json").unwrap();

        let sink = MemorySink::new();
        let store = FileStore::with_key(&path, SealingKey::generate())
            .with_sink(Arc::new(sink.clone()));

        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(sink.len(), 1);
        assert!(path.with_extension("corrupt").exists());
    }

    #[tokio::test]
    async fn test_file_store_wrong_key_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");

        FileStore::with_key(&path, SealingKey::generate())
            .save(&proofs())
            .await
            .unwrap();

        let store = FileStore::with_key(&path, SealingKey::generate());
        let result = store.load().await;
        assert!(matches!(result, Err(StoreError::Seal(SealError::Decrypt))));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_open_with_password() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");

        let store = FileStore::open(&path, "test-password-123").await.unwrap();
        store.save(&proofs()).await.unwrap();

        let reopened = FileStore::open(&path, "test-password-123").await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), proofs());

        let wrong = FileStore::open(&path, "wrong-password").await.unwrap();
        assert!(wrong.load().await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_history_roundtrip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_key(dir.path().join("proofs.json"), SealingKey::generate());

        assert!(store.load_history().await.unwrap().is_empty());
        store
            .save_history(&["a:b".to_string(), "c:d".to_string()])
            .await
            .unwrap();
        assert_eq!(store.load_history().await.unwrap().len(), 2);

        store.clear_history().await.unwrap();
        assert!(store.load_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proofs.json");
        let store = FileStore::with_key(&path, SealingKey::generate());

        store.save(&proofs()).await.unwrap();
        store.clear().await.unwrap();

        assert!(!path.exists());
        assert!(store.load().await.unwrap().is_empty());
    }
}
