//! Artifact files and persistent tables for the roster cleanser.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

mod postgres;
mod sink;

pub use postgres::{PgRecordStore, PgStoreConfig};
pub use sink::{MemoryRecordStore, RecordSink, StoreError, StoreRow, Table};

pub const CRATE_NAME: &str = "roster-storage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub file_name: String,
    pub absolute_path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

/// Output directory for per-run artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn clean_artifact_name(run_token: &str) -> String {
        format!("data_{run_token}.json")
    }

    pub fn rejected_artifact_name(run_token: &str) -> String {
        format!("data_reject_{run_token}.csv")
    }

    /// Writes `bytes` under `file_name` via a temp file and rename.
    ///
    /// An existing artifact of the same name is replaced.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<StoredArtifact> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            bail!("artifact name {file_name:?} must be a plain file name");
        }

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating artifact directory {}", self.root.display()))?;

        let absolute_path = self.root.join(file_name);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing temp artifact file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp artifact {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        let stored = StoredArtifact {
            file_name: file_name.to_string(),
            absolute_path,
            content_hash: Self::sha256_hex(bytes),
            byte_size: bytes.len(),
        };
        info!(
            path = %stored.absolute_path.display(),
            bytes = stored.byte_size,
            sha256 = %stored.content_hash,
            "wrote artifact"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn artifact_hashing_is_stable() {
        let hash = ArtifactStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn artifact_names_follow_run_token() {
        assert_eq!(
            ArtifactStore::clean_artifact_name("20250614070000"),
            "data_20250614070000.json"
        );
        assert_eq!(
            ArtifactStore::rejected_artifact_name("20250614070000"),
            "data_reject_20250614070000.csv"
        );
    }

    #[tokio::test]
    async fn rewrite_with_same_name_replaces_content() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("target"));

        let first = store.write("data_1.json", b"{\"v\":1}").await.expect("first");
        let second = store.write("data_1.json", b"{\"v\":2}").await.expect("second");

        assert_eq!(first.absolute_path, second.absolute_path);
        assert_ne!(first.content_hash, second.content_hash);
        let on_disk = std::fs::read(&second.absolute_path).expect("read back");
        assert_eq!(on_disk, b"{\"v\":2}");

        let leftovers = std::fs::read_dir(store.root())
            .expect("list")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn names_with_separators_are_refused() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        assert!(store.write("../escape.json", b"{}").await.is_err());
        assert!(store.write("", b"{}").await.is_err());
    }
}
