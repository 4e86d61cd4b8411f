//! Content-addressed LFS object store.
//!
//! Objects live at `<data>/lfs/<repo_id>/objects/<oid[0:2]>/<oid[2:4]>/<oid>`.
//! Writes stream into `<repo_id>/tmp/upload-<uuid>` while a SHA-256 digest is
//! computed, and only a byte-for-byte verified object is renamed into place.
//! Concurrent writers of the same OID are safe: content addressing makes the
//! rename race a no-op.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

const WRITE_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum LfsStorageError {
    #[error("object not found")]
    NotFound,
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: i64, actual: i64 },
    #[error("content hash does not match OID: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("invalid OID format")]
    InvalidOid,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LfsStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

pub struct LfsStorage {
    base_path: PathBuf,
}

impl LfsStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("lfs"),
        }
    }

    fn object_path(&self, repo_id: &str, oid: &str) -> PathBuf {
        self.base_path
            .join(repo_id)
            .join("objects")
            .join(&oid[0..2])
            .join(&oid[2..4])
            .join(oid)
    }

    fn temp_path(&self, repo_id: &str) -> PathBuf {
        self.base_path
            .join(repo_id)
            .join("tmp")
            .join(format!("upload-{}", Uuid::new_v4()))
    }

    pub async fn exists(&self, repo_id: &str, oid: &str) -> Result<bool, LfsStorageError> {
        validate_oid(oid)?;
        Ok(self.object_path(repo_id, oid).exists())
    }

    pub async fn size(&self, repo_id: &str, oid: &str) -> Result<i64, LfsStorageError> {
        validate_oid(oid)?;
        let metadata = fs::metadata(self.object_path(repo_id, oid))
            .await
            .map_err(LfsStorageError::from_io)?;
        Ok(metadata.len() as i64)
    }

    pub async fn get(
        &self,
        repo_id: &str,
        oid: &str,
    ) -> Result<(BufReader<File>, i64), LfsStorageError> {
        validate_oid(oid)?;
        let file = File::open(self.object_path(repo_id, oid))
            .await
            .map_err(LfsStorageError::from_io)?;

        let size = file.metadata().await?.len() as i64;
        Ok((BufReader::new(file), size))
    }

    /// Streams `reader` to disk, verifying size and SHA-256 along the way.
    /// Nothing is visible until the verified object is renamed into place;
    /// on any failure the temp file is removed.
    pub async fn put<R: AsyncRead + Unpin>(
        &self,
        repo_id: &str,
        oid: &str,
        mut reader: R,
        expected_size: i64,
    ) -> Result<(), LfsStorageError> {
        validate_oid(oid)?;

        let temp_path = self.temp_path(repo_id);
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let result = self
            .write_verified(&temp_path, oid, &mut reader, expected_size)
            .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let final_path = self.object_path(repo_id, oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    async fn write_verified<R: AsyncRead + Unpin>(
        &self,
        temp_path: &Path,
        oid: &str,
        reader: &mut R,
        expected_size: i64,
    ) -> Result<(), LfsStorageError> {
        let mut file = File::create(temp_path).await?;
        let mut hasher = Sha256::new();
        let mut written: i64 = 0;
        let mut buf = vec![0u8; WRITE_BUF_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            written += n as i64;

            if written > expected_size {
                return Err(LfsStorageError::SizeMismatch {
                    expected: expected_size,
                    actual: written,
                });
            }
        }

        file.sync_all().await?;
        drop(file);

        if written != expected_size {
            return Err(LfsStorageError::SizeMismatch {
                expected: expected_size,
                actual: written,
            });
        }

        let actual = hex::encode(hasher.finalize());
        if actual != oid {
            return Err(LfsStorageError::HashMismatch {
                expected: oid.to_string(),
                actual,
            });
        }

        Ok(())
    }

    pub async fn delete(&self, repo_id: &str, oid: &str) -> Result<bool, LfsStorageError> {
        validate_oid(oid)?;

        match fs::remove_file(self.object_path(repo_id, oid)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LfsStorageError::Io(e)),
        }
    }
}

fn validate_oid(oid: &str) -> Result<(), LfsStorageError> {
    let valid = oid.len() == 64
        && oid
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if valid {
        Ok(())
    } else {
        Err(LfsStorageError::InvalidOid)
    }
}

/// `^[a-f0-9]{64}$`
#[must_use]
pub fn is_valid_oid(oid: &str) -> bool {
    validate_oid(oid).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    // sha256("123")
    const OID_123: &str = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let temp = TempDir::new().unwrap();
        let storage = LfsStorage::new(temp.path());

        storage.put("repo", OID_123, &b"123"[..], 3).await.unwrap();

        assert!(storage.exists("repo", OID_123).await.unwrap());
        assert_eq!(storage.size("repo", OID_123).await.unwrap(), 3);

        let (mut reader, size) = storage.get("repo", OID_123).await.unwrap();
        assert_eq!(size, 3);
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"123");
    }

    #[tokio::test]
    async fn hash_mismatch_leaves_no_object() {
        let temp = TempDir::new().unwrap();
        let storage = LfsStorage::new(temp.path());

        let wrong_oid = "0".repeat(64);
        let result = storage.put("repo", &wrong_oid, &b"123"[..], 3).await;
        assert!(matches!(result, Err(LfsStorageError::HashMismatch { .. })));

        assert!(!storage.exists("repo", &wrong_oid).await.unwrap());
        // The in-flight temp file is gone too.
        let tmp_dir = temp.path().join("lfs").join("repo").join("tmp");
        let leftovers = std::fs::read_dir(&tmp_dir)
            .map(|d| d.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn size_mismatch_is_distinct_from_hash_mismatch() {
        let temp = TempDir::new().unwrap();
        let storage = LfsStorage::new(temp.path());

        let result = storage.put("repo", OID_123, &b"123"[..], 2).await;
        assert!(matches!(result, Err(LfsStorageError::SizeMismatch { .. })));

        let result = storage.put("repo", OID_123, &b"12"[..], 3).await;
        assert!(matches!(result, Err(LfsStorageError::SizeMismatch { .. })));
    }

    #[tokio::test]
    async fn missing_object_reports_not_found() {
        let temp = TempDir::new().unwrap();
        let storage = LfsStorage::new(temp.path());

        assert!(!storage.exists("repo", OID_123).await.unwrap());
        assert!(matches!(
            storage.get("repo", OID_123).await,
            Err(LfsStorageError::NotFound)
        ));
        assert!(matches!(
            storage.size("repo", OID_123).await,
            Err(LfsStorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let temp = TempDir::new().unwrap();
        let storage = LfsStorage::new(temp.path());

        storage.put("repo", OID_123, &b"123"[..], 3).await.unwrap();
        assert!(storage.delete("repo", OID_123).await.unwrap());
        assert!(!storage.exists("repo", OID_123).await.unwrap());
        assert!(!storage.delete("repo", OID_123).await.unwrap());
    }

    #[test]
    fn oid_validation() {
        assert!(is_valid_oid(OID_123));
        assert!(!is_valid_oid("short"));
        assert!(!is_valid_oid(&OID_123.to_uppercase()));
        assert!(!is_valid_oid(&format!("g{}", &OID_123[1..])));
    }
}
