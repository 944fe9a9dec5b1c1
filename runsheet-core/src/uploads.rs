use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{RunsheetError, RunsheetResult};

/// URL prefix the upload directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Disk storage for step images and remark attachments.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> RunsheetResult<()> {
        if !self.dir.exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!(dir = %self.dir.display(), "Created upload directory");
        }
        Ok(())
    }

    /// Writes `bytes` under a timestamped name derived from `original_name`
    /// and returns the public URL.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> RunsheetResult<String> {
        self.ensure_dir().await?;

        let file_name = stored_file_name(original_name, Utc::now().timestamp_millis());
        let path = self.dir.join(&file_name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RunsheetError::IoError(format!("{}: {}", path.display(), e)))?;

        debug!(file = %file_name, bytes = bytes.len(), "Stored upload");
        Ok(format!("{}/{}", UPLOADS_ROUTE, file_name))
    }
}

/// `report.final.png` at `millis` becomes `report.final-<millis>.png`;
/// directory components are dropped and a name without an extension gets
/// none.
pub fn stored_file_name(original_name: &str, millis: i64) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let path = Path::new(base);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, millis, ext),
        None => format!("{}-{}", stem, millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name_keeps_extension() {
        assert_eq!(
            stored_file_name("screenshot.png", 1700000000123),
            "screenshot-1700000000123.png"
        );
        assert_eq!(
            stored_file_name("backup.tar.gz", 42),
            "backup.tar-42.gz"
        );
    }

    #[test]
    fn test_stored_file_name_without_extension() {
        assert_eq!(stored_file_name("README", 7), "README-7");
        assert_eq!(stored_file_name(".env", 7), ".env-7");
    }

    #[test]
    fn test_stored_file_name_strips_directories() {
        assert_eq!(stored_file_name("../../etc/passwd", 1), "passwd-1");
        assert_eq!(stored_file_name("C:\\temp\\shot.jpg", 1), "shot-1.jpg");
        assert_eq!(stored_file_name("", 1), "upload-1");
    }

    #[tokio::test]
    async fn test_store_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));

        let url = store.store("diagram.png", b"\x89PNG").await.unwrap();

        assert!(url.starts_with("/uploads/diagram-"));
        assert!(url.ends_with(".png"));
        let name = url.trim_start_matches("/uploads/");
        let written = std::fs::read(store.dir().join(name)).unwrap();
        assert_eq!(written, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_store_write_failure_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("uploads");
        std::fs::write(&not_a_dir, b"occupied").unwrap();
        let store = UploadStore::new(&not_a_dir);

        let err = store.store("diagram.png", b"\x89PNG").await.unwrap_err();

        assert!(matches!(err, RunsheetError::IoError(_)), "got {:?}", err);
    }
}
