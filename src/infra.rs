//! Lazily provisioned shared handles: the database and the upload tree.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::audit::ActivityLogger;
use crate::auth::UserStore;
use crate::auth::password::DEFAULT_COST;
use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};

/// Upload subdirectory under the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Document,
}

impl UploadKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Document => "pdfs",
        }
    }
}

/// A file written under the storage root.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Generated file name (`{uuid-hex}.{ext}`)
    pub name: String,
    pub path: PathBuf,
}

/// Shared infrastructure, created on first use and reused by every request.
pub struct Infrastructure {
    db_config: DatabaseConfig,
    storage_path: PathBuf,
    bcrypt_cost: u32,
    db: OnceCell<Db>,
    storage: OnceCell<PathBuf>,
    connections_opened: AtomicUsize,
    storage_inits: AtomicUsize,
}

impl Infrastructure {
    pub fn new(db_config: DatabaseConfig, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            db_config,
            storage_path: storage_path.into(),
            bcrypt_cost: DEFAULT_COST,
            db: OnceCell::new(),
            storage: OnceCell::new(),
            connections_opened: AtomicUsize::new(0),
            storage_inits: AtomicUsize::new(0),
        }
    }

    /// Attach a database opened at startup instead of connecting lazily.
    pub fn with_database(mut self, db: Db) -> Self {
        self.db = OnceCell::new_with(Some(db));
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// The shared database handle, connecting and applying the schema once.
    pub async fn database(&self) -> Result<&Db> {
        self.db
            .get_or_try_init(|| async {
                info!(url = %self.db_config.url, "Connecting to database");
                let db = create_connection(self.db_config.clone()).await?;
                ensure_schema(&db).await?;
                self.connections_opened.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(db)
            })
            .await
    }

    pub async fn users(&self) -> Result<UserStore> {
        let db = self.database().await?;
        Ok(UserStore::new(db.clone()).with_bcrypt_cost(self.bcrypt_cost))
    }

    pub async fn activity_log(&self) -> Result<ActivityLogger> {
        let db = self.database().await?;
        Ok(ActivityLogger::new(db.clone()))
    }

    /// The resolved storage root with `images/` and `pdfs/` created.
    pub async fn storage_root(&self) -> Result<&Path> {
        let root = self
            .storage
            .get_or_try_init(|| async {
                let root = std::path::absolute(&self.storage_path)
                    .unwrap_or_else(|_| self.storage_path.clone());
                for kind in [UploadKind::Image, UploadKind::Document] {
                    let dir = root.join(kind.dir_name());
                    tokio::fs::create_dir_all(&dir)
                        .await
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                }
                self.storage_inits.fetch_add(1, Ordering::SeqCst);
                info!(root = %root.display(), "Storage ready");
                Ok::<_, anyhow::Error>(root)
            })
            .await?;

        Ok(root.as_path())
    }

    /// Write `bytes` under a fresh unique name.
    pub async fn save_upload(
        &self,
        kind: UploadKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StoredUpload> {
        let root = self.storage_root().await?;
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let stem = uuid::Uuid::new_v4().simple().to_string();
        let name = if extension.is_empty() {
            stem
        } else {
            format!("{}.{}", stem, extension)
        };
        let path = root.join(kind.dir_name()).join(&name);

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(file = %name, size = bytes.len(), "Stored upload");

        Ok(StoredUpload { name, path })
    }

    /// Number of database connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of times the storage tree was initialized.
    pub fn storage_inits(&self) -> usize {
        self.storage_inits.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_first_use_provisions_once() {
        let dir = tempfile::tempdir().unwrap();
        let infra = Arc::new(Infrastructure::new(
            DatabaseConfig::memory(),
            dir.path().join("store"),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let infra = infra.clone();
            handles.push(tokio::spawn(async move {
                infra.database().await.unwrap();
                infra.storage_root().await.unwrap().to_path_buf()
            }));
        }

        let mut roots = Vec::new();
        for handle in handles {
            roots.push(handle.await.unwrap());
        }

        assert_eq!(infra.connections_opened(), 1);
        assert_eq!(infra.storage_inits(), 1);
        assert!(roots.windows(2).all(|w| w[0] == w[1]));
        assert!(roots[0].join("images").is_dir());
        assert!(roots[0].join("pdfs").is_dir());
    }

    #[tokio::test]
    async fn test_preattached_database_skips_connect() {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        let infra = Infrastructure::new(DatabaseConfig::memory(), "unused").with_database(db);

        infra.database().await.unwrap();
        assert_eq!(infra.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_save_upload_generates_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let infra = Infrastructure::new(DatabaseConfig::memory(), dir.path());

        let first = infra
            .save_upload(UploadKind::Document, "PDF", b"%PDF-1.4")
            .await
            .unwrap();
        let second = infra
            .save_upload(UploadKind::Document, ".pdf", b"%PDF-1.4")
            .await
            .unwrap();

        assert_ne!(first.name, second.name);
        assert!(first.name.ends_with(".pdf"));
        assert_eq!(first.name.len(), 32 + 4);
        assert!(first.path.starts_with(dir.path().join("pdfs")));
        assert_eq!(tokio::fs::read(&second.path).await.unwrap(), b"%PDF-1.4");
    }
}
