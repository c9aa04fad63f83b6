use std::path::PathBuf;

use tokio::sync::OnceCell;

use crate::error::{Result, StorageError};

use super::ArticleRepository;

enum Location {
    File(PathBuf),
    Memory,
}

/// Process-wide store handle, opened on first use.
///
/// Concurrent first callers all await the same open; the database and its
/// indexes are created once. A failed open is not remembered, so the next
/// caller tries again.
pub struct SharedStore {
    location: Location,
    repository: OnceCell<ArticleRepository>,
}

impl SharedStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(db_path.into()),
            repository: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            repository: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&ArticleRepository> {
        self.repository
            .get_or_try_init(|| open_location(&self.location))
            .await
    }

    pub fn is_open(&self) -> bool {
        self.repository.initialized()
    }
}

async fn open_location(location: &Location) -> Result<ArticleRepository> {
    match location {
        Location::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(StorageError::from)?;
            }
            tracing::debug!("Opening article store at {}", path.display());
            ArticleRepository::open(path).await
        }
        Location::Memory => ArticleRepository::open_in_memory().await,
    }
}
