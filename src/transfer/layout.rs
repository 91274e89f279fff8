use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Category of a per-sector object. Each category is a flat directory under
/// the storage root and a path segment on the coordinator's object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectorCategory {
    Staged,
    Sealed,
    Cache,
}

impl SectorCategory {
    pub const ALL: [SectorCategory; 3] = [
        SectorCategory::Cache,
        SectorCategory::Sealed,
        SectorCategory::Staged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectorCategory::Staged => "staged",
            SectorCategory::Sealed => "sealed",
            SectorCategory::Cache => "cache",
        }
    }
}

impl fmt::Display for SectorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local staging layout: `{root}/{category}/{sector_name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, category: SectorCategory) -> PathBuf {
        self.root.join(category.as_str())
    }

    pub fn object_path(&self, category: SectorCategory, sector_name: &str) -> PathBuf {
        self.dir(category).join(sector_name)
    }

    /// Creates the three category directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for category in SectorCategory::ALL {
            let dir = self.dir(category);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {} directory", dir.display()))?;
        }
        Ok(())
    }
}

/// Object name on the coordinator, relative to its endpoint.
pub fn remote_object_path(category: SectorCategory, sector_name: &str) -> String {
    format!("remote/{}/{}", category.as_str(), sector_name)
}
