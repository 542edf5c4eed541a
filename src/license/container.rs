// LCP Core - Licensed Content Protection engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! License containers
//!
//! A container is wherever the License Document bytes live: a standalone
//! `.lcpl` file, or an entry of a ZIP-based publication. Only the standalone
//! file is handled here; hosts implement [`LicenseContainer`] for their
//! packaged formats.

use crate::error::{LcpError, Result};
use crate::license::document::LicenseDocument;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Storage medium of a License Document
#[async_trait]
pub trait LicenseContainer: Send + Sync {
    /// Read the License Document bytes
    ///
    /// # Errors
    /// Implementations report failures as `LcpError::Container`
    async fn read(&self) -> Result<Vec<u8>>;

    /// Replace the stored License Document with `license`, as downloaded
    async fn write(&self, license: &LicenseDocument) -> Result<()>;
}

/// Standalone License Document file (`.lcpl`)
#[derive(Debug, Clone)]
pub struct FileLicenseContainer {
    path: PathBuf,
}

impl FileLicenseContainer {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LicenseContainer for FileLicenseContainer {
    async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            LcpError::container(format!("Failed to read {}: {}", self.path.display(), e))
        })
    }

    async fn write(&self, license: &LicenseDocument) -> Result<()> {
        // Write beside the target then rename, so a crash never leaves half a license
        let temp_path = self.path.with_extension("lcpl.tmp");
        tokio::fs::write(&temp_path, license.json().as_bytes())
            .await
            .map_err(|e| {
                LcpError::container(format!("Failed to write {}: {}", temp_path.display(), e))
            })?;

        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            LcpError::container(format!("Failed to replace {}: {}", self.path.display(), e))
        })
    }
}
