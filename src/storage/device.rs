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


//! Device identity
//!
//! The license server identifies a reading device by a random UUID generated
//! on first use and kept for the lifetime of the installation.

use crate::error::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

const DEVICE_ID_KEY: &str = "device_id";

/// Storage of the installation's device identifier
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Persistent device identifier, generated on first call
    async fn device_id(&self) -> Result<String>;
}

/// SQLite implementation of [`DeviceRepository`]
#[derive(Debug, Clone)]
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for SqliteDeviceRepository {
    async fn device_id(&self) -> Result<String> {
        // First writer wins, concurrent callers all read the same value back
        sqlx::query("INSERT OR IGNORE INTO Settings (key, value) VALUES (?, ?)")
            .bind(DEVICE_ID_KEY)
            .bind(Uuid::new_v4().to_string())
            .execute(&self.pool)
            .await?;

        let id: String = sqlx::query_scalar("SELECT value FROM Settings WHERE key = ?")
            .bind(DEVICE_ID_KEY)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }
}
