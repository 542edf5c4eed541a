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


//! Cached Certificate Revocation List
//!
//! A single entry: the PEM text last downloaded and when it was fetched.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

/// CRL as last downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCrl {
    /// PEM-wrapped revocation list
    pub pem: String,
    pub fetched_at: DateTime<Utc>,
}

impl CachedCrl {
    pub fn new(pem: String, fetched_at: DateTime<Utc>) -> Self {
        Self { pem, fetched_at }
    }

    /// Check whether the entry is younger than `max_age` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < max_age
    }
}

/// Storage of the cached CRL
#[async_trait]
pub trait CrlStore: Send + Sync {
    async fn load(&self) -> Result<Option<CachedCrl>>;

    /// Replace the cached entry
    async fn save(&self, crl: &CachedCrl) -> Result<()>;
}

/// SQLite implementation of [`CrlStore`]
#[derive(Debug, Clone)]
pub struct SqliteCrlStore {
    pool: SqlitePool,
}

impl SqliteCrlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrlStore for SqliteCrlStore {
    async fn load(&self) -> Result<Option<CachedCrl>> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT pem, fetched_at FROM CrlCache WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(pem, fetched_at)| CachedCrl { pem, fetched_at }))
    }

    async fn save(&self, crl: &CachedCrl) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO CrlCache (id, pem, fetched_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                pem = excluded.pem,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&crl.pem)
        .bind(crl.fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
