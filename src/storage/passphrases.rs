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


//! Passphrase repository
//!
//! Stores the hash of every passphrase that successfully unlocked a license,
//! keyed by license id and indexed by user id so a passphrase accepted for
//! one license of a user is tried first on that user's other licenses.

use crate::error::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Storage of accepted passphrase hashes
#[async_trait]
pub trait PassphraseRepository: Send + Sync {
    /// Hash stored for a license
    async fn passphrase(&self, license_id: &str) -> Result<Option<String>>;

    /// Every hash stored for licenses of a user, most recent first
    async fn passphrases(&self, user_id: &str) -> Result<Vec<String>>;

    /// Store the hash that unlocked a license, replacing any previous one
    async fn add_passphrase(
        &self,
        hash: &str,
        license_id: &str,
        provider: &str,
        user_id: Option<&str>,
    ) -> Result<()>;
}

/// SQLite implementation of [`PassphraseRepository`]
#[derive(Debug, Clone)]
pub struct SqlitePassphraseRepository {
    pool: SqlitePool,
}

impl SqlitePassphraseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassphraseRepository for SqlitePassphraseRepository {
    async fn passphrase(&self, license_id: &str) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar("SELECT passphrase FROM Passphrases WHERE license_id = ?")
            .bind(license_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(hash)
    }

    async fn passphrases(&self, user_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT passphrase
            FROM Passphrases
            WHERE user_id = ?
            GROUP BY passphrase
            ORDER BY MAX(updated_at) DESC, MAX(rowid) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    async fn add_passphrase(
        &self,
        hash: &str,
        license_id: &str,
        provider: &str,
        user_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Passphrases (license_id, passphrase, provider, user_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(license_id) DO UPDATE SET
                passphrase = excluded.passphrase,
                provider = excluded.provider,
                user_id = excluded.user_id,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(license_id)
        .bind(hash)
        .bind(provider)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
