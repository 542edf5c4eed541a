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


//! License repository
//!
//! Local metadata kept per license id:
//! - whether this device registered the license with the status server
//! - the copy and print budgets left to the user
//!
//! Budgets are initialized once from the license rights; `NULL` means the
//! right is unrestricted.

use crate::error::Result;
use crate::license::document::LicenseDocument;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Copy and print budgets left for a license
///
/// `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserRights {
    /// Characters that may still be copied
    pub copies_left: Option<u32>,
    /// Pages that may still be printed
    pub prints_left: Option<u32>,
}

/// Storage of per-license local metadata
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// Record a license, initializing its budgets from `rights` the first time
    async fn add_license(&self, license: &LicenseDocument) -> Result<()>;

    /// Check whether this device already registered the license
    async fn is_device_registered(&self, license_id: &str) -> Result<bool>;

    /// Remember that this device registered the license
    async fn register_device(&self, license_id: &str) -> Result<()>;

    /// Budgets left, `None` if the license was never added
    async fn user_rights(&self, license_id: &str) -> Result<Option<UserRights>>;

    /// Overwrite the budgets left
    async fn update_user_rights(&self, license_id: &str, rights: UserRights) -> Result<()>;
}

/// SQLite implementation of [`LicenseRepository`]
#[derive(Debug, Clone)]
pub struct SqliteLicenseRepository {
    pool: SqlitePool,
}

impl SqliteLicenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseRepository for SqliteLicenseRepository {
    async fn add_license(&self, license: &LicenseDocument) -> Result<()> {
        // A row may already exist from device registration, budgets are set once
        sqlx::query(
            r#"
            INSERT INTO Licenses (license_id, rights_initialized, copies_left, prints_left)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(license_id) DO UPDATE SET
                rights_initialized = 1,
                copies_left = excluded.copies_left,
                prints_left = excluded.prints_left,
                updated_at = CURRENT_TIMESTAMP
            WHERE Licenses.rights_initialized = 0
            "#,
        )
        .bind(&license.id)
        .bind(license.rights.copy.map(i64::from))
        .bind(license.rights.print.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_device_registered(&self, license_id: &str) -> Result<bool> {
        let registered: Option<bool> =
            sqlx::query_scalar("SELECT registered FROM Licenses WHERE license_id = ?")
                .bind(license_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(registered.unwrap_or(false))
    }

    async fn register_device(&self, license_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Licenses (license_id, registered)
            VALUES (?, 1)
            ON CONFLICT(license_id) DO UPDATE SET
                registered = 1,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(license_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_rights(&self, license_id: &str) -> Result<Option<UserRights>> {
        let row: Option<(Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT copies_left, prints_left
            FROM Licenses
            WHERE license_id = ? AND rights_initialized = 1
            "#,
        )
        .bind(license_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(copies_left, prints_left)| UserRights {
            copies_left: copies_left.map(clamp_budget),
            prints_left: prints_left.map(clamp_budget),
        }))
    }

    async fn update_user_rights(&self, license_id: &str, rights: UserRights) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Licenses (license_id, rights_initialized, copies_left, prints_left)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(license_id) DO UPDATE SET
                rights_initialized = 1,
                copies_left = excluded.copies_left,
                prints_left = excluded.prints_left,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(license_id)
        .bind(rights.copies_left.map(i64::from))
        .bind(rights.prints_left.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn clamp_budget(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
