use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Durable client-side credential vault. Holds at most one row: the bearer
/// token for the active account plus the cached profile blob.
#[derive(Clone)]
pub struct Vault {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub auth_token: String,
    pub profile_json: String,
    pub updated_at: DateTime<Utc>,
}

impl Vault {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_credentials(&self, auth_token: &str, profile_json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO credentials (slot, auth_token, profile_json, updated_at) VALUES (0, ?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET auth_token = excluded.auth_token, profile_json = excluded.profile_json, updated_at = excluded.updated_at",
        )
        .bind(auth_token)
        .bind(profile_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to save credentials")?;
        Ok(())
    }

    pub async fn load_credentials(&self) -> Result<Option<StoredCredentials>> {
        let row = sqlx::query(
            "SELECT auth_token, profile_json, updated_at FROM credentials WHERE slot = 0",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to load credentials")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(StoredCredentials {
            auth_token: row.try_get("auth_token")?,
            profile_json: row.try_get("profile_json")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    /// Rewrites only the cached profile blob. Returns the number of rows
    /// touched; zero means no credentials were stored.
    pub async fn update_profile_json(&self, profile_json: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE credentials SET profile_json = ?, updated_at = ? WHERE slot = 0",
        )
        .bind(profile_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to update cached profile")?;
        Ok(result.rows_affected())
    }

    pub async fn clear_credentials(&self) -> Result<()> {
        sqlx::query("DELETE FROM credentials")
            .execute(&self.pool)
            .await
            .context("failed to clear credentials")?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
