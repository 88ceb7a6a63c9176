use chrono::{DateTime, Utc};
use modup_core::{RegistryKey, RegistryValue, Version};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::DbError;
use crate::models::RegistryValueRow;

/// Pool-level access to the registry.
///
/// Reads and writes issued here autocommit. Work that must be atomic goes
/// through [`RegistryRepository::begin`].
#[derive(Clone)]
pub struct RegistryRepository {
    pool: SqlitePool,
}

impl RegistryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open an isolated unit of work.
    pub async fn begin(&self) -> Result<RegistryTransaction, DbError> {
        let tx = self.pool.begin().await?;
        Ok(RegistryTransaction { tx })
    }

    pub async fn get_value(&self, key: &RegistryKey) -> Result<Option<RegistryValue>, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch_value(&mut conn, key).await
    }

    pub async fn set_value(&self, key: &RegistryKey, value: &RegistryValue) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        store_value(&mut conn, key, value).await
    }

    pub async fn get_version(&self, key: &RegistryKey) -> Result<Option<Version>, DbError> {
        let value = self.get_value(key).await?;
        expect_version(key, value)
    }

    pub async fn get_timestamp(&self, key: &RegistryKey) -> Result<Option<DateTime<Utc>>, DbError> {
        let value = self.get_value(key).await?;
        expect_timestamp(key, value)
    }

    /// All values in `namespace` whose path equals or lies below `path_prefix`.
    pub async fn list_values(
        &self,
        namespace: &str,
        path_prefix: &[&str],
    ) -> Result<Vec<(RegistryKey, RegistryValue)>, DbError> {
        let prefix = path_prefix.join("/");
        let rows: Vec<RegistryValueRow> = sqlx::query_as(
            r#"
            SELECT namespace, path, property, value_type, value, updated_at
            FROM registry_values
            WHERE namespace = ?
              AND (? = '' OR path = ? OR substr(path, 1, length(?) + 1) = ? || '/')
            ORDER BY path, property
            "#,
        )
        .bind(namespace)
        .bind(&prefix)
        .bind(&prefix)
        .bind(&prefix)
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RegistryValueRow::into_domain).collect()
    }
}

/// An open registry transaction.
///
/// Dropping it without calling [`commit`](Self::commit) rolls back every write.
pub struct RegistryTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl RegistryTransaction {
    pub async fn get_value(&mut self, key: &RegistryKey) -> Result<Option<RegistryValue>, DbError> {
        fetch_value(&mut self.tx, key).await
    }

    pub async fn set_value(
        &mut self,
        key: &RegistryKey,
        value: &RegistryValue,
    ) -> Result<(), DbError> {
        store_value(&mut self.tx, key, value).await
    }

    pub async fn get_version(&mut self, key: &RegistryKey) -> Result<Option<Version>, DbError> {
        let value = self.get_value(key).await?;
        expect_version(key, value)
    }

    pub async fn get_timestamp(
        &mut self,
        key: &RegistryKey,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let value = self.get_value(key).await?;
        expect_timestamp(key, value)
    }

    /// The underlying connection, for callers that need to run their own
    /// statements inside this unit of work.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_value(
    conn: &mut SqliteConnection,
    key: &RegistryKey,
) -> Result<Option<RegistryValue>, DbError> {
    let row: Option<RegistryValueRow> = sqlx::query_as(
        r#"
        SELECT namespace, path, property, value_type, value, updated_at
        FROM registry_values
        WHERE namespace = ? AND path = ? AND property = ?
        "#,
    )
    .bind(&key.namespace)
    .bind(key.path_string())
    .bind(&key.property)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| r.value()).transpose()
}

async fn store_value(
    conn: &mut SqliteConnection,
    key: &RegistryKey,
    value: &RegistryValue,
) -> Result<(), DbError> {
    let row = RegistryValueRow::new(key, value);

    sqlx::query(
        r#"
        INSERT INTO registry_values (namespace, path, property, value_type, value, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(namespace, path, property) DO UPDATE SET
            value_type = excluded.value_type,
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&row.namespace)
    .bind(&row.path)
    .bind(&row.property)
    .bind(&row.value_type)
    .bind(&row.value)
    .bind(row.updated_at)
    .execute(&mut *conn)
    .await?;

    debug!(key = %key, value = %value, "Registry value stored");

    Ok(())
}

fn expect_version(
    key: &RegistryKey,
    value: Option<RegistryValue>,
) -> Result<Option<Version>, DbError> {
    match value {
        None => Ok(None),
        Some(RegistryValue::Version(version)) => Ok(Some(version)),
        Some(other) => Err(DbError::ValueType {
            key: key.to_string(),
            expected: "version",
            found: other.type_name().to_string(),
        }),
    }
}

fn expect_timestamp(
    key: &RegistryKey,
    value: Option<RegistryValue>,
) -> Result<Option<DateTime<Utc>>, DbError> {
    match value {
        None => Ok(None),
        Some(RegistryValue::Timestamp(ts)) => Ok(Some(ts)),
        Some(other) => Err(DbError::ValueType {
            key: key.to_string(),
            expected: "timestamp",
            found: other.type_name().to_string(),
        }),
    }
}
