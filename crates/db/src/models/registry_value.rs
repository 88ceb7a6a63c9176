use chrono::{DateTime, SecondsFormat, Utc};
use modup_core::{RegistryKey, RegistryValue, Version};

use crate::error::DbError;

const TYPE_VERSION: &str = "version";
const TYPE_TIMESTAMP: &str = "timestamp";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegistryValueRow {
    pub namespace: String,
    pub path: String,
    pub property: String,
    pub value_type: String,
    pub value: String,
    pub updated_at: i64,
}

impl RegistryValueRow {
    pub fn new(key: &RegistryKey, value: &RegistryValue) -> Self {
        let (value_type, value) = match value {
            RegistryValue::Version(version) => (TYPE_VERSION, version.to_string()),
            RegistryValue::Timestamp(ts) => (
                TYPE_TIMESTAMP,
                ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        };

        Self {
            namespace: key.namespace.clone(),
            path: key.path_string(),
            property: key.property.clone(),
            value_type: value_type.to_string(),
            value,
            updated_at: Utc::now().timestamp(),
        }
    }

    pub fn key(&self) -> RegistryKey {
        let path: Vec<&str> = if self.path.is_empty() {
            Vec::new()
        } else {
            self.path.split('/').collect()
        };
        RegistryKey::new(self.namespace.as_str(), path, self.property.as_str())
    }

    pub fn value(&self) -> Result<RegistryValue, DbError> {
        match self.value_type.as_str() {
            TYPE_VERSION => Version::parse(&self.value)
                .map(RegistryValue::Version)
                .map_err(|e| self.corrupt(e.to_string())),
            TYPE_TIMESTAMP => DateTime::parse_from_rfc3339(&self.value)
                .map(|ts| RegistryValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| self.corrupt(e.to_string())),
            other => Err(self.corrupt(format!("unknown value type '{other}'"))),
        }
    }

    pub fn into_domain(self) -> Result<(RegistryKey, RegistryValue), DbError> {
        let value = self.value()?;
        Ok((self.key(), value))
    }

    fn corrupt(&self, reason: String) -> DbError {
        DbError::CorruptValue {
            key: self.key().to_string(),
            reason,
        }
    }
}
