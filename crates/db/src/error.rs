use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Registry value at {key} is a {found}, expected a {expected}")]
    ValueType {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("Corrupt registry value at {key}: {reason}")]
    CorruptValue { key: String, reason: String },
}
