use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version range: {min} is greater than {max}")]
    InvalidVersionRange { min: String, max: String },
}
