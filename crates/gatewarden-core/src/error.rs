use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported setting key: {0}")]
    UnknownSetting(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
