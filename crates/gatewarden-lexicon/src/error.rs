use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid word file: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] gatewarden_store::StoreError),
}

pub type Result<T> = std::result::Result<T, LexiconError>;
