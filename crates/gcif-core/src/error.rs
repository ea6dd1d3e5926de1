use thiserror::Error;

pub type Result<T> = std::result::Result<T, GcifError>;

#[derive(Debug, Error)]
pub enum GcifError {
    #[error("corrupt bitstream: {0}")]
    Corrupt(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn corrupt<T>(msg: impl Into<String>) -> Result<T> {
    Err(GcifError::Corrupt(msg.into()))
}
