use shadowsan_core::FlagError;
use shadowsan_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("flags: {0}")]
    Flags(#[from] FlagError),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("unknown shadow magic `{0}`")]
    UnknownMagic(String),
    #[error("invalid hex shadow `{0}`")]
    InvalidHex(String),
}
