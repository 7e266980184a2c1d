use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NvdMirrorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not a valid date: {0}")]
    InvalidTimeFormat(String),

    #[error("mirror has no records to derive a start time from; run `nvd-mirror init` first")]
    EmptyMirror,

    #[error("invalid sync window: {0}")]
    InvalidWindow(String),

    #[error("non-retryable API failure for window {window} at offset {offset}: {detail}")]
    FetchProtocol {
        window: String,
        offset: u64,
        detail: String,
    },

    #[error(
        "retries exhausted after {attempts} attempts for window {window} at offset {offset}: {detail}"
    )]
    FetchExhausted {
        window: String,
        offset: u64,
        attempts: u32,
        detail: String,
    },

    #[error("mirror at {0} already contains records; pass --force to re-download")]
    MirrorNotEmpty(Utf8PathBuf),

    #[error("mirror write failed for {path}: {source}")]
    MirrorWrite {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NvdMirrorError>;
