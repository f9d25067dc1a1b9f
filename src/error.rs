use thiserror::Error;

pub type Result<T> = std::result::Result<T, PapercutError>;

#[derive(Debug, Error)]
pub enum PapercutError {
    /// A caller broke the contract of a pipeline stage (zero-sized grids, unordered
    /// thresholds, and so on). These are programming errors, not runtime conditions.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to decode image {key:?}: {source}")]
    Decode {
        key: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to start image loader threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub(crate) fn invalid(msg: impl Into<String>) -> PapercutError {
    PapercutError::InvalidArgument(msg.into())
}
