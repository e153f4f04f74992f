use echo_feed::FeedError;
use echo_types::FeedKey;

/// Errors produced by the ordering layer and pipeline plumbing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// Write attempted before a writable feed was attached.
    #[error("pipeline has no writable feed")]
    NoWritableFeed,

    #[error("pipeline writable feed already set")]
    WriterAlreadySet,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("timeframe clock closed")]
    ClockClosed,
}

/// Convenience alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Per-message failures raised while folding into a state machine.
///
/// These never stop the ordering engine: the offending message is skipped
/// and its offset still advances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    #[error("message decode failed: {0}")]
    Decode(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("feed {feed} is not authorized")]
    Unauthorized { feed: FeedKey },

    #[error("message rejected: {0}")]
    Rejected(String),
}

impl From<PipelineError> for StateMachineError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(reason) => Self::Decode(reason),
            other => Self::Rejected(other.to_string()),
        }
    }
}
