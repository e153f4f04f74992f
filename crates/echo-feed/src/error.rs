use echo_types::FeedKey;

/// Errors produced by feed operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The feed is held without its write capability.
    #[error("feed {key} is not writable")]
    NotWritable { key: FeedKey },

    /// A writer for the feed is already live.
    #[error("feed {key} already has an active writer")]
    WriterInUse { key: FeedKey },

    /// Read past the end of a feed.
    #[error("offset {offset} out of range for feed {key} (length {length})")]
    OutOfRange {
        key: FeedKey,
        offset: u64,
        length: u64,
    },

    /// Replicated message would leave a gap or rewrite history.
    #[error("out of order ingest on feed {key}: expected offset {expected}, got {actual}")]
    OutOfOrder {
        key: FeedKey,
        expected: u64,
        actual: u64,
    },

    /// The feed is written locally and cannot be replicated into.
    #[error("feed {0} is written locally")]
    LocalFeed(FeedKey),

    #[error("feed {0} not found")]
    UnknownFeed(FeedKey),

    #[error("feed {0} already exists")]
    AlreadyExists(FeedKey),

    /// A feed set may hold at most one locally written feed.
    #[error("feed set already has local writable feed {existing}; refusing {attempted}")]
    WriterConflict {
        existing: FeedKey,
        attempted: FeedKey,
    },

    #[error("feed lock poisoned")]
    Poisoned,
}

/// Convenience alias used throughout the feed crate.
pub type Result<T> = std::result::Result<T, FeedError>;
