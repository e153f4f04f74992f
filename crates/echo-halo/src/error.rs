use thiserror::Error;

use echo_feed::FeedError;
use echo_pipeline::PipelineError;
use echo_types::FeedKey;

#[derive(Debug, Error)]
pub enum HaloError {
    #[error("feed {feed} has not been admitted to the party")]
    NotAdmitted { feed: FeedKey },

    #[error("feed {0} belongs to this peer and cannot be replicated into it")]
    OwnFeed(FeedKey),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
}

pub type HaloResult<T> = Result<T, HaloError>;
