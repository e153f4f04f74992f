use bytes::Bytes;
use serde::{Deserialize, Serialize};

use echo_types::{FeedKey, Timeframe};

/// What a pipeline writer stores in a feed: the application payload plus
/// the timeframe the writer had processed when producing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMessage {
    /// Causal dependencies of this message.
    pub timeframe: Timeframe,
    /// Codec-encoded application message.
    pub payload: Vec<u8>,
}

/// A message delivered by the [`crate::MessageIterator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedBlock {
    /// Feed the message was read from.
    pub key: FeedKey,
    /// Offset of the message within that feed.
    pub seq: u64,
    /// Raw feed entry.
    pub data: Bytes,
}
