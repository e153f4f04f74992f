use serde::de::DeserializeOwned;

use echo_types::{FeedKey, Timeframe};

use crate::error::StateMachineError;

/// Where a delivered message came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageMeta {
    /// Feed that carried the message, i.e. its writer.
    pub feed_key: FeedKey,
    /// Offset within that feed.
    pub seq: u64,
    /// Timeframe the writer had processed when writing it.
    pub timeframe: Timeframe,
}

/// Deterministic fold over ordered messages.
///
/// `execute` must depend only on the current state, the message and its
/// metadata: no I/O, clocks or randomness. Peers applying the same sequence
/// then reach the same state. Under a non-deterministic selector the fold
/// must also commute across feeds to converge.
///
/// An error rejects the single message; the caller logs it and moves on.
pub trait StateMachine {
    type Message: DeserializeOwned;

    fn execute(
        &mut self,
        message: Self::Message,
        meta: &MessageMeta,
    ) -> Result<(), StateMachineError>;
}
