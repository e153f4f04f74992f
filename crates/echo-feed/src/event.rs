use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use echo_types::FeedKey;

/// Change notification published by feeds and feed sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedEvent {
    /// A message was appended (or ingested); `length` is the new length.
    Appended { key: FeedKey, length: u64 },
    /// A feed joined a feed set.
    Added { key: FeedKey },
}

impl FeedEvent {
    /// The feed this event concerns.
    pub fn key(&self) -> FeedKey {
        match self {
            Self::Appended { key, .. } | Self::Added { key } => *key,
        }
    }
}

/// A broadcast receiver for feed events.
pub type EventStream = broadcast::Receiver<FeedEvent>;

/// Fan-out of a single feed's events to every feed set tracking it.
#[derive(Default)]
pub(crate) struct Listeners {
    senders: RwLock<Vec<broadcast::Sender<FeedEvent>>>,
}

impl Listeners {
    pub(crate) fn attach(&self, sender: broadcast::Sender<FeedEvent>) {
        let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
        if !senders.iter().any(|s| s.same_channel(&sender)) {
            senders.push(sender);
        }
    }

    /// Deliver to all listeners. A send fails only when nobody is currently
    /// subscribed, which is not an error: later subscribers re-read lengths.
    pub(crate) fn route(&self, event: FeedEvent) {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        for sender in senders.iter() {
            let _ = sender.send(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
