use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info};

use echo_types::FeedKey;

use crate::descriptor::FeedDescriptor;
use crate::error::{FeedError, Result};
use crate::event::{EventStream, FeedEvent};

/// Default capacity of a feed set's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

struct FeedSetInner {
    descriptors: RwLock<BTreeMap<FeedKey, FeedDescriptor>>,
    events: broadcast::Sender<FeedEvent>,
}

/// Grow-only registry of the feeds making up one party.
///
/// Cloning yields another handle to the same set. Subscribers receive a
/// [`FeedEvent`] whenever a feed is added or any member feed grows.
#[derive(Clone)]
pub struct FeedSet {
    inner: Arc<FeedSetInner>,
}

impl FeedSet {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(FeedSetInner {
                descriptors: RwLock::new(BTreeMap::new()),
                events,
            }),
        }
    }

    /// Register a feed.
    ///
    /// Re-registering a known key is a silent no-op and returns `Ok(false)`;
    /// the first descriptor wins. A second locally written feed is refused
    /// so each set has at most one local writer.
    pub fn add_feed(&self, descriptor: FeedDescriptor) -> Result<bool> {
        let key = descriptor.key();
        {
            let mut descriptors = self
                .inner
                .descriptors
                .write()
                .map_err(|_| FeedError::Poisoned)?;
            if descriptors.contains_key(&key) {
                debug!(feed = %key, "feed already registered");
                return Ok(false);
            }
            if descriptor.feed().is_local() {
                if let Some(existing) = descriptors.values().find(|d| d.feed().is_local()) {
                    return Err(FeedError::WriterConflict {
                        existing: existing.key(),
                        attempted: key,
                    });
                }
            }
            descriptor.feed().core().attach(self.inner.events.clone());
            descriptors.insert(key, descriptor.clone());
        }
        info!(feed = %key, role = %descriptor.role(), "feed added");
        let _ = self.inner.events.send(FeedEvent::Added { key });
        Ok(true)
    }

    /// Snapshot of all descriptors. Identify feeds by key, not position.
    pub fn list_descriptors(&self) -> Result<Vec<FeedDescriptor>> {
        let descriptors = self
            .inner
            .descriptors
            .read()
            .map_err(|_| FeedError::Poisoned)?;
        Ok(descriptors.values().cloned().collect())
    }

    pub fn get(&self, key: &FeedKey) -> Result<Option<FeedDescriptor>> {
        let descriptors = self
            .inner
            .descriptors
            .read()
            .map_err(|_| FeedError::Poisoned)?;
        Ok(descriptors.get(key).cloned())
    }

    pub fn contains(&self, key: &FeedKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        let descriptors = self
            .inner
            .descriptors
            .read()
            .map_err(|_| FeedError::Poisoned)?;
        Ok(descriptors.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Receive membership and append events from now on.
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }
}

impl Default for FeedSet {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
