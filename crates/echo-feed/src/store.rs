use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use echo_types::{FeedKey, KeyPair};

use crate::error::{FeedError, Result};
use crate::feed::{FeedCore, FeedReplica, ReadableFeed, WritableFeed};

/// Per-peer arena of feeds keyed by [`FeedKey`].
///
/// Feed sets reference feeds through handles obtained here; no feed ever
/// points at another, so parties reading each other's feeds form no
/// ownership cycles. Cloning yields another handle to the same arena.
#[derive(Clone, Default)]
pub struct FeedStore {
    feeds: Arc<RwLock<HashMap<FeedKey, Arc<FeedCore>>>>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the local feed owned by `key_pair` and return its writer.
    pub fn create_writable(&self, key_pair: &KeyPair) -> Result<WritableFeed> {
        let key = key_pair.public_key();
        let mut feeds = self.feeds.write().map_err(|_| FeedError::Poisoned)?;
        if feeds.contains_key(&key) {
            return Err(FeedError::AlreadyExists(key));
        }
        let core = Arc::new(FeedCore::new(key, true));
        core.claim_writer()?;
        feeds.insert(key, Arc::clone(&core));
        info!(feed = %key, "writable feed created");
        Ok(WritableFeed::new(core))
    }

    /// Reacquire the writer of a local feed whose previous writer was dropped.
    pub fn open_writer(&self, key: &FeedKey) -> Result<WritableFeed> {
        let core = self.core(key)?;
        core.claim_writer()?;
        Ok(WritableFeed::new(core))
    }

    /// Open (creating if needed) the local copy of a remote feed.
    pub fn open_replica(&self, key: FeedKey) -> Result<FeedReplica> {
        let mut feeds = self.feeds.write().map_err(|_| FeedError::Poisoned)?;
        let core = feeds
            .entry(key)
            .or_insert_with(|| {
                info!(feed = %key, "replica opened");
                Arc::new(FeedCore::new(key, false))
            })
            .clone();
        if core.is_local() {
            return Err(FeedError::LocalFeed(key));
        }
        Ok(FeedReplica::new(core))
    }

    pub fn readable(&self, key: &FeedKey) -> Result<ReadableFeed> {
        Ok(ReadableFeed::new(self.core(key)?))
    }

    pub fn contains(&self, key: &FeedKey) -> Result<bool> {
        let feeds = self.feeds.read().map_err(|_| FeedError::Poisoned)?;
        Ok(feeds.contains_key(key))
    }

    /// All feed keys, sorted.
    pub fn keys(&self) -> Result<Vec<FeedKey>> {
        let feeds = self.feeds.read().map_err(|_| FeedError::Poisoned)?;
        let mut keys: Vec<FeedKey> = feeds.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    fn core(&self, key: &FeedKey) -> Result<Arc<FeedCore>> {
        let feeds = self.feeds.read().map_err(|_| FeedError::Poisoned)?;
        feeds.get(key).cloned().ok_or(FeedError::UnknownFeed(*key))
    }
}
