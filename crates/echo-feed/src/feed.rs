use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use echo_types::FeedKey;

use crate::error::{FeedError, Result};
use crate::event::{FeedEvent, Listeners};

/// Shared storage behind every handle to one feed.
pub(crate) struct FeedCore {
    key: FeedKey,
    /// `true` when this peer holds the write capability.
    local: bool,
    /// Set while a [`WritableFeed`] handle is alive.
    writer_active: AtomicBool,
    messages: RwLock<Vec<Bytes>>,
    listeners: Listeners,
}

impl FeedCore {
    pub(crate) fn new(key: FeedKey, local: bool) -> Self {
        Self {
            key,
            local,
            writer_active: AtomicBool::new(false),
            messages: RwLock::new(Vec::new()),
            listeners: Listeners::default(),
        }
    }

    pub(crate) fn is_local(&self) -> bool {
        self.local
    }

    /// Claim the single writer slot.
    pub(crate) fn claim_writer(&self) -> Result<()> {
        if !self.local {
            return Err(FeedError::NotWritable { key: self.key });
        }
        self.writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| FeedError::WriterInUse { key: self.key })
    }

    fn length(&self) -> Result<u64> {
        let messages = self.messages.read().map_err(|_| FeedError::Poisoned)?;
        Ok(messages.len() as u64)
    }

    fn get(&self, offset: u64) -> Result<Bytes> {
        let messages = self.messages.read().map_err(|_| FeedError::Poisoned)?;
        usize::try_from(offset)
            .ok()
            .and_then(|index| messages.get(index))
            .cloned()
            .ok_or(FeedError::OutOfRange {
                key: self.key,
                offset,
                length: messages.len() as u64,
            })
    }

    /// Push at `expected` (or at the end when `None`). The new message is
    /// visible to readers before the event is published.
    fn push(&self, expected: Option<u64>, data: Bytes) -> Result<u64> {
        let offset = {
            let mut messages = self.messages.write().map_err(|_| FeedError::Poisoned)?;
            let offset = messages.len() as u64;
            if let Some(actual) = expected {
                if actual != offset {
                    return Err(FeedError::OutOfOrder {
                        key: self.key,
                        expected: offset,
                        actual,
                    });
                }
            }
            messages.push(data);
            offset
        };
        self.listeners.route(FeedEvent::Appended {
            key: self.key,
            length: offset + 1,
        });
        Ok(offset)
    }

    pub(crate) fn attach(&self, sender: broadcast::Sender<FeedEvent>) {
        self.listeners.attach(sender);
    }
}

/// Read access to a feed. Cheap to clone.
#[derive(Clone)]
pub struct ReadableFeed {
    core: Arc<FeedCore>,
}

impl ReadableFeed {
    pub(crate) fn new(core: Arc<FeedCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<FeedCore> {
        &self.core
    }

    /// The feed's identity.
    pub fn key(&self) -> FeedKey {
        self.core.key
    }

    /// Current number of messages.
    pub fn length(&self) -> Result<u64> {
        self.core.length()
    }

    /// The message at `offset`.
    pub fn get_message(&self, offset: u64) -> Result<Bytes> {
        self.core.get(offset)
    }

    /// `true` when this peer owns the feed's write capability.
    pub fn is_local(&self) -> bool {
        self.core.is_local()
    }
}

impl std::fmt::Debug for ReadableFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableFeed")
            .field("key", &self.core.key)
            .field("local", &self.core.local)
            .finish()
    }
}

/// The write capability for a feed.
///
/// At most one `WritableFeed` exists per feed at a time; it is not `Clone`
/// and releases the writer slot on drop.
pub struct WritableFeed {
    core: Arc<FeedCore>,
}

impl WritableFeed {
    /// Wrap a core whose writer slot has already been claimed.
    pub(crate) fn new(core: Arc<FeedCore>) -> Self {
        Self { core }
    }

    pub fn key(&self) -> FeedKey {
        self.core.key
    }

    /// Append a message, returning its offset.
    pub fn append(&self, data: impl Into<Bytes>) -> Result<u64> {
        let offset = self.core.push(None, data.into())?;
        debug!(feed = %self.core.key, seq = offset, "appended");
        Ok(offset)
    }

    pub fn length(&self) -> Result<u64> {
        self.core.length()
    }

    /// A read handle to the same feed.
    pub fn readable(&self) -> ReadableFeed {
        ReadableFeed::new(Arc::clone(&self.core))
    }
}

impl Drop for WritableFeed {
    fn drop(&mut self) {
        self.core.writer_active.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for WritableFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableFeed")
            .field("key", &self.core.key)
            .finish()
    }
}

/// Ingest side of a remote feed, driven by the replication transport.
///
/// Messages must arrive in order with no gaps; anything else is rejected
/// so local history never diverges from the writer's.
#[derive(Clone)]
pub struct FeedReplica {
    core: Arc<FeedCore>,
}

impl FeedReplica {
    pub(crate) fn new(core: Arc<FeedCore>) -> Self {
        Self { core }
    }

    pub fn key(&self) -> FeedKey {
        self.core.key
    }

    /// Store the message the writer appended at `offset`.
    pub fn ingest(&self, offset: u64, data: impl Into<Bytes>) -> Result<u64> {
        self.core.push(Some(offset), data.into())
    }

    pub fn length(&self) -> Result<u64> {
        self.core.length()
    }

    pub fn readable(&self) -> ReadableFeed {
        ReadableFeed::new(Arc::clone(&self.core))
    }
}

impl std::fmt::Debug for FeedReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedReplica")
            .field("key", &self.core.key)
            .finish()
    }
}

/// Copy every message `target` is missing from `source`, in order.
///
/// Stands in for the replication transport. Returns the number of messages
/// copied.
pub fn replicate(source: &ReadableFeed, target: &FeedReplica) -> Result<u64> {
    if source.key() != target.key() {
        warn!(source = %source.key(), target = %target.key(), "replicating between different feeds");
        return Err(FeedError::UnknownFeed(target.key()));
    }
    let start = target.length()?;
    let end = source.length()?;
    for offset in start..end {
        target.ingest(offset, source.get_message(offset)?)?;
    }
    let copied = end.saturating_sub(start);
    if copied > 0 {
        debug!(feed = %source.key(), copied, "replicated");
    }
    Ok(copied)
}
