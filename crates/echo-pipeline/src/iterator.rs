use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use echo_feed::{EventStream, FeedSet};
use echo_types::{FeedKey, Timeframe};

use crate::envelope::FeedBlock;
use crate::error::Result;
use crate::selector::{Candidate, FeedSelector};

/// Shared boolean backed by a watch channel.
#[derive(Clone)]
struct Flag {
    tx: Arc<watch::Sender<bool>>,
}

impl Flag {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Store `value`, returning the previous one.
    fn set(&self, value: bool) -> bool {
        self.tx.send_replace(value)
    }

    fn get(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Cooperative stop signal for a [`MessageIterator`]. Cheap to clone.
#[derive(Clone)]
pub struct StopHandle {
    flag: Flag,
}

impl StopHandle {
    /// Request termination. Idempotent.
    pub fn stop(&self) {
        self.flag.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.get()
    }
}

/// Suspends delivery without discarding cursors. Cheap to clone.
///
/// A message already handed out is not affected; the pause is observed
/// before the next one is selected.
#[derive(Clone)]
pub struct PauseHandle {
    flag: Flag,
}

impl PauseHandle {
    pub fn pause(&self) {
        if !self.flag.set(true) {
            debug!("message iterator paused");
        }
    }

    pub fn unpause(&self) {
        if self.flag.set(false) {
            debug!("message iterator resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flag.get()
    }
}

/// Raised while unread messages exist but none has been deliverable for
/// longer than the stall timeout, e.g. when a message depends on a feed
/// that was never added. Cleared by the next delivery.
#[derive(Clone)]
pub struct StallSignal {
    flag: Flag,
}

impl StallSignal {
    pub fn new() -> Self {
        Self { flag: Flag::new() }
    }

    pub fn is_stalled(&self) -> bool {
        self.flag.get()
    }

    /// Resolve once the signal is raised.
    pub async fn wait_for_stall(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stalled| *stalled).await;
    }
}

impl Default for StallSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges every feed of a [`FeedSet`] into a single ordered stream.
///
/// Each feed is read strictly in append order through a per-feed cursor.
/// Whenever several feeds have unread messages, the [`FeedSelector`] picks
/// which one goes next. When nothing is deliverable the iterator suspends
/// until a member feed grows or a feed joins the set.
///
/// Cursors belong to this iterator alone; consumers that need independent
/// progress create their own iterator.
pub struct MessageIterator {
    feeds: FeedSet,
    events: EventStream,
    selector: Box<dyn FeedSelector>,
    /// Next unread offset per feed.
    cursors: HashMap<FeedKey, u64>,
    processed: Timeframe,
    stop: StopHandle,
    stop_rx: watch::Receiver<bool>,
    pause: PauseHandle,
    pause_rx: watch::Receiver<bool>,
    poll_interval: Option<Duration>,
    stall: StallSignal,
    stall_timeout: Option<Duration>,
    /// When candidates were last found pending but ineligible.
    blocked_since: Option<Instant>,
}

fn cursors_after(start: &Timeframe) -> HashMap<FeedKey, u64> {
    start
        .iter()
        .map(|(key, seq)| (*key, seq.saturating_add(1)))
        .collect()
}

impl MessageIterator {
    pub fn new(feeds: FeedSet, selector: Box<dyn FeedSelector>) -> Self {
        Self::starting_at(feeds, selector, Timeframe::new())
    }

    /// Resume after `start`: messages up to each recorded sequence are
    /// treated as already delivered.
    pub fn starting_at(feeds: FeedSet, selector: Box<dyn FeedSelector>, start: Timeframe) -> Self {
        // Subscribe before the first candidate scan so no wake-up is lost.
        let events = feeds.subscribe();
        let stop = StopHandle { flag: Flag::new() };
        let stop_rx = stop.flag.subscribe();
        let pause = PauseHandle { flag: Flag::new() };
        let pause_rx = pause.flag.subscribe();
        info!(selector = selector.name(), start = ?start, "message iterator started");
        Self {
            feeds,
            events,
            selector,
            cursors: cursors_after(&start),
            processed: start,
            stop,
            stop_rx,
            pause,
            pause_rx,
            poll_interval: None,
            stall: StallSignal::new(),
            stall_timeout: None,
            blocked_since: None,
        }
    }

    /// Re-check candidates at least this often while suspended.
    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Raise `signal` when pending messages stay undeliverable for `timeout`.
    pub fn with_stall_detection(mut self, timeout: Duration, signal: StallSignal) -> Self {
        self.stall_timeout = Some(timeout);
        self.stall = signal;
        self
    }

    /// Next unread offset of `key` (zero for unseen feeds).
    pub fn cursor(&self, key: &FeedKey) -> u64 {
        self.cursors.get(key).copied().unwrap_or(0)
    }

    /// Last delivered sequence per feed.
    pub fn timeframe(&self) -> &Timeframe {
        &self.processed
    }

    /// Re-seek so that delivery continues after `timeframe`, forward or back.
    pub fn set_cursor(&mut self, timeframe: Timeframe) {
        info!(timeframe = ?timeframe, "message iterator cursor moved");
        self.cursors = cursors_after(&timeframe);
        self.processed = timeframe;
        self.clear_stall();
    }

    pub fn feed_set(&self) -> &FeedSet {
        &self.feeds
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn unpause(&self) {
        self.pause.unpause();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn stall_signal(&self) -> StallSignal {
        self.stall.clone()
    }

    /// Deliver the next message if one is ready, without waiting.
    /// Nothing is delivered while stopped or paused.
    pub fn try_next(&mut self) -> Result<Option<FeedBlock>> {
        if self.is_stopped() || self.is_paused() {
            return Ok(None);
        }

        let mut pending = Vec::new();
        for descriptor in self.feeds.list_descriptors()? {
            let feed = descriptor.feed();
            let key = feed.key();
            let cursor = self.cursor(&key);
            if feed.length()? > cursor {
                pending.push((key, cursor, feed.get_message(cursor)?));
            }
        }
        if pending.is_empty() {
            self.clear_stall();
            return Ok(None);
        }

        let candidates: Vec<Candidate<'_>> = pending
            .iter()
            .map(|(key, seq, data)| Candidate {
                key: *key,
                seq: *seq,
                data,
            })
            .collect();
        let Some(index) = self.selector.select(&candidates, &self.processed) else {
            trace!(pending = candidates.len(), "no eligible candidate");
            self.blocked_since.get_or_insert_with(Instant::now);
            return Ok(None);
        };
        let Some((key, seq, data)) = pending.into_iter().nth(index) else {
            return Ok(None);
        };

        self.cursors.insert(key, seq.saturating_add(1));
        self.processed.advance(key, seq);
        self.clear_stall();
        debug!(feed = %key, seq, "delivered");
        Ok(Some(FeedBlock { key, seq, data }))
    }

    /// Wait for and deliver the next message.
    ///
    /// Returns `Ok(None)` once stopped; stopping while suspended wakes the
    /// iterator immediately. While paused the iterator stays suspended.
    pub async fn next(&mut self) -> Result<Option<FeedBlock>> {
        loop {
            if let Some(block) = self.try_next()? {
                return Ok(Some(block));
            }
            if self.is_stopped() {
                return Ok(None);
            }
            if self.is_paused() {
                self.blocked_since = None;
            }
            self.wait().await;
        }
    }

    fn clear_stall(&mut self) {
        self.blocked_since = None;
        if self.stall.flag.set(false) {
            info!(timeframe = ?self.processed, "message iterator no longer stalled");
        }
    }

    /// Suspend until something may have changed.
    async fn wait(&mut self) {
        let poll = self.poll_interval;
        let tick = async move {
            match poll {
                Some(interval) => tokio::time::sleep(interval).await,
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = match (self.stall_timeout, self.blocked_since) {
            (Some(timeout), Some(since)) if !self.stall.is_stalled() => Some(since + timeout),
            _ => None,
        };
        let stall_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut stalled = false;
        tokio::select! {
            biased;
            _ = self.stop_rx.changed() => {}
            _ = self.pause_rx.changed() => {}
            event = self.events.recv() => match event {
                Ok(event) => trace!(feed = %event.key(), "woken"),
                Err(RecvError::Lagged(skipped)) => trace!(skipped, "event stream lagged"),
                // The set owns the sender for as long as we hold it.
                Err(RecvError::Closed) => self.stop.stop(),
            },
            _ = stall_timer => stalled = true,
            _ = tick => {}
        }

        if stalled && !self.stall.flag.set(true) {
            warn!(
                timeout_ms = self.stall_timeout.map_or(0, |t| t.as_millis() as u64),
                timeframe = ?self.processed,
                "message iterator stalled: pending messages have unmet dependencies"
            );
        }
    }
}

impl Drop for MessageIterator {
    fn drop(&mut self) {
        debug!(timeframe = ?self.processed, "message iterator dropped");
    }
}
