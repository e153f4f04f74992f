use tokio::sync::watch;

use echo_types::{FeedKey, Timeframe};

use crate::error::{PipelineError, Result};

/// Timeframe processed by a pipeline's primary consumer.
///
/// Writers stamp outgoing messages with it; callers can await a target.
pub struct TimeframeClock {
    tx: watch::Sender<Timeframe>,
}

impl TimeframeClock {
    pub fn new(start: Timeframe) -> Self {
        let (tx, _) = watch::channel(start);
        Self { tx }
    }

    /// Snapshot of the current timeframe.
    pub fn timeframe(&self) -> Timeframe {
        self.tx.borrow().clone()
    }

    /// Record that `seq` of `key` has been processed.
    pub fn update(&self, key: FeedKey, seq: u64) {
        self.tx.send_modify(|timeframe| timeframe.advance(key, seq));
    }

    /// Replace the timeframe outright, e.g. after a re-seek. Unlike
    /// [`Self::update`] this may move backwards.
    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.tx.send_replace(timeframe);
    }

    /// Resolve once every entry of `target` has been processed.
    pub async fn wait_until_reached(&self, target: &Timeframe) -> Result<Timeframe> {
        let mut rx = self.tx.subscribe();
        let reached = rx
            .wait_for(|current| current.has_reached(target))
            .await
            .map_err(|_| PipelineError::ClockClosed)?;
        Ok(reached.clone())
    }
}

impl Default for TimeframeClock {
    fn default() -> Self {
        Self::new(Timeframe::new())
    }
}
