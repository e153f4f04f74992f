use std::sync::Arc;

use tracing::{debug, info, warn};

use echo_types::{FeedKey, Timeframe};

use crate::clock::TimeframeClock;
use crate::codec::Codec;
use crate::envelope::FeedBlock;
use crate::error::{Result, StateMachineError};
use crate::iterator::{MessageIterator, PauseHandle, StallSignal, StopHandle};
use crate::state_machine::{MessageMeta, StateMachine};

/// Counters kept by a [`Processor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Messages folded into the state machine.
    pub processed: u64,
    /// Messages that failed to decode or were rejected.
    pub skipped: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(StateMachineError),
}

/// Result of delivering one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Processed {
    pub feed_key: FeedKey,
    pub seq: u64,
    pub outcome: Outcome,
}

/// Drives one state machine from one message iterator.
///
/// A message that fails to decode or is rejected by the state machine is
/// logged and skipped; its offset still advances and ordering continues.
pub struct Processor<S> {
    iterator: MessageIterator,
    codec: Codec,
    state: S,
    clock: Option<Arc<TimeframeClock>>,
    stats: ProcessorStats,
}

impl<S: StateMachine> Processor<S> {
    pub fn new(iterator: MessageIterator, codec: Codec, state: S) -> Self {
        Self {
            iterator,
            codec,
            state,
            clock: None,
            stats: ProcessorStats::default(),
        }
    }

    /// Publish progress to `clock` after every delivered message.
    pub fn with_clock(mut self, clock: Arc<TimeframeClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn iterator(&self) -> &MessageIterator {
        &self.iterator
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.iterator.stop_handle()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.iterator.pause_handle()
    }

    pub fn stall_signal(&self) -> StallSignal {
        self.iterator.stall_signal()
    }

    /// Re-seek the iterator and, when attached, the clock.
    ///
    /// The state machine is not rewound: seeking backwards replays the
    /// skipped-over messages into the current state.
    pub fn set_cursor(&mut self, timeframe: Timeframe) {
        if let Some(clock) = &self.clock {
            clock.set_timeframe(timeframe.clone());
        }
        self.iterator.set_cursor(timeframe);
    }

    /// Process one ready message without waiting.
    pub fn step(&mut self) -> Result<Option<Processed>> {
        Ok(self.iterator.try_next()?.map(|block| self.apply(block)))
    }

    /// Process every ready message; returns how many were delivered.
    pub fn drain(&mut self) -> Result<usize> {
        let mut delivered = 0;
        while self.step()?.is_some() {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Wait for and process the next message. `None` once stopped.
    pub async fn next(&mut self) -> Result<Option<Processed>> {
        Ok(self.iterator.next().await?.map(|block| self.apply(block)))
    }

    /// Process messages until the iterator is stopped.
    pub async fn run(&mut self) -> Result<ProcessorStats> {
        info!("processor running");
        while self.next().await?.is_some() {}
        info!(processed = self.stats.processed, skipped = self.stats.skipped, "processor stopped");
        Ok(self.stats)
    }

    fn apply(&mut self, block: FeedBlock) -> Processed {
        let outcome = match self.execute(&block) {
            Ok(()) => {
                self.stats.processed += 1;
                Outcome::Applied
            }
            Err(err) => {
                self.stats.skipped += 1;
                warn!(feed = %block.key, seq = block.seq, error = %err, "message skipped");
                Outcome::Skipped(err)
            }
        };
        if let Some(clock) = &self.clock {
            clock.update(block.key, block.seq);
        }
        Processed {
            feed_key: block.key,
            seq: block.seq,
            outcome,
        }
    }

    fn execute(&mut self, block: &FeedBlock) -> std::result::Result<(), StateMachineError> {
        let envelope = self.codec.decode_envelope(&block.data)?;
        let message = self.codec.decode::<S::Message>(&envelope.payload)?;
        let meta = MessageMeta {
            feed_key: block.key,
            seq: block.seq,
            timeframe: envelope.timeframe,
        };
        self.state.execute(message, &meta)?;
        debug!(feed = %block.key, seq = block.seq, "message applied");
        Ok(())
    }
}
