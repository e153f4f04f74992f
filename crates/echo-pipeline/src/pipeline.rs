use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use echo_feed::{FeedDescriptor, FeedRole, FeedSet, WritableFeed};
use echo_types::{FeedKey, Timeframe};

use crate::clock::TimeframeClock;
use crate::codec::Codec;
use crate::config::PipelineConfig;
use crate::envelope::FeedMessage;
use crate::error::{PipelineError, Result};
use crate::iterator::{MessageIterator, StallSignal};
use crate::processor::Processor;
use crate::state_machine::StateMachine;

/// Position of a message written through a [`FeedWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    pub feed_key: FeedKey,
    pub seq: u64,
}

/// Encodes application messages into the local writable feed.
///
/// Each entry is wrapped in a [`FeedMessage`] stamped with the pipeline's
/// processed timeframe.
pub struct FeedWriter {
    feed: WritableFeed,
    codec: Codec,
    clock: Arc<TimeframeClock>,
}

impl FeedWriter {
    pub fn key(&self) -> FeedKey {
        self.feed.key()
    }

    pub fn write<T: Serialize + ?Sized>(&self, message: &T) -> Result<WriteReceipt> {
        let envelope = FeedMessage {
            timeframe: self.clock.timeframe(),
            payload: self.codec.encode(message)?,
        };
        let seq = self.feed.append(self.codec.encode(&envelope)?)?;
        Ok(WriteReceipt {
            feed_key: self.feed.key(),
            seq,
        })
    }

    pub fn feed(&self) -> &WritableFeed {
        &self.feed
    }
}

/// How [`Pipeline::wait_until_reached_target`] finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Reached,
    /// The processor stalled before reaching the target.
    Stalled,
    TimedOut,
}

/// The unit of replication for one party: its feed set plus this peer's
/// writable feed.
pub struct Pipeline {
    config: PipelineConfig,
    feeds: FeedSet,
    clock: Arc<TimeframeClock>,
    writer: Option<FeedWriter>,
    /// Where new iterators begin.
    start: Timeframe,
    target: Timeframe,
    stall: StallSignal,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::starting_at(config, Timeframe::new())
    }

    /// Resume from a previously reached timeframe (e.g. a snapshot).
    pub fn starting_at(config: PipelineConfig, start: Timeframe) -> Result<Self> {
        config.validate()?;
        let feeds = FeedSet::new(config.event_capacity);
        info!(codec = ?config.codec, selector = ?config.selector, "pipeline created");
        Ok(Self {
            config,
            feeds,
            clock: Arc::new(TimeframeClock::new(start.clone())),
            writer: None,
            start,
            target: Timeframe::new(),
            stall: StallSignal::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn codec(&self) -> Codec {
        self.config.codec
    }

    pub fn feed_set(&self) -> &FeedSet {
        &self.feeds
    }

    pub fn clock(&self) -> &Arc<TimeframeClock> {
        &self.clock
    }

    /// Register a feed; duplicates are ignored.
    pub fn add_feed(&self, descriptor: FeedDescriptor) -> Result<bool> {
        Ok(self.feeds.add_feed(descriptor)?)
    }

    /// Attach this peer's writable feed, registering it with `role`
    /// (`Genesis` for a party's creator, `Writable` otherwise).
    pub fn set_writable_feed(&mut self, feed: WritableFeed, role: FeedRole) -> Result<()> {
        if self.writer.is_some() {
            return Err(PipelineError::WriterAlreadySet);
        }
        self.feeds
            .add_feed(FeedDescriptor::new(role, feed.readable()))?;
        debug!(feed = %feed.key(), %role, "writable feed attached");
        self.writer = Some(FeedWriter {
            feed,
            codec: self.config.codec,
            clock: Arc::clone(&self.clock),
        });
        Ok(())
    }

    /// The local writer, if one has been attached.
    pub fn writable(&self) -> Option<&FeedWriter> {
        self.writer.as_ref()
    }

    pub fn writer(&self) -> Result<&FeedWriter> {
        self.writer.as_ref().ok_or(PipelineError::NoWritableFeed)
    }

    pub fn start_timeframe(&self) -> &Timeframe {
        &self.start
    }

    /// Move the start timeframe and reset the clock to it. Affects
    /// iterators created afterwards; a running processor is re-seeked with
    /// [`Processor::set_cursor`].
    pub fn set_cursor(&mut self, timeframe: Timeframe) {
        info!(timeframe = ?timeframe, "pipeline cursor moved");
        self.clock.set_timeframe(timeframe.clone());
        self.start = timeframe;
    }

    /// A fresh iterator over this pipeline's feeds, beginning after the
    /// start timeframe. Reports stalls through [`Self::stall_signal`] when
    /// stall detection is configured.
    pub fn message_iterator(&self) -> MessageIterator {
        let iterator = self.iterator_from_start();
        match self.config.stall_timeout() {
            Some(timeout) => iterator.with_stall_detection(timeout, self.stall.clone()),
            None => iterator,
        }
    }

    fn iterator_from_start(&self) -> MessageIterator {
        MessageIterator::starting_at(
            self.feeds.clone(),
            self.config.selector.build(self.config.codec),
            self.start.clone(),
        )
        .with_poll_interval(self.config.poll_interval())
    }

    /// The primary consumer: its progress drives the writer's timeframe.
    ///
    /// Every call replays from the start timeframe with fresh cursors and
    /// empty state. All processors created here publish to the same clock,
    /// which only moves forward, so one per pipeline is the intended use.
    pub fn processor<S: StateMachine>(&self, state: S) -> Processor<S> {
        Processor::new(self.message_iterator(), self.config.codec, state)
            .with_clock(Arc::clone(&self.clock))
    }

    /// An additional consumer with its own cursors; does not drive the clock
    /// or report stalls.
    pub fn consumer<S: StateMachine>(&self, state: S) -> Processor<S> {
        Processor::new(self.iterator_from_start(), self.config.codec, state)
    }

    pub fn set_target_timeframe(&mut self, target: Timeframe) {
        debug!(target = ?target, "target timeframe set");
        self.target = target;
    }

    pub fn target_timeframe(&self) -> &Timeframe {
        &self.target
    }

    /// Resolve once the primary processor has reached `target`.
    pub async fn wait_until_timeframe(&self, target: &Timeframe) -> Result<Timeframe> {
        self.clock.wait_until_reached(target).await
    }

    /// Wait for the primary processor to reach the target timeframe.
    ///
    /// Gives up after `timeout` if one is given, and as soon as a stall is
    /// reported when `break_on_stall` is set.
    pub async fn wait_until_reached_target(
        &self,
        timeout: Option<Duration>,
        break_on_stall: bool,
    ) -> Result<TargetStatus> {
        let target = &self.target;
        let stall = async {
            if break_on_stall {
                self.stall.wait_for_stall().await
            } else {
                std::future::pending::<()>().await
            }
        };
        let timer = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            reached = self.clock.wait_until_reached(target) => {
                let reached = reached?;
                debug!(timeframe = ?reached, "target timeframe reached");
                Ok(TargetStatus::Reached)
            }
            _ = stall => {
                warn!(
                    target = ?target,
                    current = ?self.clock.timeframe(),
                    "stopped waiting for target timeframe: pipeline stalled"
                );
                Ok(TargetStatus::Stalled)
            }
            _ = timer => {
                warn!(
                    target = ?target,
                    current = ?self.clock.timeframe(),
                    "timed out waiting for target timeframe"
                );
                Ok(TargetStatus::TimedOut)
            }
        }
    }

    pub fn stall_signal(&self) -> StallSignal {
        self.stall.clone()
    }

    pub fn is_stalled(&self) -> bool {
        self.stall.is_stalled()
    }

    /// Timeframe covering every message currently stored in the feed set.
    pub fn end_timeframe(&self) -> Result<Timeframe> {
        let mut end = Timeframe::new();
        for descriptor in self.feeds.list_descriptors()? {
            let length = descriptor.feed().length()?;
            if length > 0 {
                end.set(descriptor.key(), length - 1);
            }
        }
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{Accumulator, AccumulatorMessage};
    use echo_feed::{replicate, FeedStore};
    use echo_types::KeyPair;

    /// Two peers with each other's feed replicated in, nothing written yet.
    struct Peers {
        a: Pipeline,
        b: Pipeline,
        store_a: FeedStore,
        store_b: FeedStore,
        a_on_b: echo_feed::FeedReplica,
        b_on_a: echo_feed::FeedReplica,
    }

    impl Peers {
        fn new() -> Self {
            let store_a = FeedStore::new();
            let store_b = FeedStore::new();
            let a = pipeline_with_writer(&store_a);
            let mut b = Pipeline::new(PipelineConfig::default()).unwrap();
            let b_feed = store_b.create_writable(&KeyPair::generate()).unwrap();
            b.set_writable_feed(b_feed, FeedRole::Writable).unwrap();

            let a_on_b = store_b.open_replica(a.writer().unwrap().key()).unwrap();
            let b_on_a = store_a.open_replica(b.writer().unwrap().key()).unwrap();
            a.add_feed(FeedDescriptor::readable(b_on_a.readable())).unwrap();
            b.add_feed(FeedDescriptor::genesis(a_on_b.readable())).unwrap();
            Self {
                a,
                b,
                store_a,
                store_b,
                a_on_b,
                b_on_a,
            }
        }

        fn a_to_b(&self) {
            let a_key = self.a.writer().unwrap().key();
            replicate(&self.store_a.readable(&a_key).unwrap(), &self.a_on_b).unwrap();
        }

        fn b_to_a(&self) {
            let b_key = self.b.writer().unwrap().key();
            replicate(&self.store_b.readable(&b_key).unwrap(), &self.b_on_a).unwrap();
        }
    }

    fn pipeline_with_writer(store: &FeedStore) -> Pipeline {
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let feed = store.create_writable(&KeyPair::generate()).unwrap();
        pipeline.set_writable_feed(feed, FeedRole::Genesis).unwrap();
        pipeline
    }

    #[test]
    fn writable_is_empty_before_genesis() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert!(pipeline.writable().is_none());
        assert!(matches!(
            pipeline.writer().map(|_| ()),
            Err(PipelineError::NoWritableFeed)
        ));
    }

    #[test]
    fn writer_can_only_be_set_once() {
        let store = FeedStore::new();
        let mut pipeline = pipeline_with_writer(&store);
        let other = store.create_writable(&KeyPair::generate()).unwrap();
        assert_eq!(
            pipeline
                .set_writable_feed(other, FeedRole::Writable)
                .unwrap_err(),
            PipelineError::WriterAlreadySet
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn writes_are_stamped_with_processed_timeframe() {
        let store = FeedStore::new();
        let pipeline = pipeline_with_writer(&store);
        let writer = pipeline.writer().unwrap();

        let first = writer.write(&AccumulatorMessage::add(1)).unwrap();
        let mut processor = pipeline.processor(Accumulator::new());
        processor.drain().unwrap();
        let second = writer.write(&AccumulatorMessage::add(2)).unwrap();

        let feed = writer.feed().readable();
        let envelope0 = pipeline
            .codec()
            .decode_envelope(&feed.get_message(first.seq).unwrap())
            .unwrap();
        let envelope1 = pipeline
            .codec()
            .decode_envelope(&feed.get_message(second.seq).unwrap())
            .unwrap();
        assert!(envelope0.timeframe.is_empty());
        assert_eq!(envelope1.timeframe.get(&writer.key()), Some(first.seq));
    }

    #[test]
    fn end_timeframe_tracks_feed_lengths() {
        let store = FeedStore::new();
        let pipeline = pipeline_with_writer(&store);
        assert!(pipeline.end_timeframe().unwrap().is_empty());

        let writer = pipeline.writer().unwrap();
        writer.write(&AccumulatorMessage::add(1)).unwrap();
        writer.write(&AccumulatorMessage::add(1)).unwrap();
        assert_eq!(pipeline.end_timeframe().unwrap().get(&writer.key()), Some(1));
    }

    #[test]
    fn peers_converge_with_timeframe_selector() {
        let peers = Peers::new();
        let mut proc_a = peers.a.processor(Accumulator::new());
        let mut proc_b = peers.b.processor(Accumulator::new());

        peers.a.writer().unwrap().write(&AccumulatorMessage::add(5)).unwrap();
        peers.a_to_b();
        proc_b.drain().unwrap();
        peers.b.writer().unwrap().write(&AccumulatorMessage::multiply(3)).unwrap();

        peers.b_to_a();
        proc_a.drain().unwrap();
        proc_b.drain().unwrap();

        assert_eq!(proc_a.state().value(), 15);
        assert_eq!(proc_b.state().value(), 15);
    }

    /// Writes that neither side had seen are causally unordered, and each
    /// peer has already applied its own before the other's arrives.
    #[test]
    fn concurrent_writes_diverge_under_default_selector() {
        let peers = Peers::new();
        let mut proc_a = peers.a.processor(Accumulator::new());
        let mut proc_b = peers.b.processor(Accumulator::new());

        peers.a.writer().unwrap().write(&AccumulatorMessage::add(5)).unwrap();
        peers.b.writer().unwrap().write(&AccumulatorMessage::multiply(3)).unwrap();
        proc_a.drain().unwrap();
        proc_b.drain().unwrap();

        peers.a_to_b();
        peers.b_to_a();
        proc_a.drain().unwrap();
        proc_b.drain().unwrap();

        assert_eq!(proc_a.stats().processed, 2);
        assert_eq!(proc_b.stats().processed, 2);
        assert_eq!(proc_a.state().value(), 15);
        assert_eq!(proc_b.state().value(), 5);
    }

    #[test]
    fn each_processor_replays_from_start() {
        let store = FeedStore::new();
        let pipeline = pipeline_with_writer(&store);
        let writer = pipeline.writer().unwrap();
        writer.write(&AccumulatorMessage::add(2)).unwrap();

        let mut first = pipeline.processor(Accumulator::new());
        assert_eq!(first.drain().unwrap(), 1);

        let mut second = pipeline.processor(Accumulator::new());
        assert_eq!(second.drain().unwrap(), 1);
        assert_eq!(second.state().value(), 2);
        assert_eq!(pipeline.clock().timeframe().get(&writer.key()), Some(0));
    }

    #[test]
    fn set_cursor_moves_start_and_clock() {
        let store = FeedStore::new();
        let mut pipeline = pipeline_with_writer(&store);
        let key = pipeline.writer().unwrap().key();
        for n in 1..=3 {
            pipeline.writer().unwrap().write(&AccumulatorMessage::add(n)).unwrap();
        }

        pipeline.set_cursor(vec![(key, 1u64)].into());
        assert_eq!(pipeline.start_timeframe().get(&key), Some(1));
        assert_eq!(pipeline.clock().timeframe().get(&key), Some(1));

        let mut processor = pipeline.processor(Accumulator::new());
        assert_eq!(processor.drain().unwrap(), 1);
        assert_eq!(processor.state().value(), 3);
    }

    #[tokio::test]
    async fn target_is_reached_by_running_processor() {
        let store = FeedStore::new();
        let mut pipeline = pipeline_with_writer(&store);
        pipeline.writer().unwrap().write(&AccumulatorMessage::add(1)).unwrap();
        pipeline.writer().unwrap().write(&AccumulatorMessage::add(1)).unwrap();
        pipeline.set_target_timeframe(pipeline.end_timeframe().unwrap());

        let mut processor = pipeline.processor(Accumulator::new());
        let stop = processor.stop_handle();
        let task = tokio::spawn(async move { processor.run().await.unwrap() });

        let status = pipeline
            .wait_until_reached_target(Some(Duration::from_secs(1)), true)
            .await
            .unwrap();
        assert_eq!(status, TargetStatus::Reached);

        stop.stop();
        let stats = task.await.unwrap();
        assert_eq!(stats.processed, 2);
    }

    #[tokio::test]
    async fn waiting_for_unwritten_target_times_out() {
        let store = FeedStore::new();
        let mut pipeline = pipeline_with_writer(&store);
        let key = pipeline.writer().unwrap().key();
        pipeline.set_target_timeframe(vec![(key, 0u64)].into());

        let status = pipeline
            .wait_until_reached_target(Some(Duration::from_millis(20)), true)
            .await
            .unwrap();
        assert_eq!(status, TargetStatus::TimedOut);
        assert!(!pipeline.is_stalled());
    }

    #[tokio::test]
    async fn missing_dependency_breaks_wait_on_stall() {
        let config = PipelineConfig {
            stall_timeout_ms: 20,
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(config).unwrap();
        let codec = pipeline.codec();

        let store = FeedStore::new();
        let absent = KeyPair::generate().public_key();
        let remote = store.open_replica(KeyPair::generate().public_key()).unwrap();
        let envelope = FeedMessage {
            timeframe: vec![(absent, 0u64)].into(),
            payload: codec.encode(&AccumulatorMessage::add(1)).unwrap(),
        };
        remote.ingest(0, codec.encode(&envelope).unwrap()).unwrap();
        pipeline
            .add_feed(FeedDescriptor::genesis(remote.readable()))
            .unwrap();
        pipeline.set_target_timeframe(pipeline.end_timeframe().unwrap());

        let mut processor = pipeline.processor(Accumulator::new());
        let stop = processor.stop_handle();
        let task = tokio::spawn(async move { processor.run().await.unwrap() });

        let status = pipeline
            .wait_until_reached_target(Some(Duration::from_secs(5)), true)
            .await
            .unwrap();
        assert_eq!(status, TargetStatus::Stalled);
        assert!(pipeline.is_stalled());

        stop.stop();
        assert_eq!(task.await.unwrap().processed, 0);
    }
}
