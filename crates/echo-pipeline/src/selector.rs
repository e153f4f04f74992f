use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use echo_types::{FeedKey, Timeframe};

use crate::codec::Codec;

/// The next unread message of one feed.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    pub key: FeedKey,
    pub seq: u64,
    pub data: &'a Bytes,
}

/// Cross-feed tie-break policy for the [`crate::MessageIterator`].
///
/// Candidates arrive sorted by feed key, one per feed with unread messages.
/// Return the index of the candidate to deliver, or `None` to wait for more
/// data. Only the choice between feeds is delegated; per-feed order is
/// enforced by the iterator.
///
/// A selector only sees what has arrived so far, so none of the built-in
/// policies yields one global order across peers that receive messages at
/// different times. Replicas converge only when their state machine folds
/// concurrent messages commutatively.
pub trait FeedSelector: Send {
    fn select(&mut self, candidates: &[Candidate<'_>], processed: &Timeframe) -> Option<usize>;

    fn name(&self) -> &'static str;
}

/// Uniform random choice among candidates.
///
/// Different peers will interleave feeds differently, so only commutative
/// state machines converge under this policy.
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence of choices.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSelector for RandomSelector {
    fn select(&mut self, candidates: &[Candidate<'_>], _processed: &Timeframe) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(0..candidates.len()))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Lowest feed key first.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeedKeySelector;

impl FeedSelector for FeedKeySelector {
    fn select(&mut self, candidates: &[Candidate<'_>], _processed: &Timeframe) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.key)
            .map(|(i, _)| i)
    }

    fn name(&self) -> &'static str {
        "feed_key"
    }
}

/// Causal order by envelope timeframe.
///
/// A candidate is eligible once everything its writer had processed has
/// been processed here. Among eligible candidates the one with the fewest
/// dependencies wins, ties broken by feed key. Entries that do not decode
/// as envelopes carry no dependencies.
///
/// This is a partial order. A message is never applied before one its
/// writer had seen, but concurrent messages land in arrival order, and a
/// peer usually applies its own writes first. Order-sensitive folds such
/// as the accumulator can therefore diverge between peers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeframeSelector {
    codec: Codec,
}

impl TimeframeSelector {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl FeedSelector for TimeframeSelector {
    fn select(&mut self, candidates: &[Candidate<'_>], processed: &Timeframe) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let timeframe = self
                    .codec
                    .decode_envelope(c.data)
                    .map(|envelope| envelope.timeframe)
                    .unwrap_or_default();
                processed
                    .has_reached(&timeframe)
                    .then(|| (timeframe.total_messages(), c.key, i))
            })
            .min()
            .map(|(_, _, i)| i)
    }

    fn name(&self) -> &'static str {
        "timeframe"
    }
}

/// Configurable choice of built-in selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Random,
    FeedKey,
    #[default]
    Timeframe,
}

impl SelectorKind {
    pub fn build(&self, codec: Codec) -> Box<dyn FeedSelector> {
        match self {
            Self::Random => Box::new(RandomSelector::new()),
            Self::FeedKey => Box::new(FeedKeySelector),
            Self::Timeframe => Box::new(TimeframeSelector::new(codec)),
        }
    }
}
