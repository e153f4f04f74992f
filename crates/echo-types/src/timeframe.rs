use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::FeedKey;

/// Vector clock over feeds.
///
/// Maps each feed to the sequence number (offset) of the last message
/// processed from it. A feed that is absent has had nothing processed.
/// Writers stamp every message with the timeframe they had processed when
/// writing it, which records the message's causal dependencies.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(FeedKey, u64)>", into = "Vec<(FeedKey, u64)>")]
pub struct Timeframe {
    frames: BTreeMap<FeedKey, u64>,
}

impl Timeframe {
    /// An empty timeframe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last processed sequence number for `key`, if any.
    pub fn get(&self, key: &FeedKey) -> Option<u64> {
        self.frames.get(key).copied()
    }

    /// Record `seq` as the last processed message of `key`.
    pub fn set(&mut self, key: FeedKey, seq: u64) {
        self.frames.insert(key, seq);
    }

    /// Record `seq` for `key` unless a later sequence is already present.
    pub fn advance(&mut self, key: FeedKey, seq: u64) {
        let entry = self.frames.entry(key).or_insert(seq);
        if *entry < seq {
            *entry = seq;
        }
    }

    /// Pointwise maximum of two timeframes.
    pub fn merge(&self, other: &Timeframe) -> Timeframe {
        let mut merged = self.clone();
        for (key, seq) in &other.frames {
            merged.advance(*key, *seq);
        }
        merged
    }

    /// Entries of `target` that `current` has not reached yet.
    ///
    /// An empty result means everything `target` depends on has been
    /// processed.
    pub fn dependencies(target: &Timeframe, current: &Timeframe) -> Timeframe {
        let frames = target
            .frames
            .iter()
            .filter(|(key, seq)| current.get(key).map_or(true, |have| have < **seq))
            .map(|(key, seq)| (*key, *seq))
            .collect();
        Timeframe { frames }
    }

    /// `true` when `self` has reached every entry of `target`.
    pub fn has_reached(&self, target: &Timeframe) -> bool {
        Self::dependencies(target, self).is_empty()
    }

    /// Number of messages covered by this timeframe across all feeds.
    /// Saturates rather than wrapping on hostile sequence numbers.
    pub fn total_messages(&self) -> u64 {
        self.frames
            .values()
            .fold(0u64, |total, seq| total.saturating_add(seq.saturating_add(1)))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Entries in feed key order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeedKey, &u64)> {
        self.frames.iter()
    }
}

impl FromIterator<(FeedKey, u64)> for Timeframe {
    fn from_iter<I: IntoIterator<Item = (FeedKey, u64)>>(iter: I) -> Self {
        let mut timeframe = Timeframe::new();
        for (key, seq) in iter {
            timeframe.advance(key, seq);
        }
        timeframe
    }
}

impl From<Vec<(FeedKey, u64)>> for Timeframe {
    fn from(entries: Vec<(FeedKey, u64)>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<Timeframe> for Vec<(FeedKey, u64)> {
    fn from(timeframe: Timeframe) -> Self {
        timeframe.frames.into_iter().collect()
    }
}

impl fmt::Debug for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timeframe(")?;
        for (i, (key, seq)) in self.frames.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", key.short_id(), seq)?;
        }
        write!(f, ")")
    }
}
