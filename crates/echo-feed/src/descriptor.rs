use std::fmt;

use echo_types::FeedKey;

use crate::feed::ReadableFeed;

/// Role a feed plays within a party. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeedRole {
    /// The party's first feed, carrying its genesis credential.
    Genesis,
    /// This peer's own writable feed.
    Writable,
    /// A feed written by another peer or device.
    Readable,
}

impl fmt::Display for FeedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Genesis => "genesis",
            Self::Writable => "writable",
            Self::Readable => "readable",
        };
        write!(f, "{s}")
    }
}

/// A feed together with its role in a party.
#[derive(Clone, Debug)]
pub struct FeedDescriptor {
    role: FeedRole,
    feed: ReadableFeed,
}

impl FeedDescriptor {
    pub fn new(role: FeedRole, feed: ReadableFeed) -> Self {
        Self { role, feed }
    }

    pub fn genesis(feed: ReadableFeed) -> Self {
        Self::new(FeedRole::Genesis, feed)
    }

    pub fn writable(feed: ReadableFeed) -> Self {
        Self::new(FeedRole::Writable, feed)
    }

    pub fn readable(feed: ReadableFeed) -> Self {
        Self::new(FeedRole::Readable, feed)
    }

    pub fn key(&self) -> FeedKey {
        self.feed.key()
    }

    pub fn role(&self) -> FeedRole {
        self.role
    }

    pub fn feed(&self) -> &ReadableFeed {
        &self.feed
    }
}
