//! Append-only feeds for the ECHO pipeline.
//!
//! A feed is a single-writer log of opaque messages. This crate provides:
//! - [`FeedStore`], the per-peer arena of feeds keyed by [`FeedKey`]
//! - Typed handles: [`WritableFeed`] (the only way to append),
//!   [`ReadableFeed`] and [`FeedReplica`] (the transport's ingest side)
//! - [`FeedDescriptor`] and [`FeedSet`], the membership of one party
//! - [`FeedEvent`] notifications published on every append and admission
//!
//! [`FeedKey`]: echo_types::FeedKey

pub mod descriptor;
pub mod error;
pub mod event;
pub mod feed;
pub mod set;
pub mod store;

pub use descriptor::{FeedDescriptor, FeedRole};
pub use error::{FeedError, Result};
pub use event::{EventStream, FeedEvent};
pub use feed::{replicate, FeedReplica, ReadableFeed, WritableFeed};
pub use set::FeedSet;
pub use store::FeedStore;
