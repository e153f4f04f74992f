//! Cross-feed message ordering for the ECHO pipeline.
//!
//! This crate is the heart of ECHO. It provides:
//! - [`MessageIterator`], which merges every feed of a [`FeedSet`] into one
//!   stream while preserving per-feed order
//! - Pluggable [`FeedSelector`] policies deciding the cross-feed interleaving
//! - [`Pipeline`], binding a feed set to the local writable feed
//! - The [`StateMachine`] contract plus the [`Accumulator`] and
//!   [`ObjectModel`] folds
//! - [`Processor`], which drives one state machine from one iterator and
//!   isolates per-message failures
//! - Pipeline control: pause, re-seek, target timeframes and stall reports
//!
//! [`FeedSet`]: echo_feed::FeedSet

pub mod accumulator;
pub mod clock;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod iterator;
pub mod object_model;
pub mod pipeline;
pub mod processor;
pub mod selector;
pub mod state_machine;

pub use accumulator::{Accumulator, AccumulatorMessage, Operation};
pub use clock::TimeframeClock;
pub use codec::Codec;
pub use config::PipelineConfig;
pub use envelope::{FeedBlock, FeedMessage};
pub use error::{PipelineError, Result, StateMachineError};
pub use iterator::{MessageIterator, PauseHandle, StallSignal, StopHandle};
pub use object_model::{ObjectModel, ObjectMutation, PropertyValue};
pub use pipeline::{FeedWriter, Pipeline, TargetStatus, WriteReceipt};
pub use processor::{Outcome, Processed, Processor, ProcessorStats};
pub use selector::{
    Candidate, FeedKeySelector, FeedSelector, RandomSelector, SelectorKind, TimeframeSelector,
};
pub use state_machine::{MessageMeta, StateMachine};
