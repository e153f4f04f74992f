//! Foundation types for the ECHO pipeline.
//!
//! Every other ECHO crate depends on `echo-types`.
//!
//! # Key Types
//!
//! - [`PublicKey`]: Opaque, ordered 32-byte identity for feeds, devices and parties
//! - [`KeyPair`]: Ed25519 key pair whose public half names a writable feed
//! - [`Timeframe`]: Vector clock of the last processed sequence per feed

pub mod error;
pub mod key;
pub mod keypair;
pub mod timeframe;

pub use error::TypeError;
pub use key::{FeedKey, PartyKey, PublicKey};
pub use keypair::KeyPair;
pub use timeframe::Timeframe;
