//! Party membership and shared spaces for ECHO.
//!
//! A party is a set of feeds admitted through credentials written into the
//! party's own pipeline. [`HaloState`] folds those credentials into the
//! membership view, [`SpaceState`] adds an object model guarded by it, and
//! [`Party`] ties a feed store, pipeline and processor together so that
//! newly admitted feeds are opened and ordered automatically.

pub mod credential;
pub mod error;
pub mod halo;
pub mod party;
pub mod space;

pub use credential::Credential;
pub use error::{HaloError, HaloResult};
pub use halo::HaloState;
pub use party::{Halo, Invitation, Party, PartyState, Space};
pub use space::{SpaceMessage, SpaceState};
