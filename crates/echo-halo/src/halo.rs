use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use echo_pipeline::{MessageMeta, StateMachine, StateMachineError};
use echo_types::{FeedKey, PartyKey, PublicKey};

use crate::credential::Credential;

/// Membership view of one party, folded from its credentials.
///
/// The genesis credential admits the founder's identity and the genesis
/// feed. Every later credential must arrive on an admitted feed. Feeds
/// admitted here are queued until the owning party opens them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaloState {
    party_key: PartyKey,
    genesis_feed: Option<FeedKey>,
    members: BTreeSet<PublicKey>,
    feeds: BTreeMap<FeedKey, PublicKey>,
    admitted_by: BTreeMap<PublicKey, FeedKey>,
    display_names: BTreeMap<PublicKey, String>,
    pending: Vec<FeedKey>,
}

impl HaloState {
    pub fn new(party_key: PartyKey) -> Self {
        Self {
            party_key,
            genesis_feed: None,
            members: BTreeSet::new(),
            feeds: BTreeMap::new(),
            admitted_by: BTreeMap::new(),
            display_names: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn party_key(&self) -> PartyKey {
        self.party_key
    }

    pub fn genesis_feed(&self) -> Option<FeedKey> {
        self.genesis_feed
    }

    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.members.contains(key)
    }

    pub fn is_feed_admitted(&self, feed: &FeedKey) -> bool {
        self.feeds.contains_key(feed)
    }

    pub fn members(&self) -> impl Iterator<Item = &PublicKey> {
        self.members.iter()
    }

    /// Admitted feeds with their owners.
    pub fn feeds(&self) -> impl Iterator<Item = (&FeedKey, &PublicKey)> {
        self.feeds.iter()
    }

    pub fn feed_owner(&self, feed: &FeedKey) -> Option<PublicKey> {
        self.feeds.get(feed).copied()
    }

    /// Feed that carried the credential admitting `key` (a member or a feed).
    pub fn admitted_by(&self, key: &PublicKey) -> Option<FeedKey> {
        self.admitted_by.get(key).copied()
    }

    pub fn display_name(&self, key: &PublicKey) -> Option<&str> {
        self.display_names.get(key).map(String::as_str)
    }

    /// Feeds admitted since the last call, in admission order.
    pub fn take_admitted_feeds(&mut self) -> Vec<FeedKey> {
        std::mem::take(&mut self.pending)
    }

    fn require_admitted(&self, meta: &MessageMeta) -> Result<(), StateMachineError> {
        if self.genesis_feed.is_none() {
            return Err(StateMachineError::Rejected(
                "party has no genesis credential".into(),
            ));
        }
        if !self.is_feed_admitted(&meta.feed_key) {
            return Err(StateMachineError::Unauthorized {
                feed: meta.feed_key,
            });
        }
        Ok(())
    }

    fn genesis(
        &mut self,
        party_key: PartyKey,
        identity_key: PublicKey,
        feed_key: FeedKey,
        meta: &MessageMeta,
    ) -> Result<(), StateMachineError> {
        if self.genesis_feed.is_some() {
            return Err(StateMachineError::Rejected(
                "party already has a genesis credential".into(),
            ));
        }
        if party_key != self.party_key {
            return Err(StateMachineError::InvalidMessage(format!(
                "genesis for party {party_key}, expected {}",
                self.party_key
            )));
        }
        if feed_key != meta.feed_key {
            return Err(StateMachineError::Unauthorized {
                feed: meta.feed_key,
            });
        }
        self.genesis_feed = Some(feed_key);
        self.members.insert(identity_key);
        self.admitted_by.insert(identity_key, feed_key);
        self.feeds.insert(feed_key, identity_key);
        self.admitted_by.insert(feed_key, feed_key);
        info!(party = %party_key, founder = %identity_key, "party founded");
        Ok(())
    }
}

impl StateMachine for HaloState {
    type Message = Credential;

    fn execute(
        &mut self,
        credential: Credential,
        meta: &MessageMeta,
    ) -> Result<(), StateMachineError> {
        match credential {
            Credential::Genesis {
                party_key,
                identity_key,
                feed_key,
            } => return self.genesis(party_key, identity_key, feed_key, meta),
            Credential::Identity {
                identity_key,
                display_name,
            } => {
                self.require_admitted(meta)?;
                if !self.is_member(&identity_key) {
                    return Err(StateMachineError::Rejected(format!(
                        "{identity_key} is not a member"
                    )));
                }
                self.display_names.insert(identity_key, display_name);
            }
            Credential::Device { device_key } => {
                self.require_admitted(meta)?;
                if self.members.insert(device_key) {
                    self.admitted_by.insert(device_key, meta.feed_key);
                    debug!(key = %device_key, by = %meta.feed_key, "key admitted");
                }
            }
            Credential::Feed { feed_key, owner } => {
                self.require_admitted(meta)?;
                if !self.is_member(&owner) {
                    return Err(StateMachineError::Rejected(format!(
                        "feed owner {owner} is not a member"
                    )));
                }
                if !self.feeds.contains_key(&feed_key) {
                    self.feeds.insert(feed_key, owner);
                    self.admitted_by.insert(feed_key, meta.feed_key);
                    self.pending.push(feed_key);
                    debug!(feed = %feed_key, %owner, by = %meta.feed_key, "feed admitted");
                }
            }
        }
        Ok(())
    }
}
