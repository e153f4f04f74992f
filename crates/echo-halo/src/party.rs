use serde::Serialize;
use tracing::{debug, info};

use echo_feed::{replicate, FeedDescriptor, FeedRole, FeedStore};
use echo_pipeline::{
    ObjectModel, ObjectMutation, Pipeline, PipelineConfig, Processed, Processor, ProcessorStats,
    StateMachine, StopHandle, WriteReceipt,
};
use echo_types::{FeedKey, KeyPair, PartyKey, PublicKey, Timeframe};

use crate::credential::Credential;
use crate::error::{HaloError, HaloResult};
use crate::halo::HaloState;
use crate::space::{SpaceMessage, SpaceState};

/// State folded by a [`Party`]: membership plus whatever else it carries.
pub trait PartyState: StateMachine {
    fn for_party(party_key: PartyKey) -> Self;

    fn halo(&self) -> &HaloState;

    fn halo_mut(&mut self) -> &mut HaloState;

    /// Wrap a credential as a message of this state machine.
    fn credential(credential: Credential) -> Self::Message;
}

impl PartyState for HaloState {
    fn for_party(party_key: PartyKey) -> Self {
        HaloState::new(party_key)
    }

    fn halo(&self) -> &HaloState {
        self
    }

    fn halo_mut(&mut self) -> &mut HaloState {
        self
    }

    fn credential(credential: Credential) -> Credential {
        credential
    }
}

impl PartyState for SpaceState {
    fn for_party(party_key: PartyKey) -> Self {
        SpaceState::new(party_key)
    }

    fn halo(&self) -> &HaloState {
        SpaceState::halo(self)
    }

    fn halo_mut(&mut self) -> &mut HaloState {
        SpaceState::halo_mut(self)
    }

    fn credential(credential: Credential) -> SpaceMessage {
        SpaceMessage::Credential(credential)
    }
}

/// What a peer needs to join an existing party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Invitation {
    pub party_key: PartyKey,
    pub genesis_feed: FeedKey,
}

/// One peer's view of a party.
///
/// Owns the peer's feed store, the party pipeline and the primary
/// processor. Feeds admitted by credentials are opened from the store and
/// added to the pipeline as soon as the credential is processed.
pub struct Party<S> {
    party_key: PartyKey,
    identity_key: PublicKey,
    genesis_feed: FeedKey,
    store: FeedStore,
    pipeline: Pipeline,
    processor: Processor<S>,
}

/// A party carrying only membership.
pub type Halo = Party<HaloState>;

/// A party carrying membership and shared objects.
pub type Space = Party<SpaceState>;

impl<S> Party<S>
where
    S: PartyState,
    S::Message: Serialize,
{
    /// Found a new party whose genesis feed is this peer's writable feed.
    pub fn create(
        store: FeedStore,
        config: PipelineConfig,
        identity_key: PublicKey,
    ) -> HaloResult<Self> {
        let party_key = KeyPair::generate().public_key();
        let feed = store.create_writable(&KeyPair::generate())?;
        let feed_key = feed.key();

        let mut pipeline = Pipeline::new(config)?;
        pipeline.set_writable_feed(feed, FeedRole::Genesis)?;
        let processor = pipeline.processor(S::for_party(party_key));

        let mut party = Self {
            party_key,
            identity_key,
            genesis_feed: feed_key,
            store,
            pipeline,
            processor,
        };
        party.pipeline.writer()?.write(&S::credential(Credential::Genesis {
            party_key,
            identity_key,
            feed_key,
        }))?;
        party.process_pending()?;
        info!(party = %party_key, feed = %feed_key, "party created");
        Ok(party)
    }

    /// Join an existing party. The new writable feed becomes usable once a
    /// member admits it with [`Party::admit_member`].
    pub fn join(
        store: FeedStore,
        config: PipelineConfig,
        invitation: &Invitation,
        identity_key: PublicKey,
    ) -> HaloResult<Self> {
        let feed = store.create_writable(&KeyPair::generate())?;
        let genesis = store.open_replica(invitation.genesis_feed)?;

        let mut pipeline = Pipeline::new(config)?;
        pipeline.set_writable_feed(feed, FeedRole::Writable)?;
        pipeline.add_feed(FeedDescriptor::genesis(genesis.readable()))?;
        let processor = pipeline.processor(S::for_party(invitation.party_key));

        info!(party = %invitation.party_key, "joining party");
        Ok(Self {
            party_key: invitation.party_key,
            identity_key,
            genesis_feed: invitation.genesis_feed,
            store,
            pipeline,
            processor,
        })
    }

    pub fn party_key(&self) -> PartyKey {
        self.party_key
    }

    pub fn identity_key(&self) -> PublicKey {
        self.identity_key
    }

    pub fn genesis_feed(&self) -> FeedKey {
        self.genesis_feed
    }

    /// This peer's writable feed.
    pub fn feed_key(&self) -> HaloResult<FeedKey> {
        Ok(self.pipeline.writer()?.key())
    }

    pub fn invitation(&self) -> Invitation {
        Invitation {
            party_key: self.party_key,
            genesis_feed: self.genesis_feed,
        }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> &S {
        self.processor.state()
    }

    pub fn halo(&self) -> &HaloState {
        self.processor.state().halo()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.processor.stats()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.pipeline.clock().timeframe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.processor.stop_handle()
    }

    /// Whether this peer's writable feed has been admitted.
    pub fn is_admitted(&self) -> HaloResult<bool> {
        Ok(self.halo().is_feed_admitted(&self.feed_key()?))
    }

    /// Append a message to this peer's feed. Refused until the feed is
    /// admitted, since other members would reject it.
    pub fn write(&self, message: &S::Message) -> HaloResult<WriteReceipt> {
        let writer = self.pipeline.writer()?;
        if !self.halo().is_feed_admitted(&writer.key()) {
            return Err(HaloError::NotAdmitted { feed: writer.key() });
        }
        Ok(writer.write(message)?)
    }

    pub fn write_credential(&self, credential: Credential) -> HaloResult<WriteReceipt> {
        debug!(kind = credential.kind(), "writing credential");
        self.write(&S::credential(credential))
    }

    /// Admit another member's identity together with its writable feed.
    pub fn admit_member(&self, identity_key: PublicKey, feed_key: FeedKey) -> HaloResult<()> {
        self.write_credential(Credential::Device {
            device_key: identity_key,
        })?;
        self.admit_feed(feed_key, identity_key)?;
        Ok(())
    }

    /// Admit a feed for an existing member.
    pub fn admit_feed(&self, feed_key: FeedKey, owner: PublicKey) -> HaloResult<WriteReceipt> {
        self.write_credential(Credential::Feed { feed_key, owner })
    }

    pub fn set_display_name(&self, display_name: impl Into<String>) -> HaloResult<WriteReceipt> {
        self.write_credential(Credential::Identity {
            identity_key: self.identity_key,
            display_name: display_name.into(),
        })
    }

    /// Process everything ready now, opening feeds as they are admitted.
    /// Returns the number of messages delivered.
    pub fn process_pending(&mut self) -> HaloResult<usize> {
        let mut total = 0;
        loop {
            let delivered = self.processor.drain()?;
            let opened = self.open_admitted_feeds()?;
            total += delivered;
            if delivered == 0 && opened == 0 {
                return Ok(total);
            }
        }
    }

    /// Like [`Party::process_pending`], yielding to the runtime between
    /// rounds so that concurrent writers and replicators can make progress.
    pub async fn run_until_idle(&mut self) -> HaloResult<usize> {
        let mut total = 0;
        loop {
            let delivered = self.process_pending()?;
            total += delivered;
            tokio::task::yield_now().await;
            if delivered == 0 {
                return Ok(total);
            }
        }
    }

    /// Wait for and process the next message. `None` once stopped.
    pub async fn next(&mut self) -> HaloResult<Option<Processed>> {
        let processed = self.processor.next().await?;
        self.open_admitted_feeds()?;
        Ok(processed)
    }

    /// Copy every feed `other` orders into this peer's store. Feeds not yet
    /// admitted here stay in the store until a credential admits them.
    pub fn replicate_from<T>(&self, other: &Party<T>) -> HaloResult<u64> {
        let own = self.feed_key()?;
        let mut copied = 0;
        for descriptor in other.pipeline.feed_set().list_descriptors()? {
            let key = descriptor.key();
            if key == own {
                continue;
            }
            let replica = match self.store.open_replica(key) {
                Ok(replica) => replica,
                Err(echo_feed::FeedError::LocalFeed(key)) => return Err(HaloError::OwnFeed(key)),
                Err(err) => return Err(err.into()),
            };
            copied += replicate(descriptor.feed(), &replica)?;
        }
        Ok(copied)
    }

    fn open_admitted_feeds(&mut self) -> HaloResult<usize> {
        let admitted = self.processor.state_mut().halo_mut().take_admitted_feeds();
        let mut opened = 0;
        for key in admitted {
            if self.pipeline.feed_set().contains(&key)? {
                continue;
            }
            let replica = self.store.open_replica(key)?;
            if self
                .pipeline
                .add_feed(FeedDescriptor::readable(replica.readable()))?
            {
                debug!(party = %self.party_key, feed = %key, "admitted feed opened");
                opened += 1;
            }
        }
        Ok(opened)
    }
}

impl Party<SpaceState> {
    pub fn objects(&self) -> &ObjectModel {
        self.state().objects()
    }

    pub fn mutate(&self, mutation: ObjectMutation) -> HaloResult<WriteReceipt> {
        self.write(&SpaceMessage::Mutation(mutation))
    }
}
