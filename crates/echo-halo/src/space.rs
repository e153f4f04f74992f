use serde::{Deserialize, Serialize};

use echo_pipeline::{MessageMeta, ObjectModel, ObjectMutation, StateMachine, StateMachineError};
use echo_types::PartyKey;

use crate::credential::Credential;
use crate::halo::HaloState;

/// Messages carried by a space's feeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceMessage {
    Credential(Credential),
    Mutation(ObjectMutation),
}

impl From<Credential> for SpaceMessage {
    fn from(credential: Credential) -> Self {
        Self::Credential(credential)
    }
}

impl From<ObjectMutation> for SpaceMessage {
    fn from(mutation: ObjectMutation) -> Self {
        Self::Mutation(mutation)
    }
}

/// Membership plus an object model writable only by admitted feeds.
#[derive(Clone, Debug)]
pub struct SpaceState {
    halo: HaloState,
    objects: ObjectModel,
}

impl SpaceState {
    pub fn new(party_key: PartyKey) -> Self {
        Self {
            halo: HaloState::new(party_key),
            objects: ObjectModel::new(),
        }
    }

    pub fn halo(&self) -> &HaloState {
        &self.halo
    }

    pub fn halo_mut(&mut self) -> &mut HaloState {
        &mut self.halo
    }

    pub fn objects(&self) -> &ObjectModel {
        &self.objects
    }
}

impl StateMachine for SpaceState {
    type Message = SpaceMessage;

    fn execute(
        &mut self,
        message: SpaceMessage,
        meta: &MessageMeta,
    ) -> Result<(), StateMachineError> {
        match message {
            SpaceMessage::Credential(credential) => self.halo.execute(credential, meta),
            SpaceMessage::Mutation(mutation) => {
                if !self.halo.is_feed_admitted(&meta.feed_key) {
                    return Err(StateMachineError::Unauthorized {
                        feed: meta.feed_key,
                    });
                }
                self.objects.execute(mutation, meta)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_pipeline::PropertyValue;
    use echo_types::{PublicKey, Timeframe};

    fn key(seed: u8) -> PublicKey {
        PublicKey::from_bytes([seed; 32])
    }

    fn meta(feed: u8, seq: u64) -> MessageMeta {
        MessageMeta {
            feed_key: key(feed),
            seq,
            timeframe: Timeframe::new(),
        }
    }

    fn founded() -> SpaceState {
        let mut space = SpaceState::new(key(1));
        space
            .execute(
                Credential::Genesis {
                    party_key: key(1),
                    identity_key: key(2),
                    feed_key: key(3),
                }
                .into(),
                &meta(3, 0),
            )
            .unwrap();
        space
    }

    #[test]
    fn admitted_feed_mutates_objects() {
        let mut space = founded();
        space
            .execute(ObjectMutation::set("x", "title", "Card 1").into(), &meta(3, 1))
            .unwrap();
        let object = space.objects().get_object("x").unwrap();
        assert_eq!(object.get("title"), Some(&PropertyValue::from("Card 1")));
    }

    #[test]
    fn unadmitted_feed_is_unauthorized() {
        let mut space = founded();
        let err = space
            .execute(ObjectMutation::set("x", "title", "Card 1").into(), &meta(9, 0))
            .unwrap_err();
        assert_eq!(err, StateMachineError::Unauthorized { feed: key(9) });
        assert!(space.objects().get_object("x").is_none());
    }

    #[test]
    fn credentials_reach_the_halo() {
        let mut space = founded();
        space
            .execute(
                Credential::Device { device_key: key(4) }.into(),
                &meta(3, 1),
            )
            .unwrap();
        assert!(space.halo().is_member(&key(4)));
    }
}
