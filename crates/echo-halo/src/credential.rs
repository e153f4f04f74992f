use serde::{Deserialize, Serialize};

use echo_types::{FeedKey, PartyKey, PublicKey};

/// Membership statements written into a party's feeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// Founds the party. Must be the first credential and must be written
    /// on `feed_key` itself.
    Genesis {
        party_key: PartyKey,
        identity_key: PublicKey,
        feed_key: FeedKey,
    },
    /// Names an admitted member.
    Identity {
        identity_key: PublicKey,
        display_name: String,
    },
    /// Admits a key (a device or another member's identity).
    Device { device_key: PublicKey },
    /// Admits a feed written by `owner`.
    Feed { feed_key: FeedKey, owner: PublicKey },
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Genesis { .. } => "genesis",
            Self::Identity { .. } => "identity",
            Self::Device { .. } => "device",
            Self::Feed { .. } => "feed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_pipeline::Codec;

    #[test]
    fn credentials_encode_with_both_codecs() {
        let credential = Credential::Feed {
            feed_key: PublicKey::from_bytes([1; 32]),
            owner: PublicKey::from_bytes([2; 32]),
        };
        for codec in [Codec::Json, Codec::Bincode] {
            let bytes = codec.encode(&credential).unwrap();
            assert_eq!(codec.decode::<Credential>(&bytes).unwrap(), credential);
        }
    }

    #[test]
    fn json_form_is_tagged_by_kind() {
        let credential = Credential::Device {
            device_key: PublicKey::from_bytes([3; 32]),
        };
        let json = String::from_utf8(Codec::Json.encode(&credential).unwrap()).unwrap();
        assert!(json.starts_with("{\"device\":"));
        assert_eq!(credential.kind(), "device");
    }
}
