use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::envelope::FeedMessage;
use crate::error::{PipelineError, Result};

/// Serialization format for feed entries. `encode` and `decode` are inverses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Json,
    Bincode,
}

impl Codec {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json => {
                serde_json::to_vec(value).map_err(|e| PipelineError::Encode(e.to_string()))
            }
            Self::Bincode => {
                bincode::serialize(value).map_err(|e| PipelineError::Encode(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Self::Json => {
                serde_json::from_slice(data).map_err(|e| PipelineError::Decode(e.to_string()))
            }
            Self::Bincode => {
                bincode::deserialize(data).map_err(|e| PipelineError::Decode(e.to_string()))
            }
        }
    }

    /// Decode only the envelope, leaving the payload encoded.
    pub fn decode_envelope(&self, data: &[u8]) -> Result<FeedMessage> {
        self.decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_types::{PublicKey, Timeframe};

    fn envelope() -> FeedMessage {
        FeedMessage {
            timeframe: vec![(PublicKey::from_bytes([1; 32]), 4)].into(),
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn envelope_survives_both_codecs() {
        for codec in [Codec::Json, Codec::Bincode] {
            let bytes = codec.encode(&envelope()).unwrap();
            assert_eq!(codec.decode_envelope(&bytes).unwrap(), envelope());
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        for codec in [Codec::Json, Codec::Bincode] {
            let err = codec.decode_envelope(b"\xff").unwrap_err();
            assert!(matches!(err, PipelineError::Decode(_)), "{codec:?}: {err:?}");
        }
    }

    #[test]
    fn codecs_are_not_interchangeable() {
        let bytes = Codec::Bincode.encode(&envelope()).unwrap();
        assert!(Codec::Json.decode::<FeedMessage>(&bytes).is_err());
    }

    #[test]
    fn empty_timeframe_envelope() {
        let message = FeedMessage {
            timeframe: Timeframe::new(),
            payload: Vec::new(),
        };
        let bytes = Codec::Json.encode(&message).unwrap();
        assert_eq!(Codec::Json.decode_envelope(&bytes).unwrap(), message);
    }
}
