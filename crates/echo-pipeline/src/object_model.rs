use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StateMachineError;
use crate::state_machine::{MessageMeta, StateMachine};

/// Value of an object property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Upsert of one property, or deletion of a whole object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMutation {
    pub object_id: String,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub value: Option<PropertyValue>,
    #[serde(default)]
    pub deleted: bool,
}

impl ObjectMutation {
    pub fn set(
        object_id: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            property: Some(property.into()),
            value: Some(value.into()),
            deleted: false,
        }
    }

    pub fn delete(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            property: None,
            value: None,
            deleted: true,
        }
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Objects as property bags keyed by object id.
///
/// The last delivered write to a property wins. Writes to distinct
/// `(object, property)` pairs commute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectModel {
    objects: BTreeMap<String, Properties>,
}

impl ObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_objects(&self) -> &BTreeMap<String, Properties> {
        &self.objects
    }

    pub fn get_object(&self, object_id: &str) -> Option<&Properties> {
        self.objects.get(object_id)
    }

    /// Apply a mutation regardless of who wrote it.
    pub fn apply(&mut self, mutation: ObjectMutation) -> Result<(), StateMachineError> {
        if mutation.object_id.is_empty() {
            return Err(StateMachineError::InvalidMessage(
                "mutation without object id".into(),
            ));
        }
        if mutation.deleted {
            self.objects.remove(&mutation.object_id);
            return Ok(());
        }
        let property = mutation.property.ok_or_else(|| {
            StateMachineError::InvalidMessage(format!(
                "mutation of {} names no property",
                mutation.object_id
            ))
        })?;
        self.objects
            .entry(mutation.object_id)
            .or_default()
            .insert(property, mutation.value.unwrap_or(PropertyValue::Null));
        Ok(())
    }
}

impl StateMachine for ObjectModel {
    type Message = ObjectMutation;

    fn execute(
        &mut self,
        message: ObjectMutation,
        _meta: &MessageMeta,
    ) -> Result<(), StateMachineError> {
        self.apply(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_types::{PublicKey, Timeframe};
    use proptest::prelude::*;

    fn meta() -> MessageMeta {
        MessageMeta {
            feed_key: PublicKey::from_bytes([1; 32]),
            seq: 0,
            timeframe: Timeframe::new(),
        }
    }

    #[test]
    fn upsert_then_delete_removes_object() {
        let mut model = ObjectModel::new();
        model
            .execute(ObjectMutation::set("x", "title", "Card 1"), &meta())
            .unwrap();
        assert_eq!(
            model.get_object("x").unwrap().get("title"),
            Some(&PropertyValue::from("Card 1"))
        );

        model.execute(ObjectMutation::delete("x"), &meta()).unwrap();
        assert!(!model.get_objects().contains_key("x"));
    }

    #[test]
    fn last_write_to_same_property_wins() {
        let mut model = ObjectModel::new();
        model.apply(ObjectMutation::set("x", "n", 1i64)).unwrap();
        model.apply(ObjectMutation::set("x", "n", 2i64)).unwrap();
        assert_eq!(
            model.get_object("x").unwrap().get("n"),
            Some(&PropertyValue::Integer(2))
        );
    }

    #[test]
    fn missing_property_is_invalid() {
        let mut model = ObjectModel::new();
        let mutation = ObjectMutation {
            object_id: "x".into(),
            property: None,
            value: None,
            deleted: false,
        };
        assert!(matches!(
            model.apply(mutation),
            Err(StateMachineError::InvalidMessage(_))
        ));
        assert!(model.get_objects().is_empty());
    }

    #[test]
    fn missing_value_stores_null() {
        let mut model = ObjectModel::new();
        model
            .apply(ObjectMutation {
                object_id: "x".into(),
                property: Some("p".into()),
                value: None,
                deleted: false,
            })
            .unwrap();
        assert_eq!(
            model.get_object("x").unwrap().get("p"),
            Some(&PropertyValue::Null)
        );
    }

    #[test]
    fn delete_only_json_decodes() {
        let mutation: ObjectMutation =
            serde_json::from_str(r#"{"object_id":"x","deleted":true}"#).unwrap();
        assert_eq!(mutation, ObjectMutation::delete("x"));
    }

    proptest! {
        /// Any interleaving of writes to distinct (object, property) pairs
        /// produces the same model.
        #[test]
        fn distinct_pairs_commute(
            writes in proptest::collection::btree_map((0u8..4, 0u8..4), any::<i64>(), 0..12),
            shuffle_seed in any::<u64>(),
        ) {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;

            let mutations: Vec<ObjectMutation> = writes
                .iter()
                .map(|((o, p), v)| ObjectMutation::set(format!("o{o}"), format!("p{p}"), *v))
                .collect();
            let mut shuffled = mutations.clone();
            shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(shuffle_seed));

            let mut in_order = ObjectModel::new();
            for m in mutations {
                in_order.apply(m).unwrap();
            }
            let mut reordered = ObjectModel::new();
            for m in shuffled {
                reordered.apply(m).unwrap();
            }
            prop_assert_eq!(in_order, reordered);
        }
    }
}
