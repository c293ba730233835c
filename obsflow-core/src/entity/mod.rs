//! Entity model for pipeline messages
//!
//! Every message in the transform graph is an [`Entity`]: a named record with
//! a property map and an optional default value. The `name` is the runtime
//! variant tag; guards dispatch on it against a static supertype table
//! instead of downcasting concrete types.

mod factory;
mod value;

pub use factory::{EntityFactory, FactoryRegistry};
pub use value::{Value, ValueTag};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::time::Timestamp;

/// Entity type names used by the pipeline
///
/// Names are the runtime variant tags guards match on; the supertype
/// relation over them lives in [`crate::pipeline::guard`].
pub mod names {
    /// Root of the supertype table; every entity is an `Entity`
    pub const ENTITY: &str = "Entity";
    /// Raw token batch from a line-oriented adapter
    pub const TIMESTAMPED: &str = "Timestamped";
    /// Container of mapped observations, one batch per input
    pub const OBSERVATIONS: &str = "Observations";
    /// Abstract observation supertype
    pub const OBSERVATION: &str = "Observation";
    pub const SAMPLE: &str = "Sample";
    pub const EVENT: &str = "Event";
    pub const CONDITION: &str = "Condition";
    pub const DATA_SET: &str = "DataSet";
    pub const TIME_SERIES: &str = "TimeSeries";
    pub const TABLE: &str = "Table";
    pub const ASSET: &str = "Asset";
    pub const ASSET_COMMAND: &str = "AssetCommand";
    pub const COMMAND: &str = "Command";
    pub const CONNECT_STATUS: &str = "ConnectStatus";
    /// Per-observation validation failure attached to a batch
    pub const ERROR: &str = "Error";
    /// Nested entries of a data-set or table observation
    pub const ENTRIES: &str = "Entries";
}

/// Well-known property keys
pub mod properties {
    pub const DATA_ITEM_ID: &str = "dataItemId";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SEQUENCE: &str = "sequence";
    pub const SUB_TYPE: &str = "subType";
    pub const ERRORS: &str = "errors";
    pub const SAMPLE_COUNT: &str = "sampleCount";
    pub const SAMPLE_RATE: &str = "sampleRate";
}

/// A named, typed bundle of properties flowing through the pipeline
///
/// Equality covers the name, the property mapping (key set and pairwise
/// value equality) and the default value; the associated factory is an
/// implementation detail and does not participate.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    name: String,
    properties: HashMap<String, Value>,
    value: Value,
    factory: Option<Arc<EntityFactory>>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.properties == other.properties
    }
}

impl Entity {
    /// Creates an entity with no associated factory
    ///
    /// Property writes on such an entity are unchecked; use
    /// [`EntityFactory::make`] when declared property tags should be
    /// enforced.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            value: Value::Absent,
            factory: None,
        }
    }

    pub(crate) fn with_factory(name: impl Into<String>, factory: Arc<EntityFactory>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            value: Value::Absent,
            factory: Some(factory),
        }
    }

    /// The entity's variant name (e.g. `"Sample"`, `"Timestamped"`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The factory this entity was created by, if any
    pub fn factory(&self) -> Option<&Arc<EntityFactory>> {
        self.factory.as_ref()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Reads a named property
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Writes a named property, enforcing the factory's declared tag
    ///
    /// Fails with [`PipelineError::TypeMismatch`] when an associated factory
    /// declares a different variant tag for the property. `Absent` is always
    /// accepted. Entities without a factory accept any write.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> PipelineResult<()> {
        let key = key.into();
        if let Some(factory) = &self.factory {
            if let Some(expected) = factory.property_tag(&key) {
                let actual = value.tag();
                if actual != expected && actual != ValueTag::Absent {
                    return Err(PipelineError::TypeMismatch {
                        property: key,
                        expected: expected.name(),
                        actual: actual.name(),
                    });
                }
            }
        }
        self.properties.insert(key, value);
        Ok(())
    }

    /// Builder-style property write, bypassing factory checks
    ///
    /// Intended for constructing well-known message shapes where the tags
    /// are correct by construction.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Iterates properties in arbitrary order
    pub fn each_property(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of set properties
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    // ------------------------------------------------------------------
    // Default value
    // ------------------------------------------------------------------

    /// The entity's default value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replaces the default value
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Builder-style default value
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Typed view of the default value as an entity list
    pub fn value_as_list(&self) -> Option<&[Entity]> {
        self.value.as_list()
    }

    /// Consumes the entity, returning the default value's entity list
    pub fn into_list(self) -> Option<Vec<Entity>> {
        match self.value {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Observation accessors
    // ------------------------------------------------------------------

    /// `dataItemId` property of an observation
    pub fn data_item_id(&self) -> Option<&str> {
        self.property(properties::DATA_ITEM_ID).and_then(Value::as_str)
    }

    /// `timestamp` property of an observation or token batch
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.property(properties::TIMESTAMP)
            .and_then(Value::as_timestamp)
    }

    /// `sequence` property stamped at delivery
    pub fn sequence(&self) -> Option<u64> {
        self.property(properties::SEQUENCE).and_then(Value::as_u64)
    }

    // ------------------------------------------------------------------
    // Message constructors
    // ------------------------------------------------------------------

    /// Builds a `Timestamped` token batch as a line-oriented adapter would
    ///
    /// The tokens ride in the default value as the raw `|`-separated
    /// payload; the token mapper re-tokenizes on receipt.
    pub fn timestamped<I, S>(timestamp: Timestamp, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let payload = tokens
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("|");
        Entity::new(names::TIMESTAMPED)
            .with_property(properties::TIMESTAMP, Value::Timestamp(timestamp))
            .with_value(Value::String(payload))
    }

    /// Builds a `ConnectStatus` control-plane message
    pub fn connect_status(status: impl Into<String>) -> Self {
        Entity::new(names::CONNECT_STATUS).with_value(Value::String(status.into()))
    }

    /// Builds an agent `Command` message (`* key: value` on the wire)
    pub fn command(key: impl Into<String>, value: impl Into<String>) -> Self {
        Entity::new(names::COMMAND)
            .with_property("command", Value::String(key.into()))
            .with_value(Value::String(value.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_property_round_trip() {
        let mut entity = Entity::new(names::SAMPLE);
        entity
            .set_property(properties::DATA_ITEM_ID, Value::String("a".into()))
            .unwrap();
        assert_eq!(entity.data_item_id(), Some("a"));
        assert_eq!(entity.property("missing"), None);
    }

    #[test]
    fn test_equality_ignores_property_order() {
        let a = Entity::new("X")
            .with_property("p", Value::Int(1))
            .with_property("q", Value::Int(2));
        let b = Entity::new("X")
            .with_property("q", Value::Int(2))
            .with_property("p", Value::Int(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_covers_name_and_value() {
        let a = Entity::new("X").with_value(Value::Double(1.5));
        let b = Entity::new("Y").with_value(Value::Double(1.5));
        let c = Entity::new("X").with_value(Value::Double(1.6));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_list_order_matters() {
        let one = Entity::new("A").with_value(Value::Int(1));
        let two = Entity::new("A").with_value(Value::Int(2));
        let forward = Entity::new("L").with_value(Value::List(vec![one.clone(), two.clone()]));
        let reversed = Entity::new("L").with_value(Value::List(vec![two, one]));
        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_timestamped_payload() {
        let now = Utc::now();
        let batch = Entity::timestamped(now, ["a", "1.5", "b", "ACTIVE"]);
        assert_eq!(batch.name(), names::TIMESTAMPED);
        assert_eq!(batch.timestamp(), Some(now));
        assert_eq!(batch.value().as_str(), Some("a|1.5|b|ACTIVE"));
    }

    #[test]
    fn test_unchecked_entity_accepts_any_write() {
        let mut entity = Entity::new("Loose");
        entity.set_property("anything", Value::Vector(vec![1.0])).unwrap();
        entity.set_property("anything", Value::Bool(false)).unwrap();
        assert_eq!(entity.property("anything"), Some(&Value::Bool(false)));
    }
}
