//! Entity factories and the factory registry
//!
//! A factory declares the property tags and serialization order of one
//! entity type. Factories can reference one another (an observation
//! container's children are made by the observation factories), and that
//! graph may be cyclic in principle; ownership stays acyclic because
//! factories hold *names* and resolve them through the [`FactoryRegistry`]
//! rather than owning each other.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{names, properties, Entity, ValueTag};

/// Declares the shape of one entity type
///
/// Property tags are enforced by [`Entity::set_property`]; properties not
/// declared here are accepted with any tag. The declaration order of
/// properties is the serialization order.
#[derive(Debug)]
pub struct EntityFactory {
    name: String,
    property_tags: HashMap<String, ValueTag>,
    order: Vec<String>,
}

impl EntityFactory {
    /// Creates a factory for the named entity type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_tags: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Declares a property with a required variant tag
    pub fn property(mut self, key: impl Into<String>, tag: ValueTag) -> Self {
        let key = key.into();
        if self.property_tags.insert(key.clone(), tag).is_none() {
            self.order.push(key);
        }
        self
    }

    /// The entity type name this factory produces
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared tag for a property, if any
    pub fn property_tag(&self, key: &str) -> Option<ValueTag> {
        self.property_tags.get(key).copied()
    }

    /// Declared properties in serialization order
    pub fn property_order(&self) -> &[String] {
        &self.order
    }

    /// Creates an empty entity bound to this factory
    ///
    /// Subsequent [`Entity::set_property`] calls are checked against the
    /// declared tags.
    pub fn make(self: &Arc<Self>) -> Entity {
        Entity::with_factory(self.name.clone(), Arc::clone(self))
    }
}

/// Registry of entity factories keyed by type name
///
/// Lookup by name is the only way factories reference one another, which
/// keeps the factory graph free of ownership cycles.
#[derive(Debug, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<EntityFactory>>,
}

impl FactoryRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous registration of the name
    pub fn register(&mut self, factory: EntityFactory) -> Arc<EntityFactory> {
        let factory = Arc::new(factory);
        self.factories
            .insert(factory.name().to_string(), Arc::clone(&factory));
        factory
    }

    /// Finds a factory by entity type name
    pub fn find(&self, name: &str) -> Option<Arc<EntityFactory>> {
        self.factories.get(name).cloned()
    }

    /// Creates an entity through the named factory
    ///
    /// Falls back to an unchecked [`Entity::new`] when the name is not
    /// registered.
    pub fn make(&self, name: &str) -> Entity {
        match self.find(name) {
            Some(factory) => factory.make(),
            None => Entity::new(name),
        }
    }

    /// Registry pre-populated with the pipeline's message shapes
    pub fn defaults() -> Self {
        let mut registry = Self::new();

        registry.register(
            EntityFactory::new(names::TIMESTAMPED)
                .property(properties::TIMESTAMP, ValueTag::Timestamp),
        );
        registry.register(
            EntityFactory::new(names::OBSERVATIONS)
                .property(properties::TIMESTAMP, ValueTag::Timestamp)
                .property(properties::ERRORS, ValueTag::List),
        );

        for observation in [
            names::SAMPLE,
            names::EVENT,
            names::CONDITION,
            names::DATA_SET,
            names::TABLE,
        ] {
            registry.register(observation_factory(observation));
        }
        registry.register(
            observation_factory(names::TIME_SERIES)
                .property(properties::SAMPLE_COUNT, ValueTag::UInt)
                .property(properties::SAMPLE_RATE, ValueTag::Double),
        );

        registry.register(
            EntityFactory::new(names::ASSET)
                .property("assetId", ValueTag::String)
                .property("type", ValueTag::String)
                .property(properties::TIMESTAMP, ValueTag::Timestamp),
        );
        registry.register(
            EntityFactory::new(names::ASSET_COMMAND).property("assetId", ValueTag::String),
        );
        registry.register(
            EntityFactory::new(names::COMMAND).property("command", ValueTag::String),
        );
        registry.register(EntityFactory::new(names::CONNECT_STATUS));
        registry.register(
            EntityFactory::new(names::ERROR)
                .property(properties::DATA_ITEM_ID, ValueTag::String)
                .property("property", ValueTag::String),
        );

        registry
    }
}

fn observation_factory(name: &str) -> EntityFactory {
    EntityFactory::new(name)
        .property(properties::DATA_ITEM_ID, ValueTag::String)
        .property(properties::TIMESTAMP, ValueTag::Timestamp)
        .property(properties::SEQUENCE, ValueTag::UInt)
        .property(properties::SUB_TYPE, ValueTag::String)
}
