//! SHDR token stream mapping
//!
//! Line-oriented adapters deliver batches of flat tokens:
//!
//! ```text
//! 2024-01-15T09:30:00.123Z|x1|1.5|ex|ACTIVE
//! ```
//!
//! [`parse_line`] turns one wire line into a `Timestamped` entity;
//! [`ShdrTokenMapper`] consumes `Timestamped` entities, resolves each
//! `<dataItemId> <value...>` group against the contract and emits typed
//! observations. Conversion failures are per-observation: the offending
//! tuple is dropped and recorded in the batch's error list, the rest of the
//! batch continues.

use std::sync::Arc;

use crate::entity::{names, properties, Entity, FactoryRegistry, Value};
use crate::error::{ErrorList, PipelineResult, PropertyError};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::guard::{Guard, GuardAction};
use crate::pipeline::transform::{Bindings, Transform};
use crate::time::{parse_timestamp, Timestamp};

/// The token denoting value absence, case-sensitive
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// Parses one SHDR wire line into a `Timestamped` token batch
///
/// The line is `TIMESTAMP|id|value[|id|value...]` with the timestamp in
/// ISO-8601 UTC. The token payload is carried verbatim; tokenization
/// happens in the mapper.
pub fn parse_line(line: &str) -> PipelineResult<Entity> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (timestamp, payload) = match line.split_once('|') {
        Some((ts, rest)) => (parse_timestamp(ts)?, rest),
        None => (parse_timestamp(line)?, ""),
    };
    Ok(Entity::new(names::TIMESTAMPED)
        .with_property(properties::TIMESTAMP, Value::Timestamp(timestamp))
        .with_value(Value::String(payload.to_string())))
}

/// Maps flat token batches into typed observations
///
/// Guard: exact `Timestamped`. For each tuple in the batch the mapper looks
/// the data item up in the contract, converts the value tokens according to
/// the item's category and representation, and routes the observation
/// through the bound successors. The returned `Observations` container
/// holds the observations that survived the downstream chain, in input
/// order, plus any recorded errors.
pub struct ShdrTokenMapper {
    name: String,
    guard: Guard,
    bindings: Bindings,
    context: Arc<PipelineContext>,
    factories: FactoryRegistry,
    device: Option<String>,
    validate: bool,
}

impl ShdrTokenMapper {
    pub const DEFAULT_NAME: &'static str = "ShdrTokenMapper";

    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            guard: Guard::exact(names::TIMESTAMPED, GuardAction::Run),
            bindings: Bindings::new(),
            context,
            factories: FactoryRegistry::defaults(),
            device: None,
            validate: true,
        }
    }

    /// Scopes contract lookups to one device
    pub fn for_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Enables or disables controlled-vocabulary enforcement
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    fn map_tokens(
        &self,
        batch: &Entity,
        timestamp: Timestamp,
        errors: &mut ErrorList,
    ) -> Vec<Entity> {
        let payload = match batch.value().as_str() {
            Some(payload) => payload,
            None => {
                errors.push(PropertyError::unbound(
                    "tokens",
                    "token batch carries no payload",
                ));
                return Vec::new();
            }
        };
        if payload.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<&str> = payload.split('|').map(str::trim).collect();

        let mut observations = Vec::new();
        let mut cursor = 0;
        while cursor < tokens.len() {
            let id = tokens[cursor];
            cursor += 1;

            let Some(data_item) = self.find(id) else {
                errors.push(PropertyError::unbound(
                    properties::DATA_ITEM_ID,
                    format!("unknown data item: {}", id),
                ));
                #[cfg(feature = "tracing")]
                tracing::warn!(id, "skipping tokens for unknown data item");
                // The unknown id's arity is unknowable: resynchronize at the
                // next token that is a known data-item id.
                while cursor < tokens.len() && self.find(tokens[cursor]).is_none() {
                    cursor += 1;
                }
                continue;
            };

            let arity = match data_item.representation() {
                crate::device_model::Representation::TimeSeries => 3,
                _ => 1,
            };
            if cursor + arity > tokens.len() {
                errors.push(PropertyError::new(
                    data_item.id(),
                    "VALUE",
                    "token stream truncated mid-tuple",
                ));
                break;
            }
            let value_tokens = &tokens[cursor..cursor + arity];
            cursor += arity;

            match self.build_observation(&data_item, value_tokens, timestamp) {
                Ok(observation) => observations.push(observation),
                Err(error) => errors.push(error),
            }
        }
        observations
    }

    fn find(&self, id: &str) -> Option<Arc<crate::device_model::DataItem>> {
        self.context
            .contract()
            .find_data_item(self.device.as_deref(), id)
    }

    fn build_observation(
        &self,
        data_item: &crate::device_model::DataItem,
        value_tokens: &[&str],
        timestamp: Timestamp,
    ) -> Result<Entity, PropertyError> {
        use crate::device_model::{Category, Representation};

        let id = data_item.id();
        let mut observation = self.factories.make(data_item.observation_name());

        let set = |observation: &mut Entity, key: &str, value: Value| {
            observation
                .set_property(key, value)
                .map_err(|e| PropertyError::new(id, key, e.to_string()))
        };

        set(
            &mut observation,
            properties::DATA_ITEM_ID,
            Value::String(id.to_string()),
        )?;
        set(
            &mut observation,
            properties::TIMESTAMP,
            Value::Timestamp(timestamp),
        )?;
        if let Some(sub_type) = data_item.sub_type() {
            set(
                &mut observation,
                properties::SUB_TYPE,
                Value::String(sub_type.to_string()),
            )?;
        }

        let value = match data_item.representation() {
            Representation::Value => {
                let token = value_tokens[0];
                if token == UNAVAILABLE {
                    Value::Absent
                } else {
                    match data_item.category() {
                        Category::Sample => parse_sample(id, token)?,
                        Category::Event => {
                            if self.validate && !data_item.accepts_value(token) {
                                return Err(PropertyError::new(
                                    id,
                                    "VALUE",
                                    format!("value '{}' is not in the controlled vocabulary", token),
                                ));
                            }
                            Value::String(token.to_string())
                        }
                        // Condition observations carry their level through the
                        // filters untouched.
                        Category::Condition => Value::String(token.to_string()),
                    }
                }
            }
            Representation::TimeSeries => {
                let (count, rate, samples) = parse_time_series(id, value_tokens)?;
                set(&mut observation, properties::SAMPLE_COUNT, Value::UInt(count))?;
                set(&mut observation, properties::SAMPLE_RATE, Value::Double(rate))?;
                Value::Vector(samples)
            }
            Representation::DataSet | Representation::Table => {
                let token = value_tokens[0];
                if token == UNAVAILABLE {
                    Value::Absent
                } else {
                    parse_entries(id, token)?
                }
            }
        };
        observation.set_value(value);
        Ok(observation)
    }
}

/// Parses a scalar or space-delimited vector sample value
fn parse_sample(id: &str, token: &str) -> Result<Value, PropertyError> {
    let mut components = Vec::new();
    for part in token.split_whitespace() {
        let component: f64 = part.parse().map_err(|_| {
            PropertyError::new(id, "VALUE", format!("'{}' is not a number", part))
        })?;
        components.push(component);
    }
    match components.len() {
        0 => Err(PropertyError::new(id, "VALUE", "empty sample value")),
        1 => Ok(Value::Double(components[0])),
        _ => Ok(Value::Vector(components)),
    }
}

/// Parses the `count|rate|samples` tail of a time-series tuple
fn parse_time_series(id: &str, value_tokens: &[&str]) -> Result<(u64, f64, Vec<f64>), PropertyError> {
    let count: u64 = value_tokens[0].parse().map_err(|_| {
        PropertyError::new(id, properties::SAMPLE_COUNT, "sample count is not an integer")
    })?;
    let rate: f64 = value_tokens[1].parse().map_err(|_| {
        PropertyError::new(id, properties::SAMPLE_RATE, "sample rate is not a number")
    })?;
    let samples: Vec<f64> = value_tokens[2]
        .split_whitespace()
        .map(|part| {
            part.parse::<f64>().map_err(|_| {
                PropertyError::new(id, "VALUE", format!("'{}' is not a number", part))
            })
        })
        .collect::<Result<_, _>>()?;
    if samples.len() as u64 != count {
        return Err(PropertyError::new(
            id,
            "VALUE",
            format!("expected {} samples, got {}", count, samples.len()),
        ));
    }
    Ok((count, rate, samples))
}

/// Parses `key=value` pairs into a nested entries entity
fn parse_entries(id: &str, token: &str) -> Result<Value, PropertyError> {
    let mut entries = Entity::new(names::ENTRIES);
    for pair in token.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(PropertyError::new(
                id,
                "VALUE",
                format!("malformed entry '{}', expected key=value", pair),
            ));
        };
        if key.is_empty() {
            return Err(PropertyError::new(id, "VALUE", "entry with empty key"));
        }
        entries = entries.with_property(key, Value::String(value.to_string()));
    }
    Ok(Value::Entity(Box::new(entries)))
}

impl Transform for ShdrTokenMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn transform(&self, entity: Entity) -> Option<Entity> {
        let mut errors = ErrorList::new();

        let observations = match entity.timestamp() {
            Some(timestamp) => self.map_tokens(&entity, timestamp, &mut errors),
            None => {
                errors.push(PropertyError::unbound(
                    properties::TIMESTAMP,
                    "token batch carries no timestamp",
                ));
                Vec::new()
            }
        };

        // Route each observation through the bound successors as it is
        // produced; the container keeps the ones that survived, in input
        // order.
        let mut forwarded = Vec::new();
        for observation in observations {
            forwarded.extend(self.forward(observation));
        }

        let mut batch = self
            .factories
            .make(names::OBSERVATIONS)
            .with_value(Value::List(forwarded));
        if let Some(timestamp) = entity.timestamp() {
            batch = batch.with_property(properties::TIMESTAMP, Value::Timestamp(timestamp));
        }
        if !errors.is_empty() {
            batch = batch.with_property(properties::ERRORS, Value::List(errors.to_entities()));
        }
        Some(batch)
    }

    fn apply(&self, entity: Entity) -> Vec<Entity> {
        match self.guard().check(&entity) {
            GuardAction::Stop => Vec::new(),
            GuardAction::Skip => self.forward(entity),
            // The individual observations were already routed inside
            // `transform`; the container is the caller's result and is not
            // forwarded a second time.
            GuardAction::Run => match self.transform(entity) {
                Some(batch) => vec![batch],
                None => Vec::new(),
            },
        }
    }
}
