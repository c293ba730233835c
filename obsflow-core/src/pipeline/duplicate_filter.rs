//! Duplicate suppression
//!
//! Drops an observation whose value equals the last value forwarded for the
//! same data item. Timestamps are not part of the comparison; a repeated
//! reading with a fresh timestamp is still a duplicate. IEEE equality means
//! NaN readings never compare equal, so consecutive NaN samples all
//! forward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::entity::{names, Entity, Value};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::guard::{Guard, GuardAction};
use crate::pipeline::transform::{Bindings, Transform};

/// Per-data-item last forwarded value, shared across filters with one name
#[derive(Default)]
pub struct DuplicateFilterState {
    last: Mutex<HashMap<String, Value>>,
}

/// Suppresses observations equal to the last forwarded value
///
/// Guard: all observations run, other entities pass through.
pub struct DuplicateFilter {
    name: String,
    guard: Guard,
    bindings: Bindings,
    state: Arc<DuplicateFilterState>,
}

impl DuplicateFilter {
    pub const DEFAULT_NAME: &'static str = "DuplicateFilter";

    pub fn new(context: &PipelineContext) -> Self {
        Self::with_name(context, Self::DEFAULT_NAME)
    }

    /// Creates a filter whose state is shared with every other
    /// `DuplicateFilter` of the same name on this context
    pub fn with_name(context: &PipelineContext, name: impl Into<String>) -> Self {
        let name = name.into();
        let state = context.shared_state().get_or_default::<DuplicateFilterState>(&name);
        Self {
            name,
            guard: Guard::of_type(names::OBSERVATION, GuardAction::Run)
                .or_type(names::ENTITY, GuardAction::Skip),
            bindings: Bindings::new(),
            state,
        }
    }
}

impl Transform for DuplicateFilter {
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
        let Some(id) = entity.data_item_id() else {
            #[cfg(feature = "tracing")]
            tracing::error!(
                entity = entity.name(),
                "observation without dataItemId reached the duplicate filter"
            );
            return None;
        };

        let mut last = self.state.last.lock().expect("duplicate filter lock poisoned");
        let duplicate = last.get(id) == Some(entity.value());
        if duplicate {
            None
        } else {
            last.insert(id.to_string(), entity.value().clone());
            Some(entity)
        }
    }
}
