//! Period throttling
//!
//! Enforces a minimum interval between forwarded observations per data
//! item. Decisions compare adapter-provided timestamps only; the filter
//! never reads the wall clock, which keeps tests deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::entity::{names, Entity};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::guard::{Guard, GuardAction};
use crate::pipeline::transform::{Bindings, Transform};
use crate::time::Timestamp;

#[derive(Default)]
struct PeriodInner {
    /// Configured minimum interval per data item
    minimum_duration: HashMap<String, Duration>,
    /// Timestamp of the last forwarded observation per data item
    last: HashMap<String, Timestamp>,
}

/// Per-data-item intervals and last-forwarded timestamps, shared by name
#[derive(Default)]
pub struct PeriodFilterState {
    inner: Mutex<PeriodInner>,
}

/// Throttles samples to one per configured interval
///
/// Guard: samples run, other observations pass through. Intervals are
/// pre-populated from the contract's `filterPeriod` attributes; tests and
/// dynamic configuration can add more with
/// [`PeriodFilter::add_minimum_duration`].
pub struct PeriodFilter {
    name: String,
    guard: Guard,
    bindings: Bindings,
    state: Arc<PeriodFilterState>,
}

impl PeriodFilter {
    pub const DEFAULT_NAME: &'static str = "PeriodFilter";

    pub fn new(context: &PipelineContext) -> Self {
        Self::with_name(context, Self::DEFAULT_NAME)
    }

    pub fn with_name(context: &PipelineContext, name: impl Into<String>) -> Self {
        let name = name.into();
        let state = context.shared_state().get_or_default::<PeriodFilterState>(&name);

        {
            let mut inner = state.inner.lock().expect("period filter lock poisoned");
            context.contract().each_data_item(&mut |di| {
                if let Some(period) = di.filter_period() {
                    inner.minimum_duration.insert(di.id().to_string(), period);
                }
            });
        }

        Self {
            name,
            guard: Guard::exact(names::SAMPLE, GuardAction::Run)
                .or_type(names::OBSERVATION, GuardAction::Skip),
            bindings: Bindings::new(),
            state,
        }
    }

    /// Sets the minimum interval for one data item
    pub fn add_minimum_duration(&self, id: impl Into<String>, duration: Duration) {
        self.state
            .inner
            .lock()
            .expect("period filter lock poisoned")
            .minimum_duration
            .insert(id.into(), duration);
    }
}

impl Transform for PeriodFilter {
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
                "sample without dataItemId reached the period filter"
            );
            return None;
        };

        let mut inner = self.state.inner.lock().expect("period filter lock poisoned");

        let Some(&minimum) = inner.minimum_duration.get(id) else {
            return Some(entity);
        };

        let Some(timestamp) = entity.timestamp() else {
            #[cfg(feature = "tracing")]
            tracing::error!(id, "sample without timestamp reached the period filter");
            return None;
        };

        // An earlier timestamp (clock skew, replay) yields a negative delta
        // and drops without touching the stored timestamp.
        let passes = match inner.last.get(id) {
            Some(&last) => timestamp.signed_duration_since(last) >= minimum,
            None => true,
        };
        if passes {
            inner.last.insert(id.to_string(), timestamp);
            Some(entity)
        } else {
            None
        }
    }
}
