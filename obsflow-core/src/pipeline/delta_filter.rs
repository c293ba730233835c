//! Minimum-delta suppression
//!
//! Drops a numeric sample whose absolute change from the last forwarded
//! reading does not exceed the data item's configured `minimumDelta`.
//! Non-numeric data items are a no-op, non-finite readings always forward,
//! and an `UNAVAILABLE` reading forwards and clears the baseline so the
//! first reading after an outage re-baselines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::entity::{names, Entity};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::guard::{Guard, GuardAction};
use crate::pipeline::transform::{Bindings, Transform};

#[derive(Default)]
struct DeltaInner {
    /// Configured threshold per data item
    minimum_delta: HashMap<String, f64>,
    /// Components of the last forwarded reading per data item
    last: HashMap<String, Vec<f64>>,
}

/// Per-data-item thresholds and baselines, shared by filter name
#[derive(Default)]
pub struct DeltaFilterState {
    inner: Mutex<DeltaInner>,
}

/// Suppresses numeric samples inside the minimum-delta band
///
/// Guard: samples run, other observations pass through. Thresholds are
/// pre-populated from the contract's data items at construction; tests and
/// dynamic configuration can add more with [`DeltaFilter::add_minimum_delta`].
pub struct DeltaFilter {
    name: String,
    guard: Guard,
    bindings: Bindings,
    state: Arc<DeltaFilterState>,
}

impl DeltaFilter {
    pub const DEFAULT_NAME: &'static str = "DeltaFilter";

    pub fn new(context: &PipelineContext) -> Self {
        Self::with_name(context, Self::DEFAULT_NAME)
    }

    pub fn with_name(context: &PipelineContext, name: impl Into<String>) -> Self {
        let name = name.into();
        let state = context.shared_state().get_or_default::<DeltaFilterState>(&name);

        // Scan the device model for configured thresholds.
        {
            let mut inner = state.inner.lock().expect("delta filter lock poisoned");
            context.contract().each_data_item(&mut |di| {
                if let Some(delta) = di.minimum_delta() {
                    inner.minimum_delta.insert(di.id().to_string(), delta);
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

    /// Sets the threshold for one data item
    pub fn add_minimum_delta(&self, id: impl Into<String>, delta: f64) {
        self.state
            .inner
            .lock()
            .expect("delta filter lock poisoned")
            .minimum_delta
            .insert(id.into(), delta);
    }
}

impl Transform for DeltaFilter {
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
                "sample without dataItemId reached the delta filter"
            );
            return None;
        };

        let mut inner = self.state.inner.lock().expect("delta filter lock poisoned");

        let Some(&delta) = inner.minimum_delta.get(id) else {
            return Some(entity);
        };
        if delta <= 0.0 {
            return Some(entity);
        }

        if entity.value().is_absent() {
            // Outage: forward the UNAVAILABLE marker and re-baseline on the
            // next numeric reading.
            inner.last.remove(id);
            return Some(entity);
        }

        let Some(components) = entity.value().numeric_components() else {
            return Some(entity);
        };

        if components.iter().any(|c| !c.is_finite()) {
            inner.last.insert(id.to_string(), components);
            return Some(entity);
        }

        let passes = match inner.last.get(id) {
            Some(previous) if previous.len() == components.len() => previous
                .iter()
                .zip(components.iter())
                .any(|(last, current)| (current - last).abs() > delta),
            // No baseline yet, or the component count changed: store and
            // forward.
            _ => true,
        };
        if passes {
            inner.last.insert(id.to_string(), components);
            Some(entity)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::{DataItem, Device, DeviceModel};
    use crate::entity::{properties, Value};
    use crate::pipeline::contract::DeviceModelContract;
    use chrono::Utc;

    fn context(items: Vec<DataItem>) -> Arc<PipelineContext> {
        let model = DeviceModel::from_devices(vec![Device::new("m1", items)]).unwrap();
        PipelineContext::new(Arc::new(DeviceModelContract::new(model)))
    }

    fn sample(id: &str, value: Value) -> Entity {
        Entity::new(names::SAMPLE)
            .with_property(properties::DATA_ITEM_ID, Value::String(id.into()))
            .with_property(properties::TIMESTAMP, Value::Timestamp(Utc::now()))
            .with_value(value)
    }

    fn forwarded(filter: &DeltaFilter, id: &str, value: f64) -> usize {
        filter.apply(sample(id, Value::Double(value))).len()
    }

    #[test]
    fn test_band_suppression_sequence() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 1.0);

        let inputs = [1.5, 1.6, 1.8, 2.8, 2.0, 1.7];
        let expected = [1, 0, 0, 1, 0, 1];
        for (value, want) in inputs.iter().zip(expected.iter()) {
            assert_eq!(
                forwarded(&filter, "a", *value),
                *want,
                "input {} misfiltered",
                value
            );
        }
    }

    #[test]
    fn test_equality_with_delta_drops() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 1.0);

        assert_eq!(forwarded(&filter, "a", 1.0), 1);
        // |2.0 - 1.0| == delta: pass requires strictly greater.
        assert_eq!(forwarded(&filter, "a", 2.0), 0);
        assert_eq!(forwarded(&filter, "a", 2.1), 1);
    }

    #[test]
    fn test_unconfigured_item_unfiltered() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        for value in [1.0, 1.0, 1.0] {
            assert_eq!(forwarded(&filter, "free", value), 1);
        }
    }

    #[test]
    fn test_thresholds_scanned_from_contract() {
        let item = DataItem::from_attributes([
            ("id", "pos"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("units", "MILLIMETER"),
            ("minimumDelta", "0.5"),
        ])
        .unwrap();
        let ctx = context(vec![item]);
        let filter = DeltaFilter::new(&ctx);

        assert_eq!(forwarded(&filter, "pos", 1.0), 1);
        assert_eq!(forwarded(&filter, "pos", 1.4), 0);
        assert_eq!(forwarded(&filter, "pos", 1.6), 1);
    }

    #[test]
    fn test_non_numeric_sample_is_noop() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 1.0);

        let text = sample("a", Value::String("1.5".into()));
        assert_eq!(filter.apply(text.clone()).len(), 1);
        assert_eq!(filter.apply(text).len(), 1);
    }

    #[test]
    fn test_non_finite_always_forwards() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 10.0);

        assert_eq!(forwarded(&filter, "a", 1.0), 1);
        assert_eq!(forwarded(&filter, "a", f64::NAN), 1);
        assert_eq!(forwarded(&filter, "a", f64::INFINITY), 1);
        // The non-finite reading overwrote the baseline.
        assert_eq!(forwarded(&filter, "a", 2.0), 1);
    }

    #[test]
    fn test_vector_forwards_when_any_component_passes() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("axes", 1.0);

        let apply = |v: Vec<f64>| filter.apply(sample("axes", Value::Vector(v))).len();

        assert_eq!(apply(vec![0.0, 0.0]), 1);
        assert_eq!(apply(vec![0.5, 0.9]), 0);
        // Second component moved past the band; all components re-baseline.
        assert_eq!(apply(vec![0.5, 1.5]), 1);
        assert_eq!(apply(vec![1.0, 1.0]), 0);
    }

    #[test]
    fn test_unavailable_clears_baseline() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 1.0);

        assert_eq!(forwarded(&filter, "a", 5.0), 1);
        assert_eq!(filter.apply(sample("a", Value::Absent)).len(), 1);
        // Within delta of the stale baseline, but the outage cleared it.
        assert_eq!(forwarded(&filter, "a", 5.1), 1);
    }

    #[test]
    fn test_events_skip_through() {
        let ctx = context(vec![]);
        let filter = DeltaFilter::new(&ctx);
        filter.add_minimum_delta("a", 1.0);

        let event = Entity::new(names::EVENT)
            .with_property(properties::DATA_ITEM_ID, Value::String("a".into()))
            .with_value(Value::String("READY".into()));
        assert_eq!(filter.apply(event.clone()).len(), 1);
        assert_eq!(filter.apply(event).len(), 1);
    }
}
