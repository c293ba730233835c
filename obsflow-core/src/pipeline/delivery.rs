//! Terminal transforms: the contract boundary
//!
//! The filter chain ends in [`DeliverObservation`], which stamps the
//! sequence number and hands the observation to the contract. Control-plane
//! entities take their own single-node branches off the pipeline head.
//! [`ObservationDemux`] is the entry point for adapters that parse
//! observations upstream and submit whole batches.

use std::sync::Arc;

use crate::entity::{names, properties, Entity, Value};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::guard::{Guard, GuardAction};
use crate::pipeline::transform::{Bindings, Transform};

/// Stamps the sequence number and delivers observations to the contract
///
/// Sequence numbers come from the context's single assignment point, so the
/// delivered stream is strictly increasing and gap-free regardless of how
/// many branches feed this node.
pub struct DeliverObservation {
    name: String,
    guard: Guard,
    bindings: Bindings,
    context: Arc<PipelineContext>,
}

impl DeliverObservation {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self {
            name: "DeliverObservation".to_string(),
            guard: Guard::of_type(names::OBSERVATION, GuardAction::Run),
            bindings: Bindings::new(),
            context,
        }
    }
}

impl Transform for DeliverObservation {
    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn transform(&self, mut entity: Entity) -> Option<Entity> {
        let sequence = self.context.sequencer().next();
        if let Err(_error) = entity.set_property(properties::SEQUENCE, Value::UInt(sequence)) {
            #[cfg(feature = "tracing")]
            tracing::error!(%_error, "failed to stamp sequence, dropping observation");
            return None;
        }
        self.context.contract().deliver_observation(entity.clone());
        Some(entity)
    }
}

/// Routes the observations of an already-parsed batch into the filter chain
///
/// Agent-to-agent adapters submit `Observations` containers instead of raw
/// token batches; each contained observation is forwarded individually and
/// the returned container keeps the survivors, in input order.
pub struct ObservationDemux {
    name: String,
    guard: Guard,
    bindings: Bindings,
}

impl ObservationDemux {
    pub fn new() -> Self {
        Self {
            name: "ObservationDemux".to_string(),
            guard: Guard::exact(names::OBSERVATIONS, GuardAction::Run),
            bindings: Bindings::new(),
        }
    }
}

impl Default for ObservationDemux {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ObservationDemux {
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
        let Some(observations) = entity.into_list() else {
            #[cfg(feature = "tracing")]
            tracing::warn!("observation batch without a list payload, dropping");
            return None;
        };

        let mut forwarded = Vec::new();
        for observation in observations {
            forwarded.extend(self.forward(observation));
        }
        Some(Entity::new(names::OBSERVATIONS).with_value(Value::List(forwarded)))
    }

    fn apply(&self, entity: Entity) -> Vec<Entity> {
        match self.guard().check(&entity) {
            GuardAction::Stop => Vec::new(),
            GuardAction::Skip => self.forward(entity),
            // The contained observations were already routed inside
            // `transform`; the rebuilt container is returned, not forwarded.
            GuardAction::Run => match self.transform(entity) {
                Some(batch) => vec![batch],
                None => Vec::new(),
            },
        }
    }
}

macro_rules! control_plane_delivery {
    ($(#[$doc:meta])* $type_name:ident, $entity_name:expr, $deliver:ident) => {
        $(#[$doc])*
        pub struct $type_name {
            name: String,
            guard: Guard,
            bindings: Bindings,
            context: Arc<PipelineContext>,
        }

        impl $type_name {
            pub fn new(context: Arc<PipelineContext>) -> Self {
                Self {
                    name: stringify!($type_name).to_string(),
                    guard: Guard::exact($entity_name, GuardAction::Run),
                    bindings: Bindings::new(),
                    context,
                }
            }
        }

        impl Transform for $type_name {
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
                self.context.contract().$deliver(entity.clone());
                Some(entity)
            }
        }
    };
}

control_plane_delivery!(
    /// Delivers asset documents to the contract
    DeliverAsset,
    names::ASSET,
    deliver_asset
);
control_plane_delivery!(
    /// Delivers asset commands to the contract
    DeliverAssetCommand,
    names::ASSET_COMMAND,
    deliver_asset_command
);
control_plane_delivery!(
    /// Delivers agent commands to the contract
    DeliverCommand,
    names::COMMAND,
    deliver_command
);
control_plane_delivery!(
    /// Delivers adapter connection-state changes to the contract
    DeliverConnectStatus,
    names::CONNECT_STATUS,
    deliver_connect_status
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::DeviceModel;
    use crate::pipeline::contract::DeviceModelContract;
    use crate::sink::Sink;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        observations: Mutex<Vec<Entity>>,
        statuses: Mutex<Vec<Entity>>,
    }

    impl Sink for Capture {
        fn deliver_observation(&self, observation: &Entity) {
            self.observations.lock().unwrap().push(observation.clone());
        }
        fn deliver_connect_status(&self, status: &Entity) {
            self.statuses.lock().unwrap().push(status.clone());
        }
    }

    fn context_with_sink() -> (Arc<PipelineContext>, Arc<Capture>) {
        let sink = Arc::new(Capture::default());
        let contract = DeviceModelContract::new(DeviceModel::new()).with_sink(sink.clone());
        (PipelineContext::new(Arc::new(contract)), sink)
    }

    fn observation(id: &str) -> Entity {
        Entity::new(names::SAMPLE)
            .with_property(properties::DATA_ITEM_ID, Value::String(id.into()))
            .with_value(Value::Double(1.0))
    }

    #[test]
    fn test_sequence_stamped_gap_free() {
        let (ctx, sink) = context_with_sink();
        let deliver = DeliverObservation::new(ctx);

        for _ in 0..3 {
            assert_eq!(deliver.apply(observation("a")).len(), 1);
        }

        let delivered = sink.observations.lock().unwrap();
        let sequences: Vec<u64> = delivered.iter().filter_map(Entity::sequence).collect();
        assert_eq!(sequences, [1, 2, 3]);
    }

    #[test]
    fn test_non_observation_stopped() {
        let (ctx, sink) = context_with_sink();
        let deliver = DeliverObservation::new(ctx);
        assert!(deliver.apply(Entity::new(names::TIMESTAMPED)).is_empty());
        assert!(sink.observations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_demux_routes_batch_members() {
        let (ctx, sink) = context_with_sink();
        let demux = Arc::new(ObservationDemux::new());
        demux.bind(Arc::new(DeliverObservation::new(ctx)));

        let batch = Entity::new(names::OBSERVATIONS).with_value(Value::List(vec![
            observation("a"),
            observation("b"),
        ]));
        let out = demux.apply(batch);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value_as_list().unwrap().len(), 2);
        assert_eq!(sink.observations.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_connect_status_branch() {
        let (ctx, sink) = context_with_sink();
        let deliver = DeliverConnectStatus::new(ctx);

        let status = Entity::connect_status("CONNECTED");
        assert_eq!(deliver.apply(status).len(), 1);
        assert_eq!(sink.statuses.lock().unwrap().len(), 1);
        // Observations do not match the exact guard.
        assert!(deliver.apply(observation("a")).is_empty());
    }
}
