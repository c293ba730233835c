//! Pipeline assembly and the async engine
//!
//! A [`Pipeline`] is a directed acyclic graph of transforms with a single
//! head exposed to adapters. The default topology:
//!
//! ```text
//! Start ─┬─ ShdrTokenMapper ──┐
//!        ├─ ObservationDemux ─┴─ DuplicateFilter ─ DeltaFilter ─ PeriodFilter ─ DeliverObservation
//!        ├─ DeliverAsset
//!        ├─ DeliverAssetCommand
//!        ├─ DeliverCommand
//!        └─ DeliverConnectStatus
//! ```
//!
//! The graph itself is synchronous and bounded-time; transforms never
//! suspend. [`Pipeline::start`] posts the graph onto a runtime executor:
//! each submitted entity becomes one task-step on the single worker, so
//! entities leave in submission order and the sequence invariant holds.

pub mod context;
pub mod contract;
pub mod delivery;
pub mod delta_filter;
pub mod duplicate_filter;
pub mod guard;
pub mod period_filter;
pub mod shdr;
pub mod transform;

pub use context::{PipelineContext, Sequencer, SharedState};
pub use contract::{DeviceModelContract, PipelineContract};
pub use delivery::{
    DeliverAsset, DeliverAssetCommand, DeliverCommand, DeliverConnectStatus, DeliverObservation,
    ObservationDemux,
};
pub use delta_filter::DeltaFilter;
pub use duplicate_filter::DuplicateFilter;
pub use guard::{Guard, GuardAction};
pub use period_filter::PeriodFilter;
pub use shdr::{parse_line, ShdrTokenMapper};
pub use transform::{Bindings, NullTransform, Transform, TransformPtr};

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::entity::Entity;
use crate::error::{PipelineError, PipelineResult};
use crate::runtime::Spawn;

/// Build-time options for the default topology
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Suppress observations whose value repeats the last forwarded one
    pub filter_duplicates: bool,
    /// Enforce controlled vocabularies in the token mapper
    pub validate_vocabulary: bool,
    /// Depth of the submission channel between adapters and the worker
    pub channel_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            filter_duplicates: true,
            validate_vocabulary: true,
            channel_capacity: 128,
        }
    }
}

impl PipelineOptions {
    pub fn filter_duplicates(mut self, enabled: bool) -> Self {
        self.filter_duplicates = enabled;
        self
    }

    pub fn validate_vocabulary(mut self, enabled: bool) -> Self {
        self.validate_vocabulary = enabled;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/// The transform graph with its shared context
pub struct Pipeline {
    context: Arc<PipelineContext>,
    head: TransformPtr,
    options: PipelineOptions,
}

impl Pipeline {
    /// Builds the default topology with default options
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self::with_options(context, PipelineOptions::default())
    }

    /// Builds the default topology
    pub fn with_options(context: Arc<PipelineContext>, options: PipelineOptions) -> Self {
        let mapper = Arc::new(
            ShdrTokenMapper::new(Arc::clone(&context))
                .with_validation(options.validate_vocabulary),
        );
        let demux = Arc::new(ObservationDemux::new());

        let delta = Arc::new(DeltaFilter::new(&context));
        let period = Arc::new(PeriodFilter::new(&context));
        let deliver = Arc::new(DeliverObservation::new(Arc::clone(&context)));
        delta.bind(period.clone());
        period.bind(deliver);

        let filter_head: TransformPtr = if options.filter_duplicates {
            let duplicate = Arc::new(DuplicateFilter::new(&context));
            duplicate.bind(delta);
            duplicate
        } else {
            delta
        };
        mapper.bind(filter_head.clone());
        demux.bind(filter_head);

        let head = Arc::new(NullTransform::with_name(
            "Start",
            Guard::any(GuardAction::Run),
        ));
        head.bind(mapper);
        head.bind(demux);
        head.bind(Arc::new(DeliverAsset::new(Arc::clone(&context))));
        head.bind(Arc::new(DeliverAssetCommand::new(Arc::clone(&context))));
        head.bind(Arc::new(DeliverCommand::new(Arc::clone(&context))));
        head.bind(Arc::new(DeliverConnectStatus::new(Arc::clone(&context))));

        Self {
            context,
            head,
            options,
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs one entity through the graph synchronously
    ///
    /// Returns the outputs that surfaced at the graph's leaves; deliveries
    /// to sinks happen as side effects of the terminal transforms.
    pub fn run(&self, entity: Entity) -> Vec<Entity> {
        self.head.apply(entity)
    }

    /// Moves the pipeline onto an executor and returns the submission handle
    ///
    /// A single worker task drains the submission channel and runs each
    /// entity through the graph to completion, so per-adapter submission
    /// order is preserved on the output. Shutting the handle down closes
    /// the channel; in-flight entities drain before the worker exits.
    pub fn start<R: Spawn>(self, runtime: &R) -> PipelineResult<PipelineHandle> {
        let capacity = self.options.channel_capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<Entity>(capacity);

        runtime.spawn(async move {
            #[cfg(feature = "tracing")]
            tracing::info!("observation pipeline started");

            while let Some(entity) = rx.recv().await {
                let _ = self.run(entity);
            }

            #[cfg(feature = "tracing")]
            tracing::info!("observation pipeline drained, worker exiting");
        })?;

        Ok(PipelineHandle {
            tx: Mutex::new(Some(tx)),
        })
    }
}

/// Submission handle to a started pipeline
///
/// Cheap to share behind an `Arc`; adapters serialize their own
/// submissions by awaiting each send.
pub struct PipelineHandle {
    tx: Mutex<Option<mpsc::Sender<Entity>>>,
}

impl PipelineHandle {
    /// Submits an entity to the pipeline head
    ///
    /// Applies backpressure when the channel is full. Fails with
    /// [`PipelineError::Shutdown`] once shutdown has begun.
    pub async fn submit(&self, entity: Entity) -> PipelineResult<()> {
        let sender = self
            .tx
            .lock()
            .expect("pipeline handle lock poisoned")
            .clone();
        match sender {
            Some(sender) => sender
                .send(entity)
                .await
                .map_err(|_| PipelineError::Shutdown),
            None => Err(PipelineError::Shutdown),
        }
    }

    /// Begins shutdown: rejects new submissions, lets in-flight work drain
    pub fn shutdown(&self) {
        self.tx
            .lock()
            .expect("pipeline handle lock poisoned")
            .take();
    }

    pub fn is_shutdown(&self) -> bool {
        self.tx
            .lock()
            .expect("pipeline handle lock poisoned")
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::{DataItem, Device, DeviceModel};
    use crate::entity::{names, properties, Value};
    use crate::sink::Sink;
    use chrono::Utc;

    #[derive(Default)]
    struct Capture {
        observations: Mutex<Vec<Entity>>,
        commands: Mutex<Vec<Entity>>,
        statuses: Mutex<Vec<Entity>>,
    }

    impl Sink for Capture {
        fn deliver_observation(&self, observation: &Entity) {
            self.observations.lock().unwrap().push(observation.clone());
        }
        fn deliver_command(&self, command: &Entity) {
            self.commands.lock().unwrap().push(command.clone());
        }
        fn deliver_connect_status(&self, status: &Entity) {
            self.statuses.lock().unwrap().push(status.clone());
        }
    }

    fn build(items: Vec<DataItem>) -> (Pipeline, Arc<Capture>) {
        build_with(items, PipelineOptions::default())
    }

    fn build_with(items: Vec<DataItem>, options: PipelineOptions) -> (Pipeline, Arc<Capture>) {
        let sink = Arc::new(Capture::default());
        let model = DeviceModel::from_devices(vec![Device::new("m1", items)]).unwrap();
        let contract = DeviceModelContract::new(model).with_sink(sink.clone());
        let context = PipelineContext::new(Arc::new(contract));
        (Pipeline::with_options(context, options), sink)
    }

    fn event(id: &str) -> DataItem {
        DataItem::from_attributes([("id", id), ("type", "EXECUTION"), ("category", "EVENT")])
            .unwrap()
    }

    #[test]
    fn test_token_batch_reaches_sink() {
        let (pipeline, sink) = build(vec![event("ex")]);

        let out = pipeline.run(Entity::timestamped(Utc::now(), ["ex", "ACTIVE"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), names::OBSERVATIONS);
        assert_eq!(out[0].value_as_list().unwrap().len(), 1);

        let delivered = sink.observations.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].sequence(), Some(1));
    }

    #[test]
    fn test_duplicates_filtered_through_full_graph() {
        let (pipeline, sink) = build(vec![event("ex")]);

        for _ in 0..3 {
            pipeline.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        }
        pipeline.run(Entity::timestamped(Utc::now(), ["ex", "ACTIVE"]));

        let delivered = sink.observations.lock().unwrap();
        let values: Vec<&str> = delivered
            .iter()
            .filter_map(|o| o.value().as_str())
            .collect();
        assert_eq!(values, ["READY", "ACTIVE"]);
        // Sequence numbers count forwarded observations only.
        let sequences: Vec<u64> = delivered.iter().filter_map(Entity::sequence).collect();
        assert_eq!(sequences, [1, 2]);
    }

    #[test]
    fn test_duplicate_filter_can_be_disabled() {
        let (pipeline, sink) = build_with(
            vec![event("ex")],
            PipelineOptions::default().filter_duplicates(false),
        );

        pipeline.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        pipeline.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        assert_eq!(sink.observations.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_parsed_batch_joins_filter_chain() {
        let (pipeline, sink) = build(vec![]);

        let obs = |value: f64| {
            Entity::new(names::SAMPLE)
                .with_property(properties::DATA_ITEM_ID, Value::String("a".into()))
                .with_property(properties::TIMESTAMP, Value::Timestamp(Utc::now()))
                .with_value(Value::Double(value))
        };
        let batch = Entity::new(names::OBSERVATIONS)
            .with_value(Value::List(vec![obs(1.5), obs(1.5), obs(1.6)]));

        let out = pipeline.run(batch);
        assert_eq!(out.len(), 1);
        // The duplicate 1.5 was suppressed on the shared chain.
        assert_eq!(out[0].value_as_list().unwrap().len(), 2);
        assert_eq!(sink.observations.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_control_plane_branches() {
        let (pipeline, sink) = build(vec![]);

        pipeline.run(Entity::connect_status("CONNECTED"));
        pipeline.run(Entity::command("adapterVersion", "2.0"));

        assert_eq!(sink.statuses.lock().unwrap().len(), 1);
        assert_eq!(sink.commands.lock().unwrap().len(), 1);
        assert!(sink.observations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_options_from_json() {
        let options: PipelineOptions =
            serde_json::from_str(r#"{"filterDuplicates": false, "channelCapacity": 16}"#).unwrap();
        assert!(!options.filter_duplicates);
        assert!(options.validate_vocabulary);
        assert_eq!(options.channel_capacity, 16);
    }

    #[test]
    fn test_fresh_context_resets_filter_state() {
        // Same input replayed on a rebuilt pipeline forwards again.
        let (first, first_sink) = build(vec![event("ex")]);
        first.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        first.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        assert_eq!(first_sink.observations.lock().unwrap().len(), 1);

        let (second, second_sink) = build(vec![event("ex")]);
        second.run(Entity::timestamped(Utc::now(), ["ex", "READY"]));
        let delivered = second_sink.observations.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].sequence(), Some(1));
    }
}
