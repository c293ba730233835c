//! Pipeline contract: the read-only device-model view
//!
//! Transforms never touch the device model directly; they see it through
//! [`PipelineContract`], which also carries the delivery exit points that
//! terminal transforms use to hand results to the agent's sinks. Test
//! doubles implement the same trait with the same observable semantics.

use std::sync::Arc;

use crate::device_model::{DataItem, DeviceModel};
use crate::entity::Entity;
use crate::sink::Sink;

/// Read-only device-model view plus delivery exit points
pub trait PipelineContract: Send + Sync {
    /// Looks up a data item by id or name, O(1) expected
    ///
    /// `device` scopes the lookup for agents serving several devices;
    /// implementations with globally unique ids may ignore it.
    fn find_data_item(&self, device: Option<&str>, id_or_name: &str) -> Option<Arc<DataItem>>;

    /// Visits every data item; used at build time to pre-populate filter
    /// thresholds
    fn each_data_item(&self, visitor: &mut dyn FnMut(&DataItem));

    /// An observation cleared the filter chain
    fn deliver_observation(&self, observation: Entity);

    /// Control-plane deliveries
    fn deliver_asset(&self, asset: Entity);
    fn deliver_asset_command(&self, command: Entity);
    fn deliver_command(&self, command: Entity);
    fn deliver_connect_status(&self, status: Entity);
}

/// Contract over a loaded [`DeviceModel`], fanning deliveries out to sinks
///
/// The model is immutable for the life of the contract, so lookups take no
/// lock. Sinks receive deliveries in registration order.
pub struct DeviceModelContract {
    model: DeviceModel,
    sinks: Vec<Arc<dyn Sink>>,
}

impl DeviceModelContract {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            sinks: Vec::new(),
        }
    }

    /// Registers a sink; builder-style
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }
}

impl PipelineContract for DeviceModelContract {
    fn find_data_item(&self, _device: Option<&str>, id_or_name: &str) -> Option<Arc<DataItem>> {
        // Data item ids are globally unique across devices; the device
        // argument is not needed to disambiguate.
        self.model.find(id_or_name)
    }

    fn each_data_item(&self, visitor: &mut dyn FnMut(&DataItem)) {
        self.model.each(visitor);
    }

    fn deliver_observation(&self, observation: Entity) {
        for sink in &self.sinks {
            sink.deliver_observation(&observation);
        }
    }

    fn deliver_asset(&self, asset: Entity) {
        for sink in &self.sinks {
            sink.deliver_asset(&asset);
        }
    }

    fn deliver_asset_command(&self, command: Entity) {
        for sink in &self.sinks {
            sink.deliver_asset_command(&command);
        }
    }

    fn deliver_command(&self, command: Entity) {
        for sink in &self.sinks {
            sink.deliver_command(&command);
        }
    }

    fn deliver_connect_status(&self, status: Entity) {
        for sink in &self.sinks {
            sink.deliver_connect_status(&status);
        }
    }
}
