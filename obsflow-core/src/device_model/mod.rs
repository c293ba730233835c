//! Device model consumed by the pipeline
//!
//! The pipeline sees the device model through a read-only index: data items
//! looked up by id (or name) in O(1), and iterated once at build time to
//! pre-populate filter thresholds. The model is immutable while the pipeline
//! runs; configuration reload drains and rebuilds the pipeline.

mod data_item;

pub use data_item::{Category, DataItem, Representation};

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

/// One device and the data items it publishes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    name: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    data_items: Vec<DataItem>,
}

impl Device {
    /// Creates a device with the given data items
    pub fn new(name: impl Into<String>, data_items: Vec<DataItem>) -> Self {
        Self {
            name: name.into(),
            uuid: None,
            data_items,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn data_items(&self) -> &[DataItem] {
        &self.data_items
    }
}

/// Indexed collection of devices
///
/// Data item ids are globally unique across devices; names are indexed
/// best-effort as an alias for lookups from adapters that send names
/// instead of ids.
#[derive(Debug, Default)]
pub struct DeviceModel {
    devices: Vec<Device>,
    by_id: HashMap<String, Arc<DataItem>>,
    by_name: HashMap<String, Arc<DataItem>>,
}

impl DeviceModel {
    /// Creates an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model from already-parsed devices
    ///
    /// Fails with [`PipelineError::InvalidConfiguration`] when two data
    /// items share an id.
    pub fn from_devices(devices: Vec<Device>) -> PipelineResult<Self> {
        let mut model = Self {
            devices: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        };
        for device in devices {
            model.add_device(device)?;
        }
        Ok(model)
    }

    /// Loads a model from its JSON document form
    pub fn from_json(document: &str) -> PipelineResult<Self> {
        #[derive(Deserialize)]
        struct ModelDoc {
            devices: Vec<Device>,
        }
        let doc: ModelDoc = serde_json::from_str(document)?;
        Self::from_devices(doc.devices)
    }

    /// Adds a device, indexing its data items
    pub fn add_device(&mut self, device: Device) -> PipelineResult<()> {
        for item in device.data_items() {
            let item = Arc::new(item.clone());
            if self
                .by_id
                .insert(item.id().to_string(), Arc::clone(&item))
                .is_some()
            {
                return Err(PipelineError::InvalidConfiguration {
                    message: format!("duplicate data item id: {}", item.id()),
                });
            }
            if let Some(name) = item.name() {
                self.by_name.insert(name.to_string(), item);
            }
        }
        self.devices.push(device);
        Ok(())
    }

    /// The devices in declaration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Looks up a data item by id, falling back to the name index
    pub fn find(&self, id_or_name: &str) -> Option<Arc<DataItem>> {
        self.by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(id_or_name))
            .cloned()
    }

    /// Visits every data item across all devices
    pub fn each(&self, visitor: &mut dyn FnMut(&DataItem)) {
        for device in &self.devices {
            for item in device.data_items() {
                visitor(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> DataItem {
        DataItem::from_attributes([("id", id), ("type", "POSITION"), ("category", "SAMPLE")])
            .unwrap()
    }

    #[test]
    fn test_find_by_id() {
        let model = DeviceModel::from_devices(vec![Device::new("m1", vec![item("a"), item("b")])])
            .unwrap();
        assert!(model.find("a").is_some());
        assert!(model.find("c").is_none());
    }

    #[test]
    fn test_find_by_name_alias() {
        let named = DataItem::from_attributes([
            ("id", "x1"),
            ("name", "Xpos"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
        ])
        .unwrap();
        let model = DeviceModel::from_devices(vec![Device::new("m1", vec![named])]).unwrap();
        assert_eq!(model.find("Xpos").unwrap().id(), "x1");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = DeviceModel::from_devices(vec![
            Device::new("m1", vec![item("a")]),
            Device::new("m2", vec![item("a")]),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_each_visits_all_devices() {
        let model = DeviceModel::from_devices(vec![
            Device::new("m1", vec![item("a")]),
            Device::new("m2", vec![item("b"), item("c")]),
        ])
        .unwrap();
        let mut seen = Vec::new();
        model.each(&mut |di| seen.push(di.id().to_string()));
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn test_from_json_document() {
        let model = DeviceModel::from_json(
            r#"{
                "devices": [{
                    "name": "mill-1",
                    "uuid": "4f0239f2",
                    "dataItems": [
                        {"id": "x1", "type": "POSITION", "category": "SAMPLE",
                         "units": "MILLIMETER", "minimumDelta": 0.5},
                        {"id": "ex", "type": "EXECUTION", "category": "EVENT"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(model.devices().len(), 1);
        assert_eq!(model.find("x1").unwrap().minimum_delta(), Some(0.5));
        assert_eq!(model.find("ex").unwrap().category(), Category::Event);
    }
}
