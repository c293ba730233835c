//! ObsFlow Core Pipeline Engine
//!
//! This crate provides the data-acquisition and transformation core of an
//! industrial telemetry agent: raw token streams from machine-tool adapters
//! are mapped against a device model into typed observations, pushed through
//! a chain of stateful filters (duplicate, minimum-delta, period) and routed
//! to downstream sinks.

pub mod device_model;
pub mod entity;
mod error;
pub mod pipeline;
pub mod runtime;
pub mod sink;
pub mod time;

// Public API exports
pub use entity::{names, Entity, EntityFactory, FactoryRegistry, Value, ValueTag};
pub use error::{ErrorList, PipelineError, PipelineResult, PropertyError};
pub use runtime::{
    ExecutorError, ExecutorResult, Logger, Runtime, RuntimeAdapter, RuntimeInfo, Spawn, TimeOps,
};
pub use time::Timestamp;

// Pipeline implementation exports
pub use device_model::{Category, DataItem, Device, DeviceModel, Representation};
pub use pipeline::{Pipeline, PipelineContext, PipelineContract, PipelineHandle, PipelineOptions};
pub use sink::Sink;
