//! Sink boundary
//!
//! A sink is the terminal consumer of pipeline output. The contract fans
//! every delivery out to all registered sinks, in registration order, from
//! executor threads; sinks that perform I/O must buffer internally rather
//! than block the calling thread.

use crate::entity::Entity;

/// Terminal consumer of pipeline output
///
/// Entities arrive in the order they leave the transform graph for a given
/// producing branch; deliveries from different adapters may interleave.
/// Only `deliver_observation` is required; the control-plane entry points
/// default to no-ops for sinks that only consume observations.
pub trait Sink: Send + Sync {
    /// An observation cleared the filter chain
    fn deliver_observation(&self, observation: &Entity);

    /// An asset document arrived on the control plane
    fn deliver_asset(&self, _asset: &Entity) {}

    /// An asset command (e.g. removal) arrived on the control plane
    fn deliver_asset_command(&self, _command: &Entity) {}

    /// An agent command arrived from an adapter
    fn deliver_command(&self, _command: &Entity) {}

    /// An adapter's connection state changed
    fn deliver_connect_status(&self, _status: &Entity) {}
}

/// Sink that discards everything it receives
///
/// Useful as a placeholder while wiring a pipeline, and in tests that only
/// inspect the transform graph's return values.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn deliver_observation(&self, _observation: &Entity) {}
}
