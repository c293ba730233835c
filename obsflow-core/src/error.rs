//! Error handling for pipeline operations
//!
//! Two kinds of failure flow through the pipeline and they are deliberately
//! kept apart:
//!
//! - [`PipelineError`]: operational failures surfaced to the caller
//!   (configuration problems, shutdown, I/O at the boundaries). These are
//!   returned through [`PipelineResult`] and stop the operation that raised
//!   them.
//! - [`PropertyError`]: per-observation validation failures (a token that
//!   does not parse, a value outside a controlled vocabulary). These are
//!   *values*, accumulated into an [`ErrorList`] attached to the batch; the
//!   offending observation is dropped and the batch continues.
//!
//! # Error Code System
//!
//! Each [`PipelineError`] variant carries a numeric code for log correlation,
//! organized by category:
//!
//! - **Validation** (0x1000-0x1FFF): type mismatches, unparsable input
//! - **Model** (0x2000-0x2FFF): unknown data items, contract failures
//! - **Configuration** (0x3000-0x3FFF): invalid options or device model
//! - **Runtime** (0x4000-0x4FFF): executor failures, shutdown
//! - **I/O** (0x8000-0x8FFF): boundary I/O errors
//! - **JSON** (0x9000-0x9FFF): device-model / options deserialization

use thiserror::Error;

use crate::entity::{names, Entity, Value};

/// Unified error type for pipeline operations
///
/// Covers the operational failure scenarios of the observation pipeline.
/// Per-observation validation problems are not represented here; they are
/// accumulated as [`PropertyError`] values instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A property write did not match the variant tag declared by the
    /// entity's factory
    #[error("type mismatch for property '{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A token stream referenced a data item absent from the contract
    #[error("unknown data item: {id}")]
    UnknownDataItem { id: String },

    /// The contract could not resolve a data item where one was expected
    ///
    /// Should be impossible after mapping; treated as a programming error.
    /// The offending entity is dropped and the pipeline stays alive.
    #[error("contract failure: {context}")]
    ContractFailure { context: String },

    /// A timestamp at the adapter boundary could not be parsed
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp { input: String, reason: String },

    /// Invalid pipeline options or device model
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Executor failures (task spawning, scheduling)
    #[error("runtime error: {message}")]
    RuntimeError { message: String },

    /// The pipeline is shutting down; new submissions are rejected
    #[error("pipeline is shutting down")]
    Shutdown,

    /// I/O operation errors at the adapter boundary
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON deserialization errors (device model, options)
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Returns a numeric error code for log correlation
    ///
    /// Codes are organized by category with specific ranges; see the module
    /// documentation for the category map.
    pub const fn error_code(&self) -> u32 {
        match self {
            // Validation errors: 0x1000-0x1FFF
            PipelineError::TypeMismatch { .. } => 0x1001,
            PipelineError::InvalidTimestamp { .. } => 0x1002,

            // Model errors: 0x2000-0x2FFF
            PipelineError::UnknownDataItem { .. } => 0x2001,
            PipelineError::ContractFailure { .. } => 0x2002,

            // Configuration errors: 0x3000-0x3FFF
            PipelineError::InvalidConfiguration { .. } => 0x3001,

            // Runtime errors: 0x4000-0x4FFF
            PipelineError::RuntimeError { .. } => 0x4001,
            PipelineError::Shutdown => 0x4002,

            // I/O errors: 0x8000-0x8FFF
            PipelineError::Io { .. } => 0x8001,

            // JSON errors: 0x9000-0x9FFF
            PipelineError::Json { .. } => 0x9001,
        }
    }

    /// Returns the error category based on the error code
    pub const fn error_category(&self) -> u32 {
        self.error_code() & 0xF000
    }

    /// Returns true if this error indicates shutdown rather than failure
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, PipelineError::Shutdown)
    }

    /// Returns true if the error is local to one observation or batch and
    /// must not take the pipeline down
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TypeMismatch { .. }
                | PipelineError::UnknownDataItem { .. }
                | PipelineError::ContractFailure { .. }
                | PipelineError::InvalidTimestamp { .. }
        )
    }
}

/// Type alias for Results using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// A single property that could not be parsed or failed a constraint
///
/// Recorded during token mapping and carried alongside the batch; the
/// observation that raised it is dropped, the rest of the batch continues.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyError {
    /// Data item the offending tuple referenced, when known
    pub data_item_id: Option<String>,
    /// The property that failed (e.g. `VALUE`, `timestamp`)
    pub property: String,
    /// Human-readable description of the failure
    pub message: String,
}

impl PropertyError {
    /// Creates a property error bound to a data item
    pub fn new(
        data_item_id: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            data_item_id: Some(data_item_id.into()),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a property error with no data-item association
    pub fn unbound(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data_item_id: None,
            property: property.into(),
            message: message.into(),
        }
    }

    /// Renders this error as an `Error` entity for attachment to a batch
    pub fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(names::ERROR);
        if let Some(id) = &self.data_item_id {
            entity = entity.with_property("dataItemId", Value::String(id.clone()));
        }
        entity
            .with_property("property", Value::String(self.property.clone()))
            .with_value(Value::String(self.message.clone()))
    }
}

/// Ordered accumulation of per-observation errors for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorList {
    errors: Vec<PropertyError>,
}

impl ErrorList {
    /// Creates an empty error list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error
    pub fn push(&mut self, error: PropertyError) {
        self.errors.push(error);
    }

    /// Returns true if no errors were recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates the recorded errors in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PropertyError> {
        self.errors.iter()
    }

    /// Renders the list as `Error` entities for attachment to a batch
    pub fn to_entities(&self) -> Vec<Entity> {
        self.errors.iter().map(PropertyError::to_entity).collect()
    }
}

impl From<crate::runtime::ExecutorError> for PipelineError {
    fn from(err: crate::runtime::ExecutorError) -> Self {
        PipelineError::RuntimeError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_by_category() {
        let mismatch = PipelineError::TypeMismatch {
            property: "timestamp".into(),
            expected: "Timestamp",
            actual: "String",
        };
        assert_eq!(mismatch.error_code(), 0x1001);
        assert_eq!(mismatch.error_category(), 0x1000);

        let unknown = PipelineError::UnknownDataItem { id: "x1".into() };
        assert_eq!(unknown.error_code(), 0x2001);
        assert_eq!(unknown.error_category(), 0x2000);

        assert_eq!(PipelineError::Shutdown.error_category(), 0x4000);
    }

    #[test]
    fn test_error_classification() {
        assert!(PipelineError::Shutdown.is_shutdown());
        assert!(!PipelineError::Shutdown.is_recoverable());

        let unknown = PipelineError::UnknownDataItem { id: "x1".into() };
        assert!(unknown.is_recoverable());
        assert!(!unknown.is_shutdown());
    }

    #[test]
    fn test_display_formatting() {
        let err = PipelineError::UnknownDataItem { id: "spindle".into() };
        assert_eq!(format!("{}", err), "unknown data item: spindle");

        let err = PipelineError::TypeMismatch {
            property: "sequence".into(),
            expected: "UInt",
            actual: "Double",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("sequence"));
        assert!(msg.contains("UInt"));
        assert!(msg.contains("Double"));
    }

    #[test]
    fn test_error_list_accumulation() {
        let mut list = ErrorList::new();
        assert!(list.is_empty());

        list.push(PropertyError::new("a", "VALUE", "not a number"));
        list.push(PropertyError::unbound("timestamp", "missing"));

        assert_eq!(list.len(), 2);
        let entities = list.to_entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name(), names::ERROR);
        assert_eq!(
            entities[0].property("dataItemId").and_then(Value::as_str),
            Some("a")
        );
        assert_eq!(entities[1].property("dataItemId"), None);
    }
}
