//! Tokio Runtime Adapter for ObsFlow
//!
//! Provides the Tokio implementation of the pipeline's runtime traits,
//! plus the source glue that feeds already-read SHDR lines into a running
//! pipeline. Adapter transports (TCP sessions, HTTP clients) live outside
//! this crate; they hand lines over a channel and this crate does the rest.

mod runtime;
mod source;

pub use runtime::TokioAdapter;
pub use source::ShdrLineSource;
