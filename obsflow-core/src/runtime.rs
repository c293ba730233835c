//! Runtime traits for async execution
//!
//! Pure trait definitions so the pipeline core depends on abstractions
//! rather than a concrete executor. The Tokio implementation lives in the
//! `obsflow-tokio-adapter` crate; tests can provide their own.
//!
//! # Trait Structure
//!
//! 1. **`RuntimeAdapter`** - Platform identity and metadata
//! 2. **`TimeOps`** - Time operations (now, sleep, duration helpers)
//! 3. **`Logger`** - Structured logging (info, debug, warn, error)
//! 4. **`Spawn`** - Task spawning with platform-specific tokens

use std::future::Future;

use thiserror::Error;

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("spawn failed: {message}")]
    SpawnFailed { message: String },

    #[error("runtime unavailable: {message}")]
    RuntimeUnavailable { message: String },
}

/// Core runtime adapter trait - provides identity
pub trait RuntimeAdapter: Send + Sync + 'static {
    fn runtime_name() -> &'static str
    where
        Self: Sized;
}

/// Time operations trait
pub trait TimeOps: RuntimeAdapter {
    type Instant: Clone + Send + Sync + std::fmt::Debug + 'static;
    type Duration: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn now(&self) -> Self::Instant;
    fn duration_since(
        &self,
        later: Self::Instant,
        earlier: Self::Instant,
    ) -> Option<Self::Duration>;
    fn millis(&self, ms: u64) -> Self::Duration;
    fn secs(&self, secs: u64) -> Self::Duration;
    fn sleep(&self, duration: Self::Duration) -> impl Future<Output = ()> + Send;
}

/// Logging trait
pub trait Logger: RuntimeAdapter {
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Task spawning trait - adapter-specific implementation
pub trait Spawn: RuntimeAdapter {
    type SpawnToken: Send + 'static;
    fn spawn<F>(&self, future: F) -> ExecutorResult<Self::SpawnToken>
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Complete runtime trait bundle
pub trait Runtime: RuntimeAdapter + TimeOps + Logger + Spawn {
    fn runtime_info(&self) -> RuntimeInfo
    where
        Self: Sized,
    {
        RuntimeInfo {
            name: Self::runtime_name(),
        }
    }
}

// Auto-implement Runtime for any type with all traits
impl<T> Runtime for T where T: RuntimeAdapter + TimeOps + Logger + Spawn {}

#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub name: &'static str,
}
