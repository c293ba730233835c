//! Tokio implementation of the pipeline runtime traits

use std::future::Future;
use std::time::{Duration, Instant};

use obsflow_core::runtime::{ExecutorResult, Logger, RuntimeAdapter, Spawn, TimeOps};

/// Tokio runtime adapter
///
/// A zero-sized handle over the ambient Tokio runtime: spawning goes to
/// `tokio::spawn`, time operations to `tokio::time`, and logging to
/// `tracing`. Construction is free and cannot fail.
///
/// # Example
/// ```rust,no_run
/// use obsflow_tokio_adapter::TokioAdapter;
///
/// #[tokio::main]
/// async fn main() -> obsflow_core::PipelineResult<()> {
///     let runtime = TokioAdapter::new();
///     // pipeline.start(&runtime)?
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioAdapter;

impl TokioAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeAdapter for TokioAdapter {
    fn runtime_name() -> &'static str {
        "tokio"
    }
}

impl Spawn for TokioAdapter {
    type SpawnToken = tokio::task::JoinHandle<()>;

    fn spawn<F>(&self, future: F) -> ExecutorResult<Self::SpawnToken>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("spawning future on Tokio runtime");
        Ok(tokio::spawn(future))
    }
}

impl TimeOps for TokioAdapter {
    type Instant = Instant;
    type Duration = Duration;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn duration_since(
        &self,
        later: Self::Instant,
        earlier: Self::Instant,
    ) -> Option<Self::Duration> {
        later.checked_duration_since(earlier)
    }

    fn millis(&self, millis: u64) -> Self::Duration {
        Duration::from_millis(millis)
    }

    fn secs(&self, secs: u64) -> Self::Duration {
        Duration::from_secs(secs)
    }

    fn sleep(&self, duration: Self::Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

impl Logger for TokioAdapter {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

// Runtime trait is auto-implemented from RuntimeAdapter + TimeOps + Logger + Spawn
