//! Line source: from adapter transport to pipeline head
//!
//! Transports (TCP sessions, serial readers) deliver raw SHDR lines over a
//! channel; [`ShdrLineSource`] parses each line and submits the result to
//! the pipeline head, one at a time. Awaiting every submission before
//! reading the next line is what serializes an adapter's batches, so a
//! stream's observations leave the pipeline in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;

use obsflow_core::pipeline::{parse_line, PipelineHandle};
use obsflow_core::{Entity, PipelineResult};

/// Connection states injected around a line stream
const CONNECTED: &str = "CONNECTED";
const DISCONNECTED: &str = "DISCONNECTED";

/// Pumps SHDR lines from a transport channel into a running pipeline
pub struct ShdrLineSource {
    name: String,
    handle: Arc<PipelineHandle>,
}

impl ShdrLineSource {
    /// Creates a source feeding the given pipeline handle
    ///
    /// `name` identifies the adapter in logs.
    pub fn new(name: impl Into<String>, handle: Arc<PipelineHandle>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// Drains the line channel until the transport closes it
    ///
    /// Injects `CONNECTED` before the first line and `DISCONNECTED` after
    /// the last. Unparsable lines are logged and skipped; the stream
    /// continues. Returns early only when the pipeline shuts down
    /// underneath the source.
    pub async fn run(self, mut lines: mpsc::Receiver<String>) -> PipelineResult<()> {
        tracing::info!(adapter = %self.name, "line source connected");
        self.handle
            .submit(Entity::connect_status(CONNECTED))
            .await?;

        while let Some(line) = lines.recv().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix('*') {
                match parse_command(command) {
                    Some(entity) => self.handle.submit(entity).await?,
                    None => {
                        tracing::warn!(adapter = %self.name, line, "malformed command line")
                    }
                }
                continue;
            }

            match parse_line(line) {
                Ok(batch) => self.handle.submit(batch).await?,
                Err(error) => {
                    tracing::warn!(
                        adapter = %self.name,
                        %error,
                        line,
                        "dropping unparsable line"
                    );
                }
            }
        }

        tracing::info!(adapter = %self.name, "line source disconnected");
        self.handle
            .submit(Entity::connect_status(DISCONNECTED))
            .await?;
        Ok(())
    }
}

/// Parses an agent command line: `* key: value`
fn parse_command(command: &str) -> Option<Entity> {
    let (key, value) = command.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(Entity::command(key, value.trim()))
}
