//! Pipeline context: contract handle, shared state, sequencing
//!
//! One [`PipelineContext`] is shared by every transform in a pipeline. It
//! carries the device-model contract, the registry of per-transform
//! persistent state, and the sequencer that numbers forwarded observations.
//! Context lifetime is pipeline lifetime: a rebuilt pipeline gets a fresh
//! context and therefore empty filter state.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::pipeline::contract::PipelineContract;

/// Process-wide registry of per-transform persistent state
///
/// Entries are keyed by transform name and created lazily; two transforms
/// sharing a name share state intentionally (multi-branch filters of the
/// same kind coordinate this way). The registry lock is reader-writer;
/// individual state objects carry their own fine-grained mutex.
#[derive(Default)]
pub struct SharedState {
    entries: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state object stored under `key`, creating it on first use
    ///
    /// The stored object must be the same type `S` on every call for a given
    /// key; a conflicting type is a programming error and yields a fresh,
    /// unshared default so the pipeline stays alive.
    pub fn get_or_default<S>(&self, key: &str) -> Arc<S>
    where
        S: Default + Send + Sync + 'static,
    {
        {
            let entries = self.entries.read().expect("shared state lock poisoned");
            if let Some(entry) = entries.get(key) {
                if let Ok(state) = Arc::clone(entry).downcast::<S>() {
                    return state;
                }
                #[cfg(feature = "tracing")]
                tracing::error!(key, "shared state type conflict, using unshared state");
                return Arc::new(S::default());
            }
        }

        let mut entries = self.entries.write().expect("shared state lock poisoned");
        // Double-check: another thread may have created the entry between locks.
        if let Some(entry) = entries.get(key) {
            if let Ok(state) = Arc::clone(entry).downcast::<S>() {
                return state;
            }
        }
        let state = Arc::new(S::default());
        entries.insert(key.to_string(), Arc::clone(&state) as Arc<dyn Any + Send + Sync>);
        state
    }

    /// Number of registered state entries
    pub fn len(&self) -> usize {
        self.entries.read().expect("shared state lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single assignment point for observation sequence numbers
///
/// Numbers start at 1 and are strictly increasing with no gaps for the
/// lifetime of the context. The mutex keeps the invariant regardless of
/// worker count.
pub struct Sequencer {
    next: Mutex<u64>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self { next: Mutex::new(1) }
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next sequence number
    pub fn next(&self) -> u64 {
        let mut next = self.next.lock().expect("sequencer lock poisoned");
        let sequence = *next;
        *next += 1;
        sequence
    }

    /// The number the next call to [`Sequencer::next`] will return
    pub fn peek(&self) -> u64 {
        *self.next.lock().expect("sequencer lock poisoned")
    }
}

/// Shared context threaded through every transform of a pipeline
pub struct PipelineContext {
    contract: Arc<dyn PipelineContract>,
    shared_state: SharedState,
    sequencer: Sequencer,
}

impl PipelineContext {
    /// Creates a context over a device-model contract
    pub fn new(contract: Arc<dyn PipelineContract>) -> Arc<Self> {
        Arc::new(Self {
            contract,
            shared_state: SharedState::new(),
            sequencer: Sequencer::new(),
        })
    }

    /// The device-model view
    pub fn contract(&self) -> &Arc<dyn PipelineContract> {
        &self.contract
    }

    /// The per-transform state registry
    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    /// The observation sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }
}
