//! Transform base: the nodes of the pipeline graph
//!
//! A transform has a name (its shared-state key), a guard, a transform
//! function and an ordered list of bound successors. The default
//! [`Transform::apply`] implements the dispatch every node shares; only
//! nodes with unusual routing (the token mapper, the batch demux) override
//! it.

use std::sync::{Arc, RwLock};

use crate::entity::Entity;
use crate::pipeline::guard::{Guard, GuardAction};

/// Shared handle to a pipeline node
pub type TransformPtr = Arc<dyn Transform>;

/// Ordered successor list of a transform
///
/// Interior-mutable so topologies can be wired after the nodes are shared;
/// binding happens during assembly, before any message flows.
#[derive(Default)]
pub struct Bindings {
    next: RwLock<Vec<TransformPtr>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a successor in bind order
    pub fn bind(&self, next: TransformPtr) {
        self.next
            .write()
            .expect("transform bindings lock poisoned")
            .push(next);
    }

    /// Snapshot of the successor list
    pub fn snapshot(&self) -> Vec<TransformPtr> {
        self.next
            .read()
            .expect("transform bindings lock poisoned")
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.next
            .read()
            .expect("transform bindings lock poisoned")
            .is_empty()
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        f.debug_struct("Bindings").field("next", &names).finish()
    }
}

/// A pipeline node: guard, transform function, bound successors
///
/// `apply` is the entry point invoked by predecessors:
///
/// 1. Evaluate the guard. `Stop` drops the entity.
/// 2. On `Run`, call [`Transform::transform`]; producing nothing ends the
///    flow for this entity.
/// 3. On `Skip`, or with the `Run` replacement, forward to every bound
///    successor in bind order and return the concatenated outputs. A node
///    with no successors returns its output directly, so terminal results
///    surface to the caller.
pub trait Transform: Send + Sync {
    /// Node name; doubles as the shared-state key, so two nodes with the
    /// same name intentionally share state
    fn name(&self) -> &str;

    /// The guard dispatching entities into this node
    fn guard(&self) -> &Guard;

    /// Successor list
    fn bindings(&self) -> &Bindings;

    /// Transform one entity into zero or one replacement
    fn transform(&self, entity: Entity) -> Option<Entity>;

    /// Binds a successor; messages forwarded by this node reach it in bind
    /// order after all previously bound successors
    fn bind(&self, next: TransformPtr) {
        self.bindings().bind(next);
    }

    /// Dispatches an entity through this node (see trait docs)
    fn apply(&self, entity: Entity) -> Vec<Entity> {
        match self.guard().check(&entity) {
            GuardAction::Stop => Vec::new(),
            GuardAction::Skip => self.forward(entity),
            GuardAction::Run => match self.transform(entity) {
                Some(replacement) => self.forward(replacement),
                None => Vec::new(),
            },
        }
    }

    /// Forwards an entity to every bound successor, concatenating outputs
    ///
    /// With no successors the entity itself is the output.
    fn forward(&self, entity: Entity) -> Vec<Entity> {
        let next = self.bindings().snapshot();
        let Some((last, rest)) = next.split_last() else {
            return vec![entity];
        };
        let mut out = Vec::new();
        for successor in rest {
            out.extend(successor.apply(entity.clone()));
        }
        out.extend(last.apply(entity));
        out
    }
}

/// Identity transform
///
/// Forwards whatever its guard admits, unchanged. Used as the pipeline
/// head and as a probe point in tests.
pub struct NullTransform {
    name: String,
    guard: Guard,
    bindings: Bindings,
}

impl NullTransform {
    pub fn new(guard: Guard) -> Self {
        Self::with_name("NullTransform", guard)
    }

    pub fn with_name(name: impl Into<String>, guard: Guard) -> Self {
        Self {
            name: name.into(),
            guard,
            bindings: Bindings::new(),
        }
    }
}

impl Transform for NullTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &Guard {
        &self.guard
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn transform(&self, entity: Entity) -> Option<Entity> {
        Some(entity)
    }
}
