//! Guards: variant-type dispatch for transforms
//!
//! A guard decides what a transform does with an incoming entity: run its
//! transform function, pass the entity through unchanged, or drop it.
//! Guards match on the entity's runtime name against a static supertype
//! table; there is no downcasting anywhere in the graph.

use crate::entity::{names, Entity};

/// Outcome of evaluating a guard against an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
    /// Transform the entity and forward the replacement
    Run,
    /// Forward the entity unchanged
    Skip,
    /// Drop the entity
    Stop,
}

/// Supertype relation over entity names
///
/// The table is static: observation kinds are subtypes of `Observation`,
/// and every name is a subtype of `Entity`.
pub fn is_a(name: &str, ancestor: &str) -> bool {
    if name == ancestor || ancestor == names::ENTITY {
        return true;
    }
    match ancestor {
        names::OBSERVATION => matches!(
            name,
            names::SAMPLE
                | names::EVENT
                | names::CONDITION
                | names::DATA_SET
                | names::TIME_SERIES
                | names::TABLE
        ),
        _ => false,
    }
}

#[derive(Debug, Clone)]
enum Clause {
    /// Matches iff the entity name is exactly `name`
    Exact { name: String, action: GuardAction },
    /// Matches iff `name` is the entity's name or one of its supertypes
    Type { name: String, action: GuardAction },
}

impl Clause {
    fn check(&self, entity: &Entity) -> GuardAction {
        match self {
            Clause::Exact { name, action } => {
                if entity.name() == name {
                    *action
                } else {
                    GuardAction::Stop
                }
            }
            Clause::Type { name, action } => {
                if is_a(entity.name(), name) {
                    *action
                } else {
                    GuardAction::Stop
                }
            }
        }
    }
}

/// Composable predicate from entity to [`GuardAction`]
///
/// Clauses are evaluated in order; the first non-`Stop` outcome wins, and a
/// guard whose clauses all miss yields `Stop`. The configured outcome of a
/// clause is `Run` or `Skip`.
///
/// # Example
///
/// ```rust,ignore
/// // Samples run, other observations pass through, everything else stops.
/// let guard = Guard::exact(names::SAMPLE, GuardAction::Run)
///     .or_type(names::OBSERVATION, GuardAction::Skip);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Guard {
    clauses: Vec<Clause>,
}

impl Guard {
    /// Guard with a single exact-name clause
    pub fn exact(name: impl Into<String>, action: GuardAction) -> Self {
        Self {
            clauses: vec![Clause::Exact {
                name: name.into(),
                action,
            }],
        }
    }

    /// Guard with a single supertype clause
    pub fn of_type(name: impl Into<String>, action: GuardAction) -> Self {
        Self {
            clauses: vec![Clause::Type {
                name: name.into(),
                action,
            }],
        }
    }

    /// Guard matching every entity
    pub fn any(action: GuardAction) -> Self {
        Self::of_type(names::ENTITY, action)
    }

    /// Appends an exact-name clause
    pub fn or_exact(mut self, name: impl Into<String>, action: GuardAction) -> Self {
        self.clauses.push(Clause::Exact {
            name: name.into(),
            action,
        });
        self
    }

    /// Appends a supertype clause
    pub fn or_type(mut self, name: impl Into<String>, action: GuardAction) -> Self {
        self.clauses.push(Clause::Type {
            name: name.into(),
            action,
        });
        self
    }

    /// Evaluates the guard against an entity
    pub fn check(&self, entity: &Entity) -> GuardAction {
        for clause in &self.clauses {
            let action = clause.check(entity);
            if action != GuardAction::Stop {
                return action;
            }
        }
        GuardAction::Stop
    }
}
