//! Stack exports.
//!
//! Exports are the values a program surfaces to its caller once provisioning
//! finishes: an insertion-ordered mapping from export name to cell. The set
//! is frozen together with the graph; [`ExportSet::collect`] waits for every
//! export to settle and hands back a [`StackOutputs`] snapshot.

use futures::future::join_all;
use hashbrown::HashSet;
use serde_json::{Map, Value};
use stratum_output::{CellError, CellState, Outcome, OutputCell};

use crate::error::GraphError;
use crate::input::IntoInput;

/// Named values exported by a program, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ExportSet {
    entries: Vec<(String, OutputCell<Value>)>,
    names: HashSet<String>,
}

impl ExportSet {
    /// Creates an empty export set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an export.
    ///
    /// Any input is accepted: literals become resolved cells, lists are
    /// gathered into one cell.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateExport`] if `name` is already exported.
    pub fn export(&mut self, name: impl Into<String>, value: impl IntoInput) -> Result<(), GraphError> {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(GraphError::DuplicateExport { name });
        }
        self.entries.push((name, value.into_input().into_cell()));
        Ok(())
    }

    /// Looks up an export's cell.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutputCell<Value>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, cell)| cell)
    }

    /// Exports in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputCell<Value>)> {
        self.entries.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    /// Number of exports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current state of every export, without waiting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(&str, CellState<Value>)> {
        self.iter().map(|(name, cell)| (name, cell.state())).collect()
    }

    /// Waits for every export to settle.
    pub async fn collect(&self) -> StackOutputs {
        let outcomes = join_all(self.entries.iter().map(|(_, cell)| cell.wait())).await;
        StackOutputs {
            entries: self
                .entries
                .iter()
                .map(|(name, _)| name.clone())
                .zip(outcomes)
                .collect(),
        }
    }
}

/// Settled exports of a finished run.
#[derive(Debug, Clone)]
pub struct StackOutputs {
    entries: Vec<(String, Outcome<Value>)>,
}

impl StackOutputs {
    /// The outcome of one export.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Outcome<Value>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, outcome)| outcome)
    }

    /// Every export outcome in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome<Value>)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// Exports that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &CellError)> {
        self.iter()
            .filter_map(|(name, outcome)| outcome.as_ref().err().map(|err| (name, err)))
    }

    /// Returns `true` if every export resolved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Renders the resolved exports as an ordered JSON object.
    ///
    /// Failed exports are left out; inspect them with [`failures`](Self::failures).
    #[must_use]
    pub fn to_json(&self) -> Value {
        let resolved: Map<String, Value> = self
            .entries
            .iter()
            .filter_map(|(name, outcome)| {
                outcome.as_ref().ok().map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Value::Object(resolved)
    }
}
