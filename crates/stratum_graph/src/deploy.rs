//! The engine-facing side of a finished program run.
//!
//! A [`Deployment`] bundles the frozen [`Graph`] and [`ExportSet`] of one run.
//! It is the only place attribute slots can be settled from: the engine walks
//! [`Deployment::graph`], provisions each resource, and reports back through
//! [`Deployment::resolve`] and [`Deployment::fail`]. Giving up on the run is
//! [`Deployment::abort`].

use core::fmt;
use std::sync::Arc;

use serde_json::Value;
use stratum_output::{CellError, Outcome};

use crate::config::RunConfig;
use crate::error::DeploymentError;
use crate::export::ExportSet;
use crate::graph::Graph;
use crate::resource::AttributeRef;

/// Unique identifier for one run.
///
/// Run IDs are nanoids, so independent runs never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(Arc<str>);

impl RunId {
    /// Creates a new run ID with a unique nanoid.
    #[must_use]
    pub fn new() -> Self {
        Self(nanoid::nanoid!().into())
    }

    /// Creates a run ID from a specific string value.
    #[must_use]
    pub fn from_string(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// A finalized graph and its exports, ready for an engine.
#[derive(Debug)]
pub struct Deployment {
    run_id: RunId,
    config: RunConfig,
    graph: Graph,
    exports: ExportSet,
}

impl Deployment {
    pub(crate) fn new(config: RunConfig, graph: Graph, exports: ExportSet) -> Self {
        let run_id = RunId::new();
        tracing::debug!(
            %run_id,
            project = config.project(),
            stack = config.stack(),
            resources = graph.len(),
            exports = exports.len(),
            "deployment ready"
        );
        Self {
            run_id,
            config,
            graph,
            exports,
        }
    }

    /// This run's ID.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The configuration the program ran with.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The declarations in dependency order.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The program's exports.
    #[must_use]
    pub fn exports(&self) -> &ExportSet {
        &self.exports
    }

    /// Resolves an attribute slot with its provisioned value.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::UnknownAttribute`] for a slot that does not
    /// exist and [`DeploymentError::AlreadySettled`] if it already settled.
    pub fn resolve(&self, attribute: &AttributeRef, value: Value) -> Result<(), DeploymentError> {
        self.settle(attribute, Ok(value))
    }

    /// Fails an attribute slot.
    ///
    /// Failure propagates to every cell derived from the slot.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn fail(&self, attribute: &AttributeRef, error: CellError) -> Result<(), DeploymentError> {
        self.settle(attribute, Err(error))
    }

    /// Settles an attribute slot with either outcome.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn settle(&self, attribute: &AttributeRef, outcome: Outcome<Value>) -> Result<(), DeploymentError> {
        let resolver = self
            .graph
            .resolver(attribute)
            .ok_or_else(|| DeploymentError::UnknownAttribute(attribute.clone()))?;
        resolver
            .settle(outcome)
            .map_err(|source| DeploymentError::AlreadySettled {
                attribute: attribute.clone(),
                source,
            })
    }

    /// Fails every still-pending slot with [`CellError::RunAborted`].
    ///
    /// Returns the number of slots that were aborted.
    pub fn abort(&self, reason: impl Into<Arc<str>>) -> usize {
        let reason = reason.into();
        let aborted = self.graph.registry().abort(Arc::clone(&reason));
        tracing::warn!(run_id = %self.run_id, %reason, aborted, "deployment aborted");
        aborted
    }

    /// The reason the run was aborted, if it was.
    #[must_use]
    pub fn abort_reason(&self) -> Option<Arc<str>> {
        self.graph.registry().abort_reason()
    }

    /// Number of slots that have not settled yet.
    #[must_use]
    pub fn pending_cells(&self) -> usize {
        self.graph.registry().pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::input::Inputs;
    use serde_json::json;

    fn deployment() -> Deployment {
        let mut builder = GraphBuilder::new(RunConfig::new("test"));
        builder
            .declare("rg", "t", Inputs::new().set("name", "rg-dev"))
            .unwrap();
        Deployment::new(
            RunConfig::new("test"),
            builder.finalize().unwrap(),
            ExportSet::new(),
        )
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_string("abc").to_string(), "run_abc");
    }

    #[test]
    fn resolve_settles_slot_once() {
        let deployment = deployment();
        let id = AttributeRef::new("rg", "id");
        deployment.resolve(&id, json!("rg-123")).unwrap();

        let err = deployment.resolve(&id, json!("rg-456")).unwrap_err();
        assert!(matches!(err, DeploymentError::AlreadySettled { .. }));
        let cell = deployment.graph().cell(&id).unwrap();
        assert_eq!(cell.state().value(), Some(&json!("rg-123")));
    }

    #[test]
    fn unknown_slot_is_reported() {
        let deployment = deployment();
        let err = deployment
            .fail(&AttributeRef::new("vpc", "id"), CellError::provider_message("x"))
            .unwrap_err();
        assert_eq!(err, DeploymentError::UnknownAttribute(AttributeRef::new("vpc", "id")));
    }

    #[test]
    fn abort_fails_pending_slots() {
        let deployment = deployment();
        deployment
            .resolve(&AttributeRef::new("rg", "id"), json!("rg-1"))
            .unwrap();
        assert_eq!(deployment.pending_cells(), 1);

        assert_eq!(deployment.abort("cancelled"), 1);
        let name = deployment.graph().cell(&AttributeRef::new("rg", "name")).unwrap();
        assert!(name.state().error().is_some_and(CellError::is_aborted));
        assert_eq!(deployment.pending_cells(), 0);
    }
}
