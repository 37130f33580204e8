//! Reference provisioning engine.
//!
//! [`DeploymentExecutor`] drives a [`Deployment`] through a [`Provisioner`]:
//! it walks the graph in dependency order, waits for each resource's inputs,
//! asks the provisioner to create it, and settles the resource's attribute
//! cells with the result. Independent resources are provisioned
//! concurrently, up to the configured parallelism.
//!
//! When a provisioner fails, the executor stops scheduling new resources,
//! lets in-flight work finish, and aborts the run so every remaining cell
//! fails with [`CellError::RunAborted`]. A run aborted from outside through
//! [`Deployment::abort`] is wound down the same way: nothing new is handed to
//! the provisioner and slots that already hold the abort keep it.

use core::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use stratum_output::{CellError, Outcome};
use tracing::Instrument;

use crate::deploy::Deployment;
use crate::error::DeploymentError;
use crate::resource::{AttributeRef, ID_ATTRIBUTE, ResourceDeclaration, Urn};

// ─────────────────────────────────────────────────────────────────────────────
// Provisioner seam
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a provisioner needs to create one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    /// The resource's URN.
    pub urn: Urn,
    /// The logical name.
    pub name: String,
    /// The resource type tag.
    pub type_tag: String,
    /// Fully resolved inputs, in declaration order.
    pub inputs: Map<String, Value>,
}

/// What a provisioner reports for a created resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionResponse {
    /// The provider-assigned ID.
    pub id: Value,
    /// Computed outputs. Inputs not listed here are echoed back.
    pub outputs: Map<String, Value>,
}

impl ProvisionResponse {
    /// Creates a response with the given ID and no computed outputs.
    #[must_use]
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            outputs: Map::new(),
        }
    }

    /// Adds a computed output.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }
}

/// A provisioner's report that a resource could not be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionError {
    message: String,
}

impl ProvisionError {
    /// Creates a provision error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The seam an actual engine implements to create resources.
pub trait Provisioner: Send + Sync {
    /// Creates one resource.
    fn provision(
        &self,
        request: ProvisionRequest,
    ) -> BoxFuture<'_, Result<ProvisionResponse, ProvisionError>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Result of executing a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSummary {
    /// Resources the provisioner created.
    pub created: usize,
    /// Resources the provisioner failed to create.
    pub failed: usize,
    /// Resources never handed to the provisioner, because an input failed or
    /// the run was aborted first.
    pub skipped: usize,
    /// Total execution duration.
    pub duration: Duration,
}

impl DeploymentSummary {
    /// Returns `true` if every resource was created.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Errors that stop the executor itself.
///
/// Provisioning failures are not execution errors: they settle cells and show
/// up in the [`DeploymentSummary`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// A cell was addressed that does not exist or had already settled.
    #[error("deployment protocol violated: {0}")]
    Protocol(#[from] DeploymentError),
}

enum ResourceOutcome {
    Created,
    Failed(String),
    Skipped,
}

/// Drives a [`Deployment`] through a [`Provisioner`].
#[derive(Debug, Clone, Default)]
pub struct DeploymentExecutor {
    parallelism: Option<usize>,
    timeout: Option<Duration>,
}

impl DeploymentExecutor {
    /// Creates an executor that uses the deployment's configured parallelism
    /// and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bound on concurrently provisioned resources.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism.max(1));
        self
    }

    /// Fails a resource whose provisioner does not answer within `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Provisions every resource of the deployment.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Protocol`] if a cell could not be settled.
    /// The run is aborted before returning.
    pub async fn execute<P>(
        &self,
        deployment: &Deployment,
        provisioner: &P,
    ) -> Result<DeploymentSummary, ExecutionError>
    where
        P: Provisioner + ?Sized,
    {
        let start = std::time::Instant::now();
        let parallelism = self
            .parallelism
            .unwrap_or_else(|| deployment.config().parallelism())
            .max(1);
        let declarations = deployment.graph().declarations();

        tracing::info!(
            run_id = %deployment.run_id(),
            resources = declarations.len(),
            parallelism,
            "executing deployment"
        );

        let mut in_flight = FuturesUnordered::new();
        let mut next = 0;
        let mut halted: Option<String> = None;
        let mut created = 0;
        let mut failed = 0;

        loop {
            if halted.is_none()
                && let Some(reason) = deployment.abort_reason()
            {
                tracing::warn!(%reason, "run aborted, no further resources scheduled");
                halted = Some(reason.to_string());
            }
            while halted.is_none() && in_flight.len() < parallelism && next < declarations.len() {
                let declaration = &declarations[next];
                let span = tracing::info_span!("provision", resource = declaration.name());
                in_flight.push(
                    self.provision_one(deployment, declaration, provisioner)
                        .instrument(span),
                );
                next += 1;
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };

            match outcome {
                Ok(ResourceOutcome::Created) => created += 1,
                Ok(ResourceOutcome::Failed(reason)) => {
                    failed += 1;
                    if halted.is_none() {
                        halted = Some(reason);
                    }
                }
                Ok(ResourceOutcome::Skipped) => {}
                Err(err) => {
                    deployment.abort(format!("deployment protocol violated: {err}"));
                    return Err(err.into());
                }
            }
        }

        if let Some(reason) = halted
            && deployment.abort_reason().is_none()
        {
            deployment.abort(reason);
        }

        let summary = DeploymentSummary {
            created,
            failed,
            skipped: declarations.len() - created - failed,
            duration: start.elapsed(),
        };
        tracing::info!(
            created = summary.created,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration.as_millis(),
            "deployment finished"
        );
        Ok(summary)
    }

    async fn provision_one<P>(
        &self,
        deployment: &Deployment,
        declaration: &ResourceDeclaration,
        provisioner: &P,
    ) -> Result<ResourceOutcome, DeploymentError>
    where
        P: Provisioner + ?Sized,
    {
        let graph = deployment.graph();

        // Explicit dependencies carry no data; waiting on their id orders them.
        for dependency in declaration.explicit_dependencies() {
            let Some(id) = graph.cell(&AttributeRef::new(dependency, ID_ATTRIBUTE)) else {
                continue;
            };
            if let Err(err) = id.wait().await {
                tracing::debug!(dependency, %err, "dependency failed, skipping resource");
                fail_all(deployment, declaration, &err)?;
                return Ok(ResourceOutcome::Skipped);
            }
        }

        let inputs = match declaration.inputs().resolve().await {
            Ok(inputs) => inputs,
            Err(err) => {
                tracing::debug!(%err, "input failed, skipping resource");
                fail_all(deployment, declaration, &err)?;
                return Ok(ResourceOutcome::Skipped);
            }
        };

        if let Some(reason) = deployment.abort_reason() {
            tracing::debug!(%reason, "run aborted, skipping resource");
            return Ok(ResourceOutcome::Skipped);
        }

        let request = ProvisionRequest {
            urn: declaration.urn().clone(),
            name: declaration.name().to_string(),
            type_tag: declaration.type_tag().to_string(),
            inputs,
        };
        let echoed = request.inputs.clone();

        let response = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, provisioner.provision(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProvisionError::new(format!(
                    "provisioning timed out after {timeout:?}"
                ))),
            },
            None => provisioner.provision(request).await,
        };

        match response {
            Ok(response) => {
                settle_attributes(deployment, declaration, response, &echoed)?;
                tracing::info!(urn = %declaration.urn(), "resource created");
                Ok(ResourceOutcome::Created)
            }
            Err(err) => {
                tracing::warn!(urn = %declaration.urn(), %err, "resource failed");
                let reason = format!("resource '{}' failed: {err}", declaration.name());
                fail_all(deployment, declaration, &CellError::provider(err))?;
                Ok(ResourceOutcome::Failed(reason))
            }
        }
    }
}

/// Resolves each attribute from the provider's value, falling back to the
/// echoed input of the same name.
fn settle_attributes(
    deployment: &Deployment,
    declaration: &ResourceDeclaration,
    mut response: ProvisionResponse,
    echoed: &Map<String, Value>,
) -> Result<(), DeploymentError> {
    for attribute in declaration.attributes() {
        let slot = AttributeRef::new(declaration.name(), attribute);
        let value = if attribute == ID_ATTRIBUTE {
            Some(core::mem::take(&mut response.id))
        } else {
            response
                .outputs
                .remove(attribute)
                .or_else(|| echoed.get(attribute).cloned())
        };
        let outcome = value.ok_or_else(|| CellError::missing_attribute(attribute));
        settle_slot(deployment, &slot, outcome)?;
    }
    Ok(())
}

fn fail_all(
    deployment: &Deployment,
    declaration: &ResourceDeclaration,
    error: &CellError,
) -> Result<(), DeploymentError> {
    for attribute in declaration.attributes() {
        let slot = AttributeRef::new(declaration.name(), attribute);
        settle_slot(deployment, &slot, Err(error.clone()))?;
    }
    Ok(())
}

/// Settles one slot. A slot the run already aborted keeps its abort error.
fn settle_slot(
    deployment: &Deployment,
    slot: &AttributeRef,
    outcome: Outcome<Value>,
) -> Result<(), DeploymentError> {
    match deployment.settle(slot, outcome) {
        Err(DeploymentError::AlreadySettled { .. }) if is_aborted(deployment, slot) => Ok(()),
        result => result,
    }
}

fn is_aborted(deployment: &Deployment, slot: &AttributeRef) -> bool {
    deployment
        .graph()
        .cell(slot)
        .is_some_and(|cell| cell.state().error().is_some_and(CellError::is_aborted))
}
