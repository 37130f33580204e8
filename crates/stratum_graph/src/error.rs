//! Error types for graph construction and deployment.

use stratum_output::AlreadySettled;

use crate::resource::AttributeRef;

/// Errors detected from in-memory state while a program declares its graph.
///
/// All of these fail the run before the provisioning engine sees anything.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two declarations share a logical name.
    #[error("resource '{name}' is already declared")]
    DuplicateName {
        /// The repeated logical name.
        name: String,
    },

    /// The dependency edges do not form a DAG.
    #[error("dependency cycle detected between resources: {}", .resources.join(", "))]
    CycleDetected {
        /// Resources on a cycle, in declaration order.
        resources: Vec<String>,
    },

    /// A reference or explicit dependency names a resource that was never declared.
    #[error("resource '{name}' referenced by '{referenced_by}' is not declared")]
    UnknownResource {
        /// The missing resource.
        name: String,
        /// What referenced it: a resource name, or the attribute of a late-bound reference.
        referenced_by: String,
    },

    /// A late-bound reference names an attribute the resource does not produce.
    #[error("resource '{resource}' does not produce attribute '{attribute}'")]
    UnknownAttribute {
        /// The declared resource.
        resource: String,
        /// The attribute that was referenced.
        attribute: String,
    },

    /// Two exports share a name.
    #[error("export '{name}' is already registered")]
    DuplicateExport {
        /// The repeated export name.
        name: String,
    },

    /// The run configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised when the engine settles cells through a deployment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeploymentError {
    /// The engine addressed an attribute slot that does not exist.
    #[error("unknown attribute slot: {0}")]
    UnknownAttribute(AttributeRef),

    /// The engine tried to settle a slot twice.
    #[error("attribute slot {attribute} settled twice")]
    AlreadySettled {
        /// The slot that was already terminal.
        attribute: AttributeRef,
        /// The underlying single-assignment violation.
        #[source]
        source: AlreadySettled,
    },
}
