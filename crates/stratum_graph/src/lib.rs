//! Declarative resource graphs for Stratum.
//!
//! `stratum_graph` lets a program describe infrastructure as a graph of
//! resource declarations whose attributes are deferred
//! [`OutputCell`](stratum_output::OutputCell)s. The program runs once; an
//! engine later walks the frozen graph in dependency order and settles the
//! cells.
//!
//! # Core Concepts
//!
//! - [`GraphBuilder`] - Records declarations and derives dependency edges
//! - [`Graph`] - Validated declarations in dependency order
//! - [`Program`] / [`Context`] - Runs a declaring procedure exactly once
//! - [`Deployment`] - Engine-facing view: settle, fail or abort cells
//! - [`ExportSet`] - Named values surfaced to the caller
//! - [`DeploymentExecutor`] - Reference engine driving a [`Provisioner`]
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use stratum_graph::prelude::*;
//!
//! let deployment = Program::new(RunConfig::new("demo").with_stack("dev"))
//!     .run(|ctx| {
//!         let rg = ctx.declare(
//!             "rg",
//!             "cloud:Group",
//!             Inputs::new().set("name", format!("rg-{}", ctx.stack())),
//!         )?;
//!         ctx.export("resourceGroupId", rg.id())?;
//!         Ok::<_, GraphError>(())
//!     })
//!     .unwrap();
//!
//! deployment
//!     .resolve(&AttributeRef::new("rg", "id"), json!("rg-123"))
//!     .unwrap();
//! let exported = deployment.exports().get("resourceGroupId").unwrap();
//! assert_eq!(exported.state().value(), Some(&json!("rg-123")));
//! ```

/// Graph builder API.
pub mod builder;

/// Run configuration.
pub mod config;

/// Engine-facing deployment handle.
pub mod deploy;

/// Reference provisioning engine.
pub mod engine;

/// Error types.
pub mod error;

/// Stack exports.
pub mod export;

/// The finalized graph.
pub mod graph;

/// Resource inputs.
pub mod input;

/// Declaring programs.
pub mod program;

/// Resource identity, declarations and handles.
pub mod resource;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::builder::GraphBuilder;
    pub use crate::config::RunConfig;
    pub use crate::deploy::{Deployment, RunId};
    pub use crate::engine::{
        DeploymentExecutor, DeploymentSummary, ExecutionError, ProvisionError, ProvisionRequest,
        ProvisionResponse, Provisioner,
    };
    pub use crate::error::{DeploymentError, GraphError};
    pub use crate::export::{ExportSet, StackOutputs};
    pub use crate::graph::Graph;
    pub use crate::input::{Input, Inputs, IntoInput};
    pub use crate::program::{Context, Program};
    pub use crate::resource::{
        AttributeRef, DeclareOptions, ResourceDeclaration, ResourceHandle, ResourceId,
        ResourceSchema, SchemaRegistry, Urn,
    };
    pub use stratum_output::prelude::*;
}

// Re-export key types at crate root for convenience
pub use builder::GraphBuilder;
pub use config::RunConfig;
pub use deploy::{Deployment, RunId};
pub use engine::{DeploymentExecutor, DeploymentSummary, ExecutionError, Provisioner};
pub use error::{DeploymentError, GraphError};
pub use export::{ExportSet, StackOutputs};
pub use graph::Graph;
pub use program::{Context, Program};
