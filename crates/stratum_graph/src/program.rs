//! Declarative programs.
//!
//! A [`Program`] runs a declaring procedure exactly once against a fresh
//! [`Context`]. The procedure declares resources and registers exports; it
//! never waits on a cell. When it returns, the recorded graph is validated
//! and frozen into a [`Deployment`].
//!
//! # Example
//!
//! ```
//! use stratum_graph::prelude::*;
//!
//! let deployment = Program::new(RunConfig::new("demo"))
//!     .run(|ctx| {
//!         let name = format!("example-rg-{}", ctx.stack());
//!         let rg = ctx.declare("rg", "cloud:Group", Inputs::new().set("name", name))?;
//!         ctx.export("resourceGroupId", rg.id())?;
//!         Ok::<_, GraphError>(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(deployment.graph().len(), 1);
//! assert_eq!(deployment.exports().len(), 1);
//! ```

use serde_json::Value;
use stratum_output::OutputCell;

use crate::builder::GraphBuilder;
use crate::config::RunConfig;
use crate::deploy::Deployment;
use crate::error::GraphError;
use crate::export::ExportSet;
use crate::input::{Inputs, IntoInput};
use crate::resource::{DeclareOptions, ResourceHandle, ResourceSchema, SchemaRegistry};

/// What a declaring procedure sees while it runs.
#[derive(Debug)]
pub struct Context {
    builder: GraphBuilder,
    exports: ExportSet,
}

impl Context {
    fn new(config: RunConfig, schemas: SchemaRegistry) -> Self {
        Self {
            builder: GraphBuilder::with_schemas(config, schemas),
            exports: ExportSet::new(),
        }
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        self.builder.config()
    }

    /// The stack name, for interpolating into literal resource names.
    #[must_use]
    pub fn stack(&self) -> &str {
        self.config().stack()
    }

    /// The project name.
    #[must_use]
    pub fn project(&self) -> &str {
        self.config().project()
    }

    /// Declares a resource. See [`GraphBuilder::declare`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateName`] if `name` was already declared.
    pub fn declare(
        &mut self,
        name: &str,
        type_tag: &str,
        inputs: Inputs,
    ) -> Result<ResourceHandle, GraphError> {
        self.builder.declare(name, type_tag, inputs)
    }

    /// Declares a resource with options. See [`GraphBuilder::declare_with`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateName`] if `name` was already declared.
    pub fn declare_with(
        &mut self,
        name: &str,
        type_tag: &str,
        inputs: Inputs,
        options: DeclareOptions,
    ) -> Result<ResourceHandle, GraphError> {
        self.builder.declare_with(name, type_tag, inputs, options)
    }

    /// Late-bound reference to `resource.attribute`. See [`GraphBuilder::reference`].
    #[must_use]
    pub fn reference(&mut self, resource: &str, attribute: &str) -> OutputCell<Value> {
        self.builder.reference(resource, attribute)
    }

    /// Registers a stack export.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateExport`] if `name` is already exported.
    pub fn export(&mut self, name: impl Into<String>, value: impl IntoInput) -> Result<(), GraphError> {
        self.exports.export(name, value)
    }
}

/// A declaring procedure plus the configuration it runs under.
#[derive(Debug, Clone, Default)]
pub struct Program {
    config: RunConfig,
    schemas: SchemaRegistry,
}

impl Program {
    /// Creates a program for the given configuration.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            schemas: SchemaRegistry::new(),
        }
    }

    /// Registers a resource schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ResourceSchema) -> Self {
        self.schemas.register(schema);
        self
    }

    /// Registers several resource schemas.
    #[must_use]
    pub fn with_schemas(mut self, schemas: impl IntoIterator<Item = ResourceSchema>) -> Self {
        for schema in schemas {
            self.schemas.register(schema);
        }
        self
    }

    /// The configuration this program runs under.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the declaring procedure once and freezes what it declared.
    ///
    /// The procedure may use its own error type as long as graph errors
    /// convert into it, so `?` works on every [`Context`] call.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, the procedure's own error, or the
    /// validation error from finalizing the graph. No engine has seen any of
    /// the declarations when this fails.
    pub fn run<F, E>(&self, procedure: F) -> Result<Deployment, E>
    where
        F: FnOnce(&mut Context) -> Result<(), E>,
        E: From<GraphError>,
    {
        self.config.validate()?;

        let _span = tracing::debug_span!(
            "program_run",
            project = self.config.project(),
            stack = self.config.stack()
        )
        .entered();

        let mut ctx = Context::new(self.config.clone(), self.schemas.clone());
        procedure(&mut ctx)?;

        let Context { builder, exports } = ctx;
        let graph = builder.finalize()?;
        Ok(Deployment::new(self.config.clone(), graph, exports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_errors_are_returned() {
        let result = Program::new(RunConfig::new("test")).run(|ctx| {
            ctx.declare("rg", "t", Inputs::new())?;
            ctx.declare("rg", "t", Inputs::new())?;
            Ok::<_, GraphError>(())
        });
        assert!(matches!(result, Err(GraphError::DuplicateName { .. })));
    }

    #[test]
    fn invalid_config_fails_before_procedure_runs() {
        let mut ran = false;
        let result = Program::new(RunConfig::new("test").with_parallelism(0)).run(|_| {
            ran = true;
            Ok::<_, GraphError>(())
        });
        assert!(matches!(result, Err(GraphError::InvalidConfig(_))));
        assert!(!ran);
    }

    #[test]
    fn context_exposes_stack() {
        Program::new(RunConfig::new("infra").with_stack("prod"))
            .run(|ctx| {
                assert_eq!(ctx.stack(), "prod");
                assert_eq!(ctx.project(), "infra");
                Ok::<_, GraphError>(())
            })
            .unwrap();
    }

    #[test]
    fn dangling_reference_fails_finalize() {
        let result = Program::new(RunConfig::new("test")).run(|ctx| {
            let missing = ctx.reference("db", "endpoint");
            ctx.declare("app", "t", Inputs::new().set("db", missing))?;
            Ok::<_, GraphError>(())
        });
        assert!(matches!(
            result,
            Err(GraphError::UnknownResource { ref name, .. }) if name == "db"
        ));
    }
}
