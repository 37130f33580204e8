//! Graph builder API.
//!
//! A [`GraphBuilder`] records resource declarations while a program runs.
//! Each declaration returns at once with a [`ResourceHandle`] of pending
//! cells; dependency edges are derived from the cells found in its inputs.
//! [`GraphBuilder::finalize`] checks the recorded edges and produces the
//! immutable, dependency-ordered [`Graph`] the engine consumes.
//!
//! # Example
//!
//! ```
//! use stratum_graph::builder::GraphBuilder;
//! use stratum_graph::config::RunConfig;
//! use stratum_graph::input::Inputs;
//!
//! let mut builder = GraphBuilder::new(RunConfig::new("demo"));
//! let rg = builder
//!     .declare("rg", "cloud:Group", Inputs::new().set("name", "rg-dev"))
//!     .unwrap();
//! builder
//!     .declare("vpc", "cloud:Vpc", Inputs::new().set("group", rg.id()))
//!     .unwrap();
//!
//! let graph = builder.finalize().unwrap();
//! let order: Vec<_> = graph.declarations().iter().map(|d| d.name()).collect();
//! assert_eq!(order, vec!["rg", "vpc"]);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use hashbrown::HashMap;
use serde_json::Value;
use stratum_output::{CellRegistry, OutputCell, Resolver};

use crate::config::RunConfig;
use crate::error::GraphError;
use crate::graph::{AttributeSlot, Graph};
use crate::input::Inputs;
use crate::resource::{
    AttributeRef, DeclareOptions, IdAllocator, ResourceDeclaration, ResourceHandle,
    ResourceSchema, SchemaRegistry, Urn,
};

/// Accumulates resource declarations for one run.
///
/// A builder is an explicit value scoped to a single run; independent runs
/// use independent builders and never observe each other's declarations.
#[derive(Debug)]
pub struct GraphBuilder {
    config: RunConfig,
    schemas: SchemaRegistry,
    allocator: IdAllocator,
    /// Declarations in the order they were made.
    declarations: Vec<ResourceDeclaration>,
    /// Logical name to position in `declarations`.
    index: HashMap<Arc<str>, usize>,
    /// Every attribute slot handed out so far, including late-bound ones.
    slots: HashMap<AttributeRef, AttributeSlot>,
    /// Slot creation order, for deterministic validation.
    slot_order: Vec<AttributeRef>,
    registry: CellRegistry,
}

impl GraphBuilder {
    /// Creates an empty builder for the given run configuration.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self::with_schemas(config, SchemaRegistry::new())
    }

    /// Creates an empty builder with known resource schemas.
    #[must_use]
    pub fn with_schemas(config: RunConfig, schemas: SchemaRegistry) -> Self {
        Self {
            config,
            schemas,
            allocator: IdAllocator::new(),
            declarations: Vec::new(),
            index: HashMap::new(),
            slots: HashMap::new(),
            slot_order: Vec::new(),
            registry: CellRegistry::new(),
        }
    }

    /// Registers a resource schema.
    pub fn register_schema(&mut self, schema: ResourceSchema) -> &mut Self {
        self.schemas.register(schema);
        self
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The registry tracking every slot's resolver.
    #[must_use]
    pub fn registry(&self) -> &CellRegistry {
        &self.registry
    }

    /// Number of declarations so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Returns `true` if a resource with this logical name was declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declares a resource.
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
        self.declare_with(name, type_tag, inputs, DeclareOptions::default())
    }

    /// Declares a resource with explicit options.
    ///
    /// The returned handle exposes one pending cell per attribute: `id`, every
    /// input name, and the extra outputs of the type's registered schema. If a
    /// late-bound [`reference`](Self::reference) to one of these attributes was
    /// handed out earlier, the handle shares that same cell.
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
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }

        let name: Arc<str> = name.into();
        let id = self.allocator.allocate();
        let urn = Urn::new(&self.config, type_tag, &name);
        let attributes = self.schemas.attributes_for(type_tag, &inputs);

        let explicit: Vec<Arc<str>> = options.depends_on.into_iter().map(Into::into).collect();
        let mut dependencies: BTreeSet<Arc<str>> =
            inputs.dependencies().into_iter().map(Into::into).collect();
        dependencies.extend(explicit.iter().cloned());

        let cells = attributes
            .iter()
            .map(|attribute| {
                let slot = self.slot(AttributeRef::new(Arc::clone(&name), Arc::clone(attribute)));
                (Arc::clone(attribute), slot)
            })
            .collect();

        tracing::debug!(
            resource = %name,
            %id,
            type_tag,
            dependencies = dependencies.len(),
            "declared resource"
        );

        self.index.insert(Arc::clone(&name), self.declarations.len());
        self.declarations.push(ResourceDeclaration {
            id,
            name: Arc::clone(&name),
            type_tag: type_tag.to_string(),
            urn: urn.clone(),
            inputs,
            attributes,
            explicit,
            dependencies,
        });

        Ok(ResourceHandle {
            id,
            name,
            urn,
            attributes: cells,
        })
    }

    /// Returns the cell for `resource.attribute`, whether or not the resource
    /// has been declared yet.
    ///
    /// Late-bound references let a program wire inputs to resources declared
    /// further down. They are checked by [`finalize`](Self::finalize): a
    /// reference to a resource that is never declared, or to an attribute it
    /// does not produce, fails the run.
    #[must_use]
    pub fn reference(&mut self, resource: &str, attribute: &str) -> OutputCell<Value> {
        self.slot(AttributeRef::new(resource, attribute))
    }

    fn slot(&mut self, attribute: AttributeRef) -> OutputCell<Value> {
        if let Some(slot) = self.slots.get(&attribute) {
            return slot.cell.clone();
        }

        let (cell, resolver): (OutputCell<Value>, Resolver<Value>) =
            OutputCell::pending_with_sources([attribute.resource()]);
        self.registry.register(&resolver);
        self.slot_order.push(attribute.clone());
        self.slots.insert(
            attribute,
            AttributeSlot {
                cell: cell.clone(),
                resolver,
            },
        );
        cell
    }

    /// Validates the recorded graph and orders it for the engine.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownResource`] if a late-bound reference or explicit
    ///   dependency names a resource that was never declared
    /// - [`GraphError::UnknownAttribute`] if a late-bound reference names an
    ///   attribute its resource does not produce
    /// - [`GraphError::CycleDetected`] if the dependency edges are not acyclic
    pub fn finalize(self) -> Result<Graph, GraphError> {
        for attribute in &self.slot_order {
            match self.index.get(attribute.resource()) {
                None => {
                    return Err(GraphError::UnknownResource {
                        name: attribute.resource().to_string(),
                        referenced_by: attribute.to_string(),
                    });
                }
                Some(&position) if !self.declarations[position].has_attribute(attribute.attribute()) => {
                    return Err(GraphError::UnknownAttribute {
                        resource: attribute.resource().to_string(),
                        attribute: attribute.attribute().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for declaration in &self.declarations {
            if let Some(missing) = declaration
                .dependencies()
                .find(|dep| !self.index.contains_key(*dep))
            {
                return Err(GraphError::UnknownResource {
                    name: missing.to_string(),
                    referenced_by: declaration.name().to_string(),
                });
            }
        }

        let graph = Graph::from_declarations(self.declarations, self.slots, self.registry)?;
        tracing::debug!(resources = graph.len(), "finalized resource graph");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> GraphBuilder {
        GraphBuilder::new(RunConfig::new("test"))
    }

    #[test]
    fn declare_returns_pending_cells() {
        let mut builder = builder();
        let rg = builder
            .declare("rg", "cloud:Group", Inputs::new().set("name", "rg-dev"))
            .unwrap();

        assert_eq!(rg.attributes().collect::<Vec<_>>(), vec!["id", "name"]);
        assert!(rg.id().state().is_pending());
        assert!(rg.output("name").is_some_and(|c| c.state().is_pending()));
        assert!(rg.output("crn").is_none());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut builder = builder();
        builder.declare("rg", "cloud:Group", Inputs::new()).unwrap();
        let err = builder.declare("rg", "cloud:Other", Inputs::new()).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateName {
                name: "rg".to_string()
            }
        );
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn reference_is_shared_with_later_declaration() {
        let mut builder = builder();
        let early = builder.reference("rg", "id");
        let rg = builder.declare("rg", "cloud:Group", Inputs::new()).unwrap();
        assert!(early.ptr_eq(&rg.id()));
    }

    #[test]
    fn slots_are_registered_for_abort() {
        let mut builder = builder();
        builder
            .declare("rg", "cloud:Group", Inputs::new().set("name", "x"))
            .unwrap();
        assert_eq!(builder.registry().len(), 2);
    }

    #[test]
    fn schema_outputs_become_attributes() {
        let mut builder = builder();
        builder.register_schema(ResourceSchema::new("cloud:Group").with_output("crn"));
        let rg = builder.declare("rg", "cloud:Group", Inputs::new()).unwrap();
        assert!(rg.output("crn").is_some());
    }
}
