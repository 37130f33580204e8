//! Resource identity, schemas, declarations and handles.

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_output::{CellError, OutputCell};

use crate::config::RunConfig;
use crate::input::{Input, Inputs};

/// Name of the attribute every resource produces.
pub const ID_ATTRIBUTE: &str = "id";

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Stable identifier for a declaration within one run.
///
/// IDs are assigned in declaration order, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub(crate) usize);

impl ResourceId {
    /// Creates a new resource ID.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res_{}", self.0)
    }
}

/// Allocator for resource IDs.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: Arc<AtomicUsize>,
}

impl IdAllocator {
    /// Creates a new allocator starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next resource ID.
    pub fn allocate(&self) -> ResourceId {
        ResourceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the current counter value (for debugging).
    #[must_use]
    pub fn current(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }
}

/// Uniform resource name: `urn:stratum:{stack}::{project}::{type}::{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn(Arc<str>);

impl Urn {
    /// Builds the URN of a resource declared under `config`.
    #[must_use]
    pub fn new(config: &RunConfig, type_tag: &str, name: &str) -> Self {
        Self(
            format!(
                "urn:stratum:{}::{}::{}::{}",
                config.stack(),
                config.project(),
                type_tag,
                name
            )
            .into(),
        )
    }

    /// Returns the URN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of one attribute slot: a resource's logical name plus attribute name.
///
/// This is how the engine names the cell it resolves or fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeRef {
    resource: Arc<str>,
    attribute: Arc<str>,
}

impl AttributeRef {
    /// Creates a reference to `resource.attribute`.
    #[must_use]
    pub fn new(resource: impl Into<Arc<str>>, attribute: impl Into<Arc<str>>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// The resource's logical name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The attribute name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schemas
// ─────────────────────────────────────────────────────────────────────────────

/// The attributes a resource type produces beyond `id` and its echoed inputs.
///
/// # Example
///
/// ```
/// use stratum_graph::resource::ResourceSchema;
///
/// let schema = ResourceSchema::new("ibmcloud:index/resourceGroup:ResourceGroup")
///     .with_output("crn")
///     .with_output("state");
/// assert_eq!(schema.outputs().collect::<Vec<_>>(), vec!["crn", "state"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    type_tag: String,
    outputs: Vec<String>,
}

impl ResourceSchema {
    /// Creates a schema with no extra outputs.
    #[must_use]
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            outputs: Vec::new(),
        }
    }

    /// Adds a computed output attribute.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.outputs.contains(&name) {
            self.outputs.push(name);
        }
        self
    }

    /// The type tag this schema describes.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The extra output attributes, in registration order.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str)
    }
}

/// Schemas known to a builder, keyed by type tag.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous schema for the same type.
    pub fn register(&mut self, schema: ResourceSchema) {
        self.schemas.insert(schema.type_tag.clone(), schema);
    }

    /// Looks up the schema for a type tag.
    #[must_use]
    pub fn get(&self, type_tag: &str) -> Option<&ResourceSchema> {
        self.schemas.get(type_tag)
    }

    /// Attributes a resource of `type_tag` with `inputs` produces.
    ///
    /// `id` comes first, then every input name, then schema outputs.
    #[must_use]
    pub fn attributes_for(&self, type_tag: &str, inputs: &Inputs) -> Vec<Arc<str>> {
        let mut attributes: Vec<Arc<str>> = vec![ID_ATTRIBUTE.into()];
        let extra = self
            .get(type_tag)
            .into_iter()
            .flat_map(ResourceSchema::outputs);
        for name in inputs.names().chain(extra) {
            if !attributes.iter().any(|existing| &**existing == name) {
                attributes.push(name.into());
            }
        }
        attributes
    }
}

impl FromIterator<ResourceSchema> for SchemaRegistry {
    fn from_iter<I: IntoIterator<Item = ResourceSchema>>(iter: I) -> Self {
        let mut registry = Self::new();
        for schema in iter {
            registry.register(schema);
        }
        registry
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Declarations
// ─────────────────────────────────────────────────────────────────────────────

/// Extra options for [`GraphBuilder::declare_with`](crate::builder::GraphBuilder::declare_with).
#[derive(Debug, Clone, Default)]
pub struct DeclareOptions {
    pub(crate) depends_on: Vec<String>,
}

impl DeclareOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an explicit dependency on another resource by logical name.
    ///
    /// Use this for ordering constraints that are not visible through inputs.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

/// An immutable record of one declared resource.
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    pub(crate) id: ResourceId,
    pub(crate) name: Arc<str>,
    pub(crate) type_tag: String,
    pub(crate) urn: Urn,
    pub(crate) inputs: Inputs,
    pub(crate) attributes: Vec<Arc<str>>,
    pub(crate) explicit: Vec<Arc<str>>,
    pub(crate) dependencies: BTreeSet<Arc<str>>,
}

impl ResourceDeclaration {
    /// The declaration's ID.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The caller-supplied logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resource type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The resource's URN.
    #[must_use]
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// The ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Looks up a single input.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.get(name)
    }

    /// Attribute names this resource produces, `id` first.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(AsRef::as_ref)
    }

    /// Returns `true` if the resource produces `attribute`.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| &**a == attribute)
    }

    /// Resources named through `depends_on`.
    pub fn explicit_dependencies(&self) -> impl Iterator<Item = &str> {
        self.explicit.iter().map(AsRef::as_ref)
    }

    /// Every resource this declaration depends on, derived from inputs plus
    /// explicit dependencies.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(AsRef::as_ref)
    }

    /// Returns `true` if this declaration depends on `name`.
    #[must_use]
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }
}

/// Handle returned by a declaration, exposing one cell per attribute.
///
/// Every cell starts out pending. The handle is cheap to clone.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub(crate) id: ResourceId,
    pub(crate) name: Arc<str>,
    pub(crate) urn: Urn,
    pub(crate) attributes: Vec<(Arc<str>, OutputCell<Value>)>,
}

impl ResourceHandle {
    /// The declaration's ID.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.id
    }

    /// The logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resource's URN, known at declaration time.
    #[must_use]
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// The provider-assigned ID.
    #[must_use]
    pub fn id(&self) -> OutputCell<Value> {
        self.output(ID_ATTRIBUTE)
            .unwrap_or_else(|| OutputCell::failed(CellError::missing_attribute(ID_ATTRIBUTE)))
    }

    /// The cell for an attribute, if the resource produces it.
    #[must_use]
    pub fn output(&self, attribute: &str) -> Option<OutputCell<Value>> {
        self.attributes
            .iter()
            .find(|(name, _)| &**name == attribute)
            .map(|(_, cell)| cell.clone())
    }

    /// Attribute names in order, `id` first.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(name, _)| &**name)
    }

    /// Reference to one of this resource's attribute slots.
    #[must_use]
    pub fn attribute_ref(&self, attribute: &str) -> AttributeRef {
        AttributeRef::new(Arc::clone(&self.name), attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urn_layout() {
        let config = RunConfig::new("demo").with_stack("prod");
        let urn = Urn::new(&config, "cloud:Group", "rg");
        assert_eq!(urn.as_str(), "urn:stratum:prod::demo::cloud:Group::rg");
    }

    #[test]
    fn attributes_put_id_first_and_dedupe() {
        let registry: SchemaRegistry = [ResourceSchema::new("t")
            .with_output("crn")
            .with_output("name")]
        .into_iter()
        .collect();
        let inputs = Inputs::new().set("name", "x").set("id", "ignored");

        let attrs = registry.attributes_for("t", &inputs);
        let attrs: Vec<&str> = attrs.iter().map(AsRef::as_ref).collect();
        assert_eq!(attrs, vec!["id", "name", "crn"]);
    }

    #[test]
    fn unknown_type_echoes_inputs_only() {
        let registry = SchemaRegistry::new();
        let attrs = registry.attributes_for("unknown", &Inputs::new().set("zone", "us-south-1"));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn allocator_is_sequential_and_shared() {
        let allocator = IdAllocator::new();
        let clone = allocator.clone();
        assert_eq!(allocator.allocate(), ResourceId::new(0));
        assert_eq!(clone.allocate(), ResourceId::new(1));
        assert_eq!(allocator.current(), 2);
        assert_eq!(ResourceId::new(1).to_string(), "res_1");
    }
}
