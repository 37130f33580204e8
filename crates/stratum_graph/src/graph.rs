//! The finalized resource graph.
//!
//! A [`Graph`] is what [`GraphBuilder::finalize`](crate::builder::GraphBuilder::finalize)
//! produces: every declaration in a dependency-respecting order, plus the
//! attribute slots the engine settles. Declarations are immutable once the
//! graph exists.

use std::collections::BTreeSet;
use std::sync::Arc;

use hashbrown::HashMap;
use serde_json::Value;
use stratum_output::{CellRegistry, OutputCell, Resolver};

use crate::error::GraphError;
use crate::resource::{AttributeRef, ResourceDeclaration};

/// A pending attribute cell and the resolver that settles it.
#[derive(Debug, Clone)]
pub(crate) struct AttributeSlot {
    pub(crate) cell: OutputCell<Value>,
    pub(crate) resolver: Resolver<Value>,
}

/// A validated, acyclic resource graph.
///
/// If resource B consumes an output of resource A, A comes before B in
/// [`declarations`](Self::declarations). Independent resources keep the order
/// in which they were declared.
#[derive(Debug)]
pub struct Graph {
    declarations: Vec<ResourceDeclaration>,
    positions: HashMap<Arc<str>, usize>,
    slots: HashMap<AttributeRef, AttributeSlot>,
    registry: CellRegistry,
}

impl Graph {
    /// Orders declarations so that every resource follows its dependencies.
    ///
    /// Uses Kahn's algorithm with ties broken by declaration order, so the
    /// result is deterministic. Every dependency must already name a declared
    /// resource.
    pub(crate) fn from_declarations(
        declarations: Vec<ResourceDeclaration>,
        slots: HashMap<AttributeRef, AttributeSlot>,
        registry: CellRegistry,
    ) -> Result<Self, GraphError> {
        // dependents[a] lists every declaration that depends on a.
        let (dependents, mut in_degree) = edges(&declarations);

        let mut ready: BTreeSet<usize> = (0..declarations.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(declarations.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < declarations.len() {
            let resources = cycle_members(&declarations, &dependents, &in_degree);
            tracing::debug!(?resources, "dependency cycle detected");
            return Err(GraphError::CycleDetected { resources });
        }

        let mut by_position: Vec<Option<ResourceDeclaration>> =
            declarations.into_iter().map(Some).collect();
        let declarations: Vec<ResourceDeclaration> = order
            .into_iter()
            .filter_map(|i| by_position[i].take())
            .collect();
        let positions = declarations
            .iter()
            .enumerate()
            .map(|(i, d)| (Arc::clone(&d.name), i))
            .collect();

        Ok(Self {
            declarations,
            positions,
            slots,
            registry,
        })
    }

    /// Declarations in dependency order.
    #[must_use]
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    /// Number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Looks up a declaration by logical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.position(name).map(|i| &self.declarations[i])
    }

    /// Position of a resource in dependency order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// The cell behind an attribute slot.
    #[must_use]
    pub fn cell(&self, attribute: &AttributeRef) -> Option<OutputCell<Value>> {
        self.slots.get(attribute).map(|slot| slot.cell.clone())
    }

    /// Every attribute slot of a resource, in attribute order.
    pub fn attribute_refs<'a>(&'a self, name: &'a str) -> impl Iterator<Item = AttributeRef> + 'a {
        self.get(name)
            .into_iter()
            .flat_map(move |d| d.attributes().map(move |a| AttributeRef::new(name, a)))
    }

    pub(crate) fn resolver(&self, attribute: &AttributeRef) -> Option<&Resolver<Value>> {
        self.slots.get(attribute).map(|slot| &slot.resolver)
    }

    /// The registry of every slot resolver in this run.
    #[must_use]
    pub fn registry(&self) -> &CellRegistry {
        &self.registry
    }
}

/// Resources left over by a failed topological sort that lie on a cycle.
///
/// Leftovers also include resources that merely depend on a cycle; those are
/// pruned by repeatedly removing leftovers with no leftover dependents.
/// Builds the dependents lists and in-degrees of `declarations`.
fn edges(declarations: &[ResourceDeclaration]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let index: HashMap<&str, usize> = declarations
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name(), i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); declarations.len()];
    let mut in_degree: Vec<usize> = vec![0; declarations.len()];
    for (i, declaration) in declarations.iter().enumerate() {
        for dependency in declaration.dependencies() {
            if let Some(&from) = index.get(dependency) {
                dependents[from].push(i);
                in_degree[i] += 1;
            }
        }
    }
    (dependents, in_degree)
}

fn cycle_members(
    declarations: &[ResourceDeclaration],
    dependents: &[Vec<usize>],
    in_degree: &[usize],
) -> Vec<String> {
    let mut remaining: BTreeSet<usize> = (0..declarations.len())
        .filter(|&i| in_degree[i] > 0)
        .collect();

    loop {
        let prunable: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| !dependents[i].iter().any(|d| remaining.contains(d)))
            .collect();
        if prunable.is_empty() {
            break;
        }
        for i in prunable {
            remaining.remove(&i);
        }
    }

    remaining
        .into_iter()
        .map(|i| declarations[i].name().to_string())
        .collect()
}
