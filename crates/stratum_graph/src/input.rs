//! Resource input values.
//!
//! An [`Input`] is either a literal JSON value, a list of inputs, or a
//! reference to an [`OutputCell`]. Dependency discovery goes through
//! [`Input::dependencies`], which reports the resources an input's cells are
//! derived from; the builder never inspects input types dynamically.

use std::collections::BTreeSet;

use futures::future::{BoxFuture, try_join_all};
use serde::Serialize;
use serde_json::Value;
use stratum_output::{CellError, CellValue, Outcome, OutputCell};

/// A single resource input.
#[derive(Debug, Clone)]
pub enum Input {
    /// A value known while the program runs.
    Literal(Value),
    /// An ordered list of inputs, each of which may be deferred.
    List(Vec<Input>),
    /// A value produced by another resource.
    Output(OutputCell<Value>),
}

impl Input {
    /// Names of the resources this input depends on.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<&str> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies<'a>(&'a self, deps: &mut BTreeSet<&'a str>) {
        match self {
            Input::Literal(_) => {}
            Input::List(items) => {
                for item in items {
                    item.collect_dependencies(deps);
                }
            }
            Input::Output(cell) => deps.extend(cell.sources()),
        }
    }

    /// Returns `true` if the input contains no deferred values.
    #[must_use]
    pub fn is_known(&self) -> bool {
        match self {
            Input::Literal(_) => true,
            Input::List(items) => items.iter().all(Input::is_known),
            Input::Output(_) => false,
        }
    }

    /// Waits for every deferred part of the input and returns the full value.
    ///
    /// This is engine-side: it must only be awaited after the declaring
    /// procedure returned.
    pub fn resolve(&self) -> BoxFuture<'_, Outcome<Value>> {
        Box::pin(async move {
            match self {
                Input::Literal(value) => Ok(value.clone()),
                Input::List(items) => {
                    let values = try_join_all(items.iter().map(Input::resolve)).await?;
                    Ok(Value::Array(values))
                }
                Input::Output(cell) => cell.wait().await,
            }
        })
    }

    /// Converts the input into a single cell holding its eventual value.
    #[must_use]
    pub fn into_cell(self) -> OutputCell<Value> {
        match self {
            Input::Literal(value) => OutputCell::resolved(value),
            Input::Output(cell) => cell,
            Input::List(items) => {
                OutputCell::all(items.into_iter().map(Input::into_cell)).map(Value::Array)
            }
        }
    }
}

/// Conversion into an [`Input`].
///
/// This is the capability a value needs to be passed as a resource input or
/// registered as an export.
pub trait IntoInput {
    /// Performs the conversion.
    fn into_input(self) -> Input;
}

impl IntoInput for Input {
    fn into_input(self) -> Input {
        self
    }
}

impl IntoInput for Value {
    fn into_input(self) -> Input {
        Input::Literal(self)
    }
}

macro_rules! literal_input {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoInput for $ty {
                fn into_input(self) -> Input {
                    Input::Literal(Value::from(self))
                }
            }
        )*
    };
}

literal_input!(&str, String, bool, i32, i64, u32, u64, f64);

impl<I: IntoInput> IntoInput for Vec<I> {
    fn into_input(self) -> Input {
        Input::List(self.into_iter().map(IntoInput::into_input).collect())
    }
}

impl<I: IntoInput, const N: usize> IntoInput for [I; N] {
    fn into_input(self) -> Input {
        Input::List(self.into_iter().map(IntoInput::into_input).collect())
    }
}

/// Typed cells are lifted into JSON; a value that fails to serialize fails
/// the lifted cell.
impl<T: CellValue + Serialize> IntoInput for OutputCell<T> {
    fn into_input(self) -> Input {
        Input::Output(self.try_map(serde_json::to_value))
    }
}

impl<T: CellValue + Serialize> IntoInput for &OutputCell<T> {
    fn into_input(self) -> Input {
        self.clone().into_input()
    }
}

/// An ordered mapping from input name to [`Input`].
///
/// Setting a name twice replaces the value but keeps its original position.
///
/// # Example
///
/// ```
/// use stratum_graph::input::Inputs;
///
/// let inputs = Inputs::new()
///     .set("name", "pulumi-example-rg-dev")
///     .set("tags", vec!["pulumi", "example"]);
/// assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["name", "tags"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    entries: Vec<(String, Input)>,
}

impl Inputs {
    /// Creates an empty input mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an input, returning `self` for chaining.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl IntoInput) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets an input in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl IntoInput) {
        let name = name.into();
        let value = value.into_input();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Looks up an input by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, input)| input)
    }

    /// Input names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Inputs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(name, input)| (name.as_str(), input))
    }

    /// Number of inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of the dependencies of every input.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .flat_map(|(_, input)| input.dependencies())
            .collect()
    }

    /// Resolves every input into a JSON object, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first failure in input order.
    pub async fn resolve(&self) -> Result<serde_json::Map<String, Value>, CellError> {
        let values = try_join_all(self.entries.iter().map(|(_, input)| input.resolve())).await?;
        Ok(self
            .entries
            .iter()
            .map(|(name, _)| name.clone())
            .zip(values)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literals_have_no_dependencies() {
        let input = vec!["a", "b"].into_input();
        assert!(input.dependencies().is_empty());
        assert!(input.is_known());
    }

    #[test]
    fn nested_cells_report_sources() {
        let (rg, _r) = OutputCell::<Value>::pending_with_sources(["rg"]);
        let (vpc, _v) = OutputCell::<Value>::pending_with_sources(["vpc"]);
        let input = Input::List(vec![
            Input::Literal(json!("x")),
            Input::Output(rg),
            Input::List(vec![Input::Output(vpc)]),
        ]);

        assert_eq!(input.dependencies().into_iter().collect::<Vec<_>>(), vec!["rg", "vpc"]);
        assert!(!input.is_known());
    }

    #[test]
    fn typed_cells_keep_sources_when_lifted() {
        let (name, _r) = OutputCell::<String>::pending_with_sources(["rg"]);
        let input = name.map(|n| format!("{n}-subnet")).into_input();
        assert_eq!(input.dependencies().into_iter().collect::<Vec<_>>(), vec!["rg"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let inputs = Inputs::new().set("a", 1).set("b", 2).set("a", 3);
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(matches!(inputs.get("a"), Some(Input::Literal(v)) if *v == json!(3)));
    }

    #[test]
    fn into_cell_collects_lists() {
        let (id, resolver) = OutputCell::<Value>::pending();
        let cell = Input::List(vec![Input::Literal(json!(1)), Input::Output(id)]).into_cell();
        assert!(cell.state().is_pending());
        resolver.resolve(json!(2)).unwrap();
        assert_eq!(cell.state().value(), Some(&json!([1, 2])));
    }

    #[tokio::test]
    async fn resolve_waits_for_cells() {
        let (id, resolver) = OutputCell::<Value>::pending();
        let inputs = Inputs::new().set("name", "rg").set("parent", id);
        resolver.resolve(json!("rg-1")).unwrap();

        let resolved = inputs.resolve().await.unwrap();
        assert_eq!(Value::Object(resolved), json!({"name": "rg", "parent": "rg-1"}));
    }
}
