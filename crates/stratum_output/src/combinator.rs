//! Non-blocking composition of output cells.
//!
//! Every combinator returns a fresh pending cell and wires a continuation into
//! its inputs. Transformations run only once their inputs resolve, failures
//! short-circuit past them, and a panicking transformation fails the derived
//! cell instead of unwinding into whoever settled the input.

use core::fmt;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{CellValue, Outcome, OutputCell, Resolver, panic_message};
use crate::error::CellError;

impl<T: CellValue> OutputCell<T> {
    /// Derives a cell holding `f(value)` once this cell resolves.
    ///
    /// If this cell fails, the derived cell fails with the same error and `f`
    /// is never called. A panic inside `f` fails the derived cell with
    /// [`CellError::Panicked`].
    ///
    /// ```
    /// use stratum_output::OutputCell;
    ///
    /// let name = OutputCell::resolved("rg".to_string());
    /// let upper = name.map(|n| n.to_uppercase());
    /// assert_eq!(upper.state().value().map(String::as_str), Some("RG"));
    /// ```
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> OutputCell<U>
    where
        U: CellValue,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map(move |value| Ok::<U, core::convert::Infallible>(f(value)))
    }

    /// Derives a cell from a fallible transformation.
    ///
    /// An `Err` returned by `f` fails the derived cell with
    /// [`CellError::Mapping`].
    #[must_use]
    pub fn try_map<U, E, F>(&self, f: F) -> OutputCell<U>
    where
        U: CellValue,
        E: fmt::Display,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let (derived, resolver) = OutputCell::pending_from(self.source_set().clone());
        self.subscribe(move |outcome| {
            let next = match outcome {
                Ok(value) => {
                    let value = value.clone();
                    guarded(move || f(value)).and_then(|result| {
                        result.map_err(|err| CellError::Mapping(err.to_string().into()))
                    })
                }
                Err(err) => Err(err.clone()),
            };
            settle_derived(&resolver, next);
        });
        derived
    }

    /// Derives a cell from this cell and `other`.
    ///
    /// The derived cell settles once both inputs settle. If either input
    /// fails, so does the derived cell; when both fail, the receiver's error
    /// wins no matter which failure arrived first, so the outcome does not
    /// depend on settlement timing.
    ///
    /// ```
    /// use stratum_output::OutputCell;
    ///
    /// let (host, host_resolver) = OutputCell::<String>::pending();
    /// let port = OutputCell::resolved(8080_u16);
    /// let addr = host.combine(&port, |h, p| format!("{h}:{p}"));
    ///
    /// host_resolver.resolve("db".into()).unwrap();
    /// assert_eq!(addr.state().value().map(String::as_str), Some("db:8080"));
    /// ```
    #[must_use]
    pub fn combine<U, V, F>(&self, other: &OutputCell<U>, f: F) -> OutputCell<V>
    where
        U: CellValue,
        V: CellValue,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let sources: BTreeSet<Arc<str>> = self
            .source_set()
            .union(other.source_set())
            .cloned()
            .collect();
        let (derived, resolver) = OutputCell::pending_from(sources);
        let pair = Arc::new(Mutex::new(Pair {
            left: None,
            right: None,
            f: Some(f),
        }));

        self.subscribe({
            let pair = Arc::clone(&pair);
            let resolver = resolver.clone();
            move |outcome| {
                let ready = {
                    let mut pair = pair.lock();
                    pair.left = Some(outcome.clone());
                    pair.take_ready()
                };
                if let Some((left, right, f)) = ready {
                    settle_derived(&resolver, join_pair(left, right, f));
                }
            }
        });

        other.subscribe(move |outcome| {
            let ready = {
                let mut pair = pair.lock();
                pair.right = Some(outcome.clone());
                pair.take_ready()
            };
            if let Some((left, right, f)) = ready {
                settle_derived(&resolver, join_pair(left, right, f));
            }
        });

        derived
    }

    /// Collects many cells into one cell holding every value in order.
    ///
    /// The result settles once all inputs settle. If any input fails, the
    /// result fails with the error of the earliest failed input by position.
    /// An empty input yields a cell resolved to an empty vector.
    #[must_use]
    pub fn all<I>(cells: I) -> OutputCell<Vec<T>>
    where
        I: IntoIterator<Item = OutputCell<T>>,
    {
        let cells: Vec<_> = cells.into_iter().collect();
        let sources: BTreeSet<Arc<str>> = cells
            .iter()
            .flat_map(|cell| cell.source_set().iter().cloned())
            .collect();
        let (derived, resolver) = OutputCell::pending_from(sources);

        if cells.is_empty() {
            settle_derived(&resolver, Ok(Vec::new()));
            return derived;
        }

        let gather = Arc::new(Mutex::new(Gather {
            slots: vec![None; cells.len()],
            remaining: cells.len(),
        }));

        for (index, cell) in cells.iter().enumerate() {
            let gather = Arc::clone(&gather);
            let resolver = resolver.clone();
            cell.subscribe(move |outcome| {
                let complete = {
                    let mut gather = gather.lock();
                    gather.slots[index] = Some(outcome.clone());
                    gather.remaining -= 1;
                    (gather.remaining == 0).then(|| core::mem::take(&mut gather.slots))
                };
                if let Some(slots) = complete {
                    let joined = slots
                        .into_iter()
                        .map(|slot| slot.unwrap_or_else(|| Err(CellError::aborted("missing input"))))
                        .collect::<Result<Vec<_>, _>>();
                    settle_derived(&resolver, joined);
                }
            });
        }

        derived
    }
}

struct Pair<T, U, F> {
    left: Option<Outcome<T>>,
    right: Option<Outcome<U>>,
    f: Option<F>,
}

impl<T, U, F> Pair<T, U, F> {
    fn take_ready(&mut self) -> Option<(Outcome<T>, Outcome<U>, F)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        match (self.left.take(), self.right.take(), self.f.take()) {
            (Some(left), Some(right), Some(f)) => Some((left, right, f)),
            _ => None,
        }
    }
}

struct Gather<T> {
    slots: Vec<Option<Outcome<T>>>,
    remaining: usize,
}

fn join_pair<T, U, V, F>(left: Outcome<T>, right: Outcome<U>, f: F) -> Outcome<V>
where
    F: FnOnce(T, U) -> V,
{
    match (left, right) {
        (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        (Ok(a), Ok(b)) => guarded(move || f(a, b)),
    }
}

/// Runs a transformation, turning a panic into a [`CellError::Panicked`].
fn guarded<R>(f: impl FnOnce() -> R) -> Outcome<R> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CellError::Panicked(panic_message(payload.as_ref()).into()))
}

fn settle_derived<T: CellValue>(resolver: &Resolver<T>, outcome: Outcome<T>) {
    // Derived resolvers never leave this module, so a second settlement
    // means a combinator continuation fired twice.
    if resolver.settle(outcome).is_err() {
        tracing::error!("derived output cell settled more than once");
    }
}
