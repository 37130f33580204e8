//! The write-once deferred value and its engine-side resolver.
//!
//! An [`OutputCell`] starts out pending and settles exactly once, either to a
//! value or to a [`CellError`]. Consumers never read the value synchronously;
//! they compose new cells with the combinators in [`crate::combinator`] or
//! register a continuation with [`OutputCell::subscribe`]. Only the holder of
//! the matching [`Resolver`] can settle a cell.

use core::any::Any;
use core::fmt;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{AlreadySettled, CellError};

/// Marker trait for types that can be carried by an output cell.
///
/// Any type that is `Clone + Send + Sync + 'static` implements `CellValue`.
/// Values are cloned once per subscriber, so large payloads should be wrapped
/// in an `Arc`.
pub trait CellValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CellValue for T {}

/// The settled result of a cell.
pub type Outcome<T> = Result<T, CellError>;

/// A point-in-time view of a cell's state.
#[derive(Debug, Clone)]
pub enum CellState<T> {
    /// The engine has not settled the cell yet.
    Pending,
    /// The cell holds its final value.
    Resolved(T),
    /// The cell failed and will never hold a value.
    Failed(CellError),
}

impl<T> CellState<T> {
    /// Returns `true` if the cell has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` if the cell resolved to a value.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Returns `true` if the cell failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the resolved value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&CellError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Outcome<T>),
}

pub(crate) struct Shared<T> {
    slot: Mutex<Slot<T>>,
    /// Names of the resources this value is derived from.
    sources: BTreeSet<Arc<str>>,
}

impl<T: CellValue> Shared<T> {
    fn pending(sources: BTreeSet<Arc<str>>) -> Self {
        Self {
            slot: Mutex::new(Slot::Pending(Vec::new())),
            sources,
        }
    }

    /// Moves the slot to its terminal state and runs the queued continuations.
    ///
    /// Continuations run after the lock is released so they may freely settle
    /// or subscribe to other cells, including this one. A panicking
    /// continuation is logged and does not stop the ones queued after it.
    fn settle(&self, outcome: Outcome<T>) -> Result<(), AlreadySettled> {
        let continuations = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Settled(_) => return Err(AlreadySettled),
                Slot::Pending(queued) => {
                    let queued = core::mem::take(queued);
                    *slot = Slot::Settled(outcome.clone());
                    queued
                }
            }
        };

        for continuation in continuations {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| continuation(&outcome))) {
                tracing::error!(panic = %panic_message(payload.as_ref()), "output cell subscriber panicked");
            }
        }
        Ok(())
    }

    fn is_pending(&self) -> bool {
        matches!(&*self.slot.lock(), Slot::Pending(_))
    }
}

/// A single-assignment deferred value.
///
/// Cloning an `OutputCell` produces another handle to the same cell, so the
/// declaring resource and all downstream consumers observe one state.
///
/// # Example
///
/// ```
/// use stratum_output::{CellState, OutputCell};
///
/// let (cell, resolver) = OutputCell::<u32>::pending();
/// let doubled = cell.map(|v| v * 2);
/// assert!(doubled.state().is_pending());
///
/// resolver.resolve(21).unwrap();
/// assert!(matches!(doubled.state(), CellState::Resolved(42)));
/// ```
pub struct OutputCell<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T> Clone for OutputCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: CellValue> OutputCell<T> {
    /// Creates a pending cell with no resource sources.
    #[must_use]
    pub fn pending() -> (Self, Resolver<T>) {
        Self::pending_from(BTreeSet::new())
    }

    /// Creates a pending cell whose value is produced by the named resources.
    ///
    /// The sources are what a graph builder inspects to derive dependency
    /// edges when the cell is used as a resource input.
    #[must_use]
    pub fn pending_with_sources<I, S>(sources: I) -> (Self, Resolver<T>)
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self::pending_from(sources.into_iter().map(Into::into).collect())
    }

    pub(crate) fn pending_from(sources: BTreeSet<Arc<str>>) -> (Self, Resolver<T>) {
        let shared = Arc::new(Shared::pending(sources));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Resolver { shared },
        )
    }

    /// Creates a cell that is already resolved.
    ///
    /// Useful for lifting a known value into a composition.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let (cell, resolver) = Self::pending();
        let _ = resolver.resolve(value);
        cell
    }

    /// Creates a cell that has already failed.
    #[must_use]
    pub fn failed(error: CellError) -> Self {
        let (cell, resolver) = Self::pending();
        let _ = resolver.fail(error);
        cell
    }

    /// Returns a snapshot of the cell's current state.
    ///
    /// This is an inspection hook for engines and tests. A declaring procedure
    /// should compose cells instead of polling them.
    #[must_use]
    pub fn state(&self) -> CellState<T> {
        match &*self.shared.slot.lock() {
            Slot::Pending(_) => CellState::Pending,
            Slot::Settled(Ok(value)) => CellState::Resolved(value.clone()),
            Slot::Settled(Err(err)) => CellState::Failed(err.clone()),
        }
    }

    /// Returns `true` while the cell has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.is_pending()
    }

    /// Names of the resources this cell's value is derived from.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.shared.sources.iter().map(AsRef::as_ref)
    }

    pub(crate) fn source_set(&self) -> &BTreeSet<Arc<str>> {
        &self.shared.sources
    }

    /// Returns `true` if both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Registers a continuation that runs exactly once when the cell settles.
    ///
    /// If the cell is already settled the continuation runs immediately on the
    /// calling thread. Otherwise it runs on the thread that settles the cell.
    /// Continuations registered before settlement run in registration order.
    pub fn subscribe<F>(&self, continuation: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let settled = {
            let mut slot = self.shared.slot.lock();
            match &mut *slot {
                Slot::Pending(queued) => {
                    queued.push(Box::new(continuation));
                    return;
                }
                Slot::Settled(outcome) => outcome.clone(),
            }
        };
        continuation(&settled);
    }

    /// Waits for the cell to settle.
    ///
    /// Intended for consumers running after the declaring procedure returned,
    /// such as an engine resolving inputs or a tool rendering exports.
    pub async fn wait(&self) -> Outcome<T> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.subscribe(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        // The sender lives in this cell's queue, so it is only dropped
        // unsent if the continuation never ran.
        rx.await
            .unwrap_or_else(|_| Err(CellError::aborted("output cell continuation dropped")))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl<T: CellValue + fmt::Debug> fmt::Debug for OutputCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputCell")
            .field("state", &self.state())
            .field("sources", &self.shared.sources)
            .finish()
    }
}

/// Engine-side handle that settles an [`OutputCell`].
///
/// Resolvers are handed to whoever drives provisioning. Cloning a resolver
/// does not relax single assignment: only the first `resolve` or `fail`
/// across all clones succeeds.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: CellValue> Resolver<T> {
    /// Settles the cell with a value.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadySettled`] if the cell was already resolved or failed.
    pub fn resolve(&self, value: T) -> Result<(), AlreadySettled> {
        self.shared.settle(Ok(value))
    }

    /// Settles the cell with an error.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadySettled`] if the cell was already resolved or failed.
    pub fn fail(&self, error: CellError) -> Result<(), AlreadySettled> {
        self.shared.settle(Err(error))
    }

    /// Settles the cell with either outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadySettled`] if the cell was already resolved or failed.
    pub fn settle(&self, outcome: Outcome<T>) -> Result<(), AlreadySettled> {
        self.shared.settle(outcome)
    }

    /// Returns `true` while the cell has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.is_pending()
    }

    /// Returns a consumer handle to the cell this resolver settles.
    #[must_use]
    pub fn cell(&self) -> OutputCell<T> {
        OutputCell {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("sources", &self.shared.sources)
            .finish_non_exhaustive()
    }
}
