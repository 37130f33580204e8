//! Run-scoped tracking of engine-settled cells.
//!
//! A [`CellRegistry`] remembers every resolver handed out for one run so the
//! engine can fail all still-pending cells at once when it gives up. Cells
//! derived through combinators are not registered; they fail by propagation
//! once their inputs are aborted.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{CellValue, Resolver};
use crate::error::CellError;

/// Type-erased view of a resolver that can be aborted.
trait Abortable: Send + Sync {
    fn abort(&self, error: &CellError) -> bool;
    fn is_pending(&self) -> bool;
}

impl<T: CellValue> Abortable for Resolver<T> {
    fn abort(&self, error: &CellError) -> bool {
        self.fail(error.clone()).is_ok()
    }

    fn is_pending(&self) -> bool {
        Resolver::is_pending(self)
    }
}

#[derive(Default)]
struct Inner {
    resolvers: Vec<Arc<dyn Abortable>>,
    aborted: Option<Arc<str>>,
}

/// Registry of the resolvers belonging to one run.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct CellRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl CellRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a resolver so it can be aborted with the run.
    ///
    /// Registering after the run was aborted fails the cell right away.
    pub fn register<T: CellValue>(&self, resolver: &Resolver<T>) {
        let aborted = {
            let mut inner = self.inner.lock();
            inner.resolvers.push(Arc::new(resolver.clone()));
            inner.aborted.clone()
        };
        if let Some(reason) = aborted {
            let _ = resolver.fail(CellError::RunAborted { reason });
        }
    }

    /// Fails every registered cell that is still pending with
    /// [`CellError::RunAborted`].
    ///
    /// Returns the number of cells that were aborted. Calling `abort` again
    /// keeps the first reason and aborts only cells registered since.
    pub fn abort(&self, reason: impl Into<Arc<str>>) -> usize {
        let (resolvers, reason) = {
            let mut inner = self.inner.lock();
            let reason = inner.aborted.get_or_insert_with(|| reason.into()).clone();
            (inner.resolvers.clone(), reason)
        };

        let error = CellError::RunAborted { reason };
        let aborted = resolvers.iter().filter(|r| r.abort(&error)).count();
        tracing::debug!(aborted, "aborted pending output cells");
        aborted
    }

    /// Returns the abort reason, if the run was aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<Arc<str>> {
        self.inner.lock().aborted.clone()
    }

    /// Number of registered cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().resolvers.len()
    }

    /// Returns `true` if no cells are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered cells that have not settled.
    #[must_use]
    pub fn pending(&self) -> usize {
        let resolvers = self.inner.lock().resolvers.clone();
        resolvers.iter().filter(|r| r.is_pending()).count()
    }
}

impl fmt::Debug for CellRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CellRegistry")
            .field("cells", &inner.resolvers.len())
            .field("aborted", &inner.aborted)
            .finish()
    }
}
