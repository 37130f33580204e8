//! Error types for output cells.

use std::sync::Arc;

/// Returned when a settled cell is resolved or failed a second time.
///
/// Settlement is single-assignment. A second attempt is a protocol error on
/// the caller's side and never changes the value already observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("output cell is already settled")]
pub struct AlreadySettled;

/// The failure carried by a failed [`OutputCell`](crate::OutputCell).
///
/// Errors are cheap to clone because every downstream derivation of a failed
/// cell receives the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CellError {
    /// The run was aborted before the cell settled.
    #[error("run aborted: {reason}")]
    RunAborted {
        /// Why the engine gave up on the run.
        reason: Arc<str>,
    },

    /// The provisioning engine reported a resource-specific failure.
    #[error("provider error: {0}")]
    Provider(Arc<dyn core::error::Error + Send + Sync>),

    /// A `try_map` transformation returned an error.
    #[error("transformation failed: {0}")]
    Mapping(Arc<str>),

    /// A transformation panicked while computing a derived value.
    #[error("transformation panicked: {0}")]
    Panicked(Arc<str>),

    /// The engine finished a resource without producing this attribute.
    #[error("attribute '{attribute}' was not produced by the provider")]
    MissingAttribute {
        /// The attribute that was expected.
        attribute: Arc<str>,
    },
}

impl CellError {
    /// Creates a [`CellError::RunAborted`] with the given reason.
    #[must_use]
    pub fn aborted(reason: impl Into<Arc<str>>) -> Self {
        Self::RunAborted {
            reason: reason.into(),
        }
    }

    /// Wraps an arbitrary provider error.
    #[must_use]
    pub fn provider<E>(error: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(error))
    }

    /// Creates a provider error from a plain message.
    ///
    /// ```
    /// use stratum_output::CellError;
    ///
    /// let err = CellError::provider_message("quota exceeded");
    /// assert_eq!(err.to_string(), "provider error: quota exceeded");
    /// ```
    #[must_use]
    pub fn provider_message(message: impl Into<String>) -> Self {
        Self::provider(ProviderMessage(message.into()))
    }

    /// Creates a [`CellError::MissingAttribute`].
    #[must_use]
    pub fn missing_attribute(attribute: impl Into<Arc<str>>) -> Self {
        Self::MissingAttribute {
            attribute: attribute.into(),
        }
    }

    /// Returns `true` if this error came from an aborted run.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::RunAborted { .. })
    }
}

/// Message-only provider failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ProviderMessage(String);
