//! Deferred, single-assignment output values for Stratum.
//!
//! `stratum_output` provides the value model a declaring program uses for
//! attributes that only become known once a provisioning engine has done its
//! work.
//!
//! # Core Concepts
//!
//! - [`OutputCell`] - A write-once, read-many deferred value
//! - [`Resolver`] - The engine-side handle that settles a cell
//! - [`CellState`] - `Pending`, `Resolved` or `Failed`
//! - [`CellRegistry`] - Run-scoped set of resolvers that can be aborted together
//!
//! # State Machine
//!
//! ```text
//! pending ──resolve──▶ resolved
//!    │
//!    └─────fail──────▶ failed
//! ```
//!
//! Both terminal states are final. Settling a cell twice returns
//! [`AlreadySettled`] and leaves the observed value untouched.
//!
//! # Example
//!
//! ```
//! use stratum_output::{CellError, OutputCell};
//!
//! let (id, id_resolver) = OutputCell::<String>::pending_with_sources(["rg"]);
//! let label = id.map(|id| format!("group/{id}"));
//!
//! id_resolver.resolve("rg-123".into()).unwrap();
//! assert_eq!(label.state().value().map(String::as_str), Some("group/rg-123"));
//! assert!(id_resolver.fail(CellError::aborted("too late")).is_err());
//! ```

/// The output cell and its resolver.
pub mod cell;

/// Combinators composing cells without blocking.
pub mod combinator;

/// Error types.
pub mod error;

/// Run-scoped registry used to abort pending cells.
pub mod registry;

pub use cell::{CellState, CellValue, Outcome, OutputCell, Resolver};
pub use error::{AlreadySettled, CellError};
pub use registry::CellRegistry;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::cell::{CellState, CellValue, Outcome, OutputCell, Resolver};
    pub use crate::error::{AlreadySettled, CellError};
    pub use crate::registry::CellRegistry;
}
