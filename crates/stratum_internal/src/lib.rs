//! # Stratum Internal Library
//!
//! Re-exports the core Stratum crates for convenience.

/// Deferred, single-assignment output values.
pub use stratum_output;

/// Resource graphs, programs and the reference engine.
pub use stratum_graph;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use stratum_graph::prelude::*;
}
