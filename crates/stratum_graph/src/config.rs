//! Run configuration.
//!
//! A [`RunConfig`] names the project and stack a program runs against and
//! bounds how many resources an engine may provision at once. It is an
//! explicit value handed to [`Program`](crate::program::Program); there is no
//! ambient global configuration.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Environment variable naming the project.
pub const PROJECT_ENV: &str = "STRATUM_PROJECT";
/// Environment variable naming the stack.
pub const STACK_ENV: &str = "STRATUM_STACK";
/// Environment variable bounding provisioning parallelism.
pub const PARALLELISM_ENV: &str = "STRATUM_PARALLELISM";

/// Configuration for a single program run.
///
/// # Example
///
/// ```
/// use stratum_graph::config::RunConfig;
///
/// let config = RunConfig::new("infra")
///     .with_stack("prod")
///     .with_parallelism(4);
/// assert_eq!(config.stack(), "prod");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    project: String,
    stack: String,
    parallelism: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project: "stratum".to_string(),
            stack: "dev".to_string(),
            parallelism: Self::DEFAULT_PARALLELISM,
        }
    }
}

impl RunConfig {
    /// Default bound on concurrently provisioned resources.
    pub const DEFAULT_PARALLELISM: usize = 16;

    /// Creates a configuration for the given project on the `dev` stack.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from `STRATUM_PROJECT`, `STRATUM_STACK` and
    /// `STRATUM_PARALLELISM`, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConfig`] if `STRATUM_PARALLELISM` is not a
    /// positive integer or the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, GraphError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(project) = lookup(PROJECT_ENV) {
            config.project = project;
        }
        if let Some(stack) = lookup(STACK_ENV) {
            config.stack = stack;
        }
        if let Some(raw) = lookup(PARALLELISM_ENV) {
            config.parallelism = raw.trim().parse().map_err(|_| {
                GraphError::InvalidConfig(format!("{PARALLELISM_ENV} must be an integer, got '{raw}'"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the project name.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Sets the stack name.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Sets the bound on concurrently provisioned resources.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// The project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The stack name.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// The provisioning parallelism bound.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Checks that the configuration can produce well-formed URNs.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConfig`] for an empty project or stack, a
    /// name containing the `::` URN separator, or zero parallelism.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (field, value) in [("project", &self.project), ("stack", &self.stack)] {
            if value.trim().is_empty() {
                return Err(GraphError::InvalidConfig(format!("{field} must not be empty")));
            }
            if value.contains("::") {
                return Err(GraphError::InvalidConfig(format!(
                    "{field} '{value}' must not contain '::'"
                )));
            }
        }
        if self.parallelism == 0 {
            return Err(GraphError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        assert_eq!(config.project(), "stratum");
        assert_eq!(config.stack(), "dev");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = RunConfig::from_lookup(lookup(&[
            (STACK_ENV, "prod"),
            (PARALLELISM_ENV, " 3 "),
        ]))
        .unwrap();
        assert_eq!(config.stack(), "prod");
        assert_eq!(config.parallelism(), 3);
        assert_eq!(config.project(), "stratum");
    }

    #[test]
    fn rejects_non_numeric_parallelism() {
        let err = RunConfig::from_lookup(lookup(&[(PARALLELISM_ENV, "many")])).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_parallelism_and_separators() {
        assert!(RunConfig::default().with_parallelism(0).validate().is_err());
        assert!(RunConfig::default().with_stack("a::b").validate().is_err());
        assert!(RunConfig::new("  ").validate().is_err());
    }
}
