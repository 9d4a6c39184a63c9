//! Locator error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Boxed failure produced by an instantiation collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = LocatorError> = std::result::Result<T, E>;

/// Every failure a locator operation can surface.
#[derive(Error, Debug)]
pub enum LocatorError {
    // Registry mutation errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    State(String),

    // Resolution errors
    #[error("No service satisfies {contract}{}", describe_target(.required_by))]
    UnsatisfiedDependency {
        contract: String,
        required_by: Option<String>,
    },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Ambiguous lookup for {contract}: {first} and {second} share rank {rank}")]
    AmbiguousConstruction {
        contract: String,
        first: String,
        second: String,
        rank: i32,
    },

    #[error("Failed to create {implementation}: {source}")]
    Instantiation {
        implementation: String,
        #[source]
        source: BoxError,
    },

    #[error("Service {contract} is not a {expected}")]
    TypeMismatch {
        contract: String,
        expected: &'static str,
    },

    // Context errors
    #[error("Context for scope '{0}' has been destroyed")]
    ContextDestroyed(String),

    #[error("No active context for scope '{0}'")]
    NoActiveContext(String),

    // Config errors
    #[error("Configuration load error: {0}")]
    Config(#[from] ConfigError),
}

fn describe_target(required_by: &Option<String>) -> String {
    match required_by {
        Some(owner) => format!(" (required by {})", owner),
        None => String::new(),
    }
}

impl LocatorError {
    pub(crate) fn unsatisfied(contract: &str) -> Self {
        Self::UnsatisfiedDependency {
            contract: contract.to_string(),
            required_by: None,
        }
    }

    /// True for the usage errors raised by torn-down or un-activated scopes.
    pub fn is_context_error(&self) -> bool {
        matches!(
            self,
            LocatorError::ContextDestroyed(_) | LocatorError::NoActiveContext(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsatisfied_message_names_owner() {
        let err = LocatorError::UnsatisfiedDependency {
            contract: "Database".to_string(),
            required_by: Some("UserService".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No service satisfies Database (required by UserService)"
        );
        assert_eq!(
            LocatorError::unsatisfied("Database").to_string(),
            "No service satisfies Database"
        );
    }

    #[test]
    fn test_circular_message_joins_path() {
        let err = LocatorError::CircularDependency {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> A");
    }

    #[test]
    fn test_instantiation_keeps_source() {
        let err = LocatorError::Instantiation {
            implementation: "Pool".to_string(),
            source: "connection refused".into(),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_context_errors() {
        assert!(LocatorError::NoActiveContext("request".into()).is_context_error());
        assert!(LocatorError::ContextDestroyed("request".into()).is_context_error());
        assert!(!LocatorError::State("closed".into()).is_context_error());
    }
}
