//! # Error Types
//!
//! Leaf error types shared by every crate in the workspace. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! Higher-level errors (catalog loading, page decoding, fetch failures) live
//! next to the component that raises them and carry structured context:
//! the kind, field or cursor involved and the reason.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// An API version string could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    /// The version string was empty.
    #[error("empty API version")]
    Empty,

    /// A dotted component was not an unsigned integer.
    #[error("invalid API version '{raw}': component '{component}' is not a number")]
    InvalidComponent {
        /// The full version string.
        raw: String,
        /// The offending component.
        component: String,
    },

    /// More than three dotted components.
    #[error("invalid API version '{raw}': at most three components are allowed")]
    TooManyComponents {
        /// The full version string.
        raw: String,
    },
}

/// Engine configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set but cannot be interpreted.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Name of the variable.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
