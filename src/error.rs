//! Error taxonomy for the gateway.
//!
//! Every failure that can cross the dispatch boundary is one of five
//! [`GatewayError`] kinds. The kind's [`category`](GatewayError::category)
//! is the stable, machine-checkable string placed in the `error` field of a
//! [`ToolResult`](crate::tools::ToolResult); the `Display` text becomes the
//! human-readable `message`.
//!
//! | Kind | Raised by | Category |
//! |------|-----------|----------|
//! | `ToolNotFound` | dispatcher lookup | `tool not found` |
//! | `InvalidParameters` | schema validation, path checks | `invalid parameters` |
//! | `Unavailable` | transport after exhausted retries, deadlines, inference | `unavailable` |
//! | `ClientError` | non-retryable 4xx from the vault, or a local conflict | `client error` |
//! | `InternalFailure` | panics and unexpected handler errors | `internal failure` |

use thiserror::Error;

/// Errors surfaced by the transport, search engine, and dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No tool is registered under the requested name.
    #[error("no tool registered with name: {0}")]
    ToolNotFound(String),

    /// Parameters are missing, mistyped, or semantically invalid.
    #[error("{0}")]
    InvalidParameters(String),

    /// A collaborator could not be reached within the retry/deadline budget.
    #[error("{0}")]
    Unavailable(String),

    /// The request was rejected with a non-retryable 4xx status, by the
    /// vault or by a tool's own precondition check.
    #[error("client error {status}: {message}")]
    ClientError { status: u16, message: String },

    /// A handler failed in a way the caller cannot act on.
    #[error("{0}")]
    InternalFailure(String),
}

impl GatewayError {
    /// Stable category string used in the `error` field of the envelope.
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::ToolNotFound(_) => "tool not found",
            GatewayError::InvalidParameters(_) => "invalid parameters",
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::ClientError { .. } => "client error",
            GatewayError::InternalFailure(_) => "internal failure",
        }
    }

    /// Convenience constructor for validation failures.
    pub fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidParameters(message.into())
    }

    /// True for a 404 from the vault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::ClientError { status: 404, .. })
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::InternalFailure(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InternalFailure(format!("serialization failed: {}", err))
    }
}

/// Result alias used across the library.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_stable() {
        assert_eq!(
            GatewayError::ToolNotFound("x".into()).category(),
            "tool not found"
        );
        assert_eq!(GatewayError::invalid("bad").category(), "invalid parameters");
        assert_eq!(GatewayError::Unavailable("down".into()).category(), "unavailable");
        assert_eq!(
            GatewayError::ClientError {
                status: 404,
                message: "missing".into()
            }
            .category(),
            "client error"
        );
        assert_eq!(
            GatewayError::InternalFailure("boom".into()).category(),
            "internal failure"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = GatewayError::ClientError {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(err.is_not_found());
        assert!(!GatewayError::ClientError {
            status: 400,
            message: String::new()
        }
        .is_not_found());
    }

    #[test]
    fn test_client_error_message_does_not_blame_the_vault() {
        let err = GatewayError::ClientError {
            status: 409,
            message: "note already exists: a.md".into(),
        };
        assert_eq!(err.to_string(), "client error 409: note already exists: a.md");
    }

    #[test]
    fn test_anyhow_maps_to_internal() {
        let err: GatewayError = anyhow::anyhow!("unexpected").into();
        assert_eq!(err.category(), "internal failure");
    }
}
