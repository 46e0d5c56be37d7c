//! # Flowmesh Error
//!
//! A single error type, [`FlowError`], used throughout the workspace.
//! Its [`ErrorKind`] variants mirror the taxonomy in the design's error
//! handling section exactly: config, resolution, unknown activity,
//! activity, condition, secret, cycle, and trigger-config errors.
//!
//! The split between "soft node errors" (routable via `error` transitions)
//! and fatal execution errors is not encoded in the type itself — that is
//! a routing decision the executor makes based on *where* an error
//! originated, not what kind it is. What this crate guarantees is that
//! every error carries enough structure (`kind`, `code`, `message`) for
//! the executor and audit emitter to report it without re-deriving text.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The taxonomy of error kinds, matching the design's error-handling
/// section one-to-one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    /// Missing required DSL field or malformed DSL. Reported synchronously;
    /// the flow does not start.
    #[error("invalid or missing flow configuration")]
    Config,
    /// JSONPath points at a missing key / out-of-range index.
    #[error("path resolution failed: missing key or out-of-range index")]
    Resolution,
    /// Node `type` is not registered in the activity registry.
    #[error("no activity handler registered for this node type")]
    UnknownActivity,
    /// An activity handler returned an error (retryable per node policy).
    #[error("activity handler returned an error")]
    Activity,
    /// Condition substitution produced an expression the evaluator could
    /// not evaluate. Always treated as `false`, never surfaced as an
    /// execution error — kept here only so the evaluator can log why.
    #[error("condition evaluation failed")]
    Condition,
    /// Secret resolver failed (lookup, decrypt, or decode).
    #[error("secret resolution failed")]
    Secret,
    /// The executor's depth-first walk re-entered an already-visited node.
    #[error("cycle detected in the flow graph")]
    Cycle,
    /// A trigger handler rejected its config during `Start`.
    #[error("trigger configuration rejected at start")]
    TriggerConfig,
}

impl ErrorKind {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Resolution => "RESOLUTION_ERROR",
            Self::UnknownActivity => "UNKNOWN_ACTIVITY",
            Self::Activity => "ACTIVITY_ERROR",
            Self::Condition => "CONDITION_ERROR",
            Self::Secret => "SECRET_ERROR",
            Self::Cycle => "CYCLE_ERROR",
            Self::TriggerConfig => "TRIGGER_CONFIG_ERROR",
        }
    }

    /// Whether this kind of error is, by default, worth retrying at the
    /// node level. Activity errors are; the rest are not (they won't
    /// succeed on a second attempt without something external changing).
    #[must_use]
    pub fn default_retryable(&self) -> bool {
        matches!(self, Self::Activity)
    }
}

/// Primary error type for Flowmesh.
#[derive(Error, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlowError {
    pub kind: ErrorKind,
    pub message: String,
    /// Present only on activity errors; mirrors the suggested delay an
    /// activity handler can offer (e.g. `Retry-After`). The executor's
    /// fixed-delay retry policy may ignore it in favor of node config.
    pub retry_after: Option<Duration>,
    /// Optional free-form detail, never containing secret plaintext.
    pub details: Option<String>,
}

impl FlowError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.default_retryable()
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, message)
    }

    #[must_use]
    pub fn unknown_activity(activity_type: impl Into<String>) -> Self {
        let activity_type = activity_type.into();
        Self::new(
            ErrorKind::UnknownActivity,
            format!("no activity handler registered for type `{activity_type}`"),
        )
    }

    #[must_use]
    pub fn activity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Activity, message)
    }

    #[must_use]
    pub fn condition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Condition, message)
    }

    /// Build a secret-resolution error. `reason` must never contain the
    /// decrypted secret value — callers pass a generic cause (e.g.
    /// `"not found"`, `"decrypt failed"`), never the plaintext.
    #[must_use]
    pub fn secret(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Secret, format!("secret resolution failed: {}", reason.into()))
    }

    #[must_use]
    pub fn cycle(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(ErrorKind::Cycle, format!("cycle detected at node `{node_id}`"))
    }

    #[must_use]
    pub fn trigger_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TriggerConfig, message)
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_errors_are_retryable_by_default() {
        assert!(FlowError::activity("boom").is_retryable());
        assert!(!FlowError::config("bad dsl").is_retryable());
    }

    #[test]
    fn secret_error_message_never_echoes_reason_verbatim_as_value() {
        let err = FlowError::secret("not found");
        assert!(err.message.contains("secret resolution failed"));
        assert_eq!(err.kind, ErrorKind::Secret);
    }

    #[test]
    fn display_includes_code_and_details() {
        let err = FlowError::cycle("a").with_details("a -> b -> a");
        let rendered = err.to_string();
        assert!(rendered.contains("CYCLE_ERROR"));
        assert!(rendered.contains("a -> b -> a"));
    }
}
