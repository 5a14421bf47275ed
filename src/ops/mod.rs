//! Domain operations behind each route.
//!
//! Operations take their collaborators explicitly and know nothing about
//! HTTP or the activity trail; handlers in [`crate::api`] compose them.

use std::fmt;

pub mod doubt;
pub mod educhat;
pub mod essay;
pub mod notes;
pub mod study;
pub mod tutor;
pub mod ytchat;

/// Why an operation did not produce a result.
#[derive(Debug)]
pub enum OpError {
    /// Input rejected before or after extraction
    Invalid(String),
    /// Referenced state does not exist
    NotFound(String),
    /// A collaborator failed
    Upstream(anyhow::Error),
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) | Self::NotFound(msg) => write!(f, "{}", msg),
            Self::Upstream(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OpError {}

impl OpError {
    /// Wrap a collaborator error with a short prefix naming the step.
    pub fn upstream(step: &str, error: impl fmt::Display) -> Self {
        Self::Upstream(anyhow::anyhow!("{}: {}", step, error))
    }
}

/// Result of an operation that may decline to answer.
#[derive(Debug)]
pub enum Outcome<T> {
    Answered(T),
    /// Declined by policy; the reason is shown to the caller
    Refused(String),
    Failed(OpError),
}

impl<T> From<Result<T, OpError>> for Outcome<T> {
    fn from(result: Result<T, OpError>) -> Self {
        match result {
            Ok(value) => Self::Answered(value),
            Err(e) => Self::Failed(e),
        }
    }
}

impl<T> Outcome<T> {
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused(_))
    }
}
