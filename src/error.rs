//! Error taxonomy shared by the editing core and its collaborators.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed field path, value or document shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// A collaborator was unreachable or rejected the request.
    #[error("remote error: {0}")]
    Remote(String),

    /// A response arrived for a call that has since been superseded.
    ///
    /// Never shown to the user; the session drops these after logging.
    #[error("stale response (sequence {seq}, latest {latest})")]
    StaleResponse { seq: u64, latest: u64 },

    /// An operation that needs a selection or a loaded project ran without one.
    #[error("{0}")]
    Precondition(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Whether this error should reach the visible error slot.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResponse { .. })
    }
}
