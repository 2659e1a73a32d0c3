//! Errors reported to the user without a backtrace-style context chain.

/// A failure caused by user input or the environment rather than a bug.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Find a [`UserError`] anywhere in an error chain.
pub fn as_user_error(err: &anyhow::Error) -> Option<&UserError> {
    err.chain().find_map(|cause| cause.downcast_ref::<UserError>())
}

/// Wrap a query parse failure so it is reported as a user error.
pub fn invalid_query(err: anyhow::Error) -> anyhow::Error {
    UserError::new(format!("invalid query: {err:#}")).into()
}
