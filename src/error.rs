//! Error taxonomy for the session authority.
//!
//! Credential and token failures surface as [`Error::Unauthorized`] with
//! deliberately generic messages; callers map these kinds to transport
//! status codes. None of the messages name the raw token, its hash, or
//! which validity check failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Credential mismatch, or a missing/expired/revoked/reused refresh
    /// token. The message is generic on purpose.
    #[error("{0}")]
    Unauthorized(&'static str),
    /// Authenticated caller acting on another principal's session.
    #[error("session belongs to another user")]
    Forbidden,
    /// Referenced session id does not exist for any user.
    #[error("session not found")]
    NotFound,
    /// A rate limiter rejected the attempt before credentials were checked.
    #[error("too many attempts, try again later")]
    RateLimited,
    /// Missing or unusable secrets at construction time. Fatal; the
    /// authority is never built in this state.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Storage or crypto failure. The source chain carries detail for
    /// logs; the display stays generic for callers.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl Error {
    pub(crate) fn internal(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use anyhow::anyhow;

    #[test]
    fn unauthorized_displays_its_message_verbatim() {
        let err = Error::Unauthorized("Invalid email or password");
        assert_eq!(err.to_string(), "Invalid email or password");
    }

    #[test]
    fn internal_display_does_not_leak_the_source() {
        let err = Error::internal(anyhow!("connection refused to db:5432"));
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn configuration_names_the_reason() {
        let err = Error::Configuration("signing secret too short".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: signing secret too short"
        );
    }
}
