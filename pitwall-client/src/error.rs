//! Error types for pitwall-client
//!
//! Every failure the session/entitlement subsystem can surface, together
//! with how the presentation layer must react to it ([`Disposition`]).

use thiserror::Error;

/// Client error taxonomy
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable credential or profile
    #[error("Not signed in")]
    Unauthenticated,

    /// Backend rejected the credential (HTTP 401); triggers invalidation
    #[error("Credential rejected: {0}")]
    AuthorizationFailure(String),

    /// Backend refused the operation for this account (HTTP 403), e.g. a
    /// tier-gated action or an exhausted quota. The credential stays valid.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Backend refused the request as invalid (HTTP 400), e.g. an email
    /// that is already registered
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Entitlement could not be confirmed; gated actions are blocked
    #[error("Entitlement tier could not be confirmed")]
    TierUnknown,

    /// Operation needs a completed entitlement sync first
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Backend response violates the contract; never retried
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Transport-level failure (timeout, connection refused, reset)
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Resource absent (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// Caller navigated away; nothing was written
    #[error("Request cancelled")]
    Cancelled,

    /// A newer request was issued before this one completed; its result was discarded
    #[error("Superseded by a newer request")]
    Superseded,

    /// pitwall-common error (config, store, serialization)
    #[error(transparent)]
    Common(#[from] pitwall_common::Error),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// How an error is surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the user to the sign-in entry point
    RedirectToSignIn,
    /// Visible banner with a retry affordance
    RetryableBanner,
    /// Logged, with a generic failure message
    GenericFailure,
    /// Nothing to show (the caller abandoned the request)
    Silent,
}

impl ClientError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ClientError::Unauthenticated | ClientError::AuthorizationFailure(_) => {
                Disposition::RedirectToSignIn
            }
            ClientError::TierUnknown
            | ClientError::NetworkFailure(_)
            | ClientError::Backend { .. } => Disposition::RetryableBanner,
            ClientError::Forbidden(_)
            | ClientError::Rejected(_)
            | ClientError::NotReady(_)
            | ClientError::MalformedResponse(_)
            | ClientError::NotFound(_)
            | ClientError::Common(_) => Disposition::GenericFailure,
            ClientError::Cancelled | ClientError::Superseded => Disposition::Silent,
        }
    }

    /// Text suitable for the user; never includes backend internals
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthenticated | ClientError::AuthorizationFailure(_) => {
                "Please sign in to continue.".to_string()
            }
            ClientError::Forbidden(detail) | ClientError::Rejected(detail) => detail.clone(),
            ClientError::TierUnknown => {
                "We couldn't confirm your plan right now. Please try again.".to_string()
            }
            ClientError::NetworkFailure(_) | ClientError::Backend { .. } => {
                "The service is unreachable right now. Please try again.".to_string()
            }
            ClientError::Cancelled | ClientError::Superseded => String::new(),
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }

    /// Only transport failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::NetworkFailure(_))
    }

    /// Programming or contract errors that must reach the logs
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ClientError::MalformedResponse(_) | ClientError::NotReady(_)
        )
    }
}
