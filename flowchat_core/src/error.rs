//! Error types shared by the core, the adapters and the CLI.

use std::time::Duration;
use thiserror::Error;

/// Classification of a workflow backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Rejected credentials (401, 403) - not retryable
    Auth,
    /// Connection problems - retryable
    Network,
    /// No data within the configured idle window - retryable
    Timeout,
    /// The backend answered with a failure status
    Backend,
}

/// Failure reported by the workflow backend transport.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Backend, message)
    }

    #[must_use]
    pub fn idle_timeout(after: Duration) -> Self {
        Self::new(
            BackendErrorKind::Timeout,
            format!("no data from the workflow backend for {}s", after.as_secs()),
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => BackendErrorKind::Auth,
            502..=504 => BackendErrorKind::Network,
            _ => BackendErrorKind::Backend,
        };
        let mut error = Self::new(kind, format!("HTTP {status}: {}", body.into()));
        error.status = Some(status);
        error
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self.kind {
            BackendErrorKind::Network | BackendErrorKind::Timeout => true,
            BackendErrorKind::Backend => matches!(self.status, Some(429 | 500..=599)),
            BackendErrorKind::Auth => false,
        }
    }
}

/// Classification of a blob store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobErrorKind {
    Quota,
    Auth,
    Network,
    PolicyDisallowed,
    Other,
}

/// Drive 403 reasons that are quota or throttling, not permission problems.
const THROTTLE_REASONS: [&str; 3] = [
    "storageQuotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

/// Failure reported by the blob store.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BlobError {
    pub kind: BlobErrorKind,
    pub message: String,
}

impl BlobError {
    pub fn new(kind: BlobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BlobErrorKind::Network, message)
    }

    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let kind = match status {
            401 => BlobErrorKind::Auth,
            // Drive reports both missing scopes and sharing restrictions as 403
            403 if THROTTLE_REASONS.iter().any(|r| body.contains(r)) => BlobErrorKind::Quota,
            403 if body.contains("sharing") || body.contains("publishOutNotPermitted") => {
                BlobErrorKind::PolicyDisallowed
            }
            403 => BlobErrorKind::Auth,
            429 => BlobErrorKind::Quota,
            500..=599 => BlobErrorKind::Network,
            _ => BlobErrorKind::Other,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }
}

/// Stable error categories surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyQuery,
    TurnInFlight,
    InvalidOption,
    UploadFailure,
    PublicVisibilityFailure,
    UnrecognizedStreamChunk,
    BackendTransportFailure,
    ConfigurationMissing,
}

impl ErrorKind {
    /// Problems the user fixes by editing configuration rather than retrying.
    #[must_use]
    pub const fn is_configuration(self) -> bool {
        matches!(self, Self::ConfigurationMissing | Self::InvalidOption)
    }
}

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("A turn is already in progress for this session")]
    TurnInFlight,

    #[error("Invalid session option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Upload failed: {0}")]
    Upload(#[source] BlobError),

    #[error("Could not make the uploaded file public: {0}")]
    PublicVisibility(#[source] BlobError),

    #[error("Unrecognized stream chunk: {0}")]
    UnrecognizedChunk(String),

    #[error("Workflow backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Missing configuration `{key}`: {hint}")]
    ConfigurationMissing { key: String, hint: String },
}

impl FlowError {
    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration_missing(key: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            key: key.into(),
            hint: hint.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery => ErrorKind::EmptyQuery,
            Self::TurnInFlight => ErrorKind::TurnInFlight,
            Self::InvalidOption { .. } => ErrorKind::InvalidOption,
            Self::Upload(_) => ErrorKind::UploadFailure,
            Self::PublicVisibility(_) => ErrorKind::PublicVisibilityFailure,
            Self::UnrecognizedChunk(_) => ErrorKind::UnrecognizedStreamChunk,
            Self::Backend(_) => ErrorKind::BackendTransportFailure,
            Self::ConfigurationMissing { .. } => ErrorKind::ConfigurationMissing,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_retryable(),
            Self::Upload(e) => matches!(e.kind, BlobErrorKind::Network | BlobErrorKind::Quota),
            Self::TurnInFlight => true,
            _ => false,
        }
    }

    /// Message for the end user. Configuration problems say what to fix,
    /// transient problems suggest trying again.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuery => "Please enter a message before sending.".to_string(),
            Self::TurnInFlight => {
                "Still answering the previous message. Wait for it to finish.".to_string()
            }
            Self::InvalidOption { key, reason } => {
                format!("Option `{key}` was rejected ({reason}). Use `is_rag` or `system_prompt`.")
            }
            Self::ConfigurationMissing { key, hint } => {
                format!("Configuration problem: `{key}` is not set. {hint}")
            }
            Self::Backend(e) if e.kind == BackendErrorKind::Auth => format!(
                "The workflow backend rejected the credentials ({e}). Check `workflow.api_key`."
            ),
            Self::Upload(e) if e.kind == BlobErrorKind::Auth => format!(
                "The storage service rejected the credentials ({e}). Check `storage.access_token`."
            ),
            Self::PublicVisibility(e) => {
                format!("The file was uploaded but could not be made public: {e}")
            }
            Self::UnrecognizedChunk(_) => format!(
                "{self}. The backend protocol may have changed; check the `stream` section of the configuration, then try again."
            ),
            _ if self.is_retryable() => format!("{self}. Please try again."),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(BackendError::from_status(401, "").kind, BackendErrorKind::Auth);
        assert_eq!(BackendError::from_status(503, "").kind, BackendErrorKind::Network);
        assert!(BackendError::from_status(500, "").is_retryable());
        assert!(BackendError::from_status(429, "").is_retryable());
        assert!(!BackendError::from_status(400, "bad").is_retryable());
        assert!(!BackendError::auth("nope").is_retryable());

        assert_eq!(BlobError::from_status(401, "").kind, BlobErrorKind::Auth);
        assert_eq!(
            BlobError::from_status(403, r#"{"reason":"storageQuotaExceeded"}"#).kind,
            BlobErrorKind::Quota
        );
        for reason in ["rateLimitExceeded", "userRateLimitExceeded"] {
            let throttled = BlobError::from_status(403, format!(r#"{{"reason":"{reason}"}}"#));
            assert_eq!(throttled.kind, BlobErrorKind::Quota, "{reason}");
            assert!(FlowError::Upload(throttled).is_retryable());
        }
        assert_eq!(
            BlobError::from_status(403, "publishOutNotPermitted").kind,
            BlobErrorKind::PolicyDisallowed
        );
    }

    #[test]
    fn user_messages_separate_configuration_from_transient() {
        let missing = FlowError::configuration_missing("workflow.api_key", "Set it in config.json.");
        assert!(missing.kind().is_configuration());
        assert!(missing.user_message().contains("workflow.api_key"));

        let transient = FlowError::from(BackendError::network("connection reset"));
        assert!(!transient.kind().is_configuration());
        assert!(transient.user_message().ends_with("Please try again."));

        let auth = FlowError::from(BackendError::auth("401"));
        assert!(auth.user_message().contains("workflow.api_key"));
    }
}
