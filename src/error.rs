//! Error types for the BigIP provider.
//!
//! [`ProviderError`] is what every provider operation returns. Remote API
//! failures are carried as [`ApiError`], which records the HTTP status, the
//! remote error payload, and whether the failure was transient.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while serving the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider configuration is invalid. Lists every violation found.
    #[error("Invalid provider configuration: {0}")]
    Configuration(ConfigErrors),

    /// A resource operation was requested before `Configure` succeeded.
    #[error("Provider is not configured")]
    NotConfigured,

    /// The resource does not exist on the BigIP.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The BigIP API call failed.
    #[error("BigIP API error: {0}")]
    Api(ApiError),

    /// The object was created remotely but could not be read back.
    ///
    /// `remote_id` must be handed to the host so the object stays tracked.
    #[error("Resource {remote_id} was created but reading it back failed: {source}")]
    PartialFailure {
        /// Identifier of the object that now exists on the BigIP.
        remote_id: String,
        /// The read-back failure.
        #[source]
        source: Box<ProviderError>,
    },

    /// Desired state does not satisfy the resource schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        if err.status == Some(404) {
            Self::NotFound(err.message)
        } else {
            Self::Api(err)
        }
    }
}

impl ProviderError {
    /// Build a configuration error from a single violation.
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = ConfigErrors::default();
        errors.push(field, reason);
        Self::Configuration(errors)
    }

    /// Returns true if this error means the remote object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Render the error as a host-facing diagnostic.
    ///
    /// API errors carry the HTTP status and the remote payload in the detail
    /// so the user can diagnose without re-running with debug logging.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string());
        match self {
            Self::Configuration(errors) => diagnostic.with_detail(errors.detail()),
            Self::Api(err) => diagnostic.with_detail(err.detail()),
            Self::PartialFailure { remote_id, source } => {
                let mut detail = format!(
                    "The object {} exists on the BigIP and is still tracked. \
                     Refresh or destroy it once the API is reachable.",
                    remote_id
                );
                if let Self::Api(err) = source.as_ref() {
                    detail.push('\n');
                    detail.push_str(&err.detail());
                }
                diagnostic.with_detail(detail)
            }
            _ => diagnostic,
        }
    }
}

/// A single invalid or missing configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// The configuration key.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

/// Every configuration violation found during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors {
    violations: Vec<ConfigViolation>,
}

impl ConfigErrors {
    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(ConfigViolation {
            field: field.into(),
            reason: reason.into(),
        });
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// The recorded violations, in discovery order.
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }

    /// Returns true if a violation was recorded for `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// `Ok(())` when empty, otherwise the aggregated error.
    pub fn into_result(self) -> Result<(), ProviderError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Configuration(self))
        }
    }

    fn detail(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("- {}: {}", v.field, v.reason))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", v.field, v.reason)?;
        }
        Ok(())
    }
}

/// Classification of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request or the whole operation ran past its deadline.
    Timeout,
    /// The connection could not be established or was reset.
    Connection,
    /// The BigIP answered with a 5xx status.
    Server,
    /// The BigIP rejected the request with a 4xx status.
    Rejected,
    /// The response body could not be decoded.
    Decode,
}

impl ApiErrorKind {
    /// Transient kinds are retried by the client.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Connection | Self::Server)
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection failure",
            Self::Server => "server error",
            Self::Rejected => "request rejected",
            Self::Decode => "invalid response",
        };
        f.write_str(name)
    }
}

/// A failed call against the BigIP iControl REST API.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ApiError {
    /// What went wrong.
    pub kind: ApiErrorKind,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Human-readable message (the BigIP `message` field when present).
    pub message: String,
    /// The remote error payload, when one was returned.
    pub body: Option<Value>,
    /// How many attempts were made before giving up.
    pub attempts: u32,
}

impl ApiError {
    /// Build an error for an HTTP error response.
    pub fn from_status(status: u16, body: Option<Value>) -> Self {
        let kind = if status >= 500 {
            ApiErrorKind::Server
        } else {
            ApiErrorKind::Rejected
        };
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));
        Self {
            kind,
            status: Some(status),
            message,
            body,
            attempts: 1,
        }
    }

    /// Build an error that has no HTTP response attached.
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            body: None,
            attempts: 1,
        }
    }

    /// An operation exceeded its deadline.
    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    /// Whether the client should retry this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    fn detail(&self) -> String {
        let mut detail = match self.status {
            Some(status) => format!("HTTP status: {}", status),
            None => format!("No HTTP response ({})", self.kind),
        };
        if self.attempts > 1 {
            detail.push_str(&format!("\nAttempts: {}", self.attempts));
        }
        if let Some(body) = &self.body {
            let rendered =
                serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
            detail.push_str("\nResponse body: ");
            detail.push_str(&rendered);
        }
        detail
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("/Common/web".to_string());
        assert_eq!(format!("{}", err), "Resource not found: /Common/web");

        let err = ProviderError::UnknownResource("bigip_gtm_pool".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: bigip_gtm_pool");

        let err = ProviderError::NotConfigured;
        assert_eq!(format!("{}", err), "Provider is not configured");
    }

    #[test]
    fn test_config_errors_list_every_violation() {
        let mut errors = ConfigErrors::default();
        errors.push("address", "is required");
        errors.push("username", "is required");

        let err = errors.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("address: is required"));
        assert!(message.contains("username: is required"));

        let diagnostic = err.to_diagnostic();
        let detail = diagnostic.detail.unwrap();
        assert_eq!(detail.lines().count(), 2);
    }

    #[test]
    fn test_empty_config_errors_is_ok() {
        assert!(ConfigErrors::default().into_result().is_ok());
    }

    #[test]
    fn test_api_error_from_status() {
        let body = json!({"code": 400, "message": "01070734:3: Configuration error"});
        let err = ApiError::from_status(400, Some(body));
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "01070734:3: Configuration error");
        assert!(!err.is_retryable());

        let err = ApiError::from_status(503, None);
        assert_eq!(err.kind, ApiErrorKind::Server);
        assert_eq!(err.message, "HTTP 503");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_status_maps_to_not_found() {
        let err: ProviderError = ApiError::from_status(
            404,
            Some(json!({"message": "The requested Pool (/Common/web) was not found."})),
        )
        .into();
        assert!(err.is_not_found());

        let err: ProviderError = ApiError::from_status(409, None).into();
        assert!(matches!(err, ProviderError::Api(_)));
    }

    #[test]
    fn test_api_diagnostic_carries_status_and_body() {
        let mut api = ApiError::from_status(400, Some(json!({"message": "bad monitor"})));
        api.attempts = 1;
        let diagnostic = ProviderError::Api(api).to_diagnostic();
        let detail = diagnostic.detail.unwrap();
        assert!(detail.contains("HTTP status: 400"));
        assert!(detail.contains("bad monitor"));
    }

    #[test]
    fn test_partial_failure_keeps_remote_id() {
        let err = ProviderError::PartialFailure {
            remote_id: "/Common/42".to_string(),
            source: Box::new(ProviderError::Api(ApiError::new(
                ApiErrorKind::Connection,
                "connection reset",
            ))),
        };
        assert!(err.to_string().contains("/Common/42"));
        assert!(err.to_diagnostic().detail.unwrap().contains("/Common/42"));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ApiErrorKind::Timeout.is_transient());
        assert!(ApiErrorKind::Connection.is_transient());
        assert!(ApiErrorKind::Server.is_transient());
        assert!(!ApiErrorKind::Rejected.is_transient());
        assert!(!ApiErrorKind::Decode.is_transient());
    }
}
