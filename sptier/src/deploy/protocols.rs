//! Provider-facing interfaces for starting processors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AdvisorError;

/// A structured rejection returned by the provider.
///
/// Atlas answers with `{ "error": 400, "detail": "...", "errorCode": "..." }`;
/// bodies that are not JSON are kept as the detail text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRejection {
    /// HTTP status or provider error number; `0` for synthetic rejections.
    #[serde(default)]
    pub error: u16,
    /// Free-text detail.
    #[serde(default)]
    pub detail: String,
    /// Provider error code.
    #[serde(default, rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ProviderRejection {
    /// Creates a rejection.
    #[must_use]
    pub fn new(error: u16, detail: impl Into<String>) -> Self {
        Self {
            error,
            detail: detail.into(),
            error_code: None,
        }
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Builds a rejection from an HTTP status and response body.
    #[must_use]
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<Self>(body) {
            Ok(mut parsed) if !parsed.detail.is_empty() || parsed.error_code.is_some() => {
                if parsed.error == 0 {
                    parsed.error = status;
                }
                parsed
            }
            _ => Self::new(status, body.trim()),
        }
    }

    /// A synthetic rejection for an attempt that did not answer in time.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(0, format!("timeout after {:.1}s", after.as_secs_f64())).with_error_code("TIMEOUT")
    }

    /// Whether this is a synthetic timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.error_code.as_deref() == Some("TIMEOUT")
    }

    /// Reason string recorded in the retry history.
    #[must_use]
    pub fn reason(&self) -> String {
        if self.is_timeout() {
            return "timeout".to_string();
        }
        match &self.error_code {
            Some(code) => format!("{code}: {}", self.detail),
            None => self.detail.clone(),
        }
    }
}

impl From<ProviderRejection> for AdvisorError {
    fn from(rejection: ProviderRejection) -> Self {
        Self::ProviderRejection {
            status: rejection.error,
            detail: rejection.detail,
        }
    }
}

/// Result of one start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The provider accepted the start at the requested tier.
    Accepted,
    /// The provider refused the start.
    Rejected(ProviderRejection),
}

/// Starts a processor at a given tier.
///
/// Implementations block until the provider has accepted or refused the
/// request (including any confirmation polling). Transport failures are
/// returned as `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessorStarter: Send + Sync {
    /// Requests a start of `processor` on `tier`.
    async fn start_with_tier(&self, processor: &str, tier: &str) -> Result<StartOutcome, AdvisorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_body() {
        let rejection = ProviderRejection::from_body(
            400,
            r#"{"error": 400, "detail": "Minimum tier for this workload: SP10 or larger.", "errorCode": "INVALID_ATTRIBUTE", "reason": "Bad Request"}"#,
        );
        assert_eq!(rejection.error, 400);
        assert_eq!(rejection.error_code.as_deref(), Some("INVALID_ATTRIBUTE"));
        assert!(rejection.detail.starts_with("Minimum tier"));
        assert_eq!(
            rejection.reason(),
            "INVALID_ATTRIBUTE: Minimum tier for this workload: SP10 or larger."
        );
    }

    #[test]
    fn test_from_plain_body() {
        let rejection = ProviderRejection::from_body(502, "  Bad Gateway \n");
        assert_eq!(rejection.error, 502);
        assert_eq!(rejection.detail, "Bad Gateway");
        assert!(rejection.error_code.is_none());
    }

    #[test]
    fn test_json_without_status_uses_http_status() {
        let rejection = ProviderRejection::from_body(409, r#"{"detail": "conflict"}"#);
        assert_eq!(rejection.error, 409);
    }

    #[test]
    fn test_timeout_reason() {
        let rejection = ProviderRejection::timeout(Duration::from_secs(3));
        assert!(rejection.is_timeout());
        assert_eq!(rejection.reason(), "timeout");
    }

    #[test]
    fn test_into_advisor_error() {
        let err: AdvisorError = ProviderRejection::new(400, "nope").into();
        assert_eq!(err.error_kind(), "ProviderRejection");
    }
}
