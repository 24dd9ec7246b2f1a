use serde::{Deserialize, Serialize};

use crate::domain::Decision;

/// Outbound image review envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReviewResponse {
    pub kind: String,

    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub status: ImageReviewStatus,
}

/// Decision portion of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReviewStatus {
    pub allowed: bool,
    pub reason: String,
}

impl ImageReviewResponse {
    /// Build a response echoing the caller's type metadata.
    pub fn new(kind: impl Into<String>, api_version: impl Into<String>, decision: Decision) -> Self {
        ImageReviewResponse {
            kind: kind.into(),
            api_version: api_version.into(),
            status: ImageReviewStatus {
                allowed: decision.allowed,
                reason: decision.reason,
            },
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub rules: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization() {
        let resp = ImageReviewResponse::new(
            "ImageReview",
            "imagepolicy.k8s.io/v1alpha1",
            Decision::from_rule("r1", true, "trusted registry"),
        );

        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["kind"], "ImageReview");
        assert_eq!(json["apiVersion"], "imagepolicy.k8s.io/v1alpha1");
        assert_eq!(json["status"]["allowed"], true);
        assert_eq!(json["status"]["reason"], "trusted registry");
    }

    #[test]
    fn test_error_response() {
        let json = serde_json::to_string(&ErrorResponse::new("bad body")).unwrap();
        assert_eq!(json, r#"{"error":"bad body"}"#);
    }
}
