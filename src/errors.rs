// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

/// Failure of a single call to the external generative service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, GatewayError::Authorization(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Quota(_) | GatewayError::Transient(_))
    }

    /// Text safe to show to the user. Parse details never leave the gateway.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Quota(_) => {
                "The generation service is over quota. Please retry in a moment.".to_string()
            }
            GatewayError::Authorization(_) => {
                "Access denied. Please select your API key again.".to_string()
            }
            GatewayError::ContentRejected(reason) => format!("Request rejected by the model: {}", reason),
            GatewayError::Transient(_) => {
                "The generation service is temporarily unavailable. Please retry.".to_string()
            }
            GatewayError::MalformedResponse(_) => {
                "Could not generate content. Please try again.".to_string()
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Artifact {0} already has an operation in flight")]
    InFlight(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid session document: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StudioError {
    pub fn user_message(&self) -> String {
        match self {
            StudioError::Gateway(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for StudioError {
    fn status_code(&self) -> StatusCode {
        match self {
            StudioError::Validation(_) | StudioError::ImageProcessing(_) | StudioError::Session(_) => {
                StatusCode::BAD_REQUEST
            }
            StudioError::NotFound(_) => StatusCode::NOT_FOUND,
            StudioError::InFlight(_) => StatusCode::CONFLICT,
            StudioError::Gateway(GatewayError::Authorization(_)) => StatusCode::UNAUTHORIZED,
            StudioError::Gateway(GatewayError::Quota(_)) => StatusCode::TOO_MANY_REQUESTS,
            StudioError::Gateway(GatewayError::ContentRejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            StudioError::Gateway(_) => StatusCode::BAD_GATEWAY,
            StudioError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            StudioError::Serialization(_) | StudioError::Cancelled | StudioError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            StudioError::Validation(_) => "Validation error",
            StudioError::NotFound(_) => "Not found",
            StudioError::InFlight(_) => "Operation in progress",
            StudioError::Gateway(_) => "AI service error",
            StudioError::ImageProcessing(_) => "Image processing error",
            StudioError::Session(_) => "Invalid session",
            StudioError::Serialization(_) => "Data processing error",
            StudioError::Redis(_) => "Snapshot store error",
            StudioError::Cancelled => "Cancelled",
            StudioError::Config(_) => "Configuration error",
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": error,
            "message": self.user_message(),
            "retryable": matches!(self, StudioError::Gateway(e) if e.is_retryable())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_responses_never_leak_parse_details() {
        let err = GatewayError::MalformedResponse("expected value at line 1 column 1".into());
        assert!(!err.user_message().contains("line 1"));
        assert!(!StudioError::from(err).user_message().contains("column"));
    }

    #[test]
    fn content_rejection_is_shown_verbatim() {
        let err = GatewayError::ContentRejected("SAFETY".into());
        assert!(err.user_message().contains("SAFETY"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            StudioError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(StudioError::InFlight("a".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            StudioError::from(GatewayError::Authorization("403".into())).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            StudioError::from(GatewayError::Transient("503".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn retryable_classes() {
        assert!(GatewayError::Quota("429".into()).is_retryable());
        assert!(GatewayError::Transient("timeout".into()).is_retryable());
        assert!(!GatewayError::ContentRejected("no".into()).is_retryable());
        assert!(GatewayError::Authorization("no".into()).is_authorization());
    }
}
