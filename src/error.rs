//! Error taxonomy for the lifecycle core and JSON error responses for the front door

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Errors surfaced by the lifecycle core to its callers.
///
/// Reconcile-time failures are logged and retried on the next tick rather than
/// surfaced; only admission-path failures reach a caller.
#[derive(Debug)]
pub enum CoreError {
    /// No lazy-managed container resolves to the requested hostname
    NotFound,
    /// A declared dependency has no matching provider container
    ProviderNotFound(String),
    /// A container-host call failed or timed out
    HostUnavailable(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NotFound => write!(f, "no lazy-managed container matches the requested host"),
            CoreError::ProviderNotFound(dep) => {
                write!(f, "no container provides dependency '{}'", dep)
            }
            CoreError::HostUnavailable(reason) => {
                write!(f, "container host unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// Error codes for front-door errors
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateErrorCode {
    /// Missing Host header in request
    MissingHostHeader,
    /// No lazy-managed container for this hostname
    UnknownHost,
    /// The lifecycle controller failed to handle the request
    ControllerError,
}

impl GateErrorCode {
    /// Get the default HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateErrorCode::MissingHostHeader => StatusCode::BAD_REQUEST,
            GateErrorCode::UnknownHost => StatusCode::NOT_FOUND,
            GateErrorCode::ControllerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code as a string for the X-Gate-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            GateErrorCode::MissingHostHeader => "MISSING_HOST_HEADER",
            GateErrorCode::UnknownHost => "UNKNOWN_HOST",
            GateErrorCode::ControllerError => "CONTROLLER_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// The error code
    pub code: GateErrorCode,
    /// Human-readable error message
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: GateErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code.as_header_value(),
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response with an X-Gate-Error header
pub fn json_error_response(
    code: GateErrorCode,
    message: impl Into<String>,
) -> Response<Full<Bytes>> {
    let error = ErrorResponse::new(code, message);
    let status = code.status_code();
    let body = error.to_json();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Gate-Error", code.as_header_value())
        .body(Full::new(Bytes::from(body)))
        .expect("valid response with StatusCode enum and static headers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_display() {
        assert_eq!(
            CoreError::ProviderNotFound("db".to_string()).to_string(),
            "no container provides dependency 'db'"
        );
        assert!(CoreError::HostUnavailable("timed out".to_string())
            .to_string()
            .contains("timed out"));
    }

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(
            GateErrorCode::MissingHostHeader.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GateErrorCode::UnknownHost.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GateErrorCode::ControllerError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_json() {
        let error = ErrorResponse::new(GateErrorCode::UnknownHost, "no container for app.example");
        let json = error.to_json();

        assert!(json.contains("\"code\":\"UNKNOWN_HOST\""));
        assert!(json.contains("\"message\":\"no container for app.example\""));
        assert!(json.contains("\"status\":404"));
    }

    #[test]
    fn test_json_error_response() {
        let response = json_error_response(GateErrorCode::UnknownHost, "nothing here");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get("X-Gate-Error").unwrap(), "UNKNOWN_HOST");
    }
}
