//! Error types for the registration API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Rejection of a registration request. Nothing is applied when one is
/// returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// The endpoint only accepts POST.
    #[error("{0} method not supported")]
    MethodNotSupported(String),

    /// Body is not a JSON array of registrations.
    #[error("unable to parse request: {0}")]
    Parse(String),

    /// Entry without a name (1-based index).
    #[error("missing host address on index {0} of input")]
    MissingName(usize),

    /// Entry without an address (1-based index).
    #[error("missing IP address on index {0} of input")]
    MissingAddress(usize),

    /// Entry whose address does not parse (1-based index).
    #[error("invalid IP address {1:?} on index {0} of input")]
    InvalidAddress(usize, String),
}

impl RegistrationError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            RegistrationError::MissingName(2).to_string(),
            "missing host address on index 2 of input"
        );
        assert_eq!(
            RegistrationError::MissingAddress(1).to_string(),
            "missing IP address on index 1 of input"
        );
        assert_eq!(
            RegistrationError::MethodNotSupported("PUT".into()).to_string(),
            "PUT method not supported"
        );
    }

    #[test]
    fn test_status_code() {
        assert_eq!(
            RegistrationError::Parse("eof".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
