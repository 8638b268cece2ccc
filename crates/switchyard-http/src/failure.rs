//! Failures that map onto HTTP error responses

use http::{Method, StatusCode};
use switchyard_router::RouteError;
use thiserror::Error;

/// A failure raised while routing or handling a request.
///
/// The exception handler answers with [`HttpFailure::status`]; any other
/// error reaching it is answered with a 500.
#[derive(Debug, Error)]
pub enum HttpFailure {
    #[error("The resource not found: {path}")]
    NotFound { path: String },

    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    #[error("Request Decoded Failure: {reason}")]
    Malformed { reason: String },

    #[error("Unsupported method: {method}")]
    UnsupportedMethod { method: Method },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpFailure::NotFound { .. } => StatusCode::NOT_FOUND,
            HttpFailure::BadRequest { .. }
            | HttpFailure::Malformed { .. }
            | HttpFailure::UnsupportedMethod { .. } => StatusCode::BAD_REQUEST,
            HttpFailure::Forbidden { .. } => StatusCode::FORBIDDEN,
            HttpFailure::Rejected { status, .. } => *status,
            HttpFailure::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The request stream can't be trusted past this failure
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, HttpFailure::Malformed { .. })
    }
}

impl From<RouteError> for HttpFailure {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound { path } => HttpFailure::NotFound { path },
            RouteError::UnsupportedMethod(method) => HttpFailure::UnsupportedMethod { method },
            other => HttpFailure::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = HttpFailure::NotFound {
            path: "/missing".to_string(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "The resource not found: /missing");
        assert!(!not_found.is_connection_fatal());

        let malformed = HttpFailure::Malformed {
            reason: "invalid header".to_string(),
        };
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert!(malformed.is_connection_fatal());

        assert_eq!(
            HttpFailure::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_route_error() {
        let failure: HttpFailure = RouteError::UnsupportedMethod(Method::TRACE).into();
        assert!(matches!(
            failure,
            HttpFailure::UnsupportedMethod { ref method } if *method == Method::TRACE
        ));
        assert_eq!(failure.status(), StatusCode::BAD_REQUEST);

        let failure: HttpFailure = RouteError::NotFound {
            path: "/x".to_string(),
        }
        .into();
        assert_eq!(failure.status(), StatusCode::NOT_FOUND);
    }
}
