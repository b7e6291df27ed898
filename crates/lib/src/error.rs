//! Domain errors shared by the registries, the synchronizer, and the HTTP
//! layer.
//!
//! Every failing operation reports one of five kinds; the HTTP mapping
//! lives next to the enum so handlers can bubble store results straight
//! into a response with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field or selection is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// An id (agent, source, form, mapping) does not resolve to a record.
    #[error("{0}")]
    NotFound(String),

    /// The write would violate a uniqueness rule, e.g. a second mapping
    /// for a source that already has one.
    #[error("{0}")]
    Conflict(String),

    /// A call to an external system (Graph API, model backend) failed.
    /// The upstream message is kept verbatim so operators see the cause.
    #[error("{0}")]
    Upstream(String),

    /// No mapping matched and no default agent is configured.
    #[error("no agent mapped and no default agent configured")]
    NoAgentAvailable,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::NoAgentAvailable => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::validation("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(Error::upstream("x").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(Error::NoAgentAvailable.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn messages_pass_through() {
        let err = Error::conflict("form 123 is already mapped to an agent");
        assert_eq!(err.to_string(), "form 123 is already mapped to an agent");
    }
}
