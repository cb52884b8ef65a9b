//! Maps `peerdev_common::{Kind, Error}` onto HTTP status codes and
//! collaboration WS `error` frame kinds in one place
//! (`spec.md` §7, `SPEC_FULL.md` §4.8).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use peerdev_common::{Error, Kind};

/// Default HTTP status for each error kind. Individual routes override
/// this where `spec.md` §6's HTTP table calls for a different code on
/// the same kind — e.g. `/match/cancel`'s 404 vs `/match/join`'s 409,
/// both `Kind::Conflict`.
pub fn status_for_kind(kind: Kind) -> StatusCode {
    match kind {
        Kind::Transport => StatusCode::SERVICE_UNAVAILABLE,
        Kind::Validation => StatusCode::BAD_REQUEST,
        Kind::Conflict => StatusCode::CONFLICT,
        Kind::Capability => StatusCode::UNPROCESSABLE_ENTITY,
        Kind::Authz => StatusCode::UNAUTHORIZED,
        Kind::Ot => StatusCode::BAD_REQUEST,
        Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_str(kind: Kind) -> &'static str {
    match kind {
        Kind::Transport => "transport",
        Kind::Validation => "validation",
        Kind::Conflict => "conflict",
        Kind::Capability => "capability",
        Kind::Authz => "authz",
        Kind::Ot => "ot",
        Kind::Internal => "internal",
    }
}

/// The kind a collaboration WS `error` frame reports for an error raised
/// outside `Room`'s own OT handling (which already picks its own
/// `peerdev_protocol::error_codes` constant).
pub fn ws_error_kind(kind: Kind) -> &'static str {
    match kind {
        Kind::Ot => peerdev_protocol::error_codes::OT_ERROR,
        other => kind_str(other),
    }
}

/// An HTTP error response wrapping a [`peerdev_common::Error`], with an
/// optional status override for routes whose success table disagrees
/// with the kind's default mapping.
pub struct ApiError {
    inner: Error,
    status: StatusCode,
}

impl ApiError {
    pub fn with_status(inner: Error, status: StatusCode) -> Self {
        Self { inner, status }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(inner: Error) -> Self {
        let status = status_for_kind(inner.kind);
        Self { inner, status }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": kind_str(self.inner.kind),
            "message": self.inner.message(),
        }));
        (self.status, body).into_response()
    }
}
