//! Shared-secret guard for the manual settlement trigger.
//!
//! Authentication proper is out of scope for this service; operators call
//! the recompute endpoint with a pre-shared bearer token. No token
//! configured means the guard is open (local development).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

/// Expected token, cloned into the route layer. `None` disables the check.
#[derive(Clone)]
pub struct AdminToken(pub Option<String>);

pub async fn admin_guard(
    State(AdminToken(expected)): State<AdminToken>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    match presented {
        Some(token) if token == expected => next.run(req).await,
        _ => {
            warn!(path = %req.uri().path(), "rejected manual trigger without valid admin token");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing or invalid admin token" })),
            )
                .into_response()
        }
    }
}
