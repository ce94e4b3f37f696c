use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use maplink_resolver::Resolution;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct ResolveRequest {
    #[serde(default)]
    query: Option<String>,
}

pub(super) async fn resolve_link(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(request_id = %req_id.0, error = %rejection.body_text(), "rejected request body");
        body_rejection_error(rejection)
    })?;

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("query required"))?;

    tracing::info!(request_id = %req_id.0, query, "resolving map link");

    match state.resolver.resolve(query).await {
        Ok(Resolution::Located(location)) => Ok((StatusCode::OK, Json(location))),
        Ok(Resolution::Unlocated { resolved_url }) => {
            Err(ApiError::coordinates_not_found(resolved_url))
        }
        Err(e) => {
            tracing::error!(request_id = %req_id.0, query, error = %e, "resolution failed");
            Err(ApiError::internal(e.to_string()))
        }
    }
}

/// Malformed JSON keeps the extractor's message. A missing content type or
/// a body without a string `query` is the same client error as an absent
/// query. Unreadable bodies keep their own status.
fn body_rejection_error(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonSyntaxError(e) => ApiError::bad_request(e.body_text()),
        JsonRejection::BytesRejection(e) => ApiError::new(e.status(), e.body_text()),
        _ => ApiError::bad_request("query required"),
    }
}
