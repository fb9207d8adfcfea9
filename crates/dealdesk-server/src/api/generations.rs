use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;

use crate::middleware::{Caller, RequestId};

use super::{ApiError, ApiResponse, AppState, GenerationKind};

#[derive(Debug, Serialize)]
pub(super) struct CancelData {
    kind: String,
    cancelled: bool,
}

/// Supersedes the caller's in-flight generation of `kind`. The pending
/// request answers `409 conflict` once its late result arrives, and the
/// slot is free for a new request immediately.
pub(super) async fn cancel_generation(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Path(kind): Path<String>,
) -> Result<Json<ApiResponse<CancelData>>, ApiError> {
    let Some(generation) = GenerationKind::from_segment(&kind) else {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!(
                "unknown generation kind '{kind}'; expected analysis, offer-letter, market-analysis or lead-generation"
            ),
        ));
    };

    let cancelled = state.guards.supersede(&caller.0, generation).await;
    Ok(ApiResponse::json(req_id.0, CancelData { kind, cancelled }))
}
