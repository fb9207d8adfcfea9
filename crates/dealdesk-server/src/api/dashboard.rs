use axum::{extract::State, Extension, Json};
use dealdesk_core::{summarize_dashboard, DashboardSummary};

use crate::middleware::{Caller, RequestId};

use super::{map_store_error, ApiError, ApiResponse, AppState};

/// Totals, per-status counts and map pins for the caller's leads.
pub(super) async fn dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<DashboardSummary>>, ApiError> {
    let gateway = state.gateway(&caller);
    let (leads, contacts) = tokio::try_join!(gateway.list_leads(), gateway.list_contacts())
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(
        req_id.0,
        summarize_dashboard(&leads, &contacts),
    ))
}
