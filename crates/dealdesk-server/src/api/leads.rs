use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use dealdesk_ai::BATCH_LEAD_COUNT;
use dealdesk_core::{CountyRecord, Lead, LeadStatus, NewLead};
use dealdesk_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::middleware::{Caller, RequestId};

use super::{
    map_store_error, single_flight, stream, ApiError, ApiResponse, AppState, GenerationKind,
};

const MAX_GENERATED_LEADS: usize = 20;

#[derive(Debug, Deserialize)]
pub(super) struct LeadQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct GeneratedData {
    requested: usize,
    lead_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImportCountyRequest {
    pub records: Vec<CountyRecord>,
}

#[derive(Debug, Serialize)]
pub(super) struct ImportData {
    imported: usize,
    lead_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusUpdate {
    pub status: LeadStatus,
}

#[derive(Debug, Serialize)]
pub(super) struct StatusData {
    id: String,
    status: LeadStatus,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedData {
    deleted: String,
}

pub(super) async fn list_leads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<ApiResponse<Vec<Lead>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let mut leads = state
        .gateway(&caller)
        .list_leads()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
    if let Some(status) = status {
        leads.retain(|lead| lead.effective_status() == status);
    }

    Ok(ApiResponse::json(req_id.0, leads))
}

pub(super) async fn stream_leads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .gateway(&caller)
        .subscribe_leads()
        .await
        .map_err(|e| map_store_error(req_id.0, &e))?;
    Ok(stream::snapshot_events(subscription, state.shutdown_listener()))
}

/// Generates a batch of synthetic leads and saves every one of them. The
/// batch is checked in full before the first write.
pub(super) async fn generate_leads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<GenerateQuery>,
) -> Result<Json<ApiResponse<GeneratedData>>, ApiError> {
    let count = query
        .count
        .unwrap_or(BATCH_LEAD_COUNT)
        .clamp(1, MAX_GENERATED_LEADS);

    let generated = single_flight(
        &state,
        &caller,
        &req_id.0,
        GenerationKind::BatchGeneration,
        || state.ai.generate_leads(count),
    )
    .await?;

    let new_leads = generated
        .iter()
        .map(NewLead::from_generated)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_store_error(req_id.0.clone(), &StoreError::from(e)))?;

    let gateway = state.gateway(&caller);
    let mut lead_ids = Vec::with_capacity(new_leads.len());
    for new_lead in new_leads {
        let id = gateway
            .create_lead(new_lead)
            .await
            .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
        lead_ids.push(id);
    }

    tracing::info!(user_id = %caller.0, requested = count, saved = lead_ids.len(), "generated leads saved");
    Ok(ApiResponse::json(
        req_id.0,
        GeneratedData {
            requested: count,
            lead_ids,
        },
    ))
}

/// Imports county records as leads. The whole batch is validated before
/// anything is written.
pub(super) async fn import_county(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ImportCountyRequest>,
) -> Result<Json<ApiResponse<ImportData>>, ApiError> {
    if body.records.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "records must not be empty",
        ));
    }
    if let Some(index) = body
        .records
        .iter()
        .position(|r| r.address.trim().is_empty())
    {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("records[{index}].address is required"),
        ));
    }

    let gateway = state.gateway(&caller);
    let mut lead_ids = Vec::with_capacity(body.records.len());
    for record in body.records {
        let id = gateway
            .create_lead(NewLead::from_county(record))
            .await
            .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
        lead_ids.push(id);
    }

    Ok(ApiResponse::json(
        req_id.0,
        ImportData {
            imported: lead_ids.len(),
            lead_ids,
        },
    ))
}

pub(super) async fn update_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<ApiResponse<StatusData>>, ApiError> {
    state
        .gateway(&caller)
        .update_lead_status(&id, body.status)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(
        req_id.0,
        StatusData {
            id,
            status: body.status,
        },
    ))
}

pub(super) async fn delete_lead(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedData>>, ApiError> {
    state
        .gateway(&caller)
        .delete_lead(&id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(req_id.0, DeletedData { deleted: id }))
}
