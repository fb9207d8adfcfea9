use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use dealdesk_core::{Contact, NewContact};
use serde::{Deserialize, Serialize};

use crate::middleware::{Caller, RequestId};

use super::{map_store_error, stream, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CreateContactRequest {
    pub seller_name: String,
    pub seller_phone: Option<String>,
    pub seller_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreatedData {
    id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedData {
    deleted: String,
}

/// Blank optional fields are stored as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(super) async fn list_contacts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<Contact>>>, ApiError> {
    let contacts = state
        .gateway(&caller)
        .list_contacts()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(req_id.0, contacts))
}

pub(super) async fn create_contact(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateContactRequest>,
) -> Result<Json<ApiResponse<CreatedData>>, ApiError> {
    let contact = NewContact {
        seller_name: body.seller_name,
        seller_phone: non_blank(body.seller_phone),
        seller_email: non_blank(body.seller_email),
    };
    let id = state
        .gateway(&caller)
        .create_contact(contact)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(req_id.0, CreatedData { id }))
}

pub(super) async fn stream_contacts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .gateway(&caller)
        .subscribe_contacts()
        .await
        .map_err(|e| map_store_error(req_id.0, &e))?;
    Ok(stream::snapshot_events(subscription, state.shutdown_listener()))
}

pub(super) async fn delete_contact(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedData>>, ApiError> {
    state
        .gateway(&caller)
        .delete_contact(&id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::json(req_id.0, DeletedData { deleted: id }))
}
