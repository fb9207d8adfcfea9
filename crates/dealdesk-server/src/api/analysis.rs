use axum::{extract::State, Extension, Json};
use dealdesk_ai::ImageAttachment;
use dealdesk_core::{Analysis, ComparableSale, Coordinates, NewLead};
use dealdesk_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::middleware::{Caller, RequestId};

use super::{
    map_ai_error, map_store_error, single_flight, ApiError, ApiResponse, AppState, GenerationKind,
};

#[derive(Debug, Deserialize)]
pub(super) struct ImagePayload {
    pub mime_type: String,
    /// Base64, optionally as a `data:` URL.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnalysisRequest {
    pub property_details: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image: Option<ImagePayload>,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct AnalysisData {
    analysis: Analysis,
    lead_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OfferLetterRequest {
    pub property_details: String,
    pub offer_range: String,
}

#[derive(Debug, Serialize)]
pub(super) struct OfferLetterData {
    letter: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct MarketAnalysisRequest {
    pub sales: Vec<ComparableSale>,
}

#[derive(Debug, Serialize)]
pub(super) struct MarketAnalysisData {
    commentary: String,
    sales_considered: usize,
}

fn require_text(request_id: &str, field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            request_id,
            "validation_error",
            format!("{field} is required"),
        ));
    }
    Ok(())
}

/// Both coordinates or neither.
fn coordinates(
    request_id: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coordinates>, ApiError> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(Some(Coordinates {
            latitude,
            longitude,
        })),
        (None, None) => Ok(None),
        _ => Err(ApiError::new(
            request_id,
            "validation_error",
            "latitude and longitude must be provided together",
        )),
    }
}

pub(super) async fn analyze(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<AnalysisRequest>,
) -> Result<Json<ApiResponse<AnalysisData>>, ApiError> {
    require_text(&req_id.0, "property_details", &body.property_details)?;
    let coords = coordinates(&req_id.0, body.latitude, body.longitude)?;
    let image = body
        .image
        .map(|img| ImageAttachment::from_base64(&img.mime_type, &img.data))
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let analysis = single_flight(&state, &caller, &req_id.0, GenerationKind::Analysis, || {
        state
            .ai
            .analyze_lead(&body.property_details, coords, image.as_ref())
    })
    .await?;

    let lead_id = if body.save {
        let lead = NewLead::from_analysis(body.property_details.clone(), coords, &analysis)
            .map_err(|e| map_store_error(req_id.0.clone(), &StoreError::from(e)))?;
        let id = state
            .gateway(&caller)
            .create_lead(lead)
            .await
            .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
        Some(id)
    } else {
        None
    };

    Ok(ApiResponse::json(req_id.0, AnalysisData { analysis, lead_id }))
}

pub(super) async fn offer_letter(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<OfferLetterRequest>,
) -> Result<Json<ApiResponse<OfferLetterData>>, ApiError> {
    require_text(&req_id.0, "property_details", &body.property_details)?;
    require_text(&req_id.0, "offer_range", &body.offer_range)?;

    let letter = single_flight(&state, &caller, &req_id.0, GenerationKind::OfferLetter, || {
        state
            .ai
            .draft_offer_letter(&body.property_details, &body.offer_range)
    })
    .await?;

    Ok(ApiResponse::json(req_id.0, OfferLetterData { letter }))
}

pub(super) async fn market_analysis(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<MarketAnalysisRequest>,
) -> Result<Json<ApiResponse<MarketAnalysisData>>, ApiError> {
    if body.sales.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "at least one comparable sale is required",
        ));
    }

    let commentary = single_flight(
        &state,
        &caller,
        &req_id.0,
        GenerationKind::MarketAnalysis,
        || state.ai.analyze_market(&body.sales),
    )
    .await?;

    Ok(ApiResponse::json(
        req_id.0,
        MarketAnalysisData {
            commentary,
            sales_considered: body.sales.len(),
        },
    ))
}
