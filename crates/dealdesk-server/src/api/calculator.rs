use axum::{Extension, Json};
use dealdesk_core::{compute_profit_and_roi, ProfitAndRoi};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse};

/// Deal figures. Decimals are accepted as JSON strings or numbers; the cost
/// fields default to zero.
#[derive(Debug, Deserialize)]
pub(super) struct RoiRequest {
    pub purchase_price: Decimal,
    pub sale_price: Decimal,
    #[serde(default)]
    pub closing_costs: Decimal,
    #[serde(default)]
    pub rehab_costs: Decimal,
    #[serde(default)]
    pub holding_costs: Decimal,
}

pub(super) async fn roi(
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RoiRequest>,
) -> Result<Json<ApiResponse<ProfitAndRoi>>, ApiError> {
    let result = compute_profit_and_roi(
        body.purchase_price,
        body.sale_price,
        body.closing_costs,
        body.rehab_costs,
        body.holding_costs,
    )
    .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;
    Ok(ApiResponse::json(req_id.0, result))
}
