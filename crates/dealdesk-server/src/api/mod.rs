mod analysis;
mod calculator;
mod contacts;
mod dashboard;
mod generations;
mod leads;
mod stream;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use dealdesk_ai::{AiError, GenerativeClient, RequestGuard, Ticket};
use dealdesk_store::{DocumentStore, Gateway, StoreError, UserId};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{watch, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, Caller, RateLimitState,
    RequestId,
};

/// AI-backed actions that are single-flight per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum GenerationKind {
    Analysis,
    OfferLetter,
    MarketAnalysis,
    BatchGeneration,
}

impl GenerationKind {
    /// Path segment naming the action in `/api/v1/generations/{kind}`.
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "analysis" => Some(Self::Analysis),
            "offer-letter" => Some(Self::OfferLetter),
            "market-analysis" => Some(Self::MarketAnalysis),
            "lead-generation" => Some(Self::BatchGeneration),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::OfferLetter => "offer letter",
            Self::MarketAnalysis => "market analysis",
            Self::BatchGeneration => "lead generation",
        }
    }
}

/// One [`RequestGuard`] per (user, action) with a request in flight.
///
/// Guards are kept only while busy; idle entries are pruned whenever a new
/// request claims a slot.
#[derive(Debug, Default)]
pub struct GuardRegistry {
    guards: Mutex<HashMap<(UserId, GenerationKind), RequestGuard>>,
}

impl GuardRegistry {
    pub(super) async fn begin(
        &self,
        user: &UserId,
        kind: GenerationKind,
    ) -> Result<Ticket, AiError> {
        let mut guards = self.guards.lock().await;
        guards.retain(|_, guard| guard.is_busy());
        guards
            .entry((user.clone(), kind))
            .or_default()
            .begin(kind.as_str())
    }

    /// Abandons the caller's in-flight request of `kind`. Returns whether
    /// there was one.
    pub(super) async fn supersede(&self, user: &UserId, kind: GenerationKind) -> bool {
        let guards = self.guards.lock().await;
        match guards.get(&(user.clone(), kind)) {
            Some(guard) if guard.is_busy() => {
                guard.supersede();
                tracing::info!(user_id = %user, action = kind.as_str(), "generation superseded");
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.guards.lock().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub ai: GenerativeClient,
    pub app_id: Arc<str>,
    /// Present when running against Postgres; used by the health check.
    pub db: Option<PgPool>,
    pub guards: Arc<GuardRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ai: GenerativeClient,
        app_id: &str,
        db: Option<PgPool>,
    ) -> Self {
        Self {
            store,
            ai,
            app_id: Arc::from(app_id),
            db,
            guards: Arc::new(GuardRegistry::default()),
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Ends every open snapshot stream so graceful shutdown can complete.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(super) fn shutdown_listener(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(super) fn gateway(&self, caller: &Caller) -> Gateway {
        Gateway::for_user(Arc::clone(&self.store), &self.app_id, caller.0.clone())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    store: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn json(request_id: String, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "malformed_response" => StatusCode::BAD_GATEWAY,
            "upstream_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotAuthenticated => {
            ApiError::new(request_id, "unauthorized", "no user identity for this request")
        }
        StoreError::NotFound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        StoreError::Validation(message) => {
            ApiError::new(request_id, "validation_error", message.clone())
        }
        _ => {
            tracing::error!(error = %error, "document store operation failed");
            ApiError::new(request_id, "internal_error", "document store operation failed")
        }
    }
}

fn is_rate_limited(error: &AiError) -> bool {
    match error {
        AiError::RateLimited => true,
        AiError::ExhaustedRetries { last, .. } => is_rate_limited(last),
        _ => false,
    }
}

pub(super) fn map_ai_error(request_id: String, error: &AiError) -> ApiError {
    match error {
        AiError::InFlight(action) => ApiError::new(
            request_id,
            "conflict",
            format!("a {action} request is already in progress"),
        ),
        AiError::MalformedResponse(_) => {
            tracing::warn!(error = %error, "model returned an unusable response");
            ApiError::new(
                request_id,
                "malformed_response",
                "the model returned a response that could not be understood",
            )
        }
        _ if is_rate_limited(error) => ApiError::new(
            request_id,
            "rate_limited",
            "the model is rate limiting requests; try again shortly",
        ),
        AiError::Config(_) => {
            tracing::error!(error = %error, "generative client misconfigured");
            ApiError::new(request_id, "internal_error", "generative client misconfigured")
        }
        _ => {
            tracing::error!(error = %error, "generation request failed");
            ApiError::new(
                request_id,
                "upstream_unavailable",
                "the generation service is unavailable",
            )
        }
    }
}

/// Runs `action` while holding the caller's single-flight slot for `kind`.
pub(super) async fn single_flight<T, F, Fut>(
    state: &AppState,
    caller: &Caller,
    request_id: &str,
    kind: GenerationKind,
    action: F,
) -> Result<T, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, AiError>>,
{
    let ticket = state
        .guards
        .begin(&caller.0, kind)
        .await
        .map_err(|e| map_ai_error(request_id.to_owned(), &e))?;

    let result = action().await;

    match ticket.accept(result) {
        Some(result) => result.map_err(|e| map_ai_error(request_id.to_owned(), &e)),
        None => Err(ApiError::new(
            request_id,
            "conflict",
            format!("the {} request was superseded", kind.as_str()),
        )),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/analysis", post(analysis::analyze))
        .route("/api/v1/offer-letter", post(analysis::offer_letter))
        .route("/api/v1/market-analysis", post(analysis::market_analysis))
        .route("/api/v1/leads", get(leads::list_leads))
        .route("/api/v1/leads/stream", get(leads::stream_leads))
        .route("/api/v1/leads/generate", post(leads::generate_leads))
        .route("/api/v1/leads/import-county", post(leads::import_county))
        .route("/api/v1/leads/{id}/status", patch(leads::update_status))
        .route("/api/v1/leads/{id}", delete(leads::delete_lead))
        .route(
            "/api/v1/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/api/v1/contacts/stream", get(contacts::stream_contacts))
        .route("/api/v1/contacts/{id}", delete(contacts::delete_contact))
        .route(
            "/api/v1/generations/{kind}",
            delete(generations::cancel_generation),
        )
        .route("/api/v1/dashboard", get(dashboard::dashboard))
        .route("/api/v1/calculator/roi", post(calculator::roi))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(pool) = state.db.as_ref() else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    store: "memory",
                    database: "not_configured",
                },
                meta,
            }),
        );
    };

    match dealdesk_store::ping(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    store: "postgres",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        store: "postgres",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
