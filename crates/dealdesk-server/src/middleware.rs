use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dealdesk_core::{AppConfig, Environment};
use dealdesk_store::UserId;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identity used when auth is disabled and no bearer token was sent.
const LOCAL_DEVELOPMENT_USER: &str = "local-development";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The user a request acts on behalf of, stored as a request extension.
///
/// Derived from the bearer token, which doubles as the custom sign-in token.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

/// Accepted bearer tokens. When disabled, any token (or none) is let through.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth from the configured bearer tokens. Each accepted token
    /// is also the caller's identity token.
    ///
    /// Without tokens, auth is disabled in development and startup fails in
    /// any other environment.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::from_keys(
            config.api_keys.iter().cloned(),
            matches!(config.env, Environment::Development),
        )
    }

    pub fn from_keys<I>(keys: I, is_development: bool) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let keys: HashSet<String> = keys
            .into_iter()
            .filter(|key| !key.trim().is_empty())
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!("no API keys configured; bearer auth disabled in development");
                return Ok(Self::disabled());
            }
            anyhow::bail!("DEALDESK_API_KEYS must list at least one bearer token outside development");
        }

        tracing::info!(keys = keys.len(), "bearer auth enabled");
        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(HashSet::new()),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Sliding fixed-window limiter for simple API protection.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn middleware_error(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled and resolving the
/// [`Caller`] identity.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(req.headers().get(AUTHORIZATION)).map(str::to_owned);

    let caller = match token {
        Some(token) if !auth.enabled || auth.allows(&token) => {
            match UserId::from_custom_token(&token) {
                Ok(user) => user,
                Err(_) => {
                    return middleware_error(
                        StatusCode::UNAUTHORIZED,
                        "unauthorized",
                        "missing or invalid bearer token",
                    )
                }
            }
        }
        None if !auth.enabled => UserId::from_raw(LOCAL_DEVELOPMENT_USER),
        _ => {
            return middleware_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid bearer token",
            )
        }
    };

    req.extensions_mut().insert(Caller(caller));
    next.run(req).await
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        return middleware_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
