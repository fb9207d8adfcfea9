//! HTTP client for the generative-AI `generateContent` endpoint.
//!
//! Wraps `reqwest` with status classification, the retry state machine from
//! [`crate::retry`], and extraction of the first text part from the response
//! envelope.

use std::sync::Arc;
use std::time::Duration;

use dealdesk_core::{AiSettings, Analysis, ComparableSale, Coordinates, GeneratedLead};
use reqwest::{Client, StatusCode, Url};

use crate::error::AiError;
use crate::parse;
use crate::prompts::{self, ImageAttachment};
use crate::retry::{run_with_retry, Clock, RetryPolicy, TokioClock};
use crate::types::{GenerateRequest, GenerateResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";

/// Longest slice of an error body kept in [`AiError::Rejected`].
const ERROR_BODY_LIMIT: usize = 512;

/// Client for a `generateContent`-style endpoint.
///
/// Use [`GenerativeClient::from_settings`] in production or
/// [`GenerativeClient::with_base_url`] to point at a mock server. The retry
/// policy and clock are injectable for deterministic tests.
#[derive(Clone)]
pub struct GenerativeClient {
    client: Client,
    api_key: String,
    endpoint: Url,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GenerativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[redacted]")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl GenerativeClient {
    /// Creates a client against the public endpoint with the default model.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, AiError> {
        Self::with_base_url(api_key, DEFAULT_MODEL, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client from application settings, including its retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] or [`AiError::Config`] as [`Self::with_base_url`].
    pub fn from_settings(settings: &AiSettings) -> Result<Self, AiError> {
        let client = Self::with_base_url(
            &settings.api_key,
            &settings.model,
            settings.timeout_secs,
            &settings.base_url,
        )?;
        Ok(client.with_retry_policy(RetryPolicy::new(
            settings.max_attempts,
            Duration::from_millis(settings.backoff_base_ms),
        )))
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed, or [`AiError::Config`] if `base_url` or `model` do not
    /// form a valid URL.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("dealdesk/0.1 (lead-analysis)")
            .build()?;

        let endpoint = Self::build_endpoint(base_url, model)?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            endpoint,
            policy: RetryPolicy::default(),
            clock: Arc::new(TokioClock),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Issues one logical request and returns the model's text.
    ///
    /// # Errors
    ///
    /// - [`AiError::ExhaustedRetries`] when every attempt hit a rate limit or
    ///   transient failure.
    /// - [`AiError::Rejected`] for a non-429 4xx response (not retried).
    /// - [`AiError::MalformedResponse`] when the envelope has no candidate
    ///   text (not retried).
    pub async fn call(&self, request: &GenerateRequest) -> Result<String, AiError> {
        let url = self.request_url();
        run_with_retry(self.policy, self.clock.as_ref(), |attempt| {
            let url = url.clone();
            async move {
                tracing::debug!(attempt, "sending generation request");
                self.attempt(url, request).await
            }
        })
        .await
    }

    /// One HTTP round trip: classify the status, decode the envelope, and
    /// extract the text.
    async fn attempt(&self, url: Url, request: &GenerateRequest) -> Result<String, AiError> {
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AiError::RateLimited);
        }

        if status.is_server_error() {
            return Err(AiError::Transient(format!("endpoint returned {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Rejected {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        let body = response.text().await?;
        let envelope: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::Transient(format!("response body is not JSON: {e}")))?;

        extract_text(envelope)
    }

    /// Builds `{base}/v1beta/models/{model}:generateContent`.
    fn build_endpoint(base_url: &str, model: &str) -> Result<Url, AiError> {
        if model.trim().is_empty() || model.contains('/') {
            return Err(AiError::Config(format!("invalid model name '{model}'")));
        }
        let normalised = format!(
            "{}/v1beta/models/{model}:generateContent",
            base_url.trim_end_matches('/')
        );
        Url::parse(&normalised)
            .map_err(|e| AiError::Config(format!("invalid base URL '{base_url}': {e}")))
    }

    /// Runs the lead-analysis prompt and parses the structured result.
    ///
    /// # Errors
    ///
    /// Any [`AiError`] from [`Self::call`] or the analysis parser.
    pub async fn analyze_lead(
        &self,
        details: &str,
        coordinates: Option<Coordinates>,
        image: Option<&ImageAttachment>,
    ) -> Result<Analysis, AiError> {
        let text = self
            .call(&prompts::lead_analysis(details, coordinates, image))
            .await?;
        parse::parse_analysis(&text)
    }

    /// # Errors
    ///
    /// Any [`AiError`] from [`Self::call`], or `MalformedResponse` on empty text.
    pub async fn draft_offer_letter(
        &self,
        details: &str,
        offer_range: &str,
    ) -> Result<String, AiError> {
        let text = self
            .call(&prompts::offer_letter(details, offer_range))
            .await?;
        parse::parse_text(&text)
    }

    /// # Errors
    ///
    /// Any [`AiError`] from [`Self::call`] or the batch parser.
    pub async fn generate_leads(&self, count: usize) -> Result<Vec<GeneratedLead>, AiError> {
        let text = self.call(&prompts::batch_leads(count)).await?;
        let leads = parse::parse_generated_leads(&text)?;
        if leads.len() != count {
            tracing::warn!(
                requested = count,
                received = leads.len(),
                "model returned a different number of leads than requested"
            );
        }
        Ok(leads)
    }

    /// # Errors
    ///
    /// Any [`AiError`] from [`Self::call`], or `MalformedResponse` on empty text.
    pub async fn analyze_market(&self, sales: &[ComparableSale]) -> Result<String, AiError> {
        let text = self.call(&prompts::market_trends(sales)).await?;
        parse::parse_text(&text)
    }

    /// Endpoint URL with the `key` query parameter appended, even when empty.
    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }
}

/// Pulls the first text part out of the first candidate.
///
/// # Errors
///
/// Returns [`AiError::MalformedResponse`] if there is no candidate, the
/// candidate has no content, or none of its parts carries text.
pub fn extract_text(envelope: GenerateResponse) -> Result<String, AiError> {
    let candidate = envelope
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AiError::MalformedResponse("response has no candidates".to_owned()))?;

    let finish_reason = candidate.finish_reason;
    let content = candidate.content.ok_or_else(|| {
        AiError::MalformedResponse(format!(
            "first candidate has no content (finish reason: {})",
            finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;

    content
        .parts
        .into_iter()
        .find_map(|part| part.text)
        .ok_or_else(|| AiError::MalformedResponse("first candidate has no text part".to_owned()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
