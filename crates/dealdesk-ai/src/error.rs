use thiserror::Error;

/// Errors returned by the generative-AI client and its parsers.
#[derive(Debug, Error)]
pub enum AiError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered HTTP 429.
    #[error("rate limited by the generative endpoint")]
    RateLimited,

    /// A 5xx response or a body that was not JSON at all.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A non-429 4xx response; the request itself is wrong and is not retried.
    #[error("request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Every attempt in the retry budget failed.
    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<AiError>,
    },

    /// The response envelope or the model's text did not match the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The same action is already running for this caller.
    #[error("a {0} request is already in flight")]
    InFlight(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl AiError {
    /// Returns `true` for failures worth another attempt after back-off.
    ///
    /// Rate limits and transient failures back off identically.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AiError::Http(_) | AiError::RateLimited | AiError::Transient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_transient_are_retriable() {
        assert!(AiError::RateLimited.is_retriable());
        assert!(AiError::Transient("503".to_owned()).is_retriable());
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!AiError::Rejected {
            status: 400,
            body: "bad payload".to_owned()
        }
        .is_retriable());
        assert!(!AiError::MalformedResponse("no candidates".to_owned()).is_retriable());
        assert!(!AiError::InFlight("analysis".to_owned()).is_retriable());
    }

    #[test]
    fn exhausted_retries_is_terminal() {
        let err = AiError::ExhaustedRetries {
            attempts: 5,
            last: Box::new(AiError::RateLimited),
        };
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("5 attempts"));
    }
}
