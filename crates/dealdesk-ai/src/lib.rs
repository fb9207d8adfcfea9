//! Generative-AI orchestration for dealdesk.
//!
//! [`GenerativeClient`] issues one logical request against a
//! `generateContent`-style endpoint, retrying rate limits and transient
//! failures with exponential back-off. [`prompts`] builds the request
//! payloads for each use case and [`parse`] turns the model's text back into
//! typed results.

pub mod client;
pub mod error;
pub mod guard;
pub mod parse;
pub mod prompts;
pub mod retry;
pub mod types;

pub use client::GenerativeClient;
pub use error::AiError;
pub use guard::{RequestGuard, Ticket};
pub use prompts::{ImageAttachment, BATCH_LEAD_COUNT};
pub use retry::{Clock, RetryPolicy, RetryState, TokioClock};
pub use types::{GenerateRequest, GenerateResponse};
