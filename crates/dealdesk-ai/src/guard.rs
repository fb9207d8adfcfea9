//! Single-flight guard for AI-backed actions.
//!
//! At most one generation may be outstanding per guard. Each request gets a
//! generation number; a result is delivered only while its generation is
//! still the active one, so a request that was superseded (the user navigated
//! away or cancelled) has its late result discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::AiError;

/// `0` means idle; any other value is the generation currently in flight.
const IDLE: u64 = 0;

#[derive(Debug, Default)]
struct GuardState {
    active: AtomicU64,
    next: AtomicU64,
}

/// Shared single-flight state. Cheap to clone; clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    state: Arc<GuardState>,
}

impl RequestGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for a new request.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::InFlight`] naming `action` while another request
    /// holds the slot.
    pub fn begin(&self, action: &str) -> Result<Ticket, AiError> {
        let generation = self.state.next.fetch_add(1, Ordering::Relaxed) + 1;
        match self.state.active.compare_exchange(
            IDLE,
            generation,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(Ticket {
                state: Arc::clone(&self.state),
                generation,
            }),
            Err(_) => {
                tracing::debug!(action, "rejected request while another is in flight");
                Err(AiError::InFlight(action.to_owned()))
            }
        }
    }

    /// Abandons whatever request is in flight. Its ticket will no longer
    /// accept a result and the slot is free immediately.
    pub fn supersede(&self) {
        self.state.active.store(IDLE, Ordering::Release);
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.active.load(Ordering::Acquire) != IDLE
    }
}

/// Proof of holding the guard slot. Dropping it frees the slot if it is
/// still current.
#[derive(Debug)]
pub struct Ticket {
    state: Arc<GuardState>,
    generation: u64,
}

impl Ticket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.state.active.load(Ordering::Acquire) == self.generation
    }

    /// Delivers `value` if this request was not superseded, releasing the slot.
    #[must_use]
    pub fn accept<T>(self, value: T) -> Option<T> {
        if self.is_current() {
            Some(value)
        } else {
            tracing::debug!(
                generation = self.generation,
                "discarding result of superseded request"
            );
            None
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let _ = self.state.active.compare_exchange(
            self.generation,
            IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
