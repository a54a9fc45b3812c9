//! Pool error surface.

use std::sync::Arc;

/// Result alias for pool operations.
pub type PoolResult<T, E> = Result<T, PoolError<E>>;

/// Terminal and submission errors surfaced by a pool.
///
/// `Work` and `Panicked` carry the first failure observed; once either is
/// recorded the pool is failed and every outstanding and future await
/// resolves to the same error.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PoolError<E> {
    #[error("pool was cancelled")]
    Cancelled,

    #[error("intake is closed, no further work accepted")]
    IntakeClosed,

    #[error("work item failed: {0}")]
    Work(Arc<E>),

    #[error("work item panicked: {0}")]
    Panicked(String),
}

impl<E> PoolError<E> {
    /// Short tag for structured log fields, independent of `E: Display`.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::IntakeClosed => "intake_closed",
            Self::Work(_) => "work_error",
            Self::Panicked(_) => "panic",
        }
    }
}

// Manual impl: the error is broadcast to every consumer, so it must be
// cloneable without requiring `E: Clone` (the work error is shared via Arc).
impl<E> Clone for PoolError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            Self::IntakeClosed => Self::IntakeClosed,
            Self::Work(e) => Self::Work(Arc::clone(e)),
            Self::Panicked(msg) => Self::Panicked(msg.clone()),
        }
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<unknown panic payload>".to_string()
    }
}
