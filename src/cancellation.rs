//! Cooperative cancellation (spec §5).
//!
//! Rust has no implicit exceptions, so the spec's "an exception unwinds through every cached
//! entry written in the speculative tracker" is realized here with `Result<T, Cancelled>`
//! propagated through `?` plus RAII guards (see [`crate::cache`]) whose `Drop` impls run exactly
//! the same whether the enclosing function returns `Ok` or bubbles a `Cancelled` out early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("type evaluation was cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checked at every recursive evaluation step (spec §5: "every recursive step performs a
    /// lightweight cancellation check").
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Binds `token` for the duration of `f`. After cancellation the evaluator is reusable (spec §5);
/// this function itself does nothing to reset the token — a fresh [`CancellationToken`] should be
/// installed for the next call if cancellation is one-shot in the embedding driver.
pub fn run_with_cancellation_token<T>(
    token: &CancellationToken,
    f: impl FnOnce(&CancellationToken) -> Result<T, Cancelled>,
) -> Result<T, Cancelled> {
    f(token)
}
