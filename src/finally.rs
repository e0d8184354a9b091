//! Cleanup that runs on every exit from a scope.
//!
//! A [`Finally`] guard runs its cleanup when dropped, whether the scope ends
//! normally or a throw is unwinding through it. During unwinding the cleanup may
//! still raise, but only to catch clauses it installs itself; anything that would
//! escape the cleanup is a fatal violation.

use crate::context::Context;
use crate::dispatch::FINALLY_DURING_UNWIND;
use crate::error::Violation;
use crate::fallback;
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;

/// Scope guard returned by [`Context::finally`].
#[must_use = "the cleanup runs as soon as the guard is dropped"]
pub struct Finally<'c, F: FnOnce()> {
    ctx: &'c Context,
    cleanup: Option<F>,
}

impl Context {
    /// Run `cleanup` when the returned guard leaves scope.
    pub fn finally<F: FnOnce()>(&self, cleanup: F) -> Finally<'_, F> {
        Finally {
            ctx: self,
            cleanup: Some(cleanup),
        }
    }
}

impl<F: FnOnce()> Finally<'_, F> {
    /// Drop the cleanup without running it.
    pub fn dismiss(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for Finally<'_, F> {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        if !std::thread::panicking() {
            cleanup();
            return;
        }

        trace!(ctx = %self.ctx.name(), "Running cleanup during unwind");
        // Throws from the cleanup may only be caught by try blocks it opens itself.
        let _floor = CleanupFloor::raise(self.ctx);
        // Anything escaping the cleanup would start a second unwind.
        if panic::catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
            fallback::fatal(Violation::FinallyDuringUnwind, FINALLY_DURING_UNWIND)
        }
    }
}

/// Hides the catch frames outside a cleanup from throws raised inside it.
struct CleanupFloor<'c> {
    ctx: &'c Context,
    saved: Option<usize>,
}

impl<'c> CleanupFloor<'c> {
    fn raise(ctx: &'c Context) -> Self {
        let depth = ctx.catches.borrow().len();
        let saved = ctx.cleanup_floor.replace(Some(depth));
        Self { ctx, saved }
    }
}

impl Drop for CleanupFloor<'_> {
    fn drop(&mut self) {
        self.ctx.cleanup_floor.set(self.saved);
    }
}
