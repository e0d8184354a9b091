//! Error types for the exception handling mechanism.
//!
//! Recoverable misuse surfaces as [`EhmError`]. Violations that can only end the
//! process are named by [`Violation`] and routed through [`crate::fallback`].

use crate::inbox::MessageId;
use serde::Serialize;
use thiserror::Error;

/// Engine errors that the caller can observe and handle.
#[derive(Debug, Error)]
pub enum EhmError {
    #[error("No active exception to rethrow")]
    NoActiveException,

    #[error("No active resumption to reresume")]
    NoActiveResumption,

    #[error("Async message {0} was already delivered or withdrawn")]
    AlreadyConsumed(MessageId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<config::ConfigError> for EhmError {
    fn from(err: config::ConfigError) -> Self {
        EhmError::Config(err.to_string())
    }
}

/// Conditions that terminate the process unless a replaced fallback handler intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// A thrown event found no matching catch clause in its context.
    UnmatchedThrow,
    /// A resumed event found no handler and its default action did not handle it.
    UnmatchedResume,
    /// A finally cleanup raised while a throw was unwinding through its scope.
    FinallyDuringUnwind,
    /// A termination or unexpected handler returned instead of ending the context.
    FallbackReturned,
    /// A mask or handler scope was closed while a scope opened after it was still live.
    ScopeOrder,
}

impl Violation {
    pub fn as_str(self) -> &'static str {
        match self {
            Violation::UnmatchedThrow => "unmatched_throw",
            Violation::UnmatchedResume => "unmatched_resume",
            Violation::FinallyDuringUnwind => "finally_during_unwind",
            Violation::FallbackReturned => "fallback_returned",
            Violation::ScopeOrder => "scope_order",
        }
    }
}
