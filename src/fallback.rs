//! Termination and unexpected handlers.
//!
//! A thrown event with no matching catch clause goes to the termination handler;
//! a resumed event that neither a handler nor its type's default action dealt with
//! goes to the unexpected handler. Both default to printing a diagnostic and
//! aborting. Replacements may end the context any way they like (typically by
//! unwinding with their own payload) but must not return: a returning fallback is
//! itself reported as a fatal violation.

use crate::error::Violation;
use crate::event::{Event, RaiseKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// What a fallback handler is told about the event that escaped.
#[derive(Debug, Clone, Serialize)]
pub struct Uncaught {
    pub violation: Violation,
    pub context: String,
    pub event_type: &'static str,
    pub message: String,
    pub source: String,
    pub raise_kind: Option<RaiseKind>,
}

impl Uncaught {
    pub(crate) fn new(violation: Violation, context: &str, event: &Event) -> Self {
        Self {
            violation,
            context: context.to_string(),
            event_type: event.event_type().name(),
            message: event.message().to_string(),
            source: event.source_name().to_string(),
            raise_kind: event.raise_kind(),
        }
    }
}

impl fmt::Display for Uncaught {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.violation {
            Violation::UnmatchedResume => "unhandled resumption",
            _ => "uncaught exception",
        };
        write!(
            f,
            "{}: {} of type {} raised by {} with message \"{}\"",
            self.context, what, self.event_type, self.source, self.message
        )
    }
}

pub type FallbackHandler = Arc<dyn Fn(&Uncaught) + Send + Sync>;

/// The pair of fallbacks in force for a context.
#[derive(Clone)]
pub struct Fallbacks {
    pub terminate: FallbackHandler,
    pub unexpected: FallbackHandler,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            terminate: Arc::new(default_terminate),
            unexpected: Arc::new(default_unexpected),
        }
    }
}

impl fmt::Debug for Fallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallbacks").finish_non_exhaustive()
    }
}

/// Per-context replacements layered over the runtime's fallbacks.
#[derive(Clone, Default)]
pub(crate) struct FallbackOverrides {
    pub terminate: Option<FallbackHandler>,
    pub unexpected: Option<FallbackHandler>,
}

impl FallbackOverrides {
    pub(crate) fn resolve(&self, base: Fallbacks) -> Fallbacks {
        Fallbacks {
            terminate: self.terminate.clone().unwrap_or(base.terminate),
            unexpected: self.unexpected.clone().unwrap_or(base.unexpected),
        }
    }
}

fn default_terminate(report: &Uncaught) {
    eprintln!("ehm: {}", report);
    std::process::abort()
}

fn default_unexpected(report: &Uncaught) {
    eprintln!("ehm: {}", report);
    std::process::abort()
}

/// Hand `report` to `handler`; aborts if the handler returns.
pub(crate) fn escalate(handler: &FallbackHandler, report: Uncaught) -> ! {
    error!(
        violation = report.violation.as_str(),
        context = %report.context,
        event_type = report.event_type,
        source = %report.source,
        "{}",
        report.message
    );
    handler(&report);
    fatal(
        Violation::FallbackReturned,
        &format!("fallback handler returned after: {}", report),
    )
}

/// Log, print `detail` and abort the process.
pub fn fatal(violation: Violation, detail: &str) -> ! {
    error!(violation = violation.as_str(), "{}", detail);
    eprintln!("ehm: fatal {}: {}", violation.as_str(), detail);
    std::process::abort()
}
