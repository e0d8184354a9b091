//! EHM: Exception Handling for Coroutines and Tasks
//!
//! A user-level exception engine offering both termination (`throw`, unwinding to
//! a catch clause) and resumption (`resume`, calling a handler in place) semantics.
//! Every execution context carries its own handler stack and catch frames; contexts
//! raise events at one another asynchronously through per-context inboxes, gated
//! by enable/disable masks and delivered when the target polls.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod fallback;
pub mod finally;
pub mod handlers;
pub mod inbox;
pub mod logging;
pub mod mask;
pub mod runtime;
pub mod try_block;

pub use context::{Context, ContextHandle, ContextId, HandlerScope, MaskScope};
pub use error::{EhmError, Violation};
pub use event::{BindingToken, Event, EventType, RaiseKind, Resolution};
pub use fallback::{Fallbacks, Uncaught};
pub use finally::Finally;
pub use handlers::{Handler, HandlerFrame};
pub use inbox::MessageId;
pub use runtime::{ContextBuilder, Runtime};
pub use try_block::TryBlock;
