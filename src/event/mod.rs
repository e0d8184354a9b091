//! Raised values.
//!
//! An [`Event`] is created by the raising code and moved into whichever structure
//! currently holds it: the unwinding payload for a throw, the dispatcher's call frame
//! for a resume, or an inbox message for an asynchronous send. The raise kind, the
//! source context and the binding token are stamped once, on the first raise.

mod kind;

pub use kind::{DefaultResume, DefaultTerminate, EventType, Resolution, BASE_EVENT, FAILURE, INTERRUPT};

use crate::context::ContextId;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Longest message kept on an event, in characters.
pub const MAX_MESSAGE: usize = 156;

/// Placeholder reported for events that were never raised.
pub const UNKNOWN_SOURCE: &str = "*unknown*";

/// How an event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaiseKind {
    Throw,
    Resume,
}

impl RaiseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RaiseKind::Throw => "throw",
            RaiseKind::Resume => "resume",
        }
    }
}

/// Identity of a raise site, used to select handlers registered for that site only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingToken(TokenRepr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TokenRepr {
    Issued(u64),
    Address(usize),
}

impl BindingToken {
    /// Issue a fresh token, distinct from every other issued token.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        BindingToken(TokenRepr::Issued(COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    /// Token naming the object at `site`; equal for the same live object.
    pub fn of<T: ?Sized>(site: &T) -> Self {
        BindingToken(TokenRepr::Address(site as *const T as *const () as usize))
    }
}

/// The context that raised an event, stamped at raise time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: ContextId,
    pub name: String,
}

/// An abstract raised value.
#[derive(Clone)]
pub struct Event {
    ty: &'static EventType,
    message: String,
    source: Option<Source>,
    raise_kind: Option<RaiseKind>,
    binding: Option<BindingToken>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Event {
    pub fn new(ty: &'static EventType, message: impl AsRef<str>) -> Self {
        Self {
            ty,
            message: bounded(message.as_ref(), MAX_MESSAGE),
            source: None,
            raise_kind: None,
            binding: None,
            payload: None,
        }
    }

    /// Attach application data; shared between duplicates of the event.
    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn event_type(&self) -> &'static EventType {
        self.ty
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn source_name(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or(UNKNOWN_SOURCE)
    }

    pub fn raise_kind(&self) -> Option<RaiseKind> {
        self.raise_kind
    }

    pub fn binding(&self) -> Option<BindingToken> {
        self.binding
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    pub fn is_kind_of(&self, target: &EventType) -> bool {
        self.ty.is_kind_of(target)
    }

    /// Handler matching: the type must match (`None` matches any type) and a handler
    /// bound to a raise site only accepts events raised at that site.
    pub fn matches(&self, ty: Option<&EventType>, binding: Option<BindingToken>) -> bool {
        let type_ok = ty.map_or(true, |t| self.is_kind_of(t));
        let binding_ok = binding.map_or(true, |b| self.binding == Some(b));
        type_ok && binding_ok
    }

    /// Record source, kind and binding. Returns false, changing nothing, when the
    /// event was already raised.
    pub(crate) fn stamp(
        &mut self,
        source: Source,
        kind: RaiseKind,
        binding: Option<BindingToken>,
    ) -> bool {
        if self.raise_kind.is_some() {
            return false;
        }
        self.source = Some(source);
        self.raise_kind = Some(kind);
        self.binding = binding;
        true
    }

    /// Point an already raised event at a new binding; source and kind stay.
    pub(crate) fn rebind(&mut self, binding: BindingToken) {
        self.binding = Some(binding);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.ty.name())
            .field("message", &self.message)
            .field("source", &self.source)
            .field("raise_kind", &self.raise_kind)
            .field("binding", &self.binding)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ty.name(), self.message)
    }
}

/// Truncate `text` to at most `max` characters.
pub(crate) fn bounded(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
