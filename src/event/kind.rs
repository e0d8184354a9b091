//! Event type descriptors and the "is-a" relation between them.
//!
//! Types are declared as statics with a parent link and compared by address:
//!
//! ```
//! use ehm::event::{EventType, FAILURE};
//!
//! static DISK_FULL: EventType = EventType::derived("DiskFull", &FAILURE);
//! assert!(DISK_FULL.is_kind_of(&FAILURE));
//! assert!(!FAILURE.is_kind_of(&DISK_FULL));
//! ```

use crate::context::Context;
use crate::event::Event;
use std::fmt;

/// Outcome of a type's default-resume action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The action dealt with the event; the resume returns normally.
    Handled,
    /// The action declined; the resume escalates to the unexpected handler.
    Unhandled,
}

/// Action run when a resumed event finds no handler.
pub type DefaultResume = fn(&Context, &Event) -> Resolution;

/// Action run when a thrown event finds no catch clause, before the terminate handler.
pub type DefaultTerminate = fn(&Context, &Event);

/// Run-time type tag of an event.
pub struct EventType {
    name: &'static str,
    parent: Option<&'static EventType>,
    default_resume: Option<DefaultResume>,
    default_terminate: Option<DefaultTerminate>,
}

/// Root of every event hierarchy.
pub static BASE_EVENT: EventType = EventType::root("BaseEvent");

/// Program failures, conventionally raised with `throw`.
pub static FAILURE: EventType = EventType::derived("Failure", &BASE_EVENT);

/// Notifications, conventionally delivered with `resume` or `resume_at`.
pub static INTERRUPT: EventType = EventType::derived("Interrupt", &BASE_EVENT);

impl EventType {
    /// A type with no parent.
    pub const fn root(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            default_resume: None,
            default_terminate: None,
        }
    }

    /// A type deriving from `parent`.
    pub const fn derived(name: &'static str, parent: &'static EventType) -> Self {
        Self {
            name,
            parent: Some(parent),
            default_resume: None,
            default_terminate: None,
        }
    }

    /// Attach a default-resume action; derived types inherit it unless they declare their own.
    pub const fn with_default_resume(mut self, action: DefaultResume) -> Self {
        self.default_resume = Some(action);
        self
    }

    /// Attach an action run for uncaught throws of this type (and derived types
    /// that declare none). The terminate handler still runs when it returns.
    pub const fn with_default_terminate(mut self, action: DefaultTerminate) -> Self {
        self.default_terminate = Some(action);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static EventType> {
        self.parent
    }

    /// True iff `self` is `target` or derives from it.
    pub fn is_kind_of(&self, target: &EventType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if std::ptr::eq(ty, target) {
                return true;
            }
            current = ty.parent;
        }
        false
    }

    /// The nearest declared default-resume action, walking toward the root.
    pub fn default_resume(&self) -> Option<DefaultResume> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.default_resume.is_some() {
                return ty.default_resume;
            }
            current = ty.parent;
        }
        None
    }

    pub fn default_terminate(&self) -> Option<DefaultTerminate> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.default_terminate.is_some() {
                return ty.default_terminate;
            }
            current = ty.parent;
        }
        None
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for EventType {}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType")
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name))
            .field("default_resume", &self.default_resume.is_some())
            .field("default_terminate", &self.default_terminate.is_some())
            .finish()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
