//! Dispatcher
//!
//! Raise, resume, poll and asynchronous send, as operations on the raising
//! [`Context`].
//!
//! A throw is two-phase: the context's installed catch frames are searched first,
//! innermost out, and only when one accepts the event does unwinding start (as a
//! Rust unwind carrying a private payload, caught again by the accepting try block).
//! With no accepting frame the termination handler runs without unwinding. A resume
//! never unwinds: matching handlers are called in place and the resume returns.

use crate::context::{Context, ContextHandle};
use crate::error::{EhmError, Violation};
use crate::event::{BindingToken, Event, EventType, RaiseKind, Resolution};
use crate::fallback::{self, Uncaught};
use crate::inbox::{Message, MessageId};
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::panic;
use std::rc::Rc;
use tracing::{debug, trace};

pub(crate) const FINALLY_DURING_UNWIND: &str =
    "Raising an exception in a finally clause during exception propagation is disallowed.";

/// Unwinding payload of a thrown event.
pub(crate) struct Thrown(pub(crate) Event);

/// Records `event` as active for the extent of a catch clause or resumption.
pub(crate) struct ActiveEvent<'a> {
    stack: &'a RefCell<Vec<Rc<Event>>>,
}

impl<'a> ActiveEvent<'a> {
    pub(crate) fn push(stack: &'a RefCell<Vec<Rc<Event>>>, event: Rc<Event>) -> Self {
        stack.borrow_mut().push(event);
        Self { stack }
    }
}

impl Drop for ActiveEvent<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

/// Clears a re-entry flag when dropped.
struct Entered<'a>(&'a Cell<bool>);

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Lowers the handler-search start while a resumption handler runs.
struct LoweredTop<'a> {
    ctx: &'a Context,
    saved: Option<usize>,
}

impl<'a> LoweredTop<'a> {
    fn new(ctx: &'a Context, top: Option<usize>) -> Self {
        let saved = ctx.handlers.borrow_mut().set_top(top);
        Self { ctx, saved }
    }
}

impl Drop for LoweredTop<'_> {
    fn drop(&mut self) {
        self.ctx.handlers.borrow_mut().set_top(self.saved);
    }
}

impl Context {
    // ---- synchronous throw ----

    /// Raise `event` with unwinding toward the nearest accepting catch clause.
    pub fn throw(&self, event: Event) -> ! {
        self.raise_throw(event, None)
    }

    /// Raise `event` so that only catch clauses bound to `binding` (or unbound ones) accept it.
    pub fn throw_bound(&self, event: Event, binding: BindingToken) -> ! {
        self.raise_throw(event, Some(binding))
    }

    fn raise_throw(&self, mut event: Event, binding: Option<BindingToken>) -> ! {
        self.stamp_or_rebind(&mut event, RaiseKind::Throw, binding);
        self.unwind(event)
    }

    /// First raise stamps the event; a later raise only replaces its binding.
    fn stamp_or_rebind(&self, event: &mut Event, kind: RaiseKind, binding: Option<BindingToken>) {
        if event.stamp(self.source(), kind, binding) {
            trace!(ctx = %self.name(), event_type = event.event_type().name(), "Event stamped");
        } else if let Some(binding) = binding {
            event.rebind(binding);
            debug!(
                ctx = %self.name(),
                event_type = event.event_type().name(),
                source = %event.source_name(),
                "Raised again with a new binding"
            );
        }
    }

    /// Re-raise the exception whose catch clause is running, keeping its stamp.
    pub fn rethrow(&self) -> Result<Infallible, EhmError> {
        let event = self
            .caught
            .borrow()
            .last()
            .map(|e| Event::clone(e))
            .ok_or(EhmError::NoActiveException)?;
        self.unwind(event)
    }

    pub(crate) fn unwind(&self, event: Event) -> ! {
        // Phase one: look for an accepting frame without unwinding anything.
        // Inside a cleanup that runs during unwind, only frames above the floor count.
        let floor = self.cleanup_floor.get();
        let catches = self.catches.borrow();
        let accepted = catches
            .iter()
            .skip(floor.unwrap_or(0))
            .rev()
            .any(|frame| frame.accepts(&event));
        drop(catches);

        if !accepted {
            if floor.is_some() {
                fallback::fatal(Violation::FinallyDuringUnwind, FINALLY_DURING_UNWIND)
            }
            // Nothing accepts: the type's own action, then the terminate handler,
            // both at the raise point.
            self.run_default_terminate(&event);
            let report = Uncaught::new(Violation::UnmatchedThrow, self.name(), &event);
            fallback::escalate(&self.fallbacks().terminate, report)
        }

        // Phase two: the accepting try block catches this payload.

        debug!(
            ctx = %self.name(),
            event_type = event.event_type().name(),
            source = %event.source_name(),
            "Unwinding"
        );
        panic::resume_unwind(Box::new(Thrown(event)))
    }

    /// Run the type's default-terminate action unless one is already running.
    fn run_default_terminate(&self, event: &Event) {
        let Some(action) = event.event_type().default_terminate() else {
            return;
        };
        if self.terminating.replace(true) {
            trace!(ctx = %self.name(), event_type = event.event_type().name(), "Default terminate already running");
            return;
        }
        let _entered = Entered(&self.terminating);
        trace!(ctx = %self.name(), event_type = event.event_type().name(), "Running default terminate");
        action(self, event);
    }

    // ---- resumption ----

    /// Resume `event` with the configured consequential-search default.
    pub fn resume(&self, event: Event) {
        self.resume_with(event, None, self.runtime.config().default_conseq)
    }

    pub fn resume_bound(&self, event: Event, binding: BindingToken) {
        self.resume_with(event, Some(binding), self.runtime.config().default_conseq)
    }

    /// Call matching resumption handlers in place, innermost first. With `conseq`
    /// the search continues outward past each match; without it, it stops at the
    /// first. Returns once handled; otherwise runs the type's default-resume action
    /// and finally the unexpected handler.
    pub fn resume_with(&self, mut event: Event, binding: Option<BindingToken>, conseq: bool) {
        self.stamp_or_rebind(&mut event, RaiseKind::Resume, binding);
        self.deliver_resume(Rc::new(event), conseq)
    }

    /// Repeat the search for the event currently being resumed, from the current
    /// search position.
    pub fn reresume(&self, conseq: bool) -> Result<(), EhmError> {
        let event = self
            .resuming
            .borrow()
            .last()
            .cloned()
            .ok_or(EhmError::NoActiveResumption)?;
        self.deliver_resume(event, conseq);
        Ok(())
    }

    fn deliver_resume(&self, event: Rc<Event>, conseq: bool) {
        let _active = ActiveEvent::push(&self.resuming, Rc::clone(&event));
        if self.search(&event, conseq) {
            return;
        }

        // A reresume from inside this event's own default action goes straight
        // to the unexpected handler.
        let reentered = self
            .defaulting
            .borrow()
            .iter()
            .any(|active| Rc::ptr_eq(active, &event));
        match event.event_type().default_resume() {
            Some(action) if !reentered => {
                trace!(ctx = %self.name(), event_type = event.event_type().name(), "Running default resume");
                let _defaulting = ActiveEvent::push(&self.defaulting, Rc::clone(&event));
                if action(self, &event) == Resolution::Handled {
                    return;
                }
            }
            Some(_) => {
                debug!(ctx = %self.name(), event_type = event.event_type().name(), "Default resume re-entered");
            }
            None => {}
        }

        let report = Uncaught::new(Violation::UnmatchedResume, self.name(), &event);
        fallback::escalate(&self.fallbacks().unexpected, report)
    }

    /// One search pass from the current search start, following skip links.
    fn search(&self, event: &Event, conseq: bool) -> bool {
        let mut cursor = self.handlers.borrow().top();
        let mut handled = false;

        while let Some(index) = cursor {
            let entry = self.handlers.borrow().entry(index);
            let Some((frame, skip)) = entry else {
                break;
            };
            cursor = skip;
            let Some(handler) = frame.find(event) else {
                continue;
            };

            trace!(ctx = %self.name(), frame = index, ?handler, "Resumption handler matched");
            // The handler and anything it raises search from below its own frame.
            {
                let _lowered = LoweredTop::new(self, skip);
                handler.invoke(self, event);
            }
            handled = true;
            if !conseq {
                break;
            }
        }
        handled
    }

    // ---- asynchronous delivery ----

    /// Queue `event` for `target`, to be thrown there at its next poll.
    pub fn throw_at(&self, event: Event, target: &ContextHandle) -> MessageId {
        self.send(event, target, RaiseKind::Throw, false)
    }

    /// Queue `event` for `target`, to be resumed there at its next poll.
    pub fn resume_at(&self, event: Event, target: &ContextHandle) -> MessageId {
        self.send(event, target, RaiseKind::Resume, false)
    }

    /// Forward the exception whose catch clause is running to `target`, unchanged.
    pub fn rethrow_at(&self, target: &ContextHandle) -> Result<MessageId, EhmError> {
        let event = self
            .current_exception()
            .ok_or(EhmError::NoActiveException)?;
        Ok(self.send(Event::clone(&event), target, RaiseKind::Throw, true))
    }

    /// Forward the event being resumed to `target`, unchanged.
    pub fn reresume_at(&self, target: &ContextHandle) -> Result<MessageId, EhmError> {
        let event = self
            .current_resumption()
            .ok_or(EhmError::NoActiveResumption)?;
        Ok(self.send(Event::clone(&event), target, RaiseKind::Resume, true))
    }

    fn send(
        &self,
        mut event: Event,
        target: &ContextHandle,
        kind: RaiseKind,
        rethrow: bool,
    ) -> MessageId {
        if !rethrow {
            event.stamp(self.source(), kind, None);
        }
        let hidden = !target.deliverable(event.event_type());
        debug!(
            ctx = %self.name(),
            target_ctx = %target.name(),
            kind = kind.as_str(),
            event_type = event.event_type().name(),
            hidden,
            "Async send"
        );
        target.shared.enqueue(Message::new(kind, event, hidden))
    }

    /// Whether a visible message is waiting, without consuming it.
    pub fn poll_check(&self) -> bool {
        let masks = self.shared.masks.read();
        self.shared.inbox.has_visible(|ty| masks.deliverable(ty))
    }

    /// Deliver the first visible message as if raised here. A throw message
    /// unwinds from this call; otherwise returns whether a message was delivered.
    pub fn poll(&self) -> bool {
        let message = {
            let masks = self.shared.masks.read();
            self.shared.inbox.take_visible(|ty| masks.deliverable(ty))
        };
        let Some(message) = message else {
            return false;
        };

        debug!(ctx = %self.name(), message = %message.id(), kind = message.kind().as_str(), "Delivering");
        match message.kind() {
            RaiseKind::Throw => self.unwind(message.into_event()),
            RaiseKind::Resume => {
                let conseq = self.runtime.config().default_conseq;
                self.deliver_resume(Rc::new(message.into_event()), conseq);
                true
            }
        }
    }

    /// Deliver visible messages until none remain; returns how many were resumed.
    pub fn poll_all(&self) -> usize {
        let mut delivered = 0;
        while self.poll() {
            delivered += 1;
        }
        delivered
    }

    // ---- queries ----

    /// The exception whose catch clause is running, innermost first.
    pub fn current_exception(&self) -> Option<Rc<Event>> {
        self.caught.borrow().last().cloned()
    }

    /// The event whose resumption is in progress, innermost first.
    pub fn current_resumption(&self) -> Option<Rc<Event>> {
        self.resuming.borrow().last().cloned()
    }

    pub fn top_resumption_type(&self) -> Option<&'static EventType> {
        self.current_resumption().map(|e| e.event_type())
    }

    /// Type name of the current exception or resumption.
    pub fn current_event_name(&self, kind: RaiseKind) -> Option<&'static str> {
        let event = match kind {
            RaiseKind::Throw => self.current_exception(),
            RaiseKind::Resume => self.current_resumption(),
        };
        event.map(|e| e.event_type().name())
    }
}
