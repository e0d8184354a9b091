//! Guarded blocks
//!
//! [`TryBlock`] composes one guarded body with its termination catch clauses,
//! resumption handlers and cleanup. `run` installs, in order: the cleanup guard,
//! the resumption handler frame, and the catch frame. The body then runs; the frames
//! come off the stacks before any catch clause runs, and the cleanup runs last on
//! every exit.
//!
//! ```
//! use ehm::event::{Event, FAILURE};
//! use ehm::Runtime;
//!
//! let rt = Runtime::default();
//! let ctx = rt.context("main");
//! let message = ctx
//!     .try_block(|| ctx.throw(Event::new(&FAILURE, "no route")))
//!     .catch(&FAILURE, |e| e.message().to_string())
//!     .run();
//! assert_eq!(message, "no route");
//! ```

use crate::context::{CatchFrame, Context};
use crate::dispatch::{ActiveEvent, Thrown};
use crate::event::{BindingToken, Event, EventType};
use crate::handlers::{Handler, HandlerFrame};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::debug;

type CatchFn<'c, R> = Box<dyn FnOnce(&Event) -> R + 'c>;

/// One catch clause: filter and the code that replaces the body's result.
struct Catch<'c, R> {
    ty: Option<&'static EventType>,
    binding: Option<BindingToken>,
    handler: CatchFn<'c, R>,
}

/// Builder for a guarded body. Nothing runs until [`TryBlock::run`].
#[must_use = "a try block does nothing until `run` is called"]
pub struct TryBlock<'c, R> {
    ctx: &'c Context,
    body: Box<dyn FnOnce() -> R + 'c>,
    catches: Vec<Catch<'c, R>>,
    resumes: HandlerFrame,
    cleanup: Option<Box<dyn FnOnce() + 'c>>,
}

impl Context {
    pub fn try_block<'c, R, B>(&'c self, body: B) -> TryBlock<'c, R>
    where
        B: FnOnce() -> R + 'c,
    {
        TryBlock {
            ctx: self,
            body: Box::new(body),
            catches: Vec::new(),
            resumes: HandlerFrame::new(),
            cleanup: None,
        }
    }
}

impl<'c, R> TryBlock<'c, R> {
    /// Catch thrown events of `ty` or any derived type.
    pub fn catch<F>(self, ty: &'static EventType, handler: F) -> Self
    where
        F: FnOnce(&Event) -> R + 'c,
    {
        self.clause(Some(ty), None, handler)
    }

    /// Catch thrown events of `ty` raised with `binding`.
    pub fn catch_bound<F>(self, binding: BindingToken, ty: &'static EventType, handler: F) -> Self
    where
        F: FnOnce(&Event) -> R + 'c,
    {
        self.clause(Some(ty), Some(binding), handler)
    }

    /// Catch every thrown event.
    pub fn catch_any<F>(self, handler: F) -> Self
    where
        F: FnOnce(&Event) -> R + 'c,
    {
        self.clause(None, None, handler)
    }

    fn clause<F>(
        mut self,
        ty: Option<&'static EventType>,
        binding: Option<BindingToken>,
        handler: F,
    ) -> Self
    where
        F: FnOnce(&Event) -> R + 'c,
    {
        self.catches.push(Catch {
            ty,
            binding,
            handler: Box::new(handler),
        });
        self
    }

    /// Handle resumed events of `ty` while the body runs.
    pub fn catch_resume<F>(self, ty: &'static EventType, handler: F) -> Self
    where
        F: Fn(&Context, &Event) + 'static,
    {
        self.handler(Handler::new(ty, handler))
    }

    /// Add a prepared resumption handler, bound or catch-all.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.resumes.push(handler);
        self
    }

    /// Run `cleanup` after the body and any catch clause, on every exit.
    pub fn finally<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + 'c,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Run the body. Returns its value or the value of the catch clause that
    /// accepted the thrown event; other throws keep unwinding.
    pub fn run(self) -> R {
        let TryBlock {
            ctx,
            body,
            catches,
            resumes,
            cleanup,
        } = self;

        // Declared first so the cleanup drops after the catch clause returns.
        let _cleanup = cleanup.map(|f| ctx.finally(f));

        let outcome = {
            let _resumes = (!resumes.is_empty()).then(|| ctx.install_handlers(resumes));
            if catches.is_empty() {
                return body();
            }
            // Registered before the body so a throw can see it before unwinding.
            let clauses = catches.iter().map(|c| (c.ty, c.binding)).collect();
            let _catch = ctx.push_catch_frame(CatchFrame::new(clauses));
            panic::catch_unwind(AssertUnwindSafe(body))
        };

        let payload = match outcome {
            Ok(value) => return value,
            Err(payload) => payload,
        };
        // Panics that are not throws pass through untouched.
        let Thrown(event) = match payload.downcast::<Thrown>() {
            Ok(thrown) => *thrown,
            Err(other) => panic::resume_unwind(other),
        };

        let Some(catch) = catches
            .into_iter()
            .find(|c| event.matches(c.ty, c.binding))
        else {
            panic::resume_unwind(Box::new(Thrown(event)))
        };

        debug!(
            ctx = %ctx.name(),
            event_type = event.event_type().name(),
            source = %event.source_name(),
            "Caught"
        );
        let event = Rc::new(event);
        let _active = ActiveEvent::push(&ctx.caught, Rc::clone(&event));
        (catch.handler)(&*event)
    }
}
