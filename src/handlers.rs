//! Resumption Handler Stack
//!
//! Each resumption-capable scope installs one [`HandlerFrame`] for its lexical
//! extent. Installed frames carry two links: their position in the stack, which
//! follows strict LIFO nesting, and a skip link naming the next frame a search
//! should visit after this one. While a handler from frame `i` runs, the search
//! start is lowered to frame `i`'s skip link, so a raise from inside the handler
//! sees frames it installs itself plus the frames outside `i`, never `i` or the
//! frames between `i` and the original raise point.

use crate::context::Context;
use crate::event::{BindingToken, Event, EventType};
use std::fmt;
use std::rc::Rc;

type Callback = Box<dyn Fn(&Context, &Event)>;

/// One resumption handler: a type filter, an optional binding and a callback.
pub struct Handler {
    binding: Option<BindingToken>,
    ty: Option<&'static EventType>,
    callback: Callback,
}

impl Handler {
    /// Handle events of `ty` or any derived type.
    pub fn new<F>(ty: &'static EventType, callback: F) -> Self
    where
        F: Fn(&Context, &Event) + 'static,
    {
        Self {
            binding: None,
            ty: Some(ty),
            callback: Box::new(callback),
        }
    }

    /// Handle events of `ty` only when raised with `binding`.
    pub fn bound<F>(binding: BindingToken, ty: &'static EventType, callback: F) -> Self
    where
        F: Fn(&Context, &Event) + 'static,
    {
        Self {
            binding: Some(binding),
            ty: Some(ty),
            callback: Box::new(callback),
        }
    }

    /// Handle every event.
    pub fn any<F>(callback: F) -> Self
    where
        F: Fn(&Context, &Event) + 'static,
    {
        Self {
            binding: None,
            ty: None,
            callback: Box::new(callback),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.matches(self.ty, self.binding)
    }

    pub(crate) fn invoke(&self, ctx: &Context, event: &Event) {
        (self.callback)(ctx, event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("type", &self.ty.map(|t| t.name()))
            .field("binding", &self.binding)
            .finish()
    }
}

/// Ordered handler table of one scope.
#[derive(Debug, Default)]
pub struct HandlerFrame {
    handlers: Vec<Handler>,
}

impl HandlerFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn push(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// First handler in table order matching `event`.
    pub fn find(&self, event: &Event) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.matches(event))
    }
}

#[derive(Debug)]
struct Installed {
    frame: Rc<HandlerFrame>,
    skip: Option<usize>,
}

/// Per-context handler stack; mutated only by its owning context.
#[derive(Debug, Default)]
pub struct HandlerStack {
    installed: Vec<Installed>,
    top: Option<usize>,
}

impl HandlerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a frame above everything currently visible. Returns its index.
    pub fn push(&mut self, frame: Rc<HandlerFrame>) -> usize {
        let index = self.installed.len();
        self.installed.push(Installed {
            frame,
            skip: self.top,
        });
        self.top = Some(index);
        index
    }

    /// Remove the innermost frame if it is the one installed at `index`.
    /// Any other index leaves the stack untouched and yields `None`.
    pub fn pop(&mut self, index: usize) -> Option<Rc<HandlerFrame>> {
        if index + 1 != self.installed.len() {
            return None;
        }
        let installed = self.installed.pop()?;
        self.top = installed.skip;
        Some(installed.frame)
    }

    /// Where the next search starts.
    pub fn top(&self) -> Option<usize> {
        self.top
    }

    /// Move the search start, returning the previous one.
    pub(crate) fn set_top(&mut self, top: Option<usize>) -> Option<usize> {
        std::mem::replace(&mut self.top, top)
    }

    /// The frame at `index` and the next index a search visits after it.
    pub(crate) fn entry(&self, index: usize) -> Option<(Rc<HandlerFrame>, Option<usize>)> {
        self.installed
            .get(index)
            .map(|i| (Rc::clone(&i.frame), i.skip))
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}
