//! Execution contexts.
//!
//! A [`Context`] is the view the code running inside one coroutine or task uses to
//! raise, poll and install scopes. Its handler stack, catch frames and active-event
//! records are owned by that code alone. The inbox and mask stack live in a shared
//! part that other contexts reach through a cloneable [`ContextHandle`]: senders
//! append to the inbox and read the mask to pre-compute visibility.

use crate::error::{EhmError, Violation};
use crate::event::{bounded, BindingToken, Event, EventType, Source};
use crate::fallback::{self, FallbackOverrides, Fallbacks};
use crate::handlers::{HandlerFrame, HandlerStack};
use crate::inbox::{Inbox, Message, MessageId};
use crate::mask::{MaskFilter, MaskFrame, MaskStack};
use crate::runtime::Runtime;
use parking_lot::RwLock;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

const MASK_SCOPE_ORDER: &str = "A mask scope was closed while a mask scope opened inside it was still live.";
const HANDLER_SCOPE_ORDER: &str =
    "A handler scope was closed while a handler scope opened inside it was still live.";

/// Process-unique context identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

pub(crate) struct Shared {
    id: ContextId,
    name: String,
    pub(crate) inbox: Inbox,
    pub(crate) masks: RwLock<MaskStack>,
    high_water: usize,
}

impl Shared {
    fn deliverable(&self, ty: &EventType) -> bool {
        self.masks.read().deliverable(ty)
    }

    pub(crate) fn enqueue(&self, message: Message) -> MessageId {
        let id = message.id();
        let kind = message.kind();
        let depth = self.inbox.push(message);
        trace!(target_ctx = %self.name, message = %id, kind = kind.as_str(), depth, "Message enqueued");
        if depth > self.high_water {
            warn!(
                target_ctx = %self.name,
                depth,
                high_water = self.high_water,
                "Inbox depth above high-water mark; is the context polling?"
            );
        }
        id
    }
}

/// Address of a context, usable from any thread.
#[derive(Clone)]
pub struct ContextHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the target currently admits `ty` asynchronously.
    pub fn deliverable(&self, ty: &EventType) -> bool {
        self.shared.deliverable(ty)
    }

    /// Messages queued for the target, hidden or not.
    pub fn pending(&self) -> usize {
        self.shared.inbox.len()
    }

    /// Take back a message before the target consumes it.
    pub fn withdraw(&self, id: MessageId) -> Result<Event, EhmError> {
        let result = self.shared.inbox.withdraw(id);
        match &result {
            Ok(_) => trace!(target_ctx = %self.shared.name, message = %id, "Message withdrawn"),
            Err(e) => warn!(target_ctx = %self.shared.name, message = %id, "Withdraw failed: {}", e),
        }
        result
    }

    /// Id of the first message the target would currently see after `after`.
    ///
    /// Returns `None` when `after` has already been delivered or withdrawn.
    pub fn next_visible(&self, after: Option<MessageId>) -> Option<MessageId> {
        let masks = self.shared.masks.read();
        self.shared
            .inbox
            .next_visible(after, |ty| masks.deliverable(ty))
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

/// Clause list of one try block, consulted before unwinding starts.
#[derive(Debug, Default)]
pub(crate) struct CatchFrame {
    clauses: Vec<(Option<&'static EventType>, Option<BindingToken>)>,
}

impl CatchFrame {
    pub(crate) fn new(clauses: Vec<(Option<&'static EventType>, Option<BindingToken>)>) -> Self {
        Self { clauses }
    }

    pub(crate) fn accepts(&self, event: &Event) -> bool {
        self.clauses.iter().any(|(ty, b)| event.matches(*ty, *b))
    }
}

/// The owner's view of one execution context.
pub struct Context {
    pub(crate) shared: Arc<Shared>,
    pub(crate) runtime: Runtime,
    overrides: FallbackOverrides,
    pub(crate) handlers: RefCell<HandlerStack>,
    pub(crate) catches: RefCell<Vec<CatchFrame>>,
    pub(crate) caught: RefCell<Vec<Rc<Event>>>,
    pub(crate) resuming: RefCell<Vec<Rc<Event>>>,
    pub(crate) cleanup_floor: Cell<Option<usize>>,
    pub(crate) defaulting: RefCell<Vec<Rc<Event>>>,
    pub(crate) terminating: Cell<bool>,
}

impl Context {
    pub(crate) fn new(runtime: Runtime, name: &str, overrides: FallbackOverrides) -> Self {
        let high_water = runtime.config().inbox_high_water;
        Self {
            shared: Arc::new(Shared {
                id: ContextId::next(),
                name: name.to_string(),
                inbox: Inbox::new(),
                masks: RwLock::new(MaskStack::new()),
                high_water,
            }),
            runtime,
            overrides,
            handlers: RefCell::new(HandlerStack::new()),
            catches: RefCell::new(Vec::new()),
            caught: RefCell::new(Vec::new()),
            resuming: RefCell::new(Vec::new()),
            cleanup_floor: Cell::new(None),
            defaulting: RefCell::new(Vec::new()),
            terminating: Cell::new(false),
        }
    }

    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Fallbacks in force for this context: its own, else the runtime's.
    pub fn fallbacks(&self) -> Fallbacks {
        self.overrides.resolve(self.runtime.fallbacks())
    }

    /// Whether a throw is currently unwinding the running thread.
    pub fn is_unwinding(&self) -> bool {
        std::thread::panicking()
    }

    pub(crate) fn source(&self) -> Source {
        Source {
            id: self.shared.id,
            name: bounded(&self.shared.name, self.runtime.config().max_source_name),
        }
    }

    // ---- delivery masks ----

    pub fn deliverable(&self, ty: &EventType) -> bool {
        self.shared.deliverable(ty)
    }

    /// Run `f` with `types` admitted asynchronously.
    pub fn enabled<R>(&self, types: &[&'static EventType], f: impl FnOnce() -> R) -> R {
        let _scope = self.enable(types);
        f()
    }

    pub fn enabled_all<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.enable_all();
        f()
    }

    /// Run `f` with `types` held back.
    pub fn disabled<R>(&self, types: &[&'static EventType], f: impl FnOnce() -> R) -> R {
        let _scope = self.disable(types);
        f()
    }

    pub fn disabled_all<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.disable_all();
        f()
    }

    /// Admit `types` asynchronously until the returned scope is dropped.
    ///
    /// Scopes must be dropped innermost first; closing one while a later scope
    /// is still live is fatal ([`Violation::ScopeOrder`]). Prefer [`Context::enabled`]
    /// where the frame fits a closure.
    pub fn enable(&self, types: &[&'static EventType]) -> MaskScope<'_> {
        self.push_mask(MaskFrame::enable(MaskFilter::Types(types.to_vec())))
    }

    pub fn enable_all(&self) -> MaskScope<'_> {
        self.push_mask(MaskFrame::enable(MaskFilter::All))
    }

    /// Hold back `types` until the returned scope is dropped.
    pub fn disable(&self, types: &[&'static EventType]) -> MaskScope<'_> {
        self.push_mask(MaskFrame::disable(MaskFilter::Types(types.to_vec())))
    }

    pub fn disable_all(&self) -> MaskScope<'_> {
        self.push_mask(MaskFrame::disable(MaskFilter::All))
    }

    fn push_mask(&self, frame: MaskFrame) -> MaskScope<'_> {
        let admit = frame.admit;
        let depth = self.shared.masks.write().push(frame);
        trace!(ctx = %self.name(), depth, admit, "Mask frame installed");
        MaskScope { ctx: self, depth }
    }

    // ---- resumption handlers ----

    /// Run `f` with `frame` installed as the innermost handler frame.
    pub fn with_handlers<R>(&self, frame: HandlerFrame, f: impl FnOnce() -> R) -> R {
        let _scope = self.install_handlers(frame);
        f()
    }

    /// Install a handler frame for the lifetime of the returned scope.
    ///
    /// Like mask scopes, handler scopes must be dropped innermost first.
    pub fn install_handlers(&self, frame: HandlerFrame) -> HandlerScope<'_> {
        let index = self.handlers.borrow_mut().push(Rc::new(frame));
        trace!(ctx = %self.name(), index, "Handler frame installed");
        HandlerScope { ctx: self, index }
    }

    pub(crate) fn push_catch_frame(&self, frame: CatchFrame) -> CatchScope<'_> {
        let mut catches = self.catches.borrow_mut();
        catches.push(frame);
        CatchScope {
            ctx: self,
            depth: catches.len(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("handler_frames", &self.handlers.borrow().len())
            .field("catch_frames", &self.catches.borrow().len())
            .finish()
    }
}

/// Enable/disable frame; removed when dropped.
#[must_use = "the mask frame is removed as soon as the scope is dropped"]
pub struct MaskScope<'a> {
    ctx: &'a Context,
    depth: usize,
}

impl Drop for MaskScope<'_> {
    fn drop(&mut self) {
        let removed = self.ctx.shared.masks.write().pop(self.depth);
        if removed.is_none() {
            fallback::fatal(Violation::ScopeOrder, MASK_SCOPE_ORDER)
        }
        trace!(ctx = %self.ctx.name(), depth = self.depth, "Mask frame removed");
    }
}

/// Installed handler frame; removed when dropped.
#[must_use = "the handler frame is removed as soon as the scope is dropped"]
pub struct HandlerScope<'a> {
    ctx: &'a Context,
    index: usize,
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        let removed = self.ctx.handlers.borrow_mut().pop(self.index);
        if removed.is_none() {
            fallback::fatal(Violation::ScopeOrder, HANDLER_SCOPE_ORDER)
        }
    }
}

pub(crate) struct CatchScope<'a> {
    ctx: &'a Context,
    depth: usize,
}

impl Drop for CatchScope<'_> {
    fn drop(&mut self) {
        let mut catches = self.ctx.catches.borrow_mut();
        debug_assert_eq!(self.depth, catches.len(), "catch frames must be removed LIFO");
        catches.pop();
    }
}
