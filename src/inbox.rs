//! Async Inbox
//!
//! Per-context FIFO of events sent by other contexts. This is the only structure
//! shared across contexts, so every operation runs under the inbox lock and holds
//! it only for the splice and the hidden-flag writes. Hidden messages keep their
//! queue position; visibility is recomputed against the target's current mask on
//! every check.

use crate::error::EhmError;
use crate::event::{Event, EventType, RaiseKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle naming one enqueued message, used to withdraw it before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        MessageId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event in flight to another context.
#[derive(Debug)]
pub struct Message {
    id: MessageId,
    kind: RaiseKind,
    event: Event,
    hidden: bool,
}

impl Message {
    pub(crate) fn new(kind: RaiseKind, event: Event, hidden: bool) -> Self {
        Self {
            id: MessageId::next(),
            kind,
            event,
            hidden,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// How the target delivers the event at its poll point.
    pub fn kind(&self) -> RaiseKind {
        self.kind
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    fn refresh<F>(&mut self, visible: &F) -> bool
    where
        F: Fn(&EventType) -> bool,
    {
        self.hidden = !visible(self.event.event_type());
        !self.hidden
    }
}

#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; returns the queue depth after the append.
    pub fn push(&self, message: Message) -> usize {
        let mut queue = self.queue.lock();
        queue.push_back(message);
        queue.len()
    }

    /// The first message after `after` (or from the front when `after` is `None`)
    /// that is visible under `visible`. A stale `after`, already delivered or
    /// withdrawn, yields `None` so a caller walking the queue never revisits messages.
    pub fn next_visible<F>(&self, after: Option<MessageId>, visible: F) -> Option<MessageId>
    where
        F: Fn(&EventType) -> bool,
    {
        let mut queue = self.queue.lock();
        let start = match after {
            None => 0,
            Some(id) => queue.iter().position(|m| m.id == id)? + 1,
        };
        queue
            .iter_mut()
            .skip(start)
            .find_map(|m| m.refresh(&visible).then_some(m.id))
    }

    pub fn has_visible<F>(&self, visible: F) -> bool
    where
        F: Fn(&EventType) -> bool,
    {
        self.next_visible(None, visible).is_some()
    }

    /// Remove and return the first visible message, leaving hidden ones in place.
    pub fn take_visible<F>(&self, visible: F) -> Option<Message>
    where
        F: Fn(&EventType) -> bool,
    {
        let mut queue = self.queue.lock();
        let pos = queue.iter_mut().position(|m| m.refresh(&visible))?;
        queue.remove(pos)
    }

    /// Remove a message by identity before its target consumes it.
    pub fn withdraw(&self, id: MessageId) -> Result<Event, EhmError> {
        let mut queue = self.queue.lock();
        let pos = queue
            .iter()
            .position(|m| m.id == id)
            .ok_or(EhmError::AlreadyConsumed(id))?;
        queue
            .remove(pos)
            .map(Message::into_event)
            .ok_or(EhmError::AlreadyConsumed(id))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Messages currently flagged hidden, as of the last visibility check.
    pub fn hidden_count(&self) -> usize {
        self.queue.lock().iter().filter(|m| m.hidden).count()
    }
}
