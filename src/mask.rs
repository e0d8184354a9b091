//! Delivery Mask Stack
//!
//! Nested enable/disable frames deciding which event types a context accepts
//! asynchronously. The innermost frame that mentions a type decides; an empty
//! stack admits everything. Synchronous raises are never masked.

use crate::event::EventType;

/// The set of types a mask frame speaks for.
#[derive(Debug, Clone)]
pub enum MaskFilter {
    All,
    Types(Vec<&'static EventType>),
}

impl MaskFilter {
    /// A type is mentioned when it is, or derives from, a listed type.
    pub fn mentions(&self, ty: &EventType) -> bool {
        match self {
            MaskFilter::All => true,
            MaskFilter::Types(types) => types.iter().any(|t| ty.is_kind_of(t)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaskFrame {
    pub admit: bool,
    pub filter: MaskFilter,
}

impl MaskFrame {
    pub fn enable(filter: MaskFilter) -> Self {
        Self {
            admit: true,
            filter,
        }
    }

    pub fn disable(filter: MaskFilter) -> Self {
        Self {
            admit: false,
            filter,
        }
    }
}

/// Per-context stack of mask frames, innermost last.
#[derive(Debug, Default)]
pub struct MaskStack {
    frames: Vec<MaskFrame>,
}

impl MaskStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame and return its depth, to be handed back to [`MaskStack::pop`].
    pub fn push(&mut self, frame: MaskFrame) -> usize {
        self.frames.push(frame);
        self.frames.len()
    }

    /// Remove the innermost frame if it is the one pushed at `depth`.
    ///
    /// Returns `None` and leaves the stack untouched when `depth` is not the
    /// innermost frame.
    pub fn pop(&mut self, depth: usize) -> Option<MaskFrame> {
        if depth == 0 || depth != self.frames.len() {
            return None;
        }
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn deliverable(&self, ty: &EventType) -> bool {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.filter.mentions(ty))
            .map_or(true, |frame| frame.admit)
    }
}
