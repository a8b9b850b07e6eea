//! Per-render section and body bookkeeping
//!
//! An [`ExecuteContext`] is a stack of frames. A frame is pushed when a
//! template starts rendering its own content and again when it composes
//! with a layout. Sections defined in a frame stay visible to every frame
//! above it until the frame is popped.
//!
//! Frames are only entered through [`ExecuteContext::enter_nested_render`],
//! whose guard restores the previous state on every exit path, including
//! unwinding.

use super::error::ExecutionCause;
use super::instance::SectionAction;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Frame {
    defined: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<A> {
    frame: usize,
    action: A,
}

/// Hides definitions from `hidden_from` up to (not including) `visible_from`
/// while a section action renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ceiling {
    hidden_from: usize,
    visible_from: usize,
}

/// Already-rendered output of the template a layout wraps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyWriter {
    template: String,
    content: String,
}

impl BodyWriter {
    pub fn new(template: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            content: content.into(),
        }
    }

    /// Key of the template that produced the body
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteContext<A = SectionAction> {
    frames: Vec<Frame>,
    sections: BTreeMap<String, Vec<Entry<A>>>,
    ceilings: Vec<Ceiling>,
    body_writers: Vec<BodyWriter>,
}

impl<A> Default for ExecuteContext<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> ExecuteContext<A> {
    /// A context with a single root frame
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            sections: BTreeMap::new(),
            ceilings: Vec::new(),
            body_writers: Vec::new(),
        }
    }

    /// Number of active frames, root included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn current_frame(&self) -> usize {
        self.frames.len() - 1
    }

    /// Records `action` under `name` in the current frame.
    ///
    /// Fails when the name is empty or already defined in this frame. The
    /// same name may be defined again in a nested frame, where it shadows
    /// the outer definition.
    pub fn define_section(&mut self, name: &str, action: A) -> Result<(), ExecutionCause> {
        if name.trim().is_empty() {
            return Err(ExecutionCause::InvalidSectionName);
        }
        let frame = self.current_frame();
        if !self.frames[frame].defined.insert(name.to_string()) {
            return Err(ExecutionCause::DuplicateSection {
                name: name.to_string(),
            });
        }
        self.sections
            .entry(name.to_string())
            .or_default()
            .push(Entry { frame, action });
        Ok(())
    }

    fn is_visible(&self, frame: usize) -> bool {
        self.ceilings
            .last()
            .map_or(true, |c| frame < c.hidden_from || frame >= c.visible_from)
    }

    fn visible_entry(&self, name: &str) -> Option<&Entry<A>> {
        self.sections
            .get(name)?
            .iter()
            .rev()
            .find(|entry| self.is_visible(entry.frame))
    }

    /// The innermost visible action for `name`
    pub fn section_renderer(&self, name: &str) -> Option<&A> {
        self.visible_entry(name).map(|entry| &entry.action)
    }

    pub fn is_section_defined(&self, name: &str) -> bool {
        self.visible_entry(name).is_some()
    }

    /// Runs `inner` inside a new frame.
    ///
    /// When `inner` returns, fails or unwinds, the names it defined are
    /// removed, the frame is popped and the body-writer stack is truncated
    /// to its depth on entry.
    pub fn enter_nested_render<R>(&mut self, inner: impl FnOnce(&mut Self) -> R) -> R {
        let mut guard = FrameGuard::push(self);
        inner(&mut *guard)
    }

    pub fn push_body_writer(&mut self, writer: BodyWriter) {
        self.body_writers.push(writer);
    }

    /// Pops the innermost body writer.
    ///
    /// # Panics
    ///
    /// Panics when no body writer is active. Pushes and pops are paired by
    /// the layout protocol, so an empty stack is a bug in the caller.
    pub fn pop_body_writer(&mut self) -> BodyWriter {
        match self.body_writers.pop() {
            Some(writer) => writer,
            None => panic!("pop_body_writer called with no active body writer"),
        }
    }

    pub fn has_body_writer(&self) -> bool {
        !self.body_writers.is_empty()
    }

    pub fn current_body(&self) -> Option<&BodyWriter> {
        self.body_writers.last()
    }

    fn pop_frames_to(&mut self, depth: usize, writers: usize, ceilings: usize) {
        while self.frames.len() > depth {
            let index = self.frames.len() - 1;
            if let Some(frame) = self.frames.pop() {
                for name in frame.defined {
                    if let Some(stack) = self.sections.get_mut(&name) {
                        stack.retain(|entry| entry.frame != index);
                        if stack.is_empty() {
                            self.sections.remove(&name);
                        }
                    }
                }
            }
        }
        self.body_writers.truncate(writers);
        self.ceilings.truncate(ceilings);
    }
}

impl<A: Clone> ExecuteContext<A> {
    /// Renders the innermost visible action for `name` with `render`.
    ///
    /// While `render` runs, definitions made at or above the frame that
    /// defined the action are hidden, so an action that renders a section of
    /// the same name reaches the next definition down. Returns `None` when
    /// no action is visible.
    pub fn render_section_with<R>(
        &mut self,
        name: &str,
        render: impl FnOnce(&mut Self, &A) -> R,
    ) -> Option<R> {
        let entry = self.visible_entry(name)?;
        let ceiling = Ceiling {
            hidden_from: entry.frame,
            visible_from: self.frames.len(),
        };
        let action = entry.action.clone();

        let mut guard = CeilingGuard::push(self, ceiling);
        Some(render(&mut *guard, &action))
    }
}

/// Pops the frame pushed by [`ExecuteContext::enter_nested_render`]
pub struct FrameGuard<'a, A> {
    context: &'a mut ExecuteContext<A>,
    depth: usize,
    writers: usize,
    ceilings: usize,
}

impl<'a, A> FrameGuard<'a, A> {
    fn push(context: &'a mut ExecuteContext<A>) -> Self {
        let depth = context.frames.len();
        let writers = context.body_writers.len();
        let ceilings = context.ceilings.len();
        context.frames.push(Frame::default());
        Self {
            context,
            depth,
            writers,
            ceilings,
        }
    }
}

impl<A> Deref for FrameGuard<'_, A> {
    type Target = ExecuteContext<A>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<A> DerefMut for FrameGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl<A> Drop for FrameGuard<'_, A> {
    fn drop(&mut self) {
        self.context
            .pop_frames_to(self.depth, self.writers, self.ceilings);
    }
}

struct CeilingGuard<'a, A> {
    context: &'a mut ExecuteContext<A>,
    ceilings: usize,
}

impl<'a, A> CeilingGuard<'a, A> {
    fn push(context: &'a mut ExecuteContext<A>, ceiling: Ceiling) -> Self {
        let ceilings = context.ceilings.len();
        context.ceilings.push(ceiling);
        Self { context, ceilings }
    }
}

impl<A> Deref for CeilingGuard<'_, A> {
    type Target = ExecuteContext<A>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<A> DerefMut for CeilingGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl<A> Drop for CeilingGuard<'_, A> {
    fn drop(&mut self) {
        self.context.ceilings.truncate(self.ceilings);
    }
}
