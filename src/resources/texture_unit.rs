//! Scoped allocation of hardware texture units
//!
//! A [`TextureUnitAllocator`] owns the fixed set of units exposed by the
//! device and a bounded stack of contexts. Only the top of the stack is
//! *current*: it alone may bind textures or spawn a child. A child starts
//! with its parent's bindings and hands out units after the ones the parent
//! already holds, so finishing the child makes exactly those units available
//! again.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{GraphicsBackend, TextureDescriptor, TextureHandle, TextureUnit};
use crate::error::{RenderError, RenderResult};

#[derive(Debug)]
struct ContextFrame {
    generation: u64,
    /// Index into the unit list of the next unit to hand out
    next: usize,
    bindings: Vec<(TextureUnit, TextureHandle)>,
}

#[derive(Debug)]
struct AllocatorState {
    units: Vec<TextureUnit>,
    max_depth: usize,
    stack: Vec<ContextFrame>,
    generation: u64,
}

impl AllocatorState {
    fn position(&self, depth: usize, generation: u64) -> Option<usize> {
        match self.stack.get(depth) {
            Some(frame) if frame.generation == generation => Some(depth),
            _ => None,
        }
    }

    fn is_current(&self, depth: usize, generation: u64) -> bool {
        self.position(depth, generation).is_some() && self.stack.len() == depth + 1
    }

    fn push(&mut self, next: usize, bindings: Vec<(TextureUnit, TextureHandle)>) -> RenderResult<u64> {
        if self.stack.len() >= self.max_depth {
            return Err(RenderError::ContextLimitReached {
                depth: self.max_depth,
            });
        }
        self.generation += 1;
        self.stack.push(ContextFrame {
            generation: self.generation,
            next,
            bindings,
        });
        Ok(self.generation)
    }
}

/// Allocator for a fixed pool of texture units
#[derive(Debug, Clone)]
pub struct TextureUnitAllocator {
    state: Rc<RefCell<AllocatorState>>,
}

impl TextureUnitAllocator {
    /// Create an allocator over `units` allowing at most `max_depth` nested
    /// contexts (the root included).
    pub fn new(max_depth: usize, units: Vec<TextureUnit>) -> Self {
        log::debug!(
            "Texture unit allocator: {} units, stack depth {}",
            units.len(),
            max_depth
        );
        Self {
            state: Rc::new(RefCell::new(AllocatorState {
                units,
                max_depth: max_depth.max(1),
                stack: Vec::new(),
                generation: 0,
            })),
        }
    }

    /// Create an allocator over every unit the backend exposes.
    pub fn for_backend(max_depth: usize, backend: &dyn GraphicsBackend) -> Self {
        Self::new(max_depth, backend.texture_units())
    }

    pub fn unit_count(&self) -> usize {
        self.state.borrow().units.len()
    }

    /// Number of contexts currently open
    pub fn depth(&self) -> usize {
        self.state.borrow().stack.len()
    }

    /// Open the root context. Fails if a root is already open.
    pub fn root_context(&self) -> RenderResult<TextureUnitContext> {
        let mut state = self.state.borrow_mut();
        if !state.stack.is_empty() {
            return Err(RenderError::ProtocolViolation(
                "root texture unit context is already open",
            ));
        }
        let generation = state.push(0, Vec::new())?;
        Ok(TextureUnitContext {
            state: self.state.clone(),
            depth: 0,
            generation,
        })
    }
}

/// Handle to one context in the allocator's stack
#[derive(Debug)]
pub struct TextureUnitContext {
    state: Rc<RefCell<AllocatorState>>,
    depth: usize,
    generation: u64,
}

impl TextureUnitContext {
    /// Position of this context in the stack, 0 for the root
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True if this context has not been finished (it may have a child).
    pub fn is_open(&self) -> bool {
        self.state
            .borrow()
            .position(self.depth, self.generation)
            .is_some()
    }

    /// True if this context may bind textures and spawn children.
    pub fn is_current(&self) -> bool {
        self.state.borrow().is_current(self.depth, self.generation)
    }

    fn check_current(&self) -> RenderResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(RenderError::ContextNotActive)
        }
    }

    /// Units not yet handed out by this context
    pub fn remaining_units(&self) -> RenderResult<usize> {
        let state = self.state.borrow();
        let frame = state
            .position(self.depth, self.generation)
            .map(|i| &state.stack[i])
            .ok_or(RenderError::ContextNotActive)?;
        Ok(state.units.len() - frame.next)
    }

    /// Bindings visible in this context, inherited ones included
    pub fn bindings(&self) -> RenderResult<Vec<(TextureUnit, TextureHandle)>> {
        let state = self.state.borrow();
        state
            .position(self.depth, self.generation)
            .map(|i| state.stack[i].bindings.clone())
            .ok_or(RenderError::ContextNotActive)
    }

    /// Bind `texture` to the next free unit and return that unit.
    pub fn bind_texture(
        &self,
        backend: &mut dyn GraphicsBackend,
        texture: TextureHandle,
    ) -> RenderResult<TextureUnit> {
        self.check_current()?;
        let mut state = self.state.borrow_mut();
        let available = state.units.len();
        let frame = &state.stack[self.depth];
        if frame.next >= available {
            return Err(RenderError::UnitsExhausted {
                required: frame.next + 1,
                available,
            });
        }
        let unit = state.units[frame.next];
        let frame = &mut state.stack[self.depth];
        frame.next += 1;
        frame.bindings.push((unit, texture));
        drop(state);

        log::trace!("Texture unit context {}: bind {:?} -> {:?}", self.depth, texture, unit);
        backend.bind_texture(unit, texture);
        Ok(unit)
    }

    /// Create a texture and bind it to the next free unit.
    ///
    /// The texture belongs to the caller and outlives the context.
    pub fn allocate_texture_2d(
        &self,
        backend: &mut dyn GraphicsBackend,
        desc: &TextureDescriptor,
    ) -> RenderResult<(TextureUnit, TextureHandle)> {
        self.check_current()?;
        if self.remaining_units()? == 0 {
            let state = self.state.borrow();
            return Err(RenderError::UnitsExhausted {
                required: state.units.len() + 1,
                available: state.units.len(),
            });
        }
        let texture = backend.create_texture(desc)?;
        let unit = self.bind_texture(backend, texture)?;
        Ok((unit, texture))
    }

    /// Spawn a child context. This context stops being current until the
    /// child finishes.
    pub fn new_child(&self) -> RenderResult<TextureUnitContext> {
        self.check_current()?;
        let mut state = self.state.borrow_mut();
        let parent = &state.stack[self.depth];
        let (next, bindings) = (parent.next, parent.bindings.clone());
        let generation = state.push(next, bindings)?;
        Ok(TextureUnitContext {
            state: self.state.clone(),
            depth: self.depth + 1,
            generation,
        })
    }

    /// Spawn a child context, failing up front unless `reserved` units
    /// remain for it.
    pub fn new_child_with_reserved(&self, reserved: usize) -> RenderResult<TextureUnitContext> {
        let remaining = self.remaining_units()?;
        self.check_current()?;
        if remaining < reserved {
            let state = self.state.borrow();
            let used = state.units.len() - remaining;
            return Err(RenderError::UnitsExhausted {
                required: used + reserved,
                available: state.units.len(),
            });
        }
        self.new_child()
    }

    /// Run `f` inside a fresh child context that is finished on every exit
    /// path.
    pub fn with_child<T>(
        &self,
        backend: &mut dyn GraphicsBackend,
        f: impl FnOnce(&mut dyn GraphicsBackend, &TextureUnitContext) -> RenderResult<T>,
    ) -> RenderResult<T> {
        let child = self.new_child()?;
        let result = f(&mut *backend, &child);
        let finished = child.finish(backend);
        let value = result?;
        finished?;
        Ok(value)
    }

    /// Finish this context and any descendants still open.
    ///
    /// Units handed out here go back to the parent, whose bindings are
    /// re-applied on the device. Finishing the root unbinds everything.
    pub fn finish(&self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        if state.position(self.depth, self.generation).is_none() {
            return Err(RenderError::ContextNotActive);
        }

        let released: Vec<TextureUnit> = state.stack[self.depth]
            .bindings
            .iter()
            .map(|(unit, _)| *unit)
            .collect();
        let open = state.stack.len() - self.depth;
        state.stack.truncate(self.depth);
        let parent = state.stack.last().map(|frame| frame.bindings.clone());
        drop(state);

        log::debug!(
            "Texture unit context {} finished ({} context(s) closed)",
            self.depth,
            open
        );

        match parent {
            Some(bindings) => {
                for unit in released {
                    if !bindings.iter().any(|(bound, _)| *bound == unit) {
                        backend.unbind_texture(unit);
                    }
                }
                for (unit, texture) in bindings {
                    backend.bind_texture(unit, texture);
                }
            }
            None => {
                for unit in released {
                    backend.unbind_texture(unit);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, DummyBackend};

    fn setup(units: u32) -> (DummyBackend, TextureUnitAllocator) {
        let backend = DummyBackend::new(units);
        let allocator = TextureUnitAllocator::for_backend(4, &backend);
        (backend, allocator)
    }

    #[test]
    fn test_bind_until_exhausted() {
        let (mut backend, allocator) = setup(2);
        let root = allocator.root_context().unwrap();
        assert_eq!(
            root.bind_texture(&mut backend, TextureHandle(1)).unwrap(),
            TextureUnit(0)
        );
        assert_eq!(
            root.bind_texture(&mut backend, TextureHandle(2)).unwrap(),
            TextureUnit(1)
        );
        assert_eq!(
            root.bind_texture(&mut backend, TextureHandle(3)),
            Err(RenderError::UnitsExhausted {
                required: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_parent_blocked_while_child_open() {
        let (mut backend, allocator) = setup(4);
        let root = allocator.root_context().unwrap();
        let child = root.new_child().unwrap();

        assert_eq!(
            root.bind_texture(&mut backend, TextureHandle(1)),
            Err(RenderError::ContextNotActive)
        );
        assert_eq!(root.new_child().unwrap_err(), RenderError::ContextNotActive);

        child.finish(&mut backend).unwrap();
        assert!(root.bind_texture(&mut backend, TextureHandle(1)).is_ok());
    }

    #[test]
    fn test_child_units_reused_after_finish() {
        let (mut backend, allocator) = setup(4);
        let root = allocator.root_context().unwrap();
        root.bind_texture(&mut backend, TextureHandle(1)).unwrap();

        let first = root.new_child().unwrap();
        let unit = first.bind_texture(&mut backend, TextureHandle(2)).unwrap();
        assert_eq!(unit, TextureUnit(1));
        first.finish(&mut backend).unwrap();

        let second = root.new_child().unwrap();
        assert_eq!(
            second.bind_texture(&mut backend, TextureHandle(3)).unwrap(),
            TextureUnit(1)
        );
    }

    #[test]
    fn test_finish_twice_fails() {
        let (mut backend, allocator) = setup(4);
        let root = allocator.root_context().unwrap();
        root.finish(&mut backend).unwrap();
        assert_eq!(root.finish(&mut backend), Err(RenderError::ContextNotActive));
        assert_eq!(
            root.bind_texture(&mut backend, TextureHandle(1)),
            Err(RenderError::ContextNotActive)
        );
        // A new root may be opened afterwards
        assert!(allocator.root_context().is_ok());
    }

    #[test]
    fn test_finishing_parent_closes_descendants() {
        let (mut backend, allocator) = setup(4);
        let root = allocator.root_context().unwrap();
        let child = root.new_child().unwrap();
        let grandchild = child.new_child().unwrap();
        child.finish(&mut backend).unwrap();

        assert!(!grandchild.is_open());
        assert!(root.is_current());
        assert_eq!(
            grandchild.bind_texture(&mut backend, TextureHandle(1)),
            Err(RenderError::ContextNotActive)
        );
    }

    #[test]
    fn test_stack_depth_limit() {
        let backend = DummyBackend::new(4);
        let allocator = TextureUnitAllocator::for_backend(2, &backend);
        let root = allocator.root_context().unwrap();
        let child = root.new_child().unwrap();
        assert_eq!(
            child.new_child().unwrap_err(),
            RenderError::ContextLimitReached { depth: 2 }
        );
    }

    #[test]
    fn test_reserved_child() {
        let (mut backend, allocator) = setup(2);
        let root = allocator.root_context().unwrap();
        root.bind_texture(&mut backend, TextureHandle(1)).unwrap();
        assert_eq!(
            root.new_child_with_reserved(2).unwrap_err(),
            RenderError::UnitsExhausted {
                required: 3,
                available: 2
            }
        );
        assert!(root.new_child_with_reserved(1).is_ok());
    }

    #[test]
    fn test_child_finish_restores_parent_bindings() {
        let (mut backend, allocator) = setup(4);
        let root = allocator.root_context().unwrap();
        root.bind_texture(&mut backend, TextureHandle(10)).unwrap();
        root.with_child(&mut backend, |backend, child| {
            child.bind_texture(backend, TextureHandle(11))?;
            Ok(())
        })
        .unwrap();

        let commands = backend.commands();
        let tail = &commands[commands.len() - 2..];
        assert_eq!(
            tail,
            &[
                BackendCommand::UnbindTexture(TextureUnit(1)),
                BackendCommand::BindTexture(TextureUnit(0), TextureHandle(10)),
            ]
        );
        assert!(root.is_current());
    }

    #[test]
    fn test_with_child_finishes_on_error() {
        let (mut backend, allocator) = setup(1);
        let root = allocator.root_context().unwrap();
        let result: RenderResult<()> = root.with_child(&mut backend, |backend, child| {
            child.bind_texture(backend, TextureHandle(1))?;
            child.bind_texture(backend, TextureHandle(2))?;
            Ok(())
        });
        assert!(matches!(result, Err(RenderError::UnitsExhausted { .. })));
        assert!(root.is_current());
        assert_eq!(allocator.depth(), 1);
    }

    #[test]
    fn test_allocate_texture_2d() {
        let (mut backend, allocator) = setup(1);
        let root = allocator.root_context().unwrap();
        let (unit, texture) = root
            .allocate_texture_2d(&mut backend, &TextureDescriptor::default())
            .unwrap();
        assert_eq!(unit, TextureUnit(0));
        assert_eq!(backend.bound_texture(unit), Some(texture));

        assert!(matches!(
            root.allocate_texture_2d(&mut backend, &TextureDescriptor::default()),
            Err(RenderError::UnitsExhausted { .. })
        ));
        assert_eq!(backend.live_textures(), 1);
    }
}
