//! Texture unit context tests over backends of different sizes.

mod common;

use rstest::rstest;

use deferred_scene::backend::{BackendCommand, TextureHandle, TextureUnit};
use deferred_scene::resources::TextureUnitAllocator;
use deferred_scene::RenderError;

fn texture(raw: u64) -> TextureHandle {
    TextureHandle::from_raw(raw)
}

#[rstest]
#[case::one_unit(1)]
#[case::four_units(4)]
#[case::eight_units(8)]
fn test_root_binds_every_unit_then_fails(#[case] units: u32) {
    let mut backend = common::backend(units);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();

    for i in 0..units {
        let unit = root.bind_texture(&mut backend, texture(u64::from(i) + 1)).unwrap();
        assert_eq!(unit, TextureUnit(i));
    }
    assert_eq!(root.remaining_units().unwrap(), 0);
    assert_eq!(
        root.bind_texture(&mut backend, texture(99)),
        Err(RenderError::UnitsExhausted {
            required: units as usize + 1,
            available: units as usize,
        })
    );
}

#[rstest]
#[case::one_unit(1)]
#[case::four_units(4)]
#[case::eight_units(8)]
fn test_siblings_reuse_units_after_finish(#[case] units: u32) {
    let mut backend = common::backend(units);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();

    let first = root.new_child().unwrap();
    let a = first.bind_texture(&mut backend, texture(1)).unwrap();
    first.finish(&mut backend).unwrap();

    let second = root.new_child().unwrap();
    let b = second.bind_texture(&mut backend, texture(2)).unwrap();
    assert_eq!(a, b);
    assert_eq!(backend.bound_texture(b), Some(texture(2)));
    second.finish(&mut backend).unwrap();
    assert_eq!(backend.bound_texture(b), None);
}

#[test]
fn test_child_inherits_parent_bindings() {
    let mut backend = common::backend(4);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    root.bind_texture(&mut backend, texture(1)).unwrap();

    let child = root.new_child().unwrap();
    assert_eq!(child.bindings().unwrap(), vec![(TextureUnit(0), texture(1))]);
    assert_eq!(child.remaining_units().unwrap(), 3);
    assert_eq!(
        child.bind_texture(&mut backend, texture(2)).unwrap(),
        TextureUnit(1)
    );
    child.finish(&mut backend).unwrap();

    assert_eq!(root.bindings().unwrap(), vec![(TextureUnit(0), texture(1))]);
    assert_eq!(backend.bound_texture(TextureUnit(0)), Some(texture(1)));
}

#[test]
fn test_finished_context_rejects_everything() {
    let mut backend = common::backend(4);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let child = root.new_child().unwrap();
    child.finish(&mut backend).unwrap();

    assert_eq!(
        child.bind_texture(&mut backend, texture(1)),
        Err(RenderError::ContextNotActive)
    );
    assert_eq!(child.finish(&mut backend), Err(RenderError::ContextNotActive));
    assert_eq!(child.new_child().unwrap_err(), RenderError::ContextNotActive);
}

#[test]
fn test_with_child_finishes_on_error() {
    let mut backend = common::backend(2);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();

    let result: Result<(), RenderError> = root.with_child(&mut backend, |backend, child| {
        child.bind_texture(backend, texture(1))?;
        child.bind_texture(backend, texture(2))?;
        child.bind_texture(backend, texture(3))?;
        Ok(())
    });
    assert!(matches!(result, Err(RenderError::UnitsExhausted { .. })));
    assert!(root.is_current());
    assert_eq!(allocator.depth(), 1);
    assert_eq!(
        common::count_commands(&backend, |c| matches!(c, BackendCommand::UnbindTexture(_))),
        2
    );
}

#[test]
fn test_root_finish_allows_new_frame() {
    let mut backend = common::backend(4);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    assert!(matches!(
        allocator.root_context(),
        Err(RenderError::ProtocolViolation(_))
    ));
    root.finish(&mut backend).unwrap();
    assert_eq!(allocator.depth(), 0);
    assert!(allocator.root_context().is_ok());
}
