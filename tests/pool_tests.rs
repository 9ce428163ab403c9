//! Render target pool tests.

mod common;

use rstest::rstest;

use deferred_scene::resources::{
    Area, PoolLimits, RenderTargetDescription, RenderTargetPool, TextureUnitAllocator,
};
use deferred_scene::RenderError;

fn area(width: u32, height: u32) -> Area {
    Area::of_size(width, height).unwrap()
}

#[rstest]
#[case::geometry(RenderTargetDescription::geometry(area(16, 16)), 3, true)]
#[case::mask(RenderTargetDescription::mask(area(16, 16)), 1, true)]
#[case::image(RenderTargetDescription::image(area(16, 16)), 1, true)]
#[case::depth_variance(RenderTargetDescription::depth_variance(area(16, 16)), 1, true)]
#[case::ambient_occlusion(RenderTargetDescription::ambient_occlusion(area(16, 16)), 1, false)]
fn test_attachments_per_kind(
    #[case] description: RenderTargetDescription,
    #[case] colors: usize,
    #[case] has_depth: bool,
) {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut pool = RenderTargetPool::new("test", PoolLimits::default());

    let target = pool.get(&mut backend, &root, &description).unwrap();
    assert_eq!(target.color_textures().len(), colors);
    assert_eq!(target.depth_texture().is_some(), has_depth);
    assert_eq!(
        backend.live_textures(),
        colors + usize::from(has_depth)
    );
    // Allocation happens in a child context that is already finished
    assert!(root.is_current());
    assert_eq!(root.remaining_units().unwrap(), 8);
}

#[test]
fn test_exact_match_is_reused() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut pool = RenderTargetPool::new("test", PoolLimits::default());
    let description = RenderTargetDescription::mask(area(32, 32));

    let first = pool.get(&mut backend, &root, &description).unwrap();
    let id = first.id();
    pool.return_target(first).unwrap();
    let second = pool.get(&mut backend, &root, &description).unwrap();
    assert_eq!(second.id(), id);
    assert_eq!(backend.live_textures(), 2);
}

#[test]
fn test_area_change_reallocates_with_latest_area() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut pool = RenderTargetPool::new("test", PoolLimits::default());

    let small = pool
        .get(&mut backend, &root, &RenderTargetDescription::mask(area(32, 32)))
        .unwrap();
    pool.return_target(small).unwrap();
    let large = pool
        .get(&mut backend, &root, &RenderTargetDescription::mask(area(64, 48)))
        .unwrap();

    assert_eq!(large.area(), area(64, 48));
    assert_eq!(pool.pooled_count(), 0);
    // The stale target was destroyed, not kept alongside
    assert_eq!(backend.live_textures(), 2);
    assert_eq!(backend.live_framebuffers(), 1);
}

#[test]
fn test_hard_limit_rejects_allocation() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let limits = PoolLimits {
        soft: 100,
        hard: 10_000,
    };
    let mut pool = RenderTargetPool::new("tight", limits);
    let description = RenderTargetDescription::mask(area(100, 100));

    let held = pool.get(&mut backend, &root, &description).unwrap();
    assert_eq!(
        pool.get(&mut backend, &root, &description).unwrap_err(),
        RenderError::PoolHardLimit {
            pool: "tight".into(),
            requested: 10_000,
            used: 10_000,
            limit: 10_000,
        }
    );
    assert_eq!(pool.outstanding_count(), 1);
    drop(held);
}

#[test]
fn test_soft_limit_evicts_on_return() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let limits = PoolLimits {
        soft: 100,
        hard: 100_000,
    };
    let mut pool = RenderTargetPool::new("soft", limits);

    let target = pool
        .get(&mut backend, &root, &RenderTargetDescription::mask(area(20, 20)))
        .unwrap();
    pool.return_target(target).unwrap();
    assert_eq!(pool.pooled_count(), 0);
    // Evicted targets are destroyed on the next trim
    assert_eq!(backend.live_textures(), 2);
    pool.trim(&mut backend);
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn test_foreign_target_is_rejected() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut first = RenderTargetPool::new("first", PoolLimits::default());
    let mut second = RenderTargetPool::new("second", PoolLimits::default());

    let target = first
        .get(&mut backend, &root, &RenderTargetDescription::mask(area(8, 8)))
        .unwrap();
    let id = target.id();
    assert_eq!(
        second.return_target(target),
        Err(RenderError::ForeignRenderTarget(id))
    );
}

#[test]
fn test_deleted_pool_refuses_targets() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut pool = RenderTargetPool::new("gone", PoolLimits::default());
    let description = RenderTargetDescription::geometry(area(8, 8));

    let target = pool.get(&mut backend, &root, &description).unwrap();
    pool.return_target(target).unwrap();
    pool.delete(&mut backend, &root).unwrap();

    assert!(pool.is_deleted());
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(
        pool.get(&mut backend, &root, &description).unwrap_err(),
        RenderError::PoolDeleted("gone".into())
    );
}

#[test]
fn test_failed_allocation_leaks_nothing() {
    let mut backend = common::backend(8);
    let allocator = TextureUnitAllocator::for_backend(4, &backend);
    let root = allocator.root_context().unwrap();
    let mut pool = RenderTargetPool::new("test", PoolLimits::default());
    backend.set_fail_texture_creation(true);

    assert!(pool
        .get(&mut backend, &root, &RenderTargetDescription::geometry(area(8, 8)))
        .is_err());
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(pool.outstanding_count(), 0);
    assert!(root.is_current());
}
