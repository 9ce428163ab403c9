//! Shadow map execution and lookup tests.

mod common;

use glam::Vec3;

use deferred_scene::backend::{DummyBackend, ShaderId};
use deferred_scene::resources::{PoolLimits, RenderTargetPool, TextureUnitAllocator};
use deferred_scene::scene::{
    DepthInstances, IdPool, InstanceSingle, Light, LightProjective, LightSphericalVolume,
    Matrices, Projection, ShadowDepthVariance, TransformIdentity, TransformView,
};
use deferred_scene::shadow::{DepthVarianceShaderRenderer, ShadowMapRenderer};
use deferred_scene::RenderError;

struct Fixture {
    backend: DummyBackend,
    allocator: TextureUnitAllocator,
    renderer: ShadowMapRenderer,
    matrices: Matrices,
    ids: IdPool,
}

impl Fixture {
    fn new() -> Self {
        let backend = common::backend(8);
        let allocator = TextureUnitAllocator::for_backend(4, &backend);
        Self {
            backend,
            allocator,
            renderer: ShadowMapRenderer::new(
                RenderTargetPool::new("shadows", PoolLimits::default()),
                DepthVarianceShaderRenderer::new(ShaderId(10), ShaderId(11)),
            ),
            matrices: Matrices::new(),
            ids: IdPool::new(),
        }
    }

    fn spot(&self, shadowed: bool) -> Light {
        let light = LightProjective::new(
            self.ids.light(),
            ShaderId(20),
            common::array(1),
            TransformView::look_at(Vec3::new(0.0, 4.0, 4.0), Vec3::ZERO, Vec3::Y),
            Projection::perspective(50.0, 1.0, 0.5, 20.0),
        );
        if shadowed {
            light
                .with_shadow(ShadowDepthVariance::with_map_size(self.ids.shadow(), 64).unwrap())
                .into()
        } else {
            light.into()
        }
    }
}

#[test]
fn test_rendered_map_is_found_after_complete() {
    let mut f = Fixture::new();
    let spot = f.spot(true);
    let other = f.spot(true);
    let caster = InstanceSingle::new(f.ids.instance(), common::array(2), TransformIdentity);
    let mut casters = DepthInstances::new();
    casters.add_single(&caster).unwrap();

    let root = f.allocator.root_context().unwrap();
    let mut execution = f.renderer.begin().unwrap();
    execution
        .render_light(&mut f.backend, &root, &f.matrices, &spot, &casters)
        .unwrap();
    assert_eq!(execution.rendered_count(), 1);
    assert_eq!(f.backend.draw_count(), 1);

    let mut context = execution.complete().unwrap();
    assert_eq!(context.len(), 1);
    let map = context.get(&spot).unwrap();
    assert!(map.texture().is_some());
    assert!(matches!(
        context.get(&other),
        Err(RenderError::ShadowNotRendered { .. })
    ));

    context.finish().unwrap();
    assert_eq!(context.get(&spot).unwrap_err(), RenderError::ContextNotActive);
    assert_eq!(context.finish(), Err(RenderError::ContextNotActive));
    drop(context);
    drop(execution);

    assert_eq!(f.renderer.pool().outstanding_count(), 0);
    assert_eq!(f.renderer.pool().pooled_count(), 1);
    assert!(root.is_current());
}

#[test]
fn test_lights_without_shadow_are_rejected() {
    let mut f = Fixture::new();
    let plain = f.spot(false);
    let bulb: Light =
        LightSphericalVolume::new(f.ids.light(), ShaderId(21), common::array(3), Vec3::ZERO, 1.0)
            .into();
    let casters = DepthInstances::new();

    let root = f.allocator.root_context().unwrap();
    let mut execution = f.renderer.begin().unwrap();
    assert_eq!(
        execution.render_light(&mut f.backend, &root, &f.matrices, &plain, &casters),
        Err(RenderError::LightWithoutShadow(plain.id()))
    );
    assert_eq!(
        execution.render_light(&mut f.backend, &root, &f.matrices, &bulb, &casters),
        Err(RenderError::LightWithoutShadow(bulb.id()))
    );
    let context = execution.complete().unwrap();
    assert_eq!(
        context.get(&bulb).unwrap_err(),
        RenderError::LightWithoutShadow(bulb.id())
    );
}

#[test]
fn test_completed_execution_is_inactive() {
    let mut f = Fixture::new();
    let spot = f.spot(true);
    let casters = DepthInstances::new();
    let root = f.allocator.root_context().unwrap();

    let mut execution = f.renderer.begin().unwrap();
    let _context = execution.complete().unwrap();
    assert!(!execution.is_active());
    assert_eq!(
        execution.complete().unwrap_err(),
        RenderError::ExecutionNotActive
    );
    assert_eq!(
        execution.render_light(&mut f.backend, &root, &f.matrices, &spot, &casters),
        Err(RenderError::ExecutionNotActive)
    );
}

#[test]
fn test_dropped_execution_returns_maps() {
    let mut f = Fixture::new();
    let spot = f.spot(true);
    let casters = DepthInstances::new();
    let root = f.allocator.root_context().unwrap();

    {
        let mut execution = f.renderer.begin().unwrap();
        execution
            .render_light(&mut f.backend, &root, &f.matrices, &spot, &casters)
            .unwrap();
    }
    assert_eq!(f.renderer.pool().outstanding_count(), 0);
    assert_eq!(f.renderer.pool().pooled_count(), 1);
}

#[test]
fn test_rendering_twice_replaces_map() {
    let mut f = Fixture::new();
    let spot = f.spot(true);
    let casters = DepthInstances::new();
    let root = f.allocator.root_context().unwrap();

    let mut execution = f.renderer.begin().unwrap();
    execution
        .render_light(&mut f.backend, &root, &f.matrices, &spot, &casters)
        .unwrap();
    execution
        .render_light(&mut f.backend, &root, &f.matrices, &spot, &casters)
        .unwrap();
    assert_eq!(execution.rendered_count(), 1);
    let mut context = execution.complete().unwrap();
    assert_eq!(context.len(), 1);
    context.finish().unwrap();
}

#[test]
fn test_deleted_renderer_cannot_begin() {
    let mut f = Fixture::new();
    let root = f.allocator.root_context().unwrap();
    f.renderer.delete(&mut f.backend, &root).unwrap();
    assert_eq!(
        f.renderer.begin().unwrap_err(),
        RenderError::PoolDeleted("shadows".into())
    );
}
