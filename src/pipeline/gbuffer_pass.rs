//! G-Buffer generation pass for deferred rendering
//!
//! Replays the visible opaque instances into a geometry target:
//! - Albedo (base color)
//! - Eye-space normals (encoded)
//! - Specular color and exponent
//! - Depth and stencil
//!
//! Each group writes its number into the low stencil bits so the lighting
//! pass can restrict lights to the instances they illuminate.

use crate::backend::{
    ArrayObjectHandle, ClearValues, CompareFunction, GraphicsBackend, ShaderId, StencilOperation,
    StencilState,
};
use crate::error::RenderResult;
use crate::pipeline::draw;
use crate::resources::{Material, RenderTarget, TextureUnitContext};
use crate::scene::{
    ConsumerProtocol, InstanceBatchedDynamic, InstanceSingle, MatricesObserver,
    SceneOpaquesConsumer, TransformContext,
};

/// Stencil bits holding the group number
pub const GROUP_STENCIL_MASK: u32 = 0x3f;

/// Stencil state writing `group` into the group bits
pub fn group_write_stencil(group: u32) -> StencilState {
    StencilState {
        compare: CompareFunction::Always,
        reference: group,
        read_mask: 0,
        write_mask: GROUP_STENCIL_MASK,
        pass_op: StencilOperation::Replace,
    }
}

/// G-Buffer generation pass
pub struct GeometryPass<'f> {
    backend: &'f mut dyn GraphicsBackend,
    tc: &'f TextureUnitContext,
    observer: &'f MatricesObserver<'f>,
    target: &'f RenderTarget,
    protocol: ConsumerProtocol,
    /// Units bound for the current material
    material: Option<TextureUnitContext>,
    transforms: TransformContext,
    draws: usize,
}

impl<'f> GeometryPass<'f> {
    pub fn new(
        backend: &'f mut dyn GraphicsBackend,
        tc: &'f TextureUnitContext,
        observer: &'f MatricesObserver<'f>,
        target: &'f RenderTarget,
    ) -> Self {
        Self {
            backend,
            tc,
            observer,
            target,
            protocol: ConsumerProtocol::new(),
            material: None,
            transforms: TransformContext::new(),
            draws: 0,
        }
    }

    /// Number of draw calls issued so far
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    fn use_shader(&mut self, shader: ShaderId) -> RenderResult<()> {
        self.protocol.require_group()?;
        self.backend.set_shader(shader);
        draw::set_observer_uniforms(self.backend, self.observer);
        Ok(())
    }

    fn start_material(&mut self, material: &Material) -> RenderResult<()> {
        self.protocol.require_group()?;
        self.finish_material()?;
        let context = self.tc.new_child()?;
        let bound = material.bind(self.backend, &context);
        self.material = Some(context);
        bound
    }

    fn finish_material(&mut self) -> RenderResult<()> {
        match self.material.take() {
            Some(context) => context.finish(self.backend),
            None => Ok(()),
        }
    }
}

impl SceneOpaquesConsumer for GeometryPass<'_> {
    fn on_start(&mut self) -> RenderResult<()> {
        self.protocol.start()?;
        self.target.bind_for_drawing(self.backend);
        self.backend.clear(&ClearValues {
            color: Some([0.0, 0.0, 0.0, 0.0]),
            depth: Some(1.0),
            stencil: None,
        });
        Ok(())
    }

    fn on_instance_batched_update(
        &mut self,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()> {
        self.protocol.require_started()?;
        instance.update(self.backend, &mut self.transforms)
    }

    fn on_start_group(&mut self, group: u32) -> RenderResult<()> {
        self.protocol.start_group(group)?;
        self.backend
            .set_stencil_state(Some(group_write_stencil(group)));
        Ok(())
    }

    fn on_instance_batched_shader_start(&mut self, shader: ShaderId) -> RenderResult<()> {
        self.use_shader(shader)
    }

    fn on_instance_batched_material_start(&mut self, material: &Material) -> RenderResult<()> {
        self.start_material(material)
    }

    fn on_instance_batched(
        &mut self,
        _material: &Material,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()> {
        self.protocol.require_group()?;
        if instance.render_count() > 0 {
            draw::draw_instance_batched(self.backend, instance);
            self.draws += 1;
        }
        Ok(())
    }

    fn on_instance_batched_material_finish(&mut self, _material: &Material) -> RenderResult<()> {
        self.finish_material()
    }

    fn on_instance_single_shader_start(&mut self, shader: ShaderId) -> RenderResult<()> {
        self.use_shader(shader)
    }

    fn on_instance_single_material_start(&mut self, material: &Material) -> RenderResult<()> {
        self.start_material(material)
    }

    fn on_instance_single_array_start(&mut self, array: ArrayObjectHandle) -> RenderResult<()> {
        self.backend.bind_array_object(array);
        Ok(())
    }

    fn on_instance_single(
        &mut self,
        _material: &Material,
        instance: &InstanceSingle,
    ) -> RenderResult<()> {
        self.protocol.require_group()?;
        draw::draw_instance_single(self.backend, self.observer, instance)?;
        self.draws += 1;
        Ok(())
    }

    fn on_instance_single_material_finish(&mut self, _material: &Material) -> RenderResult<()> {
        self.finish_material()
    }

    fn on_finish_group(&mut self, _group: u32) -> RenderResult<()> {
        self.protocol.finish_group()?;
        self.finish_material()
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        let material = self.finish_material();
        self.backend.set_stencil_state(None);
        log::trace!("G-Buffer pass issued {} draw(s)", self.draws);
        let finished = self.protocol.finish();
        material.and(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, DummyBackend, TextureDescriptor};
    use crate::resources::{
        Area, PoolLimits, RenderTargetDescription, RenderTargetPool, TextureUnitAllocator,
    };
    use crate::scene::{
        InstanceId, Matrices, MaterialId, Projection, SceneOpaques, TransformIdentity,
        DEFAULT_GROUP,
    };
    use glam::Mat4;

    #[test]
    fn test_material_textures_released_per_material() {
        let mut backend = DummyBackend::new(4);
        let allocator = TextureUnitAllocator::for_backend(8, &backend);
        let root = allocator.root_context().unwrap();
        let mut pool = RenderTargetPool::new("gbuffer", PoolLimits::default());
        let area = Area::of_size(64, 64).unwrap();
        let target = pool
            .get(&mut backend, &root, &RenderTargetDescription::geometry(area))
            .unwrap();

        let albedo = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let material = Material::new(MaterialId(1), ShaderId(7)).with_texture("albedo", albedo);
        let instance = InstanceSingle::new(InstanceId(2), ArrayObjectHandle(3), TransformIdentity);
        let mut opaques = SceneOpaques::new();
        opaques.add_single(&instance, &material, DEFAULT_GROUP).unwrap();

        let matrices = Matrices::new();
        let projection = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        let draws = matrices
            .with_observer(Mat4::IDENTITY, projection, |observer| {
                let mut pass = GeometryPass::new(&mut backend, &root, observer, &target);
                opaques.execute(&mut pass)?;
                Ok(pass.draw_count())
            })
            .unwrap();

        assert_eq!(draws, 1);
        assert_eq!(root.remaining_units().unwrap(), 4);
        assert!(backend
            .commands()
            .contains(&BackendCommand::StencilState(Some(group_write_stencil(1)))));
        root.finish(&mut backend).unwrap();
    }
}
