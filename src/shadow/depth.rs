//! Depth-variance rendering of shadow casters

use glam::Vec4;

use crate::backend::{GraphicsBackend, ShaderId, UniformValue};
use crate::error::RenderResult;
use crate::pipeline::draw;
use crate::resources::TextureUnitContext;
use crate::scene::{
    DepthInstances, InstanceBatchedDynamic, InstanceSetConsumer, InstanceSingle,
    MatricesObserver, ShadowDepthVariance, TransformContext,
};

/// Draws shadow casters into the bound depth-variance target
pub trait DepthVarianceRenderer {
    fn render_depth_variance(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
        observer: &MatricesObserver<'_>,
        shadow: &ShadowDepthVariance,
        instances: &DepthInstances<'_>,
    ) -> RenderResult<()>;
}

/// [`DepthVarianceRenderer`] using one shader for single instances and one
/// for batched instances
#[derive(Debug, Clone, Copy)]
pub struct DepthVarianceShaderRenderer {
    pub single_shader: ShaderId,
    pub batched_shader: ShaderId,
}

impl DepthVarianceShaderRenderer {
    pub fn new(single_shader: ShaderId, batched_shader: ShaderId) -> Self {
        Self {
            single_shader,
            batched_shader,
        }
    }
}

impl DepthVarianceRenderer for DepthVarianceShaderRenderer {
    fn render_depth_variance(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        _tc: &TextureUnitContext,
        observer: &MatricesObserver<'_>,
        shadow: &ShadowDepthVariance,
        instances: &DepthInstances<'_>,
    ) -> RenderResult<()> {
        let mut consumer = DepthConsumer {
            backend,
            observer,
            shadow,
            shaders: *self,
            current: None,
            transforms: TransformContext::new(),
        };
        instances.execute(&mut consumer)
    }
}

struct DepthConsumer<'b, 'o, 's> {
    backend: &'b mut dyn GraphicsBackend,
    observer: &'o MatricesObserver<'o>,
    shadow: &'s ShadowDepthVariance,
    shaders: DepthVarianceShaderRenderer,
    current: Option<ShaderId>,
    transforms: TransformContext,
}

impl DepthConsumer<'_, '_, '_> {
    fn use_shader(&mut self, shader: ShaderId) {
        if self.current == Some(shader) {
            return;
        }
        self.current = Some(shader);
        self.backend.set_shader(shader);
        draw::set_observer_uniforms(self.backend, self.observer);
        self.backend.set_uniform(
            "depth_coefficient",
            UniformValue::Float(self.shadow.depth_coefficient),
        );
    }
}

impl InstanceSetConsumer for DepthConsumer<'_, '_, '_> {
    fn on_start(&mut self) -> RenderResult<()> {
        self.backend.clear(&crate::backend::ClearValues {
            color: Some(Vec4::ONE.to_array()),
            depth: Some(1.0),
            stencil: None,
        });
        Ok(())
    }

    fn on_instance_batched_update(
        &mut self,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()> {
        instance.update(self.backend, &mut self.transforms)
    }

    fn on_instance_single_array_start(
        &mut self,
        array: crate::backend::ArrayObjectHandle,
    ) -> RenderResult<()> {
        self.backend.bind_array_object(array);
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()> {
        let shader = self.shaders.single_shader;
        self.use_shader(shader);
        draw::draw_instance_single(self.backend, self.observer, instance)
    }

    fn on_instance_batched(&mut self, instance: &InstanceBatchedDynamic) -> RenderResult<()> {
        let shader = self.shaders.batched_shader;
        self.use_shader(shader);
        draw::draw_instance_batched(self.backend, instance);
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        Ok(())
    }
}
