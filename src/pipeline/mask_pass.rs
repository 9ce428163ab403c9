//! Mask pass
//!
//! Renders untextured instances as a single-channel coverage mask.

use crate::backend::{ArrayObjectHandle, ClearValues, GraphicsBackend, ShaderId};
use crate::error::RenderResult;
use crate::pipeline::draw;
use crate::resources::RenderTarget;
use crate::scene::{
    ConsumerProtocol, InstanceBatchedDynamic, InstanceSetConsumer, InstanceSingle,
    MatricesObserver, TransformContext,
};

/// Shaders used by [`MaskPass`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskShaders {
    pub single: ShaderId,
    pub batched: ShaderId,
}

/// Mask pass
pub struct MaskPass<'f> {
    backend: &'f mut dyn GraphicsBackend,
    observer: &'f MatricesObserver<'f>,
    target: &'f RenderTarget,
    shaders: MaskShaders,
    current: Option<ShaderId>,
    protocol: ConsumerProtocol,
    transforms: TransformContext,
}

impl<'f> MaskPass<'f> {
    pub fn new(
        backend: &'f mut dyn GraphicsBackend,
        observer: &'f MatricesObserver<'f>,
        target: &'f RenderTarget,
        shaders: MaskShaders,
    ) -> Self {
        Self {
            backend,
            observer,
            target,
            shaders,
            current: None,
            protocol: ConsumerProtocol::new(),
            transforms: TransformContext::new(),
        }
    }

    fn use_shader(&mut self, shader: ShaderId) {
        if self.current != Some(shader) {
            self.current = Some(shader);
            self.backend.set_shader(shader);
            draw::set_observer_uniforms(self.backend, self.observer);
        }
    }
}

impl InstanceSetConsumer for MaskPass<'_> {
    fn on_start(&mut self) -> RenderResult<()> {
        self.protocol.start()?;
        self.target.bind_for_drawing(self.backend);
        self.backend.clear(&ClearValues {
            color: Some([0.0, 0.0, 0.0, 0.0]),
            depth: Some(1.0),
            stencil: Some(0),
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

    fn on_instance_single_array_start(&mut self, array: ArrayObjectHandle) -> RenderResult<()> {
        self.backend.bind_array_object(array);
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()> {
        self.protocol.require_started()?;
        self.use_shader(self.shaders.single);
        draw::draw_instance_single(self.backend, self.observer, instance)
    }

    fn on_instance_batched(&mut self, instance: &InstanceBatchedDynamic) -> RenderResult<()> {
        self.protocol.require_started()?;
        self.use_shader(self.shaders.batched);
        draw::draw_instance_batched(self.backend, instance);
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        self.backend.bind_framebuffer(None);
        self.protocol.finish()
    }
}
