//! Stencil pass
//!
//! Marks the pixels lighting is allowed to touch in the top stencil bit of
//! the G-buffer. Runs before the geometry pass, which only writes the low
//! group bits.

use crate::backend::{
    ArrayObjectHandle, ClearValues, CompareFunction, GraphicsBackend, ShaderId, StencilOperation,
    StencilState,
};
use crate::error::RenderResult;
use crate::pipeline::draw;
use crate::resources::RenderTarget;
use crate::scene::{
    ConsumerProtocol, InstanceSingle, MatricesObserver, SceneStencilsConsumer, StencilMode,
};

/// Stencil bit set where lighting is allowed
pub const ALLOWED_STENCIL_BIT: u32 = 0x80;

/// Stencil pass
pub struct StencilPass<'f> {
    backend: &'f mut dyn GraphicsBackend,
    observer: &'f MatricesObserver<'f>,
    target: &'f RenderTarget,
    shader: ShaderId,
    protocol: ConsumerProtocol,
}

impl<'f> StencilPass<'f> {
    pub fn new(
        backend: &'f mut dyn GraphicsBackend,
        observer: &'f MatricesObserver<'f>,
        target: &'f RenderTarget,
        shader: ShaderId,
    ) -> Self {
        Self {
            backend,
            observer,
            target,
            shader,
            protocol: ConsumerProtocol::new(),
        }
    }
}

impl SceneStencilsConsumer for StencilPass<'_> {
    fn on_start(&mut self, mode: StencilMode) -> RenderResult<()> {
        self.protocol.start()?;
        self.target.bind_for_drawing(self.backend);
        self.backend.clear(&ClearValues {
            color: None,
            depth: None,
            stencil: Some(mode.clear_value() * ALLOWED_STENCIL_BIT),
        });
        self.backend.set_stencil_state(Some(StencilState {
            compare: CompareFunction::Always,
            reference: mode.instance_value() * ALLOWED_STENCIL_BIT,
            read_mask: 0,
            write_mask: ALLOWED_STENCIL_BIT,
            pass_op: StencilOperation::Replace,
        }));
        self.backend.set_shader(self.shader);
        draw::set_observer_uniforms(self.backend, self.observer);
        Ok(())
    }

    fn on_instance_single_array_start(&mut self, array: ArrayObjectHandle) -> RenderResult<()> {
        self.backend.bind_array_object(array);
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()> {
        self.protocol.require_started()?;
        draw::draw_instance_single(self.backend, self.observer, instance)
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        self.backend.set_stencil_state(None);
        self.protocol.finish()
    }
}
