//! Draw helpers shared by the passes

use crate::backend::{GraphicsBackend, UniformValue};
use crate::error::RenderResult;
use crate::scene::{InstanceBatchedDynamic, InstanceSingle, MatricesObserver};

/// Upload the observer's view and projection to the active shader.
pub(crate) fn set_observer_uniforms(
    backend: &mut dyn GraphicsBackend,
    observer: &MatricesObserver<'_>,
) {
    backend.set_uniform("transform_view", UniformValue::Mat4(observer.view()));
    backend.set_uniform(
        "transform_projection",
        UniformValue::Mat4(observer.projection()),
    );
}

/// Draw a single instance with the currently bound array object.
pub(crate) fn draw_instance_single(
    backend: &mut dyn GraphicsBackend,
    observer: &MatricesObserver<'_>,
    instance: &InstanceSingle,
) -> RenderResult<()> {
    observer.with_transform(instance.transform(), instance.uv(), |matrices| {
        backend.set_uniform(
            "transform_modelview",
            UniformValue::Mat4(matrices.model_view()),
        );
        backend.set_uniform("transform_normal", UniformValue::Mat3(matrices.normal()));
        backend.set_uniform("transform_uv", UniformValue::Mat3(matrices.uv()));
        backend.draw_elements();
        Ok(())
    })
}

/// Draw every slot of a batch up to its render count.
pub(crate) fn draw_instance_batched(
    backend: &mut dyn GraphicsBackend,
    instance: &InstanceBatchedDynamic,
) {
    let count = instance.render_count();
    if count == 0 {
        return;
    }
    backend.bind_array_object(instance.array_object());
    backend.draw_elements_instanced(count as u32);
}
