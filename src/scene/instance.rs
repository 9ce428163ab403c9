//! Single mesh instances

use glam::Mat3;

use crate::backend::ArrayObjectHandle;
use crate::scene::ids::InstanceId;
use crate::scene::transform::Transform;

/// One mesh drawn once with its own transform
#[derive(Debug)]
pub struct InstanceSingle {
    id: InstanceId,
    array_object: ArrayObjectHandle,
    transform: Box<dyn Transform>,
    uv: Mat3,
}

impl InstanceSingle {
    pub fn new(
        id: InstanceId,
        array_object: ArrayObjectHandle,
        transform: impl Transform + 'static,
    ) -> Self {
        Self {
            id,
            array_object,
            transform: Box::new(transform),
            uv: Mat3::IDENTITY,
        }
    }

    pub fn with_uv(mut self, uv: Mat3) -> Self {
        self.uv = uv;
        self
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn array_object(&self) -> ArrayObjectHandle {
        self.array_object
    }

    pub fn transform(&self) -> &dyn Transform {
        self.transform.as_ref()
    }

    pub fn set_transform(&mut self, transform: impl Transform + 'static) {
        self.transform = Box::new(transform);
    }

    pub fn uv(&self) -> Mat3 {
        self.uv
    }
}
