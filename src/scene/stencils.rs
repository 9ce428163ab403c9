//! Stencil instances
//!
//! Stencil instances mark screen regions where lighting is either allowed
//! or disallowed. The [`StencilMode`] decides which, and with it how the
//! stencil buffer is cleared before the instances are drawn.

use std::collections::BTreeMap;

use crate::backend::ArrayObjectHandle;
use crate::error::{RenderError, RenderResult};
use crate::scene::ids::InstanceId;
use crate::scene::instance::InstanceSingle;

/// Meaning of the stenciled area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilMode {
    /// Only the stenciled area is rendered.
    InstancesArePositive,
    /// Everything except the stenciled area is rendered.
    #[default]
    InstancesAreNegative,
}

impl StencilMode {
    /// Value the stencil buffer is cleared to before drawing instances
    pub fn clear_value(&self) -> u32 {
        match self {
            StencilMode::InstancesArePositive => 0,
            StencilMode::InstancesAreNegative => 1,
        }
    }

    /// Value written wherever an instance covers a pixel
    pub fn instance_value(&self) -> u32 {
        match self {
            StencilMode::InstancesArePositive => 1,
            StencilMode::InstancesAreNegative => 0,
        }
    }
}

/// Receiver of the stencil instances of a frame
pub trait SceneStencilsConsumer {
    fn on_start(&mut self, mode: StencilMode) -> RenderResult<()>;

    fn on_instance_single_array_start(&mut self, _array: ArrayObjectHandle) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()>;

    fn on_finish(&mut self) -> RenderResult<()>;
}

/// Stencil instances visible this frame
#[derive(Debug, Default)]
pub struct SceneStencils<'a> {
    mode: StencilMode,
    instances: BTreeMap<InstanceId, &'a InstanceSingle>,
}

impl<'a> SceneStencils<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> StencilMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StencilMode) {
        self.mode = mode;
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn add(&mut self, instance: &'a InstanceSingle) -> RenderResult<()> {
        if self.instances.contains_key(&instance.id()) {
            return Err(RenderError::InstanceAlreadyVisible(instance.id()));
        }
        self.instances.insert(instance.id(), instance);
        Ok(())
    }

    /// Remove every instance and restore the default mode.
    pub fn reset(&mut self) {
        self.instances.clear();
        self.mode = StencilMode::default();
    }

    /// Replay the instances ordered by mesh then id. `on_finish` is called
    /// even if an earlier callback fails.
    pub fn execute(&self, consumer: &mut dyn SceneStencilsConsumer) -> RenderResult<()> {
        consumer.on_start(self.mode)?;
        let result = self.execute_body(consumer);
        let finished = consumer.on_finish();
        result.and(finished)
    }

    fn execute_body(&self, consumer: &mut dyn SceneStencilsConsumer) -> RenderResult<()> {
        let mut sorted: Vec<&InstanceSingle> = self.instances.values().copied().collect();
        sorted.sort_by_key(|i| (i.array_object(), i.id()));
        let mut current = None;
        for instance in sorted {
            if current != Some(instance.array_object()) {
                current = Some(instance.array_object());
                consumer.on_instance_single_array_start(instance.array_object())?;
            }
            consumer.on_instance_single(instance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::transform::TransformIdentity;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SceneStencilsConsumer for Recorder {
        fn on_start(&mut self, mode: StencilMode) -> RenderResult<()> {
            self.events.push(format!("start clear={}", mode.clear_value()));
            Ok(())
        }

        fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()> {
            self.events.push(format!("instance {}", instance.id().0));
            Ok(())
        }

        fn on_finish(&mut self) -> RenderResult<()> {
            self.events.push("finish".into());
            Ok(())
        }
    }

    #[test]
    fn test_mode_values() {
        assert_eq!(StencilMode::default(), StencilMode::InstancesAreNegative);
        let positive = StencilMode::InstancesArePositive;
        assert_ne!(positive.clear_value(), positive.instance_value());
        let negative = StencilMode::InstancesAreNegative;
        assert_eq!(negative.clear_value(), positive.instance_value());
    }

    #[test]
    fn test_execute_sorted() {
        let a = InstanceSingle::new(InstanceId(1), ArrayObjectHandle(2), TransformIdentity);
        let b = InstanceSingle::new(InstanceId(2), ArrayObjectHandle(1), TransformIdentity);
        let mut stencils = SceneStencils::new();
        stencils.set_mode(StencilMode::InstancesArePositive);
        stencils.add(&a).unwrap();
        stencils.add(&b).unwrap();
        assert!(stencils.add(&a).is_err());

        let mut recorder = Recorder::default();
        stencils.execute(&mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec!["start clear=0", "instance 2", "instance 1", "finish"]
        );
    }
}
