//! Untextured instance sets
//!
//! Masks and shadow casters only need geometry: no materials, no groups.
//! Both are plain [`InstanceSet`]s of single and batched instances.

use std::collections::BTreeMap;

use crate::backend::ArrayObjectHandle;
use crate::error::{RenderError, RenderResult};
use crate::scene::batch::InstanceBatchedDynamic;
use crate::scene::ids::InstanceId;
use crate::scene::instance::InstanceSingle;

/// Receiver of an [`InstanceSet`]
///
/// Call order: `on_start`, `on_instance_batched_update` for every batched
/// instance, the single instances ordered by mesh then id, the batched
/// instances, `on_finish`.
pub trait InstanceSetConsumer {
    fn on_start(&mut self) -> RenderResult<()>;

    fn on_instance_batched_update(&mut self, instance: &InstanceBatchedDynamic)
        -> RenderResult<()>;

    fn on_instance_single_array_start(&mut self, _array: ArrayObjectHandle) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single(&mut self, instance: &InstanceSingle) -> RenderResult<()>;

    fn on_instance_batched(&mut self, instance: &InstanceBatchedDynamic) -> RenderResult<()>;

    fn on_finish(&mut self) -> RenderResult<()>;
}

/// Set of single and batched instances drawn without materials
#[derive(Debug, Default)]
pub struct InstanceSet<'a> {
    singles: BTreeMap<InstanceId, &'a InstanceSingle>,
    batched: BTreeMap<InstanceId, &'a InstanceBatchedDynamic>,
}

/// Instances rendered into a mask
pub type MaskInstances<'a> = InstanceSet<'a>;

/// Instances rendered into shadow maps
pub type DepthInstances<'a> = InstanceSet<'a>;

impl<'a> InstanceSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.singles.len() + self.batched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_unique(&self, id: InstanceId) -> RenderResult<()> {
        if self.singles.contains_key(&id) || self.batched.contains_key(&id) {
            Err(RenderError::InstanceAlreadyVisible(id))
        } else {
            Ok(())
        }
    }

    pub fn add_single(&mut self, instance: &'a InstanceSingle) -> RenderResult<()> {
        self.check_unique(instance.id())?;
        self.singles.insert(instance.id(), instance);
        Ok(())
    }

    pub fn add_batched(&mut self, instance: &'a InstanceBatchedDynamic) -> RenderResult<()> {
        self.check_unique(instance.id())?;
        self.batched.insert(instance.id(), instance);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.singles.clear();
        self.batched.clear();
    }

    /// Replay the set to `consumer`. `on_finish` is called even if an
    /// earlier callback fails.
    pub fn execute(&self, consumer: &mut dyn InstanceSetConsumer) -> RenderResult<()> {
        consumer.on_start()?;
        let result = self.execute_body(consumer);
        let finished = consumer.on_finish();
        result.and(finished)
    }

    fn execute_body(&self, consumer: &mut dyn InstanceSetConsumer) -> RenderResult<()> {
        for instance in self.batched.values() {
            consumer.on_instance_batched_update(instance)?;
        }

        let mut sorted: Vec<&InstanceSingle> = self.singles.values().copied().collect();
        sorted.sort_by_key(|i| (i.array_object(), i.id()));
        let mut current = None;
        for instance in sorted {
            if current != Some(instance.array_object()) {
                current = Some(instance.array_object());
                consumer.on_instance_single_array_start(instance.array_object())?;
            }
            consumer.on_instance_single(instance)?;
        }

        for instance in self.batched.values() {
            consumer.on_instance_batched(instance)?;
        }
        Ok(())
    }
}
