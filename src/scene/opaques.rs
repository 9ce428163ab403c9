//! Visible opaque instances
//!
//! [`SceneOpaques`] collects the opaque instances visible this frame, each
//! with a material and a group number, and replays them to a
//! [`SceneOpaquesConsumer`] ordered so that shader and material changes are
//! as rare as possible.

use std::collections::BTreeMap;

use crate::backend::{ArrayObjectHandle, ShaderId};
use crate::error::{RenderError, RenderResult};
use crate::resources::Material;
use crate::scene::batch::InstanceBatchedDynamic;
use crate::scene::ids::{InstanceId, MaterialId};
use crate::scene::instance::InstanceSingle;

/// Exclusive upper bound on group numbers
pub const MAXIMUM_GROUPS: u32 = 16;

/// Group used when the caller does not pick one
pub const DEFAULT_GROUP: u32 = 1;

/// Fail unless `1 <= group < maximum`.
pub fn check_valid_group(group: u32, maximum: u32) -> RenderResult<u32> {
    if group >= 1 && group < maximum {
        Ok(group)
    } else {
        Err(RenderError::InvalidGroup { group, maximum })
    }
}

/// Receiver of the opaque instances of a frame
///
/// Call order: `on_start`, `on_instance_batched_update` for every batched
/// instance, then per non-empty group `on_start_group`, the batched
/// instances, the single instances and `on_finish_group`, and finally
/// `on_finish`. Transition callbacks have empty defaults.
pub trait SceneOpaquesConsumer {
    fn on_start(&mut self) -> RenderResult<()>;

    /// Upload the transforms of a batched instance before any group is drawn.
    fn on_instance_batched_update(&mut self, instance: &InstanceBatchedDynamic)
        -> RenderResult<()>;

    fn on_start_group(&mut self, group: u32) -> RenderResult<()>;

    fn on_instance_batched_shader_start(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_batched_material_start(&mut self, _material: &Material) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_batched(
        &mut self,
        material: &Material,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()>;

    fn on_instance_batched_material_finish(&mut self, _material: &Material) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_batched_shader_finish(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single_shader_start(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single_material_start(&mut self, _material: &Material) -> RenderResult<()> {
        Ok(())
    }

    /// Called when consecutive single instances switch mesh.
    fn on_instance_single_array_start(&mut self, _array: ArrayObjectHandle) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single(&mut self, material: &Material, instance: &InstanceSingle)
        -> RenderResult<()>;

    fn on_instance_single_material_finish(&mut self, _material: &Material) -> RenderResult<()> {
        Ok(())
    }

    fn on_instance_single_shader_finish(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    fn on_finish_group(&mut self, group: u32) -> RenderResult<()>;

    fn on_finish(&mut self) -> RenderResult<()>;
}

type ByShader<'a, I> = BTreeMap<ShaderId, BTreeMap<MaterialId, (&'a Material, Vec<&'a I>)>>;

#[derive(Debug)]
struct OpaqueGroup<'a> {
    batched: ByShader<'a, InstanceBatchedDynamic>,
    singles: ByShader<'a, InstanceSingle>,
}

impl<'a> Default for OpaqueGroup<'a> {
    fn default() -> Self {
        Self {
            batched: BTreeMap::new(),
            singles: BTreeMap::new(),
        }
    }
}

impl<'a> OpaqueGroup<'a> {
    fn is_empty(&self) -> bool {
        self.batched.is_empty() && self.singles.is_empty()
    }
}

/// Opaque instances visible this frame
#[derive(Debug)]
pub struct SceneOpaques<'a> {
    maximum_groups: u32,
    visible: BTreeMap<InstanceId, u32>,
    batched: BTreeMap<InstanceId, &'a InstanceBatchedDynamic>,
    groups: BTreeMap<u32, OpaqueGroup<'a>>,
}

impl<'a> Default for SceneOpaques<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SceneOpaques<'a> {
    pub fn new() -> Self {
        Self::with_maximum_groups(MAXIMUM_GROUPS)
    }

    pub fn with_maximum_groups(maximum_groups: u32) -> Self {
        Self {
            maximum_groups,
            visible: BTreeMap::new(),
            batched: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    pub fn maximum_groups(&self) -> u32 {
        self.maximum_groups
    }

    pub fn instance_count(&self) -> usize {
        self.visible.len()
    }

    /// Group an instance was added to
    pub fn group_of(&self, instance: InstanceId) -> Option<u32> {
        self.visible.get(&instance).copied()
    }

    fn mark_visible(&mut self, instance: InstanceId, group: u32) -> RenderResult<u32> {
        let group = check_valid_group(group, self.maximum_groups)?;
        if self.visible.contains_key(&instance) {
            return Err(RenderError::InstanceAlreadyVisible(instance));
        }
        self.visible.insert(instance, group);
        Ok(group)
    }

    pub fn add_single(
        &mut self,
        instance: &'a InstanceSingle,
        material: &'a Material,
        group: u32,
    ) -> RenderResult<()> {
        let group = self.mark_visible(instance.id(), group)?;
        log::trace!("Opaques: single {:?} in group {}", instance.id(), group);
        self.groups
            .entry(group)
            .or_default()
            .singles
            .entry(material.shader)
            .or_default()
            .entry(material.id)
            .or_insert_with(|| (material, Vec::new()))
            .1
            .push(instance);
        Ok(())
    }

    pub fn add_batched(
        &mut self,
        instance: &'a InstanceBatchedDynamic,
        material: &'a Material,
        group: u32,
    ) -> RenderResult<()> {
        let group = self.mark_visible(instance.id(), group)?;
        log::trace!("Opaques: batched {:?} in group {}", instance.id(), group);
        self.batched.insert(instance.id(), instance);
        self.groups
            .entry(group)
            .or_default()
            .batched
            .entry(material.shader)
            .or_default()
            .entry(material.id)
            .or_insert_with(|| (material, Vec::new()))
            .1
            .push(instance);
        Ok(())
    }

    /// Remove every instance.
    pub fn reset(&mut self) {
        self.visible.clear();
        self.batched.clear();
        self.groups.clear();
    }

    /// Replay the visible instances to `consumer`. `on_finish` is called
    /// even if an earlier callback fails; the first error wins.
    pub fn execute(&self, consumer: &mut dyn SceneOpaquesConsumer) -> RenderResult<()> {
        consumer.on_start()?;
        let result = self.execute_body(consumer);
        let finished = consumer.on_finish();
        result.and(finished)
    }

    fn execute_body(&self, consumer: &mut dyn SceneOpaquesConsumer) -> RenderResult<()> {
        for instance in self.batched.values() {
            consumer.on_instance_batched_update(instance)?;
        }

        for (group, contents) in &self.groups {
            if contents.is_empty() {
                continue;
            }
            consumer.on_start_group(*group)?;

            for (shader, materials) in &contents.batched {
                consumer.on_instance_batched_shader_start(*shader)?;
                for (material, instances) in materials.values() {
                    consumer.on_instance_batched_material_start(material)?;
                    for instance in instances {
                        consumer.on_instance_batched(material, instance)?;
                    }
                    consumer.on_instance_batched_material_finish(material)?;
                }
                consumer.on_instance_batched_shader_finish(*shader)?;
            }

            for (shader, materials) in &contents.singles {
                consumer.on_instance_single_shader_start(*shader)?;
                for (material, instances) in materials.values() {
                    consumer.on_instance_single_material_start(material)?;
                    let mut sorted: Vec<&InstanceSingle> = instances.clone();
                    sorted.sort_by_key(|i| (i.array_object(), i.id()));
                    let mut current = None;
                    for instance in sorted {
                        if current != Some(instance.array_object()) {
                            current = Some(instance.array_object());
                            consumer.on_instance_single_array_start(instance.array_object())?;
                        }
                        consumer.on_instance_single(material, instance)?;
                    }
                    consumer.on_instance_single_material_finish(material)?;
                }
                consumer.on_instance_single_shader_finish(*shader)?;
            }

            consumer.on_finish_group(*group)?;
        }
        Ok(())
    }
}
