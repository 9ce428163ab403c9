//! Visible lights
//!
//! Lights are added to numbered groups matching the opaque groups they
//! illuminate. A group may also own clip groups: lights restricted to the
//! volume of a clipping instance. Execution replays every clip group, then
//! every group, each section ordered by shader, mesh and light id.

use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{ArrayObjectHandle, ShaderId};
use crate::error::{RenderError, RenderResult};
use crate::scene::ids::LightId;
use crate::scene::instance::InstanceSingle;
use crate::scene::light::Light;
use crate::scene::opaques::{check_valid_group, MAXIMUM_GROUPS};

/// Receiver of the lights in one group or clip group
pub trait SceneLightsSectionConsumer {
    fn on_light_single_shader_start(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    /// Called when consecutive lights switch volume mesh.
    fn on_light_single_array_start(&mut self, _array: ArrayObjectHandle) -> RenderResult<()> {
        Ok(())
    }

    fn on_light_single(&mut self, light: &Light) -> RenderResult<()>;

    fn on_light_single_shader_finish(&mut self, _shader: ShaderId) -> RenderResult<()> {
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()>;
}

/// Receiver of the lights of one clip group
pub trait SceneLightsClipGroupConsumer: SceneLightsSectionConsumer {}

/// Receiver of the lights of one group
pub trait SceneLightsGroupConsumer: SceneLightsSectionConsumer {}

/// Receiver of the lights of a frame
pub trait SceneLightsConsumer {
    fn on_start(&mut self) -> RenderResult<()>;

    fn on_start_clip_group(
        &mut self,
        volume: &InstanceSingle,
        group: u32,
    ) -> RenderResult<&mut dyn SceneLightsClipGroupConsumer>;

    fn on_start_group(&mut self, group: u32) -> RenderResult<&mut dyn SceneLightsGroupConsumer>;

    fn on_finish(&mut self) -> RenderResult<()>;
}

/// Handle to a clip group, invalidated by [`SceneLights::reset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipGroupId {
    index: usize,
    generation: u64,
}

type ByShader<'a> = BTreeMap<ShaderId, Vec<&'a Light>>;

#[derive(Debug)]
struct ClipGroup<'a> {
    volume: &'a InstanceSingle,
    group: u32,
    lights: ByShader<'a>,
}

#[derive(Debug, Default)]
struct LightGroup<'a> {
    visible: BTreeSet<LightId>,
    lights: ByShader<'a>,
}

/// Lights visible this frame
#[derive(Debug)]
pub struct SceneLights<'a> {
    maximum_groups: u32,
    generation: u64,
    groups: BTreeMap<u32, LightGroup<'a>>,
    clip_groups: Vec<ClipGroup<'a>>,
}

impl<'a> Default for SceneLights<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SceneLights<'a> {
    pub fn new() -> Self {
        Self::with_maximum_groups(MAXIMUM_GROUPS)
    }

    pub fn with_maximum_groups(maximum_groups: u32) -> Self {
        Self {
            maximum_groups,
            generation: 0,
            groups: BTreeMap::new(),
            clip_groups: Vec::new(),
        }
    }

    pub fn light_count(&self) -> usize {
        self.groups.values().map(|g| g.visible.len()).sum()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().filter(|g| !g.lights.is_empty()).count()
    }

    pub fn clip_group_count(&self) -> usize {
        self.clip_groups.len()
    }

    /// Visible lights that cast shadows, once each, ordered by id
    pub fn shadow_casters(&self) -> Vec<&'a Light> {
        let groups = self.groups.values().flat_map(|g| g.lights.values());
        let clips = self.clip_groups.iter().flat_map(|c| c.lights.values());
        let casters: BTreeMap<LightId, &'a Light> = groups
            .chain(clips)
            .flatten()
            .filter(|light| light.shadow().is_some())
            .map(|light| (light.id(), *light))
            .collect();
        casters.into_values().collect()
    }

    fn mark_visible(&mut self, light: &Light, group: u32) -> RenderResult<&mut LightGroup<'a>> {
        let group = check_valid_group(group, self.maximum_groups)?;
        let entry = self.groups.entry(group).or_default();
        if !entry.visible.insert(light.id()) {
            return Err(RenderError::LightAlreadyVisible {
                light: light.id(),
                group,
            });
        }
        Ok(entry)
    }

    /// Add `light` to `group`.
    pub fn add(&mut self, light: &'a Light, group: u32) -> RenderResult<()> {
        let entry = self.mark_visible(light, group)?;
        entry.lights.entry(light.shader()).or_default().push(light);
        log::trace!("Lights: {:?} in group {}", light.id(), group);
        Ok(())
    }

    /// Open a clip group of `group` bounded by `volume`.
    pub fn new_clip_group(
        &mut self,
        volume: &'a InstanceSingle,
        group: u32,
    ) -> RenderResult<ClipGroupId> {
        let group = check_valid_group(group, self.maximum_groups)?;
        self.groups.entry(group).or_default();
        self.clip_groups.push(ClipGroup {
            volume,
            group,
            lights: BTreeMap::new(),
        });
        Ok(ClipGroupId {
            index: self.clip_groups.len() - 1,
            generation: self.generation,
        })
    }

    /// Add `light` to a clip group.
    pub fn add_to_clip_group(&mut self, clip: ClipGroupId, light: &'a Light) -> RenderResult<()> {
        if clip.generation != self.generation || clip.index >= self.clip_groups.len() {
            return Err(RenderError::ClipGroupDeleted);
        }
        let group = self.clip_groups[clip.index].group;
        self.mark_visible(light, group)?;
        self.clip_groups[clip.index]
            .lights
            .entry(light.shader())
            .or_default()
            .push(light);
        log::trace!("Lights: {:?} in clip group of group {}", light.id(), group);
        Ok(())
    }

    /// Remove every light and invalidate every clip group.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.clip_groups.clear();
        self.generation += 1;
    }

    /// Replay the visible lights to `consumer`. `on_finish` is called even
    /// if an earlier callback fails; the first error wins.
    pub fn execute(&self, consumer: &mut dyn SceneLightsConsumer) -> RenderResult<()> {
        consumer.on_start()?;
        let result = self.execute_body(consumer);
        let finished = consumer.on_finish();
        result.and(finished)
    }

    fn execute_body(&self, consumer: &mut dyn SceneLightsConsumer) -> RenderResult<()> {
        for clip in &self.clip_groups {
            if clip.lights.is_empty() {
                continue;
            }
            let section = consumer.on_start_clip_group(clip.volume, clip.group)?;
            execute_section(section, &clip.lights)?;
        }
        for (group, contents) in &self.groups {
            if contents.lights.is_empty() {
                continue;
            }
            let section = consumer.on_start_group(*group)?;
            execute_section(section, &contents.lights)?;
        }
        Ok(())
    }
}

fn execute_section<C: SceneLightsSectionConsumer + ?Sized>(
    section: &mut C,
    lights: &ByShader<'_>,
) -> RenderResult<()> {
    let result = replay_section(section, lights);
    let finished = section.on_finish();
    result.and(finished)
}

fn replay_section<C: SceneLightsSectionConsumer + ?Sized>(
    section: &mut C,
    lights: &ByShader<'_>,
) -> RenderResult<()> {
    for (shader, lights) in lights {
        section.on_light_single_shader_start(*shader)?;
        let mut sorted: Vec<&Light> = lights.clone();
        sorted.sort_by_key(|l| (l.array_object(), l.id()));
        let mut current = None;
        for light in sorted {
            if current != Some(light.array_object()) {
                current = Some(light.array_object());
                section.on_light_single_array_start(light.array_object())?;
            }
            section.on_light_single(light)?;
        }
        section.on_light_single_shader_finish(*shader)?;
    }
    Ok(())
}
