//! Common utilities for integration tests.
//!
//! Shared fixtures over the recording [`DummyBackend`] and a consumer that
//! records every scene callback it receives.

#![allow(dead_code)]

use deferred_scene::backend::{ArrayObjectHandle, BackendCommand, DummyBackend, ShaderId};
use deferred_scene::error::RenderResult;
use deferred_scene::pipeline::{DeferredShaders, MaskShaders};
use deferred_scene::resources::Material;
use deferred_scene::scene::{
    InstanceBatchedDynamic, InstanceSingle, Light, SceneLightsClipGroupConsumer,
    SceneLightsConsumer, SceneLightsGroupConsumer, SceneLightsSectionConsumer,
    SceneOpaquesConsumer,
};

/// Install a test logger once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Dummy backend with `units` texture units and logging enabled.
pub fn backend(units: u32) -> DummyBackend {
    init_logging();
    DummyBackend::new(units)
}

pub fn array(raw: u64) -> ArrayObjectHandle {
    ArrayObjectHandle::from_raw(raw)
}

pub fn shaders() -> DeferredShaders {
    DeferredShaders {
        stencil: ShaderId(100),
        clip_volume: ShaderId(101),
        depth_single: ShaderId(102),
        depth_batched: ShaderId(103),
        mask: MaskShaders {
            single: ShaderId(104),
            batched: ShaderId(105),
        },
    }
}

/// Number of recorded commands matching `predicate`.
pub fn count_commands(
    backend: &DummyBackend,
    predicate: impl Fn(&BackendCommand) -> bool,
) -> usize {
    backend.commands().iter().filter(|c| predicate(c)).count()
}

/// Consumer recording every opaque and light callback as a string.
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    pub events: Vec<String>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneOpaquesConsumer for RecordingConsumer {
    fn on_start(&mut self) -> RenderResult<()> {
        self.events.push("opaques start".into());
        Ok(())
    }

    fn on_instance_batched_update(
        &mut self,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()> {
        self.events.push(format!("update {}", instance.id().0));
        Ok(())
    }

    fn on_start_group(&mut self, group: u32) -> RenderResult<()> {
        self.events.push(format!("group {}", group));
        Ok(())
    }

    fn on_instance_batched(
        &mut self,
        material: &Material,
        instance: &InstanceBatchedDynamic,
    ) -> RenderResult<()> {
        self.events
            .push(format!("batched {} material {}", instance.id().0, material.id.0));
        Ok(())
    }

    fn on_instance_single(
        &mut self,
        material: &Material,
        instance: &InstanceSingle,
    ) -> RenderResult<()> {
        self.events
            .push(format!("single {} material {}", instance.id().0, material.id.0));
        Ok(())
    }

    fn on_finish_group(&mut self, group: u32) -> RenderResult<()> {
        self.events.push(format!("end group {}", group));
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        self.events.push("opaques finish".into());
        Ok(())
    }
}

impl SceneLightsSectionConsumer for RecordingConsumer {
    fn on_light_single(&mut self, light: &Light) -> RenderResult<()> {
        self.events.push(format!("light {}", light.id().0));
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        self.events.push("end section".into());
        Ok(())
    }
}

impl SceneLightsClipGroupConsumer for RecordingConsumer {}

impl SceneLightsGroupConsumer for RecordingConsumer {}

impl SceneLightsConsumer for RecordingConsumer {
    fn on_start(&mut self) -> RenderResult<()> {
        self.events.push("lights start".into());
        Ok(())
    }

    fn on_start_clip_group(
        &mut self,
        volume: &InstanceSingle,
        group: u32,
    ) -> RenderResult<&mut dyn SceneLightsClipGroupConsumer> {
        self.events
            .push(format!("clip group {} volume {}", group, volume.id().0));
        Ok(self)
    }

    fn on_start_group(&mut self, group: u32) -> RenderResult<&mut dyn SceneLightsGroupConsumer> {
        self.events.push(format!("light group {}", group));
        Ok(self)
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        self.events.push("lights finish".into());
        Ok(())
    }
}
