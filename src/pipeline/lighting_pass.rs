//! Deferred lighting pass
//!
//! Draws the volume of every visible light over the G-buffer and
//! accumulates the result into the bound light target. A group's lights are
//! restricted by stencil to the pixels its opaque instances wrote. A clip
//! group additionally restricts its lights to the inside of the clipping
//! volume, marked in a dedicated stencil bit while the clip group is open.

use glam::Mat4;

use crate::backend::{
    ArrayObjectHandle, CompareFunction, GraphicsBackend, ShaderId, StencilOperation,
    StencilState, TextureUnit, UniformValue,
};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::draw;
use crate::pipeline::gbuffer_pass::GROUP_STENCIL_MASK;
use crate::pipeline::stencil_pass::ALLOWED_STENCIL_BIT;
use crate::resources::{RenderTarget, TextureUnitContext};
use crate::scene::{
    ConsumerProtocol, InstanceSingle, Light, LightProjective, LightSphericalVolume,
    MatricesObserver, SceneLightsClipGroupConsumer, SceneLightsConsumer,
    SceneLightsGroupConsumer, SceneLightsSectionConsumer,
};
use crate::shadow::ShadowMapContext;

/// Stencil bit marking the inside of the open clip volume
pub const CLIP_STENCIL_BIT: u32 = 0x40;

const GBUFFER_SAMPLERS: [&str; 3] = ["gbuffer_albedo", "gbuffer_normal", "gbuffer_specular"];

/// Stencil state passing only where `reference` matches the group, allowed
/// and clip bits
fn light_stencil(reference: u32) -> StencilState {
    StencilState {
        compare: CompareFunction::Equal,
        reference,
        read_mask: ALLOWED_STENCIL_BIT | CLIP_STENCIL_BIT | GROUP_STENCIL_MASK,
        write_mask: 0,
        pass_op: StencilOperation::Keep,
    }
}

#[derive(Debug, Clone, Copy)]
struct ClipVolume {
    array: ArrayObjectHandle,
    model_view: Mat4,
}

/// Deferred lighting pass
pub struct LightingPass<'f, 's> {
    backend: &'f mut dyn GraphicsBackend,
    tc: &'f TextureUnitContext,
    observer: &'f MatricesObserver<'f>,
    gbuffer: &'f RenderTarget,
    shadows: &'f ShadowMapContext<'s>,
    clip_shader: ShaderId,
    protocol: ConsumerProtocol,
    /// Units holding the G-buffer while the pass runs, parent of the
    /// per-light shadow map contexts
    gbuffer_context: Option<TextureUnitContext>,
    gbuffer_units: Vec<(&'static str, TextureUnit)>,
    clip: Option<ClipVolume>,
    lights: usize,
}

impl<'f, 's> LightingPass<'f, 's> {
    pub fn new(
        backend: &'f mut dyn GraphicsBackend,
        tc: &'f TextureUnitContext,
        observer: &'f MatricesObserver<'f>,
        gbuffer: &'f RenderTarget,
        shadows: &'f ShadowMapContext<'s>,
        clip_shader: ShaderId,
    ) -> Self {
        Self {
            backend,
            tc,
            observer,
            gbuffer,
            shadows,
            clip_shader,
            protocol: ConsumerProtocol::new(),
            gbuffer_context: None,
            gbuffer_units: Vec::new(),
            clip: None,
            lights: 0,
        }
    }

    /// Number of lights drawn so far
    pub fn light_count(&self) -> usize {
        self.lights
    }

    fn bind_gbuffer(&mut self) -> RenderResult<()> {
        let gbuffer = self.gbuffer;
        let context = self.tc.new_child()?;
        let textures = gbuffer
            .color_textures()
            .iter()
            .copied()
            .zip(GBUFFER_SAMPLERS)
            .map(|(texture, sampler)| (sampler, texture))
            .chain(gbuffer.depth_texture().map(|t| ("gbuffer_depth", t)));
        let mut units = Vec::new();
        let mut bound = Ok(());
        for (sampler, texture) in textures {
            match context.bind_texture(self.backend, texture) {
                Ok(unit) => units.push((sampler, unit)),
                Err(err) => {
                    bound = Err(err);
                    break;
                }
            }
        }
        self.gbuffer_context = Some(context);
        self.gbuffer_units = units;
        bound
    }

    fn draw_clip_volume(&mut self, clip: ClipVolume, state: StencilState) {
        self.backend.set_stencil_state(Some(state));
        self.backend.set_shader(self.clip_shader);
        draw::set_observer_uniforms(self.backend, self.observer);
        self.backend
            .set_uniform("transform_modelview", UniformValue::Mat4(clip.model_view));
        self.backend.bind_array_object(clip.array);
        self.backend.draw_elements();
    }

    fn set_light_uniforms(&mut self, color: glam::Vec3, intensity: f32, falloff: f32) {
        self.backend
            .set_uniform("light_color", UniformValue::Vec3(color));
        self.backend
            .set_uniform("light_intensity", UniformValue::Float(intensity));
        self.backend
            .set_uniform("light_falloff", UniformValue::Float(falloff));
    }

    fn draw_projective(&mut self, light: &Light, projective: &LightProjective) -> RenderResult<()> {
        let observer = self.observer;
        let shadows = self.shadows;
        observer.with_projective_light(projective, |matrices| {
            self.backend.set_uniform(
                "transform_modelview",
                UniformValue::Mat4(matrices.model_view()),
            );
            self.backend.set_uniform(
                "transform_light_view",
                UniformValue::Mat4(matrices.projective_view()),
            );
            self.backend.set_uniform(
                "transform_light_projection",
                UniformValue::Mat4(matrices.projective_projection()),
            );
            self.backend.set_uniform(
                "transform_eye_to_light_eye",
                UniformValue::Mat4(matrices.eye_to_light_eye()),
            );
            self.set_light_uniforms(projective.color, projective.intensity, projective.falloff);

            let Some(shadow) = projective.shadow.as_ref() else {
                self.backend.draw_elements();
                return Ok(());
            };
            let map = shadows.get(light)?;
            let Some(texture) = map.texture() else {
                self.backend.draw_elements();
                return Ok(());
            };
            let parent = self
                .gbuffer_context
                .as_ref()
                .ok_or(RenderError::ContextNotActive)?;
            parent.with_child(self.backend, |backend, child| {
                let unit = child.bind_texture(backend, texture)?;
                backend.set_uniform("shadow_map", UniformValue::Sampler(unit));
                backend.set_uniform(
                    "shadow_minimum_factor",
                    UniformValue::Float(shadow.minimum_factor),
                );
                backend.set_uniform(
                    "shadow_minimum_variance",
                    UniformValue::Float(shadow.minimum_variance),
                );
                backend.set_uniform(
                    "shadow_light_bleed_reduction",
                    UniformValue::Float(shadow.light_bleed_reduction),
                );
                backend.set_uniform(
                    "shadow_depth_coefficient",
                    UniformValue::Float(shadow.depth_coefficient),
                );
                backend.draw_elements();
                Ok(())
            })
        })
    }

    fn draw_volume(&mut self, volume: &LightSphericalVolume) -> RenderResult<()> {
        let observer = self.observer;
        observer.with_volume_light(volume, |matrices| {
            self.backend.set_uniform(
                "transform_modelview",
                UniformValue::Mat4(matrices.model_view()),
            );
            self.backend
                .set_uniform("light_position", UniformValue::Vec3(volume.position));
            self.backend
                .set_uniform("light_radius", UniformValue::Float(volume.radius));
            self.set_light_uniforms(volume.color, volume.intensity, volume.falloff);
            self.backend.draw_elements();
            Ok(())
        })
    }
}

impl SceneLightsSectionConsumer for LightingPass<'_, '_> {
    fn on_light_single_shader_start(&mut self, shader: ShaderId) -> RenderResult<()> {
        self.protocol.require_group()?;
        self.backend.set_shader(shader);
        draw::set_observer_uniforms(self.backend, self.observer);
        for (sampler, unit) in &self.gbuffer_units {
            self.backend
                .set_uniform(sampler, UniformValue::Sampler(*unit));
        }
        Ok(())
    }

    fn on_light_single_array_start(&mut self, array: ArrayObjectHandle) -> RenderResult<()> {
        self.backend.bind_array_object(array);
        Ok(())
    }

    fn on_light_single(&mut self, light: &Light) -> RenderResult<()> {
        self.protocol.require_group()?;
        match light {
            Light::Projective(projective) => self.draw_projective(light, projective)?,
            Light::Volume(volume) => self.draw_volume(volume)?,
        }
        self.lights += 1;
        Ok(())
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        let group = self.protocol.finish_group()?;
        if let Some(clip) = self.clip.take() {
            // Clear the clip bit again so later clip groups start empty
            self.draw_clip_volume(
                clip,
                StencilState {
                    compare: CompareFunction::Always,
                    reference: 0,
                    read_mask: 0,
                    write_mask: CLIP_STENCIL_BIT,
                    pass_op: StencilOperation::Zero,
                },
            );
            log::trace!("Lighting: clip group of group {} finished", group);
        }
        self.backend.set_stencil_state(None);
        Ok(())
    }
}

impl SceneLightsClipGroupConsumer for LightingPass<'_, '_> {}

impl SceneLightsGroupConsumer for LightingPass<'_, '_> {}

impl SceneLightsConsumer for LightingPass<'_, '_> {
    fn on_start(&mut self) -> RenderResult<()> {
        self.protocol.start()?;
        self.bind_gbuffer()
    }

    fn on_start_clip_group(
        &mut self,
        volume: &InstanceSingle,
        group: u32,
    ) -> RenderResult<&mut dyn SceneLightsClipGroupConsumer> {
        self.protocol.start_group(group)?;
        let model_view = self
            .observer
            .with_transform(volume.transform(), volume.uv(), |m| Ok(m.model_view()))?;
        let clip = ClipVolume {
            array: volume.array_object(),
            model_view,
        };
        self.draw_clip_volume(
            clip,
            StencilState {
                compare: CompareFunction::Equal,
                reference: ALLOWED_STENCIL_BIT | group,
                read_mask: ALLOWED_STENCIL_BIT | GROUP_STENCIL_MASK,
                write_mask: CLIP_STENCIL_BIT,
                pass_op: StencilOperation::Replace,
            },
        );
        self.clip = Some(clip);
        self.backend.set_stencil_state(Some(light_stencil(
            ALLOWED_STENCIL_BIT | CLIP_STENCIL_BIT | group,
        )));
        Ok(self)
    }

    fn on_start_group(&mut self, group: u32) -> RenderResult<&mut dyn SceneLightsGroupConsumer> {
        self.protocol.start_group(group)?;
        self.backend
            .set_stencil_state(Some(light_stencil(ALLOWED_STENCIL_BIT | group)));
        Ok(self)
    }

    fn on_finish(&mut self) -> RenderResult<()> {
        let released = match self.gbuffer_context.take() {
            Some(context) => context.finish(self.backend),
            None => Ok(()),
        };
        self.gbuffer_units.clear();
        log::trace!("Lighting pass drew {} light(s)", self.lights);
        let finished = self.protocol.finish();
        released.and(finished)
    }
}
