//! Light types for the scene
//!
//! Lights form a closed set of variants. Code that needs per-variant
//! behaviour goes through [`Light::dispatch`], which takes one continuation
//! per variant.

use glam::{Mat4, Vec3};

use crate::backend::{ArrayObjectHandle, ShaderId};
use crate::resources::{Area, RenderTargetDescription};
use crate::scene::ids::{LightId, ShadowId};
use crate::scene::projection::Projection;
use crate::scene::transform::{TransformContext, TransformOrthogonal, TransformView};

/// Variance shadow map parameters of a projective light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowDepthVariance {
    pub shadow_id: ShadowId,
    /// Description of the depth-variance target rendered for this shadow
    pub map_description: RenderTargetDescription,
    /// Lowest attenuation a shadowed point can receive
    pub minimum_factor: f32,
    pub minimum_variance: f32,
    pub light_bleed_reduction: f32,
    pub depth_coefficient: f32,
}

impl ShadowDepthVariance {
    pub fn new(shadow_id: ShadowId, map_description: RenderTargetDescription) -> Self {
        Self {
            shadow_id,
            map_description,
            minimum_factor: 0.2,
            minimum_variance: 0.00002,
            light_bleed_reduction: 0.2,
            depth_coefficient: 30.0,
        }
    }

    /// Shadow with a square `size` x `size` map of the default layout
    pub fn with_map_size(shadow_id: ShadowId, size: u32) -> crate::error::RenderResult<Self> {
        Ok(Self::new(
            shadow_id,
            RenderTargetDescription::depth_variance(Area::of_size(size, size)?),
        ))
    }

    pub fn with_minimum_factor(mut self, factor: f32) -> Self {
        self.minimum_factor = factor.clamp(0.0, 1.0);
        self
    }
}

/// A light projecting through a frustum, optionally casting a shadow
#[derive(Debug, Clone)]
pub struct LightProjective {
    pub id: LightId,
    pub shader: ShaderId,
    /// Frustum volume mesh
    pub array_object: ArrayObjectHandle,
    pub color: Vec3,
    pub intensity: f32,
    pub falloff: f32,
    pub transform: TransformView,
    pub projection: Projection,
    pub shadow: Option<ShadowDepthVariance>,
}

impl LightProjective {
    pub fn new(
        id: LightId,
        shader: ShaderId,
        array_object: ArrayObjectHandle,
        transform: TransformView,
        projection: Projection,
    ) -> Self {
        Self {
            id,
            shader,
            array_object,
            color: Vec3::ONE,
            intensity: 1.0,
            falloff: 1.0,
            transform,
            projection,
            shadow: None,
        }
    }

    pub fn with_color(mut self, color: Vec3, intensity: f32) -> Self {
        self.color = color;
        self.intensity = intensity;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowDepthVariance) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn view_matrix(&self, ctx: &mut TransformContext) -> Mat4 {
        self.transform.view_matrix(ctx)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }
}

/// A light filling a sphere
#[derive(Debug, Clone)]
pub struct LightSphericalVolume {
    pub id: LightId,
    pub shader: ShaderId,
    /// Unit sphere mesh, scaled by the radius
    pub array_object: ArrayObjectHandle,
    pub color: Vec3,
    pub intensity: f32,
    pub falloff: f32,
    pub position: Vec3,
    pub radius: f32,
}

impl LightSphericalVolume {
    pub fn new(
        id: LightId,
        shader: ShaderId,
        array_object: ArrayObjectHandle,
        position: Vec3,
        radius: f32,
    ) -> Self {
        Self {
            id,
            shader,
            array_object,
            color: Vec3::ONE,
            intensity: 1.0,
            falloff: 1.0,
            position,
            radius,
        }
    }

    pub fn with_color(mut self, color: Vec3, intensity: f32) -> Self {
        self.color = color;
        self.intensity = intensity;
        self
    }

    /// Transform placing the unit sphere mesh
    pub fn volume_transform(&self) -> TransformOrthogonal {
        TransformOrthogonal::from_translation_scale(self.position, self.radius)
    }
}

/// A light of any supported variant
#[derive(Debug, Clone)]
pub enum Light {
    Projective(LightProjective),
    Volume(LightSphericalVolume),
}

impl Light {
    /// Run the continuation matching this light's variant.
    pub fn dispatch<T>(
        &self,
        on_projective: impl FnOnce(&LightProjective) -> T,
        on_volume: impl FnOnce(&LightSphericalVolume) -> T,
    ) -> T {
        match self {
            Light::Projective(light) => on_projective(light),
            Light::Volume(light) => on_volume(light),
        }
    }

    pub fn id(&self) -> LightId {
        self.dispatch(|l| l.id, |l| l.id)
    }

    pub fn shader(&self) -> ShaderId {
        self.dispatch(|l| l.shader, |l| l.shader)
    }

    pub fn array_object(&self) -> ArrayObjectHandle {
        self.dispatch(|l| l.array_object, |l| l.array_object)
    }

    pub fn shadow(&self) -> Option<&ShadowDepthVariance> {
        match self {
            Light::Projective(light) => light.shadow.as_ref(),
            Light::Volume(_) => None,
        }
    }
}

impl From<LightProjective> for Light {
    fn from(light: LightProjective) -> Self {
        Light::Projective(light)
    }
}

impl From<LightSphericalVolume> for Light {
    fn from(light: LightSphericalVolume) -> Self {
        Light::Volume(light)
    }
}
