//! Surface materials
//!
//! A material pairs a shader with the textures and constants it reads. The
//! scene collections batch instances by shader, then by material, so a
//! material's bindings are applied once per run of instances sharing it.

use glam::{Vec3, Vec4};

use crate::backend::{GraphicsBackend, ShaderId, TextureHandle, UniformValue};
use crate::error::RenderResult;
use crate::resources::texture_unit::TextureUnitContext;
use crate::scene::MaterialId;

/// Material used by opaque and mask instances
#[derive(Debug, Clone)]
pub struct Material {
    pub id: MaterialId,
    pub shader: ShaderId,
    pub albedo: Vec4,
    pub specular: Vec3,
    pub specular_exponent: f32,
    pub emission: f32,
    /// Sampler uniform name and texture
    pub textures: Vec<(String, TextureHandle)>,
}

impl Material {
    pub fn new(id: MaterialId, shader: ShaderId) -> Self {
        Self {
            id,
            shader,
            albedo: Vec4::ONE,
            specular: Vec3::ZERO,
            specular_exponent: 64.0,
            emission: 0.0,
            textures: Vec::new(),
        }
    }

    pub fn with_albedo(mut self, albedo: Vec4) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_specular(mut self, color: Vec3, exponent: f32) -> Self {
        self.specular = color;
        self.specular_exponent = exponent;
        self
    }

    pub fn with_emission(mut self, emission: f32) -> Self {
        self.emission = emission;
        self
    }

    pub fn with_texture(mut self, sampler: &str, texture: TextureHandle) -> Self {
        self.textures.push((sampler.to_string(), texture));
        self
    }

    /// Bind this material's textures in `tc` and upload its constants to the
    /// active shader.
    pub fn bind(
        &self,
        backend: &mut dyn GraphicsBackend,
        tc: &TextureUnitContext,
    ) -> RenderResult<()> {
        for (sampler, texture) in &self.textures {
            let unit = tc.bind_texture(backend, *texture)?;
            backend.set_uniform(sampler, UniformValue::Sampler(unit));
        }
        backend.set_uniform("material_albedo", UniformValue::Vec4(self.albedo));
        backend.set_uniform(
            "material_specular",
            UniformValue::Vec4(self.specular.extend(self.specular_exponent)),
        );
        backend.set_uniform("material_emission", UniformValue::Float(self.emission));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, DummyBackend, TextureUnit};
    use crate::resources::TextureUnitAllocator;

    #[test]
    fn test_bind_allocates_units() {
        let mut backend = DummyBackend::new(4);
        let allocator = TextureUnitAllocator::for_backend(2, &backend);
        let root = allocator.root_context().unwrap();

        let material = Material::new(MaterialId(1), ShaderId(3))
            .with_texture("albedo_texture", TextureHandle(20))
            .with_texture("normal_texture", TextureHandle(21));
        material.bind(&mut backend, &root).unwrap();

        assert_eq!(backend.bound_texture(TextureUnit(1)), Some(TextureHandle(21)));
        assert!(backend
            .commands()
            .contains(&BackendCommand::SetUniform("material_albedo".to_string())));
        assert_eq!(root.remaining_units().unwrap(), 2);
    }
}
