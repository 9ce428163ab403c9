//! Graphics-resource API consumed by the scene pipeline
//!
//! The pipeline never talks to a GPU directly. Everything it needs from the
//! device (texture and buffer objects, texture unit binding, framebuffers,
//! shader activation and draws) goes through [`GraphicsBackend`].

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create array object: {0}")]
    ArrayObjectCreationFailed(String),
    #[error("Unknown handle: {0}")]
    UnknownHandle(u64),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of attached textures)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to an array object (vertex layout + index buffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayObjectHandle(pub(crate) u64);

/// Identity of a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

macro_rules! raw_handle {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Wrap a raw backend name.
                pub fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

raw_handle!(BufferHandle, TextureHandle, FramebufferHandle, ArrayObjectHandle);

/// A hardware texture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Main graphics-resource trait
///
/// Implementations are expected to be current on a single thread; none of
/// the methods suspend.
pub trait GraphicsBackend {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Texture units exposed by the device
    fn texture_units(&self) -> Vec<TextureUnit>;

    // Textures

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Bind a texture to a unit
    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle);

    /// Leave a unit with nothing bound
    fn unbind_texture(&mut self, unit: TextureUnit);

    /// Regenerate the mipmaps of the texture bound to `unit`
    fn regenerate_mipmaps(&mut self, unit: TextureUnit);

    // Buffers

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Array objects

    /// Create an array object that sources per-instance data from a buffer
    fn create_array_object(
        &mut self,
        desc: &ArrayObjectDescriptor,
    ) -> BackendResult<ArrayObjectHandle>;

    /// Destroy an array object
    fn destroy_array_object(&mut self, array: ArrayObjectHandle);

    /// Bind an array object for subsequent draws
    fn bind_array_object(&mut self, array: ArrayObjectHandle);

    // Framebuffers

    /// Create a framebuffer from attached textures
    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle>;

    /// Destroy a framebuffer
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Bind a framebuffer for drawing, `None` for the default framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Clear the bound framebuffer
    fn clear(&mut self, values: &ClearValues);

    /// Set viewport
    fn set_viewport(&mut self, viewport: Viewport);

    /// Set (or disable) stencil testing
    fn set_stencil_state(&mut self, state: Option<StencilState>);

    // Shaders and draws

    /// Activate a shader program
    fn set_shader(&mut self, shader: ShaderId);

    /// Upload a uniform to the active shader
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Draw the bound array object
    fn draw_elements(&mut self);

    /// Draw `instances` copies of the bound array object
    fn draw_elements_instanced(&mut self, instances: u32);
}
