//! Dummy graphics backend for testing and development.
//!
//! This backend doesn't talk to a device. It hands out fresh handles,
//! tracks which resources are alive and records every call in order, so
//! bind orders and resource leaks can be checked without GPU hardware.

use std::collections::{BTreeMap, BTreeSet};

use super::traits::*;
use super::types::*;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    BindTexture(TextureUnit, TextureHandle),
    UnbindTexture(TextureUnit),
    RegenerateMipmaps(TextureUnit),
    CreateBuffer(BufferHandle),
    WriteBuffer { buffer: BufferHandle, offset: u64, size: usize },
    DestroyBuffer(BufferHandle),
    CreateArrayObject(ArrayObjectHandle),
    DestroyArrayObject(ArrayObjectHandle),
    BindArrayObject(ArrayObjectHandle),
    CreateFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    Clear(ClearValues),
    Viewport(Viewport),
    StencilState(Option<StencilState>),
    SetShader(ShaderId),
    SetUniform(String),
    Draw,
    DrawInstanced(u32),
}

/// Dummy graphics backend.
#[derive(Debug)]
pub struct DummyBackend {
    units: u32,
    next_handle: u64,
    commands: Vec<BackendCommand>,
    textures: BTreeMap<u64, TextureDescriptor>,
    buffers: BTreeMap<u64, Vec<u8>>,
    framebuffers: BTreeSet<u64>,
    arrays: BTreeSet<u64>,
    bound: BTreeMap<u32, TextureHandle>,
    fail_texture_creation: bool,
}

impl DummyBackend {
    /// Create a new dummy backend exposing `units` texture units.
    pub fn new(units: u32) -> Self {
        Self {
            units,
            next_handle: 1,
            commands: Vec::new(),
            textures: BTreeMap::new(),
            buffers: BTreeMap::new(),
            framebuffers: BTreeSet::new(),
            arrays: BTreeSet::new(),
            bound: BTreeMap::new(),
            fail_texture_creation: false,
        }
    }

    /// Make every subsequent texture creation fail with `OutOfMemory`.
    pub fn set_fail_texture_creation(&mut self, fail: bool) {
        self.fail_texture_creation = fail;
    }

    /// Every call made so far, oldest first.
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_array_objects(&self) -> usize {
        self.arrays.len()
    }

    /// Descriptor a live texture was created with.
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Contents of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.as_slice())
    }

    /// Texture currently bound to `unit`, if any.
    pub fn bound_texture(&self, unit: TextureUnit) -> Option<TextureHandle> {
        self.bound.get(&unit.0).copied()
    }

    /// Number of draw calls (instanced or not) recorded so far.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, BackendCommand::Draw | BackendCommand::DrawInstanced(_)))
            .count()
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(8)
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &str {
        "Dummy Backend"
    }

    fn texture_units(&self) -> Vec<TextureUnit> {
        (0..self.units).map(TextureUnit).collect()
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if self.fail_texture_creation {
            return Err(BackendError::OutOfMemory);
        }
        let handle = TextureHandle(self.allocate_handle());
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.textures.insert(handle.0, desc.clone());
        self.commands.push(BackendCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.bound.retain(|_, bound| *bound != texture);
        self.commands.push(BackendCommand::DestroyTexture(texture));
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle) {
        log::trace!("DummyBackend: binding {:?} to {:?}", texture, unit);
        self.bound.insert(unit.0, texture);
        self.commands.push(BackendCommand::BindTexture(unit, texture));
    }

    fn unbind_texture(&mut self, unit: TextureUnit) {
        self.bound.remove(&unit.0);
        self.commands.push(BackendCommand::UnbindTexture(unit));
    }

    fn regenerate_mipmaps(&mut self, unit: TextureUnit) {
        self.commands.push(BackendCommand::RegenerateMipmaps(unit));
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.allocate_handle());
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.buffers.insert(handle.0, vec![0; desc.size as usize]);
        self.commands.push(BackendCommand::CreateBuffer(handle));
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = (start + data.len()).min(contents.len());
            if start < end {
                contents[start..end].copy_from_slice(&data[..end - start]);
            }
        }
        self.commands.push(BackendCommand::WriteBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.commands.push(BackendCommand::DestroyBuffer(buffer));
    }

    fn create_array_object(
        &mut self,
        desc: &ArrayObjectDescriptor,
    ) -> BackendResult<ArrayObjectHandle> {
        if let Some((buffer, _)) = desc.instance_buffer {
            if !self.buffers.contains_key(&buffer.0) {
                return Err(BackendError::UnknownHandle(buffer.0));
            }
        }
        let handle = ArrayObjectHandle(self.allocate_handle());
        self.arrays.insert(handle.0);
        self.commands.push(BackendCommand::CreateArrayObject(handle));
        Ok(handle)
    }

    fn destroy_array_object(&mut self, array: ArrayObjectHandle) {
        self.arrays.remove(&array.0);
        self.commands.push(BackendCommand::DestroyArrayObject(array));
    }

    fn bind_array_object(&mut self, array: ArrayObjectHandle) {
        self.commands.push(BackendCommand::BindArrayObject(array));
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        for texture in desc.color_attachments.iter().chain(desc.depth_attachment.iter()) {
            if !self.textures.contains_key(&texture.0) {
                return Err(BackendError::UnknownHandle(texture.0));
            }
        }
        let handle = FramebufferHandle(self.allocate_handle());
        self.framebuffers.insert(handle.0);
        self.commands.push(BackendCommand::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        self.commands
            .push(BackendCommand::DestroyFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.commands.push(BackendCommand::BindFramebuffer(framebuffer));
    }

    fn clear(&mut self, values: &ClearValues) {
        self.commands.push(BackendCommand::Clear(*values));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(BackendCommand::Viewport(viewport));
    }

    fn set_stencil_state(&mut self, state: Option<StencilState>) {
        self.commands.push(BackendCommand::StencilState(state));
    }

    fn set_shader(&mut self, shader: ShaderId) {
        self.commands.push(BackendCommand::SetShader(shader));
    }

    fn set_uniform(&mut self, name: &str, _value: UniformValue) {
        self.commands.push(BackendCommand::SetUniform(name.to_string()));
    }

    fn draw_elements(&mut self) {
        self.commands.push(BackendCommand::Draw);
    }

    fn draw_elements_instanced(&mut self, instances: u32) {
        self.commands.push(BackendCommand::DrawInstanced(instances));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_tracks_live_textures() {
        let mut backend = DummyBackend::new(4);
        let a = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let b = backend.create_texture(&TextureDescriptor::default()).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.live_textures(), 2);

        backend.bind_texture(TextureUnit(0), a);
        backend.destroy_texture(a);
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(backend.bound_texture(TextureUnit(0)), None);
    }

    #[test]
    fn test_dummy_framebuffer_requires_live_attachments() {
        let mut backend = DummyBackend::default();
        let desc = FramebufferDescriptor {
            label: None,
            color_attachments: vec![TextureHandle(99)],
            depth_attachment: None,
        };
        assert_eq!(
            backend.create_framebuffer(&desc),
            Err(BackendError::UnknownHandle(99))
        );
    }

    #[test]
    fn test_dummy_buffer_write() {
        let mut backend = DummyBackend::default();
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            })
            .unwrap();
        backend.write_buffer(buffer, 1, &[7, 8]);
        assert_eq!(backend.buffer_contents(buffer), Some(&[0, 7, 8, 0][..]));
    }
}
