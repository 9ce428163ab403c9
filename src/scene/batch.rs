//! Dynamically batched instances
//!
//! An [`InstanceBatchedDynamic`] holds a fixed number of transform slots
//! backed by one per-instance vertex buffer, so every enabled copy of the
//! mesh is drawn by a single instanced draw call. Disabled slots below the
//! highest enabled one are uploaded as zero-scale matrices and collapse to
//! nothing on the GPU. The buffer is only rewritten after a slot changed.

use std::cell::Cell;
use std::collections::BTreeSet;

use glam::{Mat4, Vec4};

use crate::backend::{
    ArrayObjectDescriptor, ArrayObjectHandle, BufferDescriptor, BufferHandle, BufferUsage,
    GraphicsBackend,
};
use crate::error::{RenderError, RenderResult};
use crate::scene::ids::InstanceId;
use crate::scene::transform::{Transform, TransformContext, TransformOrthogonal};

const MATRIX_SIZE: u64 = std::mem::size_of::<Mat4>() as u64;

/// Matrix uploaded for a disabled slot
const DISABLED_MATRIX: Mat4 = Mat4::from_cols(Vec4::ZERO, Vec4::ZERO, Vec4::ZERO, Vec4::W);

/// Fixed-capacity set of instance transforms drawn with one call
#[derive(Debug)]
pub struct InstanceBatchedDynamic {
    id: InstanceId,
    base: ArrayObjectHandle,
    array_object: ArrayObjectHandle,
    buffer: BufferHandle,
    slots: Vec<Option<TransformOrthogonal>>,
    free: BTreeSet<usize>,
    enabled: usize,
    dirty: Cell<bool>,
    deleted: bool,
}

impl InstanceBatchedDynamic {
    /// Allocate a batch of `capacity` slots drawing the mesh in `base`.
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        id: InstanceId,
        base: ArrayObjectHandle,
        capacity: usize,
    ) -> RenderResult<Self> {
        if capacity == 0 {
            return Err(RenderError::EmptyBatch);
        }
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("batch {} matrices", id.0)),
            size: capacity as u64 * MATRIX_SIZE,
            usage: BufferUsage::VERTEX | BufferUsage::DYNAMIC | BufferUsage::COPY_DST,
        })?;
        let array_object = match backend.create_array_object(&ArrayObjectDescriptor {
            label: Some(format!("batch {}", id.0)),
            base,
            instance_buffer: Some((buffer, MATRIX_SIZE)),
        }) {
            Ok(array_object) => array_object,
            Err(err) => {
                backend.destroy_buffer(buffer);
                return Err(err.into());
            }
        };

        log::debug!("Batch {:?}: allocated {} slots", id, capacity);
        Ok(Self {
            id,
            base,
            array_object,
            buffer,
            slots: vec![None; capacity],
            free: (0..capacity).collect(),
            enabled: 0,
            dirty: Cell::new(false),
            deleted: false,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Mesh the batch draws
    pub fn base_array_object(&self) -> ArrayObjectHandle {
        self.base
    }

    /// Array object combining the mesh with the per-instance matrices
    pub fn array_object(&self) -> ArrayObjectHandle {
        self.array_object
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Number of instances the next draw must cover: one past the highest
    /// enabled slot.
    pub fn render_count(&self) -> usize {
        self.slots
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |highest| highest + 1)
    }

    fn check_alive(&self) -> RenderResult<()> {
        if self.deleted {
            Err(RenderError::BatchDeleted)
        } else {
            Ok(())
        }
    }

    /// Store `transform` in the lowest free slot and return its index.
    pub fn enable(&mut self, transform: TransformOrthogonal) -> RenderResult<usize> {
        self.check_alive()?;
        let index = self.free.pop_first().ok_or(RenderError::BatchFull {
            capacity: self.slots.len(),
        })?;
        self.slots[index] = Some(transform);
        self.enabled += 1;
        self.dirty.set(true);
        log::trace!("Batch {:?}: enabled slot {}", self.id, index);
        Ok(index)
    }

    pub fn disable(&mut self, index: usize) -> RenderResult<()> {
        self.check_alive()?;
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RenderError::InvalidInstanceIndex { index, capacity })?;
        if slot.take().is_none() {
            return Err(RenderError::InstanceNotEnabled(index));
        }
        self.free.insert(index);
        self.enabled -= 1;
        self.dirty.set(true);
        Ok(())
    }

    pub fn disable_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.free = (0..self.slots.len()).collect();
        self.enabled = 0;
        self.dirty.set(true);
    }

    /// True if the uploaded matrices are stale
    pub fn update_required(&self) -> bool {
        self.dirty.get()
    }

    /// Mutable access to an enabled slot's transform. Marks the batch for
    /// upload.
    pub fn transform_mut(&mut self, index: usize) -> RenderResult<&mut TransformOrthogonal> {
        let capacity = self.slots.len();
        match self.slots.get_mut(index) {
            Some(Some(transform)) => {
                self.dirty.set(true);
                Ok(transform)
            }
            Some(None) => Err(RenderError::InstanceNotEnabled(index)),
            None => Err(RenderError::InvalidInstanceIndex { index, capacity }),
        }
    }

    /// Upload the matrices of every slot below [`render_count`](Self::render_count)
    /// if any slot changed since the last upload.
    pub fn update(
        &self,
        backend: &mut dyn GraphicsBackend,
        ctx: &mut TransformContext,
    ) -> RenderResult<()> {
        self.check_alive()?;
        if !self.dirty.replace(false) {
            return Ok(());
        }
        let count = self.render_count();
        if count == 0 {
            return Ok(());
        }
        let matrices: Vec<Mat4> = self.slots[..count]
            .iter()
            .map(|slot| match slot {
                Some(transform) => transform.make_matrix(ctx),
                None => DISABLED_MATRIX,
            })
            .collect();
        backend.write_buffer(self.buffer, 0, bytemuck::cast_slice(&matrices));
        Ok(())
    }

    /// Release the GPU objects. The batch is unusable afterwards.
    pub fn delete(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        self.check_alive()?;
        backend.destroy_array_object(self.array_object);
        backend.destroy_buffer(self.buffer);
        self.deleted = true;
        log::debug!("Batch {:?} deleted", self.id);
        Ok(())
    }
}
