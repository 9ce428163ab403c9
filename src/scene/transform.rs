//! Instance and light transforms
//!
//! Building a model matrix goes through a [`TransformContext`], a small
//! scratch area reused between calls. One context exists per thread; see
//! [`TransformContext::with_thread_local`].

use std::cell::RefCell;

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::{RenderError, RenderResult};

/// Scratch storage for matrix construction
#[derive(Debug)]
pub struct TransformContext {
    rotation: Quat,
    matrices: [Mat4; 2],
}

thread_local! {
    static THREAD_CONTEXT: RefCell<TransformContext> = RefCell::new(TransformContext::new());
}

impl TransformContext {
    pub fn new() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            matrices: [Mat4::IDENTITY; 2],
        }
    }

    /// Run `f` with this thread's context. Nested calls on the same thread
    /// fail instead of aliasing the scratch area.
    pub fn with_thread_local<T>(f: impl FnOnce(&mut TransformContext) -> T) -> RenderResult<T> {
        THREAD_CONTEXT.with(|cell| match cell.try_borrow_mut() {
            Ok(mut ctx) => Ok(f(&mut ctx)),
            Err(_) => Err(RenderError::ProtocolViolation(
                "thread transform context is already in use",
            )),
        })
    }

    /// Compose translation * rotation * scale using the scratch slots.
    pub fn compose(&mut self, translation: Vec3, orientation: Quat, scale: Vec3) -> Mat4 {
        self.rotation = orientation.normalize();
        self.matrices[0] = Mat4::from_quat(self.rotation) * Mat4::from_scale(scale);
        self.matrices[1] = Mat4::from_translation(translation) * self.matrices[0];
        self.matrices[1]
    }

    /// Inverse of a rigid (rotation + translation) transform.
    pub fn rigid_inverse(&mut self, translation: Vec3, orientation: Quat) -> Mat4 {
        self.rotation = orientation.normalize().conjugate();
        self.matrices[0] = Mat4::from_quat(self.rotation);
        self.matrices[1] = self.matrices[0] * Mat4::from_translation(-translation);
        self.matrices[1]
    }
}

impl Default for TransformContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that produces a model (object to world) matrix
pub trait Transform: std::fmt::Debug {
    fn make_matrix(&self, ctx: &mut TransformContext) -> Mat4;
}

/// The identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformIdentity;

impl Transform for TransformIdentity {
    fn make_matrix(&self, _ctx: &mut TransformContext) -> Mat4 {
        Mat4::IDENTITY
    }
}

/// Translation, orientation and per-axis scale
#[derive(Debug, Clone, Copy)]
pub struct TransformOrthogonal {
    pub translation: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Default for TransformOrthogonal {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl TransformOrthogonal {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn from_translation_scale(translation: Vec3, scale: f32) -> Self {
        Self {
            translation,
            scale: Vec3::splat(scale),
            ..Default::default()
        }
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotate around an axis
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        self.orientation = Quat::from_axis_angle(axis, angle) * self.orientation;
    }
}

impl Transform for TransformOrthogonal {
    fn make_matrix(&self, ctx: &mut TransformContext) -> Mat4 {
        ctx.compose(self.translation, self.orientation, self.scale)
    }
}

/// A placed viewpoint: position and orientation, no scale
///
/// Used by projective lights, which need both the model matrix (to place
/// the light volume) and the view matrix (to render and sample the shadow).
#[derive(Debug, Clone, Copy)]
pub struct TransformView {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for TransformView {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl TransformView {
    /// Viewpoint at `eye` looking at `target`
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        Self {
            position: eye,
            orientation: Quat::from_mat3(&Mat3::from_cols(right, up, -forward)),
        }
    }

    /// Forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.orientation * -Vec3::Z
    }

    /// World to eye matrix
    pub fn view_matrix(&self, ctx: &mut TransformContext) -> Mat4 {
        ctx.rigid_inverse(self.position, self.orientation)
    }
}

impl Transform for TransformView {
    fn make_matrix(&self, ctx: &mut TransformContext) -> Mat4 {
        ctx.compose(self.position, self.orientation, Vec3::ONE)
    }
}
