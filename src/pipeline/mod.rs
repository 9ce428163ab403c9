//! Deferred rendering pipeline
//!
//! This module implements the per-frame passes of a deferred renderer:
//! 1. Shadow maps - Depth-variance maps for shadow-casting lights
//! 2. Stencil pass - Marks where lighting is allowed
//! 3. G-Buffer pass - Renders opaque geometry to multiple render targets
//! 4. Lighting pass - Accumulates light volumes over the G-buffer

pub(crate) mod draw;
pub mod frame;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod mask_pass;
pub mod profiling;
pub mod stencil_pass;

pub use frame::{lit_image_description, DeferredFrame, DeferredRenderer};
pub use gbuffer_pass::GeometryPass;
pub use lighting_pass::LightingPass;
pub use mask_pass::{MaskPass, MaskShaders};
pub use profiling::{NoopProfiling, ProfilingContext};
pub use stencil_pass::StencilPass;

use crate::backend::ShaderId;
use crate::scene::MAXIMUM_GROUPS;

/// Configuration for the Deferred pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of texture units to use (capped by the backend)
    pub texture_units: usize,
    /// Maximum nesting of texture unit contexts, root included
    pub texture_unit_stack_depth: usize,
    /// Pixels a render target pool keeps for reuse
    pub render_target_soft_limit: u64,
    /// Pixels a render target pool may allocate in total
    pub render_target_hard_limit: u64,
    /// Exclusive upper bound of group numbers
    pub maximum_groups: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            texture_units: 16,
            texture_unit_stack_depth: 8,
            render_target_soft_limit: 1920 * 1080 * 8,
            render_target_hard_limit: 1920 * 1080 * 32,
            maximum_groups: MAXIMUM_GROUPS,
        }
    }
}

/// Shaders owned by the pipeline itself
///
/// Opaque instances use their material's shader and lights their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredShaders {
    pub stencil: ShaderId,
    pub clip_volume: ShaderId,
    pub depth_single: ShaderId,
    pub depth_batched: ShaderId,
    pub mask: MaskShaders,
}
