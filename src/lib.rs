//! Deferred Scene - scene batching and scoped GPU resources for a deferred renderer
//!
//! This crate sits above a low-level graphics API, abstracted as
//! [`backend::GraphicsBackend`], and organizes a frame's content into
//! state-change friendly batches.
//!
//! # Features
//! - Scoped texture unit contexts with deterministic unit reuse
//! - Render target pool keyed by description, with rescaling and limits
//! - Callback-scoped matrices evaluator for observers, instances and lights
//! - Dynamic instance batches drawn with one instanced call
//! - Scene consumers for opaques, lights, stencils and masks
//! - Per-frame shadow map execution with a read-only lookup context
//! - A deferred frame driver wiring everything together

pub mod backend;
pub mod error;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod shadow;

pub use error::{ErrorKind, RenderError, RenderResult};
pub use pipeline::{DeferredFrame, DeferredRenderer, DeferredShaders, PipelineConfig};

/// Initialize the crate (logs the version once).
pub fn init() {
    log::info!(
        "{} {} initialized",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}
