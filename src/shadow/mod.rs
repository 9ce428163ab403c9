//! Shadow maps
//!
//! Depth-variance shadow maps are rendered once per frame for every
//! shadow-casting projective light, then looked up by the lighting pass.

mod depth;
mod renderer;

pub use depth::*;
pub use renderer::*;
