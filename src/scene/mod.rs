//! Scene management
//!
//! Entities (instances, lights), the matrices evaluator, and the per-frame
//! collections that replay visible content to consumers.

mod batch;
mod ids;
mod instance;
mod light;
mod lights;
mod masks;
mod matrices;
mod opaques;
mod projection;
mod protocol;
mod stencils;
mod transform;

pub use batch::*;
pub use ids::*;
pub use instance::*;
pub use light::*;
pub use lights::*;
pub use masks::*;
pub use matrices::*;
pub use opaques::*;
pub use projection::*;
pub use protocol::*;
pub use stencils::*;
pub use transform::*;
