//! Resource management
//!
//! Index widths, texture unit scoping, render targets and their pool, and
//! materials.

mod index;
mod material;
mod pool;
mod render_target;
mod texture_unit;

pub use index::*;
pub use material::*;
pub use pool::*;
pub use render_target::*;
pub use texture_unit::*;
