//! Backend abstraction layer
//!
//! The graphics-resource API is consumed through the [`GraphicsBackend`]
//! trait. A recording [`DummyBackend`] is provided for tests and tooling.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::{BackendCommand, DummyBackend};
pub use traits::*;
pub use types::*;
