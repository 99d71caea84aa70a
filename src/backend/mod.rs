//! Backend abstraction layer
//!
//! Provides the [`Rhi`] trait concrete GPU backends implement, the types shared
//! with the render graph, and a [`DummyBackend`] for tests and headless runs.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::{DummyBackend, RecordedCommand};
pub use traits::*;
pub use types::*;
