//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic graph (DAG).
//! Passes declare the resources they read and write; the graph derives the
//! execution order, culls passes that do not reach the final output, allocates
//! transient resources through the [`Rhi`](crate::backend::Rhi) and runs the
//! passes every frame.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new(DummyBackend::new());
//! let color = graph.builder_mut().create_texture(TextureDescriptor::new_2d(
//!     "color", 1280, 720, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_ATTACHMENT,
//! ));
//! graph.builder_mut().set_final_output(color)?;
//! graph.add_pass(CallbackPass::new("clear", move |b| b.write_texture(color), |_ctx| {}))?;
//!
//! graph.compile()?;
//! graph.execute(0)?;
//! ```

pub mod builder;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod pass;
pub mod resource;

pub use builder::*;
pub use compiler::CompiledGraph;
pub use error::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
