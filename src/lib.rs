//! Lilium Frame Graph - a declarative render graph over an abstract RHI
//!
//! Passes declare the GPU resources they produce and consume; the graph
//! derives a correct execution order, culls passes that do not contribute to
//! the frame, allocates transient resources and drives per-frame execution.
//!
//! # Features
//! - Render graph with typed pass data, culling and cycle detection
//! - [`Rhi`](backend::Rhi) trait for concrete backends, plus a recording
//!   [`DummyBackend`](backend::DummyBackend) for tests and headless runs
//! - Reference deferred pipeline (shadow, G-buffer, lighting, tonemapping)
//! - Single-slot frame mailbox for a dedicated render thread

pub mod backend;
pub mod pipeline;
pub mod render_graph;
pub mod render_thread;

pub use backend::{DummyBackend, Rhi};
pub use pipeline::{build_deferred_graph, DeferredConfig, DeferredResources};
pub use render_graph::{GraphConfig, GraphError, RenderGraph};
pub use render_thread::{FrameMailbox, PushError, RenderThread};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for a renderer built on the render graph
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Shadow map edge length, 0 disables shadows
    pub shadow_map_size: u32,
    /// Maximum number of lights supported
    pub max_lights: u32,
    /// Cull passes that do not contribute to the final output
    pub cull_passes: bool,
    /// Warn when a pass reads a resource nobody wrote
    pub warn_undefined_reads: bool,
}

impl RendererConfig {
    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            cull_passes: self.cull_passes,
            warn_undefined_reads: self.warn_undefined_reads,
        }
    }

    pub fn deferred_config(&self) -> DeferredConfig {
        DeferredConfig {
            width: self.width,
            height: self.height,
            shadow_map_size: self.shadow_map_size,
            max_lights: self.max_lights,
            ..Default::default()
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            shadow_map_size: 2048,
            max_lights: 1024,
            cull_passes: true,
            warn_undefined_reads: true,
        }
    }
}
