//! Shared helpers for the integration tests.

#![allow(dead_code)]

use lilium_frame_graph::backend::{DummyBackend, TextureFormat, TextureUsage};
use lilium_frame_graph::render_graph::{
    CallbackPass, GraphError, PassBuilder, PassHandle, RenderGraph, TextureDescriptor, TextureId,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn new_graph() -> RenderGraph<DummyBackend> {
    init_logging();
    RenderGraph::new(DummyBackend::new())
}

pub fn color_target(name: &str, width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        name,
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

/// Add a pass that reads and writes the given textures and records a render
/// pass labelled with its name when executed.
pub fn add_simple_pass(
    graph: &mut RenderGraph<DummyBackend>,
    name: &str,
    reads: &[TextureId],
    writes: &[TextureId],
) -> Result<PassHandle, GraphError> {
    let reads = reads.to_vec();
    let writes = writes.to_vec();
    let label = name.to_string();
    graph.add_pass(CallbackPass::new(
        name,
        move |builder: &mut PassBuilder<'_>| {
            for &texture in &reads {
                builder.read_texture(texture)?;
            }
            for &texture in &writes {
                builder.write_texture(texture)?;
            }
            Ok(())
        },
        move |ctx| {
            ctx.rhi()
                .begin_render_pass(&lilium_frame_graph::backend::RenderPassDescriptor {
                    label: Some(label.clone()),
                    ..Default::default()
                });
            ctx.rhi().end_render_pass();
        },
    ))
}
