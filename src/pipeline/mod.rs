//! Deferred rendering pipeline
//!
//! Reference passes wired through the render graph:
//! 1. Shadow pass - depth from the main light
//! 2. G-Buffer pass - renders geometry to multiple render targets
//! 3. Lighting pass - fullscreen pass computing lighting from the G-buffer
//! 4. Tonemapping - HDR to the presentable target (optional)

pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod postprocess;
pub mod shadow_pass;

pub use gbuffer_pass::{GBufferData, GBufferPass};
pub use lighting_pass::{DirectionalLight, GpuLight, LightingData, LightingInputs, LightingPass};
pub use postprocess::{TonemapOperator, TonemapParams, TonemappingPass};
pub use shadow_pass::{ShadowData, ShadowPass};

use crate::backend::traits::Rhi;
use crate::render_graph::{
    GraphError, PassHandle, RenderGraph, ResourceId, TextureId, TypedPassHandle,
};

/// Configuration for the Deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    pub width: u32,
    pub height: u32,
    /// Edge length of the square shadow map; 0 disables the shadow pass
    pub shadow_map_size: u32,
    /// Maximum number of lights
    pub max_lights: u32,
    pub lights: Vec<DirectionalLight>,
    pub tonemap: TonemapOperator,
    pub exposure: f32,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            shadow_map_size: 2048,
            max_lights: 1024,
            lights: vec![DirectionalLight::default()],
            tonemap: TonemapOperator::default(),
            exposure: 1.0,
        }
    }
}

/// Passes and resources created by the Deferred pipeline
#[derive(Debug, Clone, Copy)]
pub struct DeferredResources {
    pub shadow_pass: Option<TypedPassHandle<ShadowPass>>,
    pub gbuffer_pass: TypedPassHandle<GBufferPass>,
    pub lighting_pass: TypedPassHandle<LightingPass>,
    pub tonemap_pass: Option<PassHandle>,
    pub shadow_map: Option<TextureId>,
    pub gbuffer: GBufferData,
    pub lighting: LightingData,
    /// The graph's final output: the present target, or the HDR color.
    pub output: TextureId,
}

/// Build the Deferred render graph
///
/// With a `present_target` (usually an imported swapchain image) a
/// tonemapping pass writes it and it becomes the final output. Without one,
/// the HDR lighting result is the final output.
pub fn build_deferred_graph<R: Rhi>(
    graph: &mut RenderGraph<R>,
    config: &DeferredConfig,
    present_target: Option<TextureId>,
) -> Result<DeferredResources, GraphError> {
    let shadow_pass = if config.shadow_map_size > 0 {
        Some(graph.add_typed_pass(ShadowPass::new(config.shadow_map_size))?)
    } else {
        None
    };
    let shadow_map = shadow_pass
        .and_then(|handle| graph.pass_data(handle))
        .map(|data| data.shadow_map);

    let gbuffer_pass = graph.add_typed_pass(GBufferPass::new(config.width, config.height))?;
    let gbuffer = graph
        .pass_data(gbuffer_pass)
        .copied()
        .unwrap_or_default();

    let inputs = LightingInputs {
        gbuffer,
        shadow_map,
    };
    let lighting_pass = graph.add_typed_pass(
        LightingPass::new(config.width, config.height, config.max_lights, inputs)
            .with_lights(config.lights.clone()),
    )?;
    let lighting = graph
        .pass_data(lighting_pass)
        .copied()
        .unwrap_or_default();

    let (tonemap_pass, output) = match present_target {
        Some(target) => {
            let pass = TonemappingPass::new(lighting.hdr_output, target, config.width, config.height)
                .with_operator(config.tonemap)
                .with_exposure(config.exposure);
            (Some(graph.add_pass(pass)?), target)
        }
        None => (None, lighting.hdr_output),
    };
    graph
        .builder_mut()
        .set_final_output(ResourceId::Texture(output))?;

    log::debug!(
        "Built deferred graph {}x{} ({} passes)",
        config.width,
        config.height,
        graph.passes().len()
    );

    Ok(DeferredResources {
        shadow_pass,
        gbuffer_pass,
        lighting_pass,
        tonemap_pass,
        shadow_map,
        gbuffer,
        lighting,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{TextureFormat, TextureHandle, TextureUsage};
    use crate::backend::{DummyBackend, RecordedCommand};
    use crate::render_graph::TextureDescriptor;

    #[test]
    fn test_deferred_graph_to_swapchain() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let swapchain = graph.builder_mut().import_texture(
            "swapchain",
            TextureHandle::from_raw(1000),
            TextureDescriptor::new_2d(
                "swapchain",
                1280,
                720,
                TextureFormat::Bgra8UnormSrgb,
                TextureUsage::RENDER_ATTACHMENT,
            ),
        );
        let resources =
            build_deferred_graph(&mut graph, &DeferredConfig::default(), Some(swapchain)).unwrap();

        graph.compile().unwrap();
        assert_eq!(
            graph.execution_order_names(),
            vec![
                "Shadow Pass",
                "G-Buffer Pass",
                "Deferred Lighting Pass",
                "Tonemapping"
            ]
        );
        assert_eq!(graph.texture(resources.output), Some(TextureHandle::from_raw(1000)));

        graph.execute(0).unwrap();
        let rhi = graph.rhi();
        assert_eq!(rhi.render_pass_labels().len(), 4);
        assert!(rhi
            .commands()
            .iter()
            .any(|cmd| matches!(cmd, RecordedCommand::WriteBuffer { len: 32, .. })));
        // swapchain is never created by the graph
        assert!(!rhi.is_image_alive(TextureHandle::from_raw(1000)));
    }

    #[test]
    fn test_deferred_graph_without_shadows() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let config = DeferredConfig {
            shadow_map_size: 0,
            ..Default::default()
        };
        let resources = build_deferred_graph(&mut graph, &config, None).unwrap();
        assert!(resources.shadow_pass.is_none());
        assert_eq!(resources.output, resources.lighting.hdr_output);

        graph.compile().unwrap();
        assert_eq!(graph.execution_order().len(), 2);
    }
}
