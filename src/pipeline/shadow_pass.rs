//! Directional shadow map pass

use crate::backend::types::*;
use crate::render_graph::*;

/// Handles published by [`ShadowPass`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowData {
    pub shadow_map: TextureId,
}

/// Renders scene depth from the light into a square shadow map
pub struct ShadowPass {
    size: u32,
}

impl ShadowPass {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl Default for ShadowPass {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl TypedRenderPass for ShadowPass {
    type Data = ShadowData;

    fn name(&self) -> &str {
        "Shadow Pass"
    }

    fn viewport(&self) -> (u32, u32) {
        (self.size, self.size)
    }

    fn declare(
        &mut self,
        builder: &mut PassBuilder<'_>,
        data: &mut ShadowData,
    ) -> Result<(), GraphError> {
        data.shadow_map = builder.create_texture(TextureDescriptor::new_2d(
            "shadow_map",
            self.size,
            self.size,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ));
        builder.write_texture(data.shadow_map)
    }

    fn execute(&self, data: &ShadowData, ctx: &mut PassExecuteContext<'_>) {
        let Some(shadow_map) = ctx.texture(data.shadow_map) else {
            log::warn!("Shadow Pass: shadow map is not allocated");
            return;
        };

        let rhi = ctx.rhi();
        rhi.begin_render_pass(&RenderPassDescriptor {
            label: Some("Shadow Pass".into()),
            color_attachments: Vec::new(),
            depth_stencil_attachment: Some(DepthStencilAttachment::cleared(shadow_map)),
        });
        rhi.set_viewport(0.0, 0.0, self.size as f32, self.size as f32, 0.0, 1.0);
        rhi.end_render_pass();
    }
}
