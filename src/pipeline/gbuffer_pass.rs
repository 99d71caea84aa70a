//! G-Buffer generation pass for deferred rendering
//!
//! Renders geometry to multiple render targets (MRT):
//! - Albedo (base color)
//! - World-space normals
//! - Material properties (metallic, roughness)
//! - Depth buffer

use crate::backend::types::*;
use crate::render_graph::*;

/// G-buffer textures published by [`GBufferPass`]
#[derive(Debug, Default, Clone, Copy)]
pub struct GBufferData {
    pub albedo: TextureId,
    pub normal: TextureId,
    pub material: TextureId,
    pub depth: TextureId,
}

impl GBufferData {
    pub fn textures(&self) -> [TextureId; 4] {
        [self.albedo, self.normal, self.material, self.depth]
    }
}

/// G-Buffer generation pass for deferred rendering
pub struct GBufferPass {
    width: u32,
    height: u32,
}

impl GBufferPass {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn target(&self, name: &str, format: TextureFormat) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            name,
            self.width,
            self.height,
            format,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
    }
}

impl TypedRenderPass for GBufferPass {
    type Data = GBufferData;

    fn name(&self) -> &str {
        "G-Buffer Pass"
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn declare(
        &mut self,
        builder: &mut PassBuilder<'_>,
        data: &mut GBufferData,
    ) -> Result<(), GraphError> {
        data.albedo = builder.create_texture(self.target("gbuffer_albedo", TextureFormat::Rgba8Unorm));
        // Float normals for precision
        data.normal = builder.create_texture(self.target("gbuffer_normal", TextureFormat::Rgba16Float));
        data.material =
            builder.create_texture(self.target("gbuffer_material", TextureFormat::Rgba8Unorm));
        data.depth = builder.create_texture(self.target("gbuffer_depth", TextureFormat::Depth32Float));

        for texture in data.textures() {
            builder.write_texture(texture)?;
        }
        Ok(())
    }

    fn execute(&self, data: &GBufferData, ctx: &mut PassExecuteContext<'_>) {
        let (Some(albedo), Some(normal), Some(material), Some(depth)) = (
            ctx.texture(data.albedo),
            ctx.texture(data.normal),
            ctx.texture(data.material),
            ctx.texture(data.depth),
        ) else {
            log::warn!("G-Buffer Pass: render targets are not allocated");
            return;
        };

        let rhi = ctx.rhi();
        rhi.begin_render_pass(&RenderPassDescriptor {
            label: Some("G-Buffer Pass".into()),
            color_attachments: vec![
                ColorAttachment::cleared(albedo, [0.0, 0.0, 0.0, 0.0]),
                ColorAttachment::cleared(normal, [0.0, 0.0, 0.0, 0.0]),
                // Default roughness 0.5
                ColorAttachment::cleared(material, [0.0, 0.5, 0.0, 0.0]),
            ],
            depth_stencil_attachment: Some(DepthStencilAttachment::cleared(depth)),
        });
        rhi.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);

        // Geometry draws are recorded by the scene renderer inside this pass
        rhi.end_render_pass();
    }
}
