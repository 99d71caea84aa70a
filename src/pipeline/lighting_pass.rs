//! Deferred lighting pass
//!
//! Performs lighting calculations using G-buffer data.
//! Renders a fullscreen triangle and accumulates lighting from all lights.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::backend::traits::Rhi;
use crate::backend::types::*;
use crate::pipeline::gbuffer_pass::GBufferData;
use crate::render_graph::*;

/// A directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            color,
            intensity,
        }
    }

    pub fn to_gpu(&self) -> GpuLight {
        GpuLight {
            direction_intensity: self.direction.normalize_or_zero().extend(self.intensity),
            color: self.color.extend(1.0),
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 1.0)
    }
}

/// GPU layout of a light in the light buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    /// xyz = direction, w = intensity
    pub direction_intensity: Vec4,
    /// xyz = color, w = unused
    pub color: Vec4,
}

/// Resources the lighting pass consumes
#[derive(Debug, Default, Clone, Copy)]
pub struct LightingInputs {
    pub gbuffer: GBufferData,
    pub shadow_map: Option<TextureId>,
}

/// Resources published by [`LightingPass`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LightingData {
    pub hdr_output: TextureId,
    pub light_buffer: BufferId,
}

/// Deferred lighting pass
pub struct LightingPass {
    width: u32,
    height: u32,
    max_lights: u32,
    lights: Vec<DirectionalLight>,
    inputs: LightingInputs,
}

impl LightingPass {
    pub fn new(width: u32, height: u32, max_lights: u32, inputs: LightingInputs) -> Self {
        Self {
            width,
            height,
            max_lights,
            lights: Vec::new(),
            inputs,
        }
    }

    pub fn with_lights(mut self, lights: Vec<DirectionalLight>) -> Self {
        self.lights = lights;
        self
    }

    pub fn set_lights(&mut self, lights: Vec<DirectionalLight>) {
        self.lights = lights;
    }

    pub fn lights(&self) -> &[DirectionalLight] {
        &self.lights
    }

    pub fn max_lights(&self) -> u32 {
        self.max_lights
    }

    fn light_buffer_size(&self) -> u64 {
        self.max_lights as u64 * std::mem::size_of::<GpuLight>() as u64
    }

    /// Lights packed for upload, clamped to the buffer capacity.
    pub fn gpu_lights(&self) -> Vec<GpuLight> {
        self.lights
            .iter()
            .take(self.max_lights as usize)
            .map(DirectionalLight::to_gpu)
            .collect()
    }
}

impl TypedRenderPass for LightingPass {
    type Data = LightingData;

    fn name(&self) -> &str {
        "Deferred Lighting Pass"
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn initialize(&mut self, _rhi: &mut dyn Rhi) -> bool {
        if self.max_lights == 0 {
            log::error!("Deferred Lighting Pass: light buffer needs room for at least one light");
            return false;
        }
        if self.lights.len() > self.max_lights as usize {
            log::warn!(
                "Deferred Lighting Pass: {} lights exceed capacity {}, extra lights are dropped",
                self.lights.len(),
                self.max_lights
            );
        }
        true
    }

    fn declare(
        &mut self,
        builder: &mut PassBuilder<'_>,
        data: &mut LightingData,
    ) -> Result<(), GraphError> {
        for texture in self.inputs.gbuffer.textures() {
            builder.read_texture(texture)?;
        }
        if let Some(shadow_map) = self.inputs.shadow_map {
            builder.read_texture(shadow_map)?;
        }

        // The pass uploads its own light data every frame
        data.light_buffer = builder.create_buffer(BufferDescriptor::new(
            "light_buffer",
            self.light_buffer_size(),
            BufferUsage::STORAGE | BufferUsage::COPY_DST,
        ));
        builder.write_buffer(data.light_buffer)?;

        data.hdr_output = builder.create_texture(TextureDescriptor::new_2d(
            "hdr_color",
            self.width,
            self.height,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ));
        builder.write_texture(data.hdr_output)
    }

    fn execute(&self, data: &LightingData, ctx: &mut PassExecuteContext<'_>) {
        let (Some(hdr), Some(light_buffer)) =
            (ctx.texture(data.hdr_output), ctx.buffer(data.light_buffer))
        else {
            log::warn!("Deferred Lighting Pass: outputs are not allocated");
            return;
        };

        let lights = self.gpu_lights();
        let rhi = ctx.rhi();
        if !lights.is_empty() {
            if let Err(err) = rhi.write_buffer(light_buffer, 0, bytemuck::cast_slice(&lights)) {
                log::error!("Deferred Lighting Pass: light upload failed: {}", err);
                return;
            }
        }

        rhi.begin_render_pass(&RenderPassDescriptor {
            label: Some("Deferred Lighting Pass".into()),
            color_attachments: vec![ColorAttachment::cleared(hdr, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        });
        rhi.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
        // Fullscreen triangle
        rhi.draw(0..3, 0..1);
        rhi.end_render_pass();
    }
}
