//! Tonemapping post-processing

use std::any::Any;

use bytemuck::{Pod, Zeroable};

use crate::backend::types::*;
use crate::render_graph::*;

/// Tonemapping operator
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    None,
}

impl TonemapOperator {
    /// Operator index the tonemapping shader switches on.
    pub fn shader_index(self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::Uncharted2 => 2,
            TonemapOperator::None => 3,
        }
    }
}

/// Uniform block read by the tonemapping shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TonemapParams {
    pub exposure: f32,
    pub gamma: f32,
    pub operator: u32,
    pub _padding: u32,
}

/// Maps the HDR lighting result into the presentable target
pub struct TonemappingPass {
    pub operator: TonemapOperator,
    pub exposure: f32,
    pub gamma: f32,
    input: TextureId,
    output: TextureId,
    params_buffer: BufferId,
    viewport: (u32, u32),
}

impl TonemappingPass {
    pub fn new(input: TextureId, output: TextureId, width: u32, height: u32) -> Self {
        Self {
            operator: TonemapOperator::Aces,
            exposure: 1.0,
            gamma: 2.2,
            input,
            output,
            params_buffer: BufferId::INVALID,
            viewport: (width, height),
        }
    }

    pub fn with_operator(mut self, operator: TonemapOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn params(&self) -> TonemapParams {
        TonemapParams {
            exposure: self.exposure,
            gamma: self.gamma,
            operator: self.operator.shader_index(),
            _padding: 0,
        }
    }

    /// Uniform buffer holding [`TonemapParams`]; invalid until declared.
    pub fn params_buffer(&self) -> BufferId {
        self.params_buffer
    }
}

impl RenderPass for TonemappingPass {
    fn name(&self) -> &str {
        "Tonemapping"
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn declare(&mut self, builder: &mut PassBuilder<'_>) -> Result<(), GraphError> {
        builder.read_texture(self.input)?;

        self.params_buffer = builder.create_buffer(BufferDescriptor::new(
            "tonemap_params",
            std::mem::size_of::<TonemapParams>() as u64,
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        ));
        builder.write_buffer(self.params_buffer)?;

        builder.write_texture(self.output)
    }

    fn execute(&self, ctx: &mut PassExecuteContext<'_>) {
        let (Some(output), Some(params_buffer)) =
            (ctx.texture(self.output), ctx.buffer(self.params_buffer))
        else {
            log::warn!("Tonemapping: output target is not bound");
            return;
        };
        let (width, height) = self.viewport;

        let rhi = ctx.rhi();
        let params = self.params();
        if let Err(err) = rhi.write_buffer(params_buffer, 0, bytemuck::bytes_of(&params)) {
            log::error!("Tonemapping: parameter upload failed: {}", err);
            return;
        }

        rhi.begin_render_pass(&RenderPassDescriptor {
            label: Some("Tonemapping".into()),
            color_attachments: vec![ColorAttachment::cleared(output, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        });
        rhi.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        rhi.draw(0..3, 0..1);
        rhi.end_render_pass();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};

    fn target(name: &str, format: TextureFormat) -> TextureDescriptor {
        TextureDescriptor::new_2d(name, 8, 8, format, TextureUsage::RENDER_ATTACHMENT)
    }

    #[test]
    fn params_layout() {
        assert_eq!(std::mem::size_of::<TonemapParams>(), 16);
        let pass = TonemappingPass::new(TextureId::INVALID, TextureId::INVALID, 8, 8)
            .with_operator(TonemapOperator::Reinhard)
            .with_exposure(2.0);
        assert_eq!(
            pass.params(),
            TonemapParams {
                exposure: 2.0,
                gamma: 2.2,
                operator: 0,
                _padding: 0,
            }
        );
    }

    #[test]
    fn settings_are_uploaded_each_frame() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let hdr = graph
            .builder_mut()
            .create_texture(target("hdr", TextureFormat::Rgba16Float));
        let ldr = graph
            .builder_mut()
            .create_texture(target("ldr", TextureFormat::Rgba8Unorm));
        let pass = graph
            .add_pass(
                TonemappingPass::new(hdr, ldr, 8, 8)
                    .with_operator(TonemapOperator::Uncharted2)
                    .with_exposure(0.5),
            )
            .unwrap();
        graph.compile().unwrap();

        let params_buffer = graph
            .pass(pass)
            .and_then(|record| record.pass().as_any().downcast_ref::<TonemappingPass>())
            .map(TonemappingPass::params_buffer)
            .unwrap();
        let physical = graph.buffer(params_buffer).unwrap();

        graph.execute(0).unwrap();
        let expected = TonemapParams {
            exposure: 0.5,
            gamma: 2.2,
            operator: 2,
            _padding: 0,
        };
        let uploads = graph
            .rhi()
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::WriteBuffer { buffer, data, .. } if *buffer == physical => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(uploads, vec![bytemuck::bytes_of(&expected).to_vec()]);
    }
}
