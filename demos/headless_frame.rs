//! Headless frame demo
//!
//! Builds the deferred pipeline on the dummy backend, hands frames to a
//! render thread through the frame mailbox and prints the compiled graph.
//!
//! ```text
//! cargo run --example headless_frame -- --frames 4 --resize-at 2 --dump
//! ```

use clap::Parser;
use lilium_frame_graph::backend::{DummyBackend, TextureFormat, TextureHandle, TextureUsage};
use lilium_frame_graph::render_graph::TextureDescriptor;
use lilium_frame_graph::{build_deferred_graph, GraphError, RenderGraph, RenderThread, RendererConfig};

/// Headless render graph demo arguments.
#[derive(Parser, Debug)]
#[command(name = "headless_frame", about = "Run the deferred render graph on the dummy backend", version)]
struct Args {
    /// Output width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Output height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Number of frames to submit.
    #[arg(long, default_value = "3")]
    frames: u64,

    /// Frame at which the output is resized to half size.
    #[arg(long)]
    resize_at: Option<u64>,

    /// Keep passes that do not contribute to the final output.
    #[arg(long)]
    no_cull: bool,

    /// Print execution order and resource usage after each compile.
    #[arg(long)]
    dump: bool,
}

/// Work handed to the render thread for one frame.
#[derive(Debug, Clone, Copy)]
struct FrameBatch {
    index: u64,
    width: u32,
    height: u32,
}

/// Stand-in for the swapchain image a real backend would acquire.
const SWAPCHAIN_IMAGE: u64 = 1 << 32;

struct Renderer {
    graph: RenderGraph<DummyBackend>,
    config: RendererConfig,
    extent: Option<(u32, u32)>,
    dump: bool,
}

impl Renderer {
    fn new(config: RendererConfig, dump: bool) -> Self {
        Self {
            graph: RenderGraph::with_config(DummyBackend::new(), config.graph_config()),
            config,
            extent: None,
            dump,
        }
    }

    fn rebuild(&mut self, width: u32, height: u32) -> Result<(), GraphError> {
        log::info!("Building deferred graph for {}x{}", width, height);
        self.graph.reset();
        self.config.width = width;
        self.config.height = height;

        let swapchain = self.graph.builder_mut().import_texture(
            "swapchain",
            TextureHandle::from_raw(SWAPCHAIN_IMAGE),
            TextureDescriptor::new_2d(
                "swapchain",
                width,
                height,
                TextureFormat::Bgra8UnormSrgb,
                TextureUsage::RENDER_ATTACHMENT,
            ),
        );
        build_deferred_graph(&mut self.graph, &self.config.deferred_config(), Some(swapchain))?;

        for pass in self.graph.initialize_passes() {
            log::warn!("Disabling pass {:?} after failed initialization", pass);
            self.graph.set_pass_enabled(pass, false)?;
        }

        self.graph.compile()?;
        self.extent = Some((width, height));

        if self.dump {
            println!("{}", self.graph.dump_execution_order());
            println!("{}", self.graph.dump_resource_usage());
        }
        Ok(())
    }

    fn render(&mut self, frame: FrameBatch) -> Result<(), GraphError> {
        if self.extent != Some((frame.width, frame.height)) {
            self.rebuild(frame.width, frame.height)?;
        }
        self.graph.execute(frame.index)?;

        let rhi = self.graph.rhi();
        log::info!(
            "Frame {}: {} render passes recorded, {} images alive",
            frame.index,
            rhi.render_pass_labels().len(),
            rhi.live_image_count()
        );
        self.graph.rhi_mut().clear_commands();
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("lilium-frame-graph {}", lilium_frame_graph::VERSION);

    let config = RendererConfig {
        width: args.width,
        height: args.height,
        cull_passes: !args.no_cull,
        ..Default::default()
    };

    let mut renderer = Renderer::new(config, args.dump);
    let thread = match RenderThread::spawn("render", move |frame: FrameBatch| {
        if let Err(err) = renderer.render(frame) {
            log::error!("Frame {} failed: {}", frame.index, err);
        }
    }) {
        Ok(thread) => thread,
        Err(err) => {
            log::error!("Failed to spawn render thread: {}", err);
            std::process::exit(1);
        }
    };

    let (mut width, mut height) = (args.width, args.height);
    for index in 0..args.frames {
        if args.resize_at == Some(index) {
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
        if let Err(err) = thread.submit(FrameBatch {
            index,
            width,
            height,
        }) {
            log::error!("Failed to submit frame {}: {}", index, err);
            break;
        }
    }

    let frames = thread.shutdown();
    log::info!("Render thread processed {} frames", frames);
}
