//! Render hardware interface consumed by the render graph
//!
//! Concrete backends (Vulkan, D3D11, ...) implement [`Rhi`]. Creation calls
//! never fail loudly: they return a null handle, and the graph decides how to
//! surface the failure.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Unknown buffer handle: {0:?}")]
    UnknownBuffer(BufferHandle),
    #[error("Write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    WriteOutOfBounds { offset: u64, len: u64, size: u64 },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Render hardware interface
pub trait Rhi: Send {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    // Resource creation

    /// Create an image; returns [`TextureHandle::NULL`] on failure
    fn create_image(&mut self, info: &ImageCreateInfo) -> TextureHandle;

    /// Create a buffer; returns [`BufferHandle::NULL`] on failure
    fn create_buffer(&mut self, info: &BufferCreateInfo) -> BufferHandle;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()>;

    // Command recording

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set viewport
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Dispatch compute work
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    // Resource cleanup

    /// Destroy an image
    fn destroy_image(&mut self, image: TextureHandle);

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);
}
