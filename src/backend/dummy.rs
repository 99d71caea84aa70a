//! Dummy RHI backend for testing and headless runs.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, tracks which resources are alive, and records every call so tests
//! can inspect what the render graph asked of the backend.

use std::collections::HashMap;
use std::ops::Range;

use crate::backend::traits::{BackendError, BackendResult, Rhi};
use crate::backend::types::*;

/// A call observed by the [`DummyBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    CreateImage(TextureHandle),
    CreateBuffer(BufferHandle),
    DestroyImage(TextureHandle),
    DestroyBuffer(BufferHandle),
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: u64,
        data: Vec<u8>,
    },
    BeginRenderPass {
        label: Option<String>,
        color_attachments: Vec<TextureHandle>,
        depth_attachment: Option<TextureHandle>,
    },
    EndRenderPass,
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

/// Dummy RHI backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_handle: u64,
    images: HashMap<TextureHandle, ImageCreateInfo>,
    buffers: HashMap<BufferHandle, BufferCreateInfo>,
    /// Every image ever created, kept for [`DummyBackend::image_info`].
    /// Never pruned, so it grows across graph resets.
    image_history: Vec<(TextureHandle, ImageCreateInfo)>,
    commands: Vec<RecordedCommand>,
    image_creations: usize,
    buffer_creations: usize,
    /// Remaining successful allocations before creation starts failing.
    allocation_budget: Option<usize>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            images: HashMap::new(),
            buffers: HashMap::new(),
            image_history: Vec::new(),
            commands: Vec::new(),
            image_creations: 0,
            buffer_creations: 0,
            allocation_budget: None,
        }
    }

    /// Let the next `count` allocations succeed, then return null handles.
    pub fn fail_allocations_after(&mut self, count: usize) {
        self.allocation_budget = Some(count);
    }

    /// Stop injecting allocation failures.
    pub fn clear_allocation_failures(&mut self) {
        self.allocation_budget = None;
    }

    /// Number of `create_image` calls that returned a valid handle.
    pub fn image_creations(&self) -> usize {
        self.image_creations
    }

    /// Number of `create_buffer` calls that returned a valid handle.
    pub fn buffer_creations(&self) -> usize {
        self.buffer_creations
    }

    /// Images created and not yet destroyed.
    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    /// Buffers created and not yet destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_image_alive(&self, image: TextureHandle) -> bool {
        self.images.contains_key(&image)
    }

    pub fn is_buffer_alive(&self, buffer: BufferHandle) -> bool {
        self.buffers.contains_key(&buffer)
    }

    /// Creation parameters of an image, even if it was destroyed since.
    pub fn image_info(&self, image: TextureHandle) -> Option<&ImageCreateInfo> {
        self.image_history
            .iter()
            .find(|(handle, _)| *handle == image)
            .map(|(_, info)| info)
    }

    pub fn buffer_info(&self, buffer: BufferHandle) -> Option<&BufferCreateInfo> {
        self.buffers.get(&buffer)
    }

    /// Every call recorded so far, in order.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Labels of the render passes begun so far, in order.
    pub fn render_pass_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::BeginRenderPass { label, .. } => label.as_deref(),
                _ => None,
            })
            .collect()
    }

    fn take_allocation(&mut self) -> bool {
        match self.allocation_budget.as_mut() {
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
            None => true,
        }
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Rhi for DummyBackend {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_image(&mut self, info: &ImageCreateInfo) -> TextureHandle {
        if info.width == 0 || info.height == 0 || info.depth == 0 {
            log::warn!(
                "DummyBackend: rejecting image {:?} with zero extent ({}x{}x{})",
                info.label,
                info.width,
                info.height,
                info.depth
            );
            return TextureHandle::NULL;
        }
        if !self.take_allocation() {
            log::trace!("DummyBackend: injected failure for image {:?}", info.label);
            return TextureHandle::NULL;
        }

        let handle = TextureHandle::from_raw(self.next_raw());
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{}x{}, {:?}) -> {:?}",
            info.label,
            info.width,
            info.height,
            info.depth,
            info.format,
            handle
        );
        self.images.insert(handle, info.clone());
        self.image_history.push((handle, info.clone()));
        self.image_creations += 1;
        self.commands.push(RecordedCommand::CreateImage(handle));
        handle
    }

    fn create_buffer(&mut self, info: &BufferCreateInfo) -> BufferHandle {
        if info.size == 0 {
            log::warn!("DummyBackend: rejecting empty buffer {:?}", info.label);
            return BufferHandle::NULL;
        }
        if !self.take_allocation() {
            log::trace!("DummyBackend: injected failure for buffer {:?}", info.label);
            return BufferHandle::NULL;
        }

        let handle = BufferHandle::from_raw(self.next_raw());
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {}) -> {:?}",
            info.label,
            info.size,
            handle
        );
        self.buffers.insert(handle, info.clone());
        self.buffer_creations += 1;
        self.commands.push(RecordedCommand::CreateBuffer(handle));
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let info = self
            .buffers
            .get(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        let len = data.len() as u64;
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= info.size);
        if !in_bounds {
            return Err(BackendError::WriteOutOfBounds {
                offset,
                len,
                size: info.size,
            });
        }
        log::trace!("DummyBackend: write_buffer offset={} len={}", offset, len);
        self.commands
            .push(RecordedCommand::WriteBuffer {
                buffer,
                offset,
                len,
                data: data.to_vec(),
            });
        Ok(())
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        log::trace!("DummyBackend: begin render pass {:?}", desc.label);
        self.commands.push(RecordedCommand::BeginRenderPass {
            label: desc.label.clone(),
            color_attachments: desc.color_attachments.iter().map(|a| a.texture).collect(),
            depth_attachment: desc.depth_stencil_attachment.as_ref().map(|d| d.texture),
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.commands
            .push(RecordedCommand::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::Draw { vertices, instances });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch { x, y, z });
    }

    fn destroy_image(&mut self, image: TextureHandle) {
        if self.images.remove(&image).is_none() {
            log::warn!("DummyBackend: destroying unknown image {:?}", image);
            return;
        }
        log::trace!("DummyBackend: destroying image {:?}", image);
        self.commands.push(RecordedCommand::DestroyImage(image));
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("DummyBackend: destroying unknown buffer {:?}", buffer);
            return;
        }
        log::trace!("DummyBackend: destroying buffer {:?}", buffer);
        self.commands.push(RecordedCommand::DestroyBuffer(buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_info(width: u32, height: u32) -> ImageCreateInfo {
        ImageCreateInfo {
            label: Some("test".into()),
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn create_and_destroy_image() {
        let mut backend = DummyBackend::new();
        let image = backend.create_image(&image_info(64, 64));
        assert!(!image.is_null());
        assert!(backend.is_image_alive(image));
        assert_eq!(backend.image_info(image).map(|i| i.width), Some(64));

        backend.destroy_image(image);
        assert!(!backend.is_image_alive(image));
        assert_eq!(backend.live_image_count(), 0);
        // creation info survives destruction for later inspection
        assert!(backend.image_info(image).is_some());
    }

    #[test]
    fn zero_extent_image_fails() {
        let mut backend = DummyBackend::new();
        assert!(backend.create_image(&image_info(0, 64)).is_null());
        assert_eq!(backend.image_creations(), 0);
    }

    #[test]
    fn injected_allocation_failure() {
        let mut backend = DummyBackend::new();
        backend.fail_allocations_after(1);
        let first = backend.create_buffer(&BufferCreateInfo {
            label: None,
            size: 16,
            usage: BufferUsage::UNIFORM,
        });
        let second = backend.create_image(&image_info(4, 4));
        assert!(!first.is_null());
        assert!(second.is_null());

        backend.clear_allocation_failures();
        assert!(!backend.create_image(&image_info(4, 4)).is_null());
    }

    #[test]
    fn write_buffer_bounds() {
        let mut backend = DummyBackend::new();
        let buffer = backend.create_buffer(&BufferCreateInfo {
            label: None,
            size: 8,
            usage: BufferUsage::COPY_DST,
        });
        assert!(backend.write_buffer(buffer, 0, &[0u8; 8]).is_ok());
        assert_eq!(
            backend.write_buffer(buffer, 4, &[0u8; 8]),
            Err(BackendError::WriteOutOfBounds {
                offset: 4,
                len: 8,
                size: 8
            })
        );
        assert_eq!(
            backend.write_buffer(buffer, u64::MAX, &[0u8; 2]),
            Err(BackendError::WriteOutOfBounds {
                offset: u64::MAX,
                len: 2,
                size: 8
            })
        );
        assert_eq!(
            backend.write_buffer(BufferHandle::from_raw(99), 0, &[1]),
            Err(BackendError::UnknownBuffer(BufferHandle::from_raw(99)))
        );
    }

    #[test]
    fn records_render_pass_labels() {
        let mut backend = DummyBackend::new();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("first".into()),
            ..Default::default()
        });
        backend.end_render_pass();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("second".into()),
            ..Default::default()
        });
        backend.end_render_pass();
        assert_eq!(backend.render_pass_labels(), vec!["first", "second"]);
    }
}
