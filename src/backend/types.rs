//! Common types shared between the render graph and RHI backends

use bitflags::bitflags;

/// Handle to a physical GPU image owned by an RHI backend.
///
/// The zero value is reserved as the null handle, returned by backends when
/// creation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub const NULL: Self = Self(0);

    /// Wrap a backend-specific identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Handle to a physical GPU buffer owned by an RHI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub const NULL: Self = Self(0);

    /// Wrap a backend-specific identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    R8Unorm,
    R32Float,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::R32Float
            | TextureFormat::Rg16Float
            | TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const STORAGE_BINDING = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const UNIFORM = 1 << 6;
        const STORAGE = 1 << 7;
        const INDIRECT = 1 << 8;
    }
}

/// Parameters for creating a physical image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageCreateInfo {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl ImageCreateInfo {
    /// Approximate memory footprint of the top mip of every layer.
    pub fn approximate_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.depth.max(1) as u64
            * self.array_layers.max(1) as u64
            * self.sample_count.max(1) as u64
            * self.format.bytes_per_pixel() as u64
    }
}

/// Parameters for creating a physical buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferCreateInfo {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Color attachment for a render pass
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl ColorAttachment {
    /// Attachment that is cleared on load and stored afterwards.
    pub fn cleared(texture: TextureHandle, color: [f32; 4]) -> Self {
        Self {
            texture,
            load_op: LoadOp::Clear(color),
            store_op: StoreOp::Store,
        }
    }
}

/// Depth stencil attachment for a render pass
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: TextureHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

impl DepthStencilAttachment {
    /// Depth attachment cleared to the far plane.
    pub fn cleared(texture: TextureHandle) -> Self {
        Self {
            texture,
            depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
            depth_store_op: StoreOp::Store,
            depth_clear_value: 1.0,
        }
    }
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}
