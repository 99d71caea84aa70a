//! Logical resources for the render graph

use crate::backend::types::*;
use crate::render_graph::pass::PassHandle;

/// Logical handle to a texture declared in the render graph.
///
/// The handle is an arena index plus the builder session it was issued in.
/// Handles from a previous session (before a `reset`) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId {
    index: u32,
    session: u32,
}

/// Logical handle to a buffer declared in the render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: u32,
    session: u32,
}

macro_rules! logical_handle {
    ($ty:ident) => {
        impl $ty {
            /// Sentinel that never refers to a resource.
            pub const INVALID: Self = Self {
                index: u32::MAX,
                session: u32::MAX,
            };

            pub(crate) fn new(index: u32, session: u32) -> Self {
                Self { index, session }
            }

            pub fn index(&self) -> usize {
                self.index as usize
            }

            pub fn session(&self) -> u32 {
                self.session
            }

            /// False only for the [`INVALID`](Self::INVALID) sentinel; a valid
            /// looking handle may still be stale for a given graph.
            pub fn is_valid(&self) -> bool {
                self.index != u32::MAX
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

logical_handle!(TextureId);
logical_handle!(BufferId);

/// Either kind of logical resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Texture(TextureId),
    Buffer(BufferId),
}

impl From<TextureId> for ResourceId {
    fn from(id: TextureId) -> Self {
        ResourceId::Texture(id)
    }
}

impl From<BufferId> for ResourceId {
    fn from(id: BufferId) -> Self {
        ResourceId::Buffer(id)
    }
}

/// A physical resource resolved from a logical handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

impl PhysicalResource {
    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            PhysicalResource::Texture(handle) => Some(*handle),
            PhysicalResource::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<BufferHandle> {
        match self {
            PhysicalResource::Buffer(handle) => Some(*handle),
            PhysicalResource::Texture(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            PhysicalResource::Texture(handle) => handle.is_null(),
            PhysicalResource::Buffer(handle) => handle.is_null(),
        }
    }
}

/// Describes a texture the graph should provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub usage: TextureUsage,
    /// Set by `import_texture`; imported textures are never allocated by the graph.
    pub is_imported: bool,
}

impl TextureDescriptor {
    pub fn new_2d(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            sample_count: 1,
            usage,
            is_imported: false,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Parameters handed to [`Rhi::create_image`](crate::backend::Rhi::create_image).
    pub fn to_create_info(&self) -> ImageCreateInfo {
        ImageCreateInfo {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            depth: self.depth,
            mip_levels: self.mip_levels,
            array_layers: self.array_layers,
            sample_count: self.sample_count,
            format: self.format,
            usage: self.usage,
        }
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(
            "texture",
            1,
            1,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        )
    }
}

/// Describes a buffer the graph should provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub name: String,
    pub size: u64,
    pub usage: BufferUsage,
    /// Set by `import_buffer`; imported buffers are never allocated by the graph.
    pub is_imported: bool,
}

impl BufferDescriptor {
    pub fn new(name: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            is_imported: false,
        }
    }

    /// Parameters handed to [`Rhi::create_buffer`](crate::backend::Rhi::create_buffer).
    pub fn to_create_info(&self) -> BufferCreateInfo {
        BufferCreateInfo {
            label: Some(self.name.clone()),
            size: self.size,
            usage: self.usage,
        }
    }
}

/// Resource access type for dependency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    /// Read-only access.
    Read,
    /// Write-only access.
    Write,
    /// Read and write access.
    ReadWrite,
}

impl ResourceAccess {
    /// Check if this access includes reading.
    pub fn reads(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Check if this access includes writing.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A resource access declared by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDependency {
    pub resource: ResourceId,
    pub access: ResourceAccess,
    pub pass: PassHandle,
}

/// A logical resource together with its usage bookkeeping.
///
/// `first_use`/`last_use` are pass declaration indices. They are the hook
/// for lifetime-based aliasing; the graph currently keeps every owned
/// resource alive until `reset`.
#[derive(Debug, Clone)]
pub struct ResourceNode<D, H> {
    descriptor: D,
    imported: Option<H>,
    first_use: Option<usize>,
    last_use: Option<usize>,
    is_read: bool,
    is_written: bool,
}

pub type TextureNode = ResourceNode<TextureDescriptor, TextureHandle>;
pub type BufferNode = ResourceNode<BufferDescriptor, BufferHandle>;

impl<D, H: Copy> ResourceNode<D, H> {
    pub(crate) fn new(descriptor: D, imported: Option<H>) -> Self {
        Self {
            descriptor,
            imported,
            first_use: None,
            last_use: None,
            is_read: false,
            is_written: false,
        }
    }

    pub fn descriptor(&self) -> &D {
        &self.descriptor
    }

    /// Externally owned physical handle, if this resource was imported.
    pub fn imported(&self) -> Option<H> {
        self.imported
    }

    pub fn is_imported(&self) -> bool {
        self.imported.is_some()
    }

    pub fn first_use(&self) -> Option<usize> {
        self.first_use
    }

    pub fn last_use(&self) -> Option<usize> {
        self.last_use
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn is_written(&self) -> bool {
        self.is_written
    }

    /// Check whether a pass declaration index falls inside this resource's lifetime.
    pub fn is_alive_at(&self, pass_index: usize) -> bool {
        match (self.first_use, self.last_use) {
            (Some(first), Some(last)) => first <= pass_index && pass_index <= last,
            _ => false,
        }
    }

    pub(crate) fn record_use(&mut self, pass_index: usize, access: ResourceAccess) {
        self.first_use = Some(self.first_use.map_or(pass_index, |f| f.min(pass_index)));
        self.last_use = Some(self.last_use.map_or(pass_index, |l| l.max(pass_index)));
        self.is_read |= access.reads();
        self.is_written |= access.writes();
    }
}

impl TextureNode {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl BufferNode {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Borrowed view of either kind of resource node.
#[derive(Debug, Clone, Copy)]
pub enum ResourceNodeRef<'a> {
    Texture(&'a TextureNode),
    Buffer(&'a BufferNode),
}

impl ResourceNodeRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            ResourceNodeRef::Texture(node) => node.name(),
            ResourceNodeRef::Buffer(node) => node.name(),
        }
    }

    pub fn is_imported(&self) -> bool {
        match self {
            ResourceNodeRef::Texture(node) => node.is_imported(),
            ResourceNodeRef::Buffer(node) => node.is_imported(),
        }
    }

    pub fn first_use(&self) -> Option<usize> {
        match self {
            ResourceNodeRef::Texture(node) => node.first_use(),
            ResourceNodeRef::Buffer(node) => node.first_use(),
        }
    }

    pub fn last_use(&self) -> Option<usize> {
        match self {
            ResourceNodeRef::Texture(node) => node.last_use(),
            ResourceNodeRef::Buffer(node) => node.last_use(),
        }
    }

    pub fn is_read(&self) -> bool {
        match self {
            ResourceNodeRef::Texture(node) => node.is_read(),
            ResourceNodeRef::Buffer(node) => node.is_read(),
        }
    }

    pub fn is_written(&self) -> bool {
        match self {
            ResourceNodeRef::Texture(node) => node.is_written(),
            ResourceNodeRef::Buffer(node) => node.is_written(),
        }
    }
}
