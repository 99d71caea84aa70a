//! Resource declaration for one compile cycle.
//!
//! [`GraphBuilder`] owns the logical resource arena. Dependencies can only be
//! recorded through a [`PassBuilder`], the explicit context the graph hands to
//! a pass while its declare phase runs, so there is no "current pass" state
//! that could leak outside an active declaration.

use crate::backend::types::{BufferHandle, TextureHandle};
use crate::render_graph::error::GraphError;
use crate::render_graph::pass::PassHandle;
use crate::render_graph::resource::*;

/// Logical resources and the final output of the current compile cycle.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    session: u32,
    textures: Vec<TextureNode>,
    buffers: Vec<BufferNode>,
    final_output: Option<ResourceId>,
    /// Bumped on every mutation so the graph can tell when a compile is stale.
    revision: u64,
}

impl GraphBuilder {
    pub(crate) fn new(session: u32) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }

    /// Create a transient texture owned by the graph.
    pub fn create_texture(&mut self, desc: TextureDescriptor) -> TextureId {
        let desc = TextureDescriptor {
            is_imported: false,
            ..desc
        };
        self.push_texture(ResourceNode::new(desc, None))
    }

    /// Create a transient buffer owned by the graph.
    pub fn create_buffer(&mut self, desc: BufferDescriptor) -> BufferId {
        let desc = BufferDescriptor {
            is_imported: false,
            ..desc
        };
        self.push_buffer(ResourceNode::new(desc, None))
    }

    /// Register a texture whose physical backing is owned elsewhere (e.g. a
    /// swapchain image). The graph never allocates or destroys it.
    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        external: TextureHandle,
        desc: TextureDescriptor,
    ) -> TextureId {
        let desc = TextureDescriptor {
            name: name.into(),
            is_imported: true,
            ..desc
        };
        if external.is_null() {
            log::warn!("Importing texture '{}' with a null handle", desc.name);
        }
        self.push_texture(ResourceNode::new(desc, Some(external)))
    }

    /// Register a buffer whose physical backing is owned elsewhere.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        external: BufferHandle,
        desc: BufferDescriptor,
    ) -> BufferId {
        let desc = BufferDescriptor {
            name: name.into(),
            is_imported: true,
            ..desc
        };
        if external.is_null() {
            log::warn!("Importing buffer '{}' with a null handle", desc.name);
        }
        self.push_buffer(ResourceNode::new(desc, Some(external)))
    }

    /// Mark the resource the frame must produce. Passes that do not
    /// contribute to it are culled at compile time.
    pub fn set_final_output(&mut self, resource: impl Into<ResourceId>) -> Result<(), GraphError> {
        let resource = resource.into();
        self.validate(resource)?;
        self.final_output = Some(resource);
        self.revision += 1;
        Ok(())
    }

    pub fn final_output(&self) -> Option<ResourceId> {
        self.final_output
    }

    /// Check that a handle refers to a resource of this session.
    pub fn validate(&self, resource: ResourceId) -> Result<(), GraphError> {
        let in_range = match resource {
            ResourceId::Texture(id) => id.session() == self.session && id.index() < self.textures.len(),
            ResourceId::Buffer(id) => id.session() == self.session && id.index() < self.buffers.len(),
        };
        if in_range {
            Ok(())
        } else {
            Err(GraphError::InvalidHandle(resource))
        }
    }

    pub fn texture_node(&self, id: TextureId) -> Option<&TextureNode> {
        self.validate(id.into()).ok()?;
        self.textures.get(id.index())
    }

    pub fn buffer_node(&self, id: BufferId) -> Option<&BufferNode> {
        self.validate(id.into()).ok()?;
        self.buffers.get(id.index())
    }

    pub fn resource_node(&self, resource: ResourceId) -> Option<ResourceNodeRef<'_>> {
        match resource {
            ResourceId::Texture(id) => self.texture_node(id).map(ResourceNodeRef::Texture),
            ResourceId::Buffer(id) => self.buffer_node(id).map(ResourceNodeRef::Buffer),
        }
    }

    pub fn textures(&self) -> &[TextureNode] {
        &self.textures
    }

    pub fn buffers(&self) -> &[BufferNode] {
        &self.buffers
    }

    /// Whether the resource's physical backing is owned outside the graph.
    pub fn is_imported(&self, resource: ResourceId) -> bool {
        match resource {
            ResourceId::Texture(id) => self.texture_node(id).is_some_and(|n| n.is_imported()),
            ResourceId::Buffer(id) => self.buffer_node(id).is_some_and(|n| n.is_imported()),
        }
    }

    /// Debug name of a resource, or `"<invalid>"`.
    pub fn resource_name(&self, resource: ResourceId) -> &str {
        match resource {
            ResourceId::Texture(id) => self.texture_node(id).map(|n| n.name()),
            ResourceId::Buffer(id) => self.buffer_node(id).map(|n| n.name()),
        }
        .unwrap_or("<invalid>")
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    /// Update a node's bookkeeping for an access by the pass at `pass_index`.
    pub(crate) fn record_access(
        &mut self,
        pass_index: usize,
        resource: ResourceId,
        access: ResourceAccess,
    ) -> Result<(), GraphError> {
        self.validate(resource)?;
        match resource {
            ResourceId::Texture(id) => self.textures[id.index()].record_use(pass_index, access),
            ResourceId::Buffer(id) => self.buffers[id.index()].record_use(pass_index, access),
        }
        self.revision += 1;
        Ok(())
    }

    fn push_texture(&mut self, node: TextureNode) -> TextureId {
        let id = TextureId::new(self.textures.len() as u32, self.session);
        log::trace!("Declared texture '{}' as {:?}", node.name(), id);
        self.textures.push(node);
        self.revision += 1;
        id
    }

    fn push_buffer(&mut self, node: BufferNode) -> BufferId {
        let id = BufferId::new(self.buffers.len() as u32, self.session);
        log::trace!("Declared buffer '{}' as {:?}", node.name(), id);
        self.buffers.push(node);
        self.revision += 1;
        id
    }
}

/// Context for declaring one pass's resources.
///
/// Created by the graph just before the pass's declare phase and dropped
/// right after it, so every dependency lands on the pass being declared.
pub struct PassBuilder<'a> {
    builder: &'a mut GraphBuilder,
    dependencies: &'a mut Vec<ResourceDependency>,
    pass: PassHandle,
    pass_name: &'a str,
    viewport: (u32, u32),
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(
        builder: &'a mut GraphBuilder,
        dependencies: &'a mut Vec<ResourceDependency>,
        pass: PassHandle,
        pass_name: &'a str,
        viewport: (u32, u32),
    ) -> Self {
        Self {
            builder,
            dependencies,
            pass,
            pass_name,
            viewport,
        }
    }

    /// Handle of the pass being declared.
    pub fn pass(&self) -> PassHandle {
        self.pass
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// Viewport dimensions reported by the pass.
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn create_texture(&mut self, desc: TextureDescriptor) -> TextureId {
        self.builder.create_texture(desc)
    }

    pub fn create_buffer(&mut self, desc: BufferDescriptor) -> BufferId {
        self.builder.create_buffer(desc)
    }

    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        external: TextureHandle,
        desc: TextureDescriptor,
    ) -> TextureId {
        self.builder.import_texture(name, external, desc)
    }

    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        external: BufferHandle,
        desc: BufferDescriptor,
    ) -> BufferId {
        self.builder.import_buffer(name, external, desc)
    }

    pub fn set_final_output(&mut self, resource: impl Into<ResourceId>) -> Result<(), GraphError> {
        self.builder.set_final_output(resource)
    }

    /// Declare that this pass reads from a texture.
    pub fn read_texture(&mut self, texture: TextureId) -> Result<(), GraphError> {
        self.access(texture.into(), ResourceAccess::Read)
    }

    /// Declare that this pass writes to a texture.
    pub fn write_texture(&mut self, texture: TextureId) -> Result<(), GraphError> {
        self.access(texture.into(), ResourceAccess::Write)
    }

    /// Declare that this pass reads and then modifies a texture.
    pub fn read_write_texture(&mut self, texture: TextureId) -> Result<(), GraphError> {
        self.access(texture.into(), ResourceAccess::ReadWrite)
    }

    pub fn read_buffer(&mut self, buffer: BufferId) -> Result<(), GraphError> {
        self.access(buffer.into(), ResourceAccess::Read)
    }

    pub fn write_buffer(&mut self, buffer: BufferId) -> Result<(), GraphError> {
        self.access(buffer.into(), ResourceAccess::Write)
    }

    pub fn read_write_buffer(&mut self, buffer: BufferId) -> Result<(), GraphError> {
        self.access(buffer.into(), ResourceAccess::ReadWrite)
    }

    /// Record an access of any kind.
    ///
    /// `Ok` means the dependency was recorded; an invalid or stale handle is
    /// rejected with [`GraphError::InvalidHandle`] and nothing is recorded.
    pub fn access(&mut self, resource: ResourceId, access: ResourceAccess) -> Result<(), GraphError> {
        if let Err(err) = self
            .builder
            .record_access(self.pass.index(), resource, access)
        {
            log::warn!(
                "Pass '{}' declared {:?} on a rejected handle {:?}",
                self.pass_name,
                access,
                resource
            );
            return Err(err);
        }
        self.dependencies.push(ResourceDependency {
            resource,
            access,
            pass: self.pass,
        });
        Ok(())
    }

    /// Dependencies declared so far by this pass.
    pub fn dependencies(&self) -> &[ResourceDependency] {
        self.dependencies
    }

    /// Read-only view of the whole resource arena.
    pub fn resources(&self) -> &GraphBuilder {
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{BufferUsage, TextureFormat, TextureUsage};

    fn color(name: &str) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            name,
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        )
    }

    #[test]
    fn handles_are_monotonic() {
        let mut builder = GraphBuilder::new(0);
        let a = builder.create_texture(color("a"));
        let b = builder.create_texture(color("b"));
        let buf = builder.create_buffer(BufferDescriptor::new("buf", 16, BufferUsage::UNIFORM));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(buf.index(), 0);
        assert_eq!(builder.textures().len(), 2);
    }

    #[test]
    fn import_marks_descriptor() {
        let mut builder = GraphBuilder::new(0);
        let external = TextureHandle::from_raw(42);
        let id = builder.import_texture("swapchain", external, color("ignored"));
        let node = builder.texture_node(id).unwrap();
        assert!(node.descriptor().is_imported);
        assert_eq!(node.name(), "swapchain");
        assert_eq!(node.imported(), Some(external));
        assert!(builder.is_imported(id.into()));
    }

    #[test]
    fn stale_session_is_rejected() {
        let mut old = GraphBuilder::new(0);
        let id = old.create_texture(color("a"));

        let mut fresh = GraphBuilder::new(1);
        fresh.create_texture(color("b"));
        assert_eq!(
            fresh.validate(id.into()),
            Err(GraphError::InvalidHandle(id.into()))
        );
        assert!(fresh.set_final_output(id).is_err());
    }

    #[test]
    fn pass_builder_records_dependencies() {
        let mut builder = GraphBuilder::new(0);
        let target = builder.create_texture(color("target"));
        let mut deps = Vec::new();
        {
            let mut pass = PassBuilder::new(&mut builder, &mut deps, PassHandle::new(3), "p", (64, 64));
            pass.write_texture(target).unwrap();
            assert_eq!(
                pass.read_texture(TextureId::INVALID),
                Err(GraphError::InvalidHandle(TextureId::INVALID.into()))
            );
            assert_eq!(pass.dependencies().len(), 1);
        }
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].access, ResourceAccess::Write);
        assert_eq!(deps[0].pass, PassHandle::new(3));

        let node = builder.texture_node(target).unwrap();
        assert_eq!(node.first_use(), Some(3));
        assert!(node.is_written());
        assert!(!node.is_read());
    }
}
