//! Render graph definition, compilation and execution

use std::collections::HashSet;
use std::fmt::Write as _;
use std::mem;

use crate::backend::traits::Rhi;
use crate::backend::types::{BufferHandle, TextureHandle};
use crate::render_graph::builder::{GraphBuilder, PassBuilder};
use crate::render_graph::compiler::{self, CompiledGraph};
use crate::render_graph::error::GraphError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Render graph configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Remove passes that do not contribute to the final output.
    pub cull_passes: bool,
    /// Log a warning when a pass reads a transient resource nobody wrote.
    pub warn_undefined_reads: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cull_passes: true,
            warn_undefined_reads: true,
        }
    }
}

/// The main render graph structure
///
/// Owns the backend it allocates from. Transient resources are created at
/// [`compile`](Self::compile) and destroyed at [`reset`](Self::reset) or when
/// the graph is dropped; imported resources are only ever mapped.
pub struct RenderGraph<R: Rhi> {
    rhi: R,
    config: GraphConfig,
    builder: GraphBuilder,
    passes: Vec<PassRecord>,
    compiled: Option<CompiledGraph>,
    /// Builder and pass revisions the current `compiled` was built from.
    compiled_key: Option<(u64, u64)>,
    pass_revision: u64,
    /// Logical to physical maps, indexed like the builder arrays.
    physical_textures: Vec<TextureHandle>,
    physical_buffers: Vec<BufferHandle>,
}

impl<R: Rhi> RenderGraph<R> {
    pub fn new(rhi: R) -> Self {
        Self::with_config(rhi, GraphConfig::default())
    }

    pub fn with_config(rhi: R, config: GraphConfig) -> Self {
        log::debug!("Creating render graph on '{}' backend", rhi.name());
        Self {
            rhi,
            config,
            builder: GraphBuilder::new(0),
            passes: Vec::new(),
            compiled: None,
            compiled_key: None,
            pass_revision: 0,
            physical_textures: Vec::new(),
            physical_buffers: Vec::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Change the configuration; takes effect at the next compile.
    pub fn set_config(&mut self, config: GraphConfig) {
        if self.config != config {
            self.config = config;
            self.pass_revision += 1;
        }
    }

    /// Add a render pass to the graph and run its declare phase.
    ///
    /// If the pass rejects its own declaration it is kept, disabled, and
    /// [`GraphError::PassDeclarationFailed`] is returned.
    pub fn add_pass<P: RenderPass + 'static>(&mut self, pass: P) -> Result<PassHandle, GraphError> {
        let handle = PassHandle::new(self.passes.len());
        let mut record = PassRecord::new(Box::new(pass));
        let viewport = record.pass.viewport();

        let result = {
            let mut builder = PassBuilder::new(
                &mut self.builder,
                &mut record.dependencies,
                handle,
                &record.name,
                viewport,
            );
            record.pass.declare(&mut builder)
        };

        self.pass_revision += 1;
        match result {
            Ok(()) => {
                log::trace!(
                    "Added pass '{}' as {:?} with {} dependencies",
                    record.name,
                    handle,
                    record.dependencies.len()
                );
                self.passes.push(record);
                Ok(handle)
            }
            Err(source) => {
                log::warn!("Pass '{}' failed to declare: {}", record.name, source);
                record.enabled = false;
                let pass = record.name.clone();
                self.passes.push(record);
                Err(GraphError::PassDeclarationFailed {
                    pass,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Add a typed pass; its data is available through [`pass_data`](Self::pass_data)
    /// as soon as this returns.
    pub fn add_typed_pass<P: TypedRenderPass>(
        &mut self,
        pass: P,
    ) -> Result<TypedPassHandle<P>, GraphError> {
        self.add_pass(TypedPass::new(pass)).map(TypedPassHandle::new)
    }

    /// Data published by a typed pass's declare phase.
    pub fn pass_data<P: TypedRenderPass>(&self, handle: TypedPassHandle<P>) -> Option<&P::Data> {
        self.typed_pass(handle).map(TypedPass::data)
    }

    pub fn typed_pass<P: TypedRenderPass>(&self, handle: TypedPassHandle<P>) -> Option<&TypedPass<P>> {
        self.passes
            .get(handle.handle().index())?
            .pass
            .as_any()
            .downcast_ref::<TypedPass<P>>()
    }

    pub fn typed_pass_mut<P: TypedRenderPass>(
        &mut self,
        handle: TypedPassHandle<P>,
    ) -> Option<&mut TypedPass<P>> {
        self.passes
            .get_mut(handle.handle().index())?
            .pass
            .as_any_mut()
            .downcast_mut::<TypedPass<P>>()
    }

    /// Run a pass's one-time backend initialization.
    ///
    /// `Ok(false)` reports that the pass failed to initialize; disabling it
    /// is left to the caller.
    pub fn initialize_pass(&mut self, handle: impl Into<PassHandle>) -> Result<bool, GraphError> {
        let handle = handle.into();
        let record = self
            .passes
            .get_mut(handle.index())
            .ok_or(GraphError::InvalidPassHandle(handle))?;
        let ok = record.pass.initialize(&mut self.rhi);
        if !ok {
            log::warn!("Pass '{}' failed to initialize", record.name);
        }
        Ok(ok)
    }

    /// Initialize every enabled pass, returning the ones that failed.
    pub fn initialize_passes(&mut self) -> Vec<PassHandle> {
        let mut failed = Vec::new();
        for (index, record) in self.passes.iter_mut().enumerate() {
            if record.enabled && !record.pass.initialize(&mut self.rhi) {
                log::warn!("Pass '{}' failed to initialize", record.name);
                failed.push(PassHandle::new(index));
            }
        }
        failed
    }

    pub fn set_pass_enabled(
        &mut self,
        handle: impl Into<PassHandle>,
        enabled: bool,
    ) -> Result<(), GraphError> {
        let handle = handle.into();
        let record = self
            .passes
            .get_mut(handle.index())
            .ok_or(GraphError::InvalidPassHandle(handle))?;
        if record.enabled != enabled {
            log::debug!(
                "{} pass '{}'",
                if enabled { "Enabling" } else { "Disabling" },
                record.name
            );
            record.enabled = enabled;
            self.pass_revision += 1;
        }
        Ok(())
    }

    /// Compile the graph: cull, sort, detect cycles and allocate transient
    /// resources.
    ///
    /// Calling this again without structural changes is a no-op. On failure
    /// the graph stays uncompiled and `execute` refuses to run.
    pub fn compile(&mut self) -> Result<(), GraphError> {
        let key = self.revision_key();
        if self.compiled.is_some() && self.compiled_key == Some(key) {
            log::trace!("Render graph unchanged since last compile");
            return Ok(());
        }

        self.clear_compiled();
        let compiled = compiler::compile(&self.passes, &self.builder, &self.config)?;
        self.allocate()?;

        for (position, &handle) in compiled.pass_order().iter().enumerate() {
            self.passes[handle.index()].execution_order = Some(position);
        }
        for &handle in compiled.culled() {
            self.passes[handle.index()].culled = true;
        }

        self.compiled = Some(compiled);
        self.compiled_key = Some(key);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", self.dump_execution_order());
            log::debug!("{}", self.dump_resource_usage());
        }
        Ok(())
    }

    /// Execute the compiled passes in order.
    pub fn execute(&mut self, frame_index: u64) -> Result<(), GraphError> {
        let key = self.revision_key();
        let compiled = match &self.compiled {
            Some(compiled) if self.compiled_key == Some(key) => compiled,
            _ => {
                log::warn!("Refusing to execute a render graph that is not compiled");
                return Err(GraphError::NotCompiled);
            }
        };

        let session = self.builder.session();
        for &handle in compiled.pass_order() {
            let record = &self.passes[handle.index()];
            log::trace!("Executing pass '{}' (frame {})", record.name, frame_index);
            let mut ctx = PassExecuteContext::new(
                &mut self.rhi,
                frame_index,
                &record.name,
                record.pass.viewport(),
                &self.physical_textures,
                &self.physical_buffers,
                session,
            );
            record.pass.execute(&mut ctx);
        }
        Ok(())
    }

    /// Destroy every owned resource and drop all passes and declarations.
    ///
    /// Starts a new builder session, so handles issued before the reset are
    /// rejected afterwards.
    pub fn reset(&mut self) {
        self.release_resources();
        let session = self.builder.session().wrapping_add(1);
        log::debug!(
            "Resetting render graph ({} passes), new session {}",
            self.passes.len(),
            session
        );
        self.passes.clear();
        self.clear_compiled();
        self.builder = GraphBuilder::new(session);
        self.pass_revision += 1;
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some() && self.compiled_key == Some(self.revision_key())
    }

    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Surviving passes in execution order; empty unless compiled.
    pub fn execution_order(&self) -> &[PassHandle] {
        self.compiled
            .as_ref()
            .map(CompiledGraph::pass_order)
            .unwrap_or(&[])
    }

    /// Names of the surviving passes in execution order.
    pub fn execution_order_names(&self) -> Vec<&str> {
        self.execution_order()
            .iter()
            .map(|h| self.passes[h.index()].name())
            .collect()
    }

    /// Physical handle behind the final output, once compiled.
    pub fn final_output(&self) -> Option<PhysicalResource> {
        self.resource(self.builder.final_output()?)
    }

    pub fn resource(&self, resource: ResourceId) -> Option<PhysicalResource> {
        match resource {
            ResourceId::Texture(id) => self.texture(id).map(PhysicalResource::Texture),
            ResourceId::Buffer(id) => self.buffer(id).map(PhysicalResource::Buffer),
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<TextureHandle> {
        self.builder.validate(id.into()).ok()?;
        self.physical_textures
            .get(id.index())
            .copied()
            .filter(|handle| !handle.is_null())
    }

    pub fn buffer(&self, id: BufferId) -> Option<BufferHandle> {
        self.builder.validate(id.into()).ok()?;
        self.physical_buffers
            .get(id.index())
            .copied()
            .filter(|handle| !handle.is_null())
    }

    pub fn resource_node(&self, resource: ResourceId) -> Option<ResourceNodeRef<'_>> {
        self.builder.resource_node(resource)
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Declare shared resources before adding passes.
    pub fn builder_mut(&mut self) -> &mut GraphBuilder {
        &mut self.builder
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    pub fn pass(&self, handle: impl Into<PassHandle>) -> Option<&PassRecord> {
        self.passes.get(handle.into().index())
    }

    pub fn rhi(&self) -> &R {
        &self.rhi
    }

    pub fn rhi_mut(&mut self) -> &mut R {
        &mut self.rhi
    }

    /// Human readable execution order.
    pub fn dump_execution_order(&self) -> String {
        let Some(compiled) = &self.compiled else {
            return "Render graph is not compiled".to_string();
        };

        let mut out = String::new();
        let _ = writeln!(out, "Execution order ({} passes):", compiled.pass_count());
        for (position, handle) in compiled.pass_order().iter().enumerate() {
            let record = &self.passes[handle.index()];
            let (width, height) = record.pass.viewport();
            let _ = writeln!(out, "  {position}: {} [{width}x{height}]", record.name);
        }
        if !compiled.culled().is_empty() {
            let names = compiled
                .culled()
                .iter()
                .map(|h| self.passes[h.index()].name())
                .collect::<Vec<_>>();
            let _ = writeln!(out, "Culled: {}", names.join(", "));
        }
        let disabled = self
            .passes
            .iter()
            .filter(|p| !p.enabled)
            .map(PassRecord::name)
            .collect::<Vec<_>>();
        if !disabled.is_empty() {
            let _ = writeln!(out, "Disabled: {}", disabled.join(", "));
        }
        out
    }

    /// Human readable resource table with lifetimes and physical handles.
    pub fn dump_resource_usage(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Resources ({} textures, {} buffers):",
            self.builder.textures().len(),
            self.builder.buffers().len()
        );
        for (index, node) in self.builder.textures().iter().enumerate() {
            let desc = node.descriptor();
            let physical = self.physical_textures.get(index).copied().unwrap_or_default();
            let _ = writeln!(
                out,
                "  T{index} '{}' {}x{}x{} {:?} {} uses {} -> {:?}",
                desc.name,
                desc.width,
                desc.height,
                desc.depth,
                desc.format,
                ownership(node.is_imported()),
                lifetime(node.first_use(), node.last_use(), node.is_read(), node.is_written()),
                physical
            );
        }
        for (index, node) in self.builder.buffers().iter().enumerate() {
            let desc = node.descriptor();
            let physical = self.physical_buffers.get(index).copied().unwrap_or_default();
            let _ = writeln!(
                out,
                "  B{index} '{}' {} bytes {} uses {} -> {:?}",
                desc.name,
                desc.size,
                ownership(node.is_imported()),
                lifetime(node.first_use(), node.last_use(), node.is_read(), node.is_written()),
                physical
            );
        }
        out
    }

    fn revision_key(&self) -> (u64, u64) {
        (self.builder.revision(), self.pass_revision)
    }

    fn clear_compiled(&mut self) {
        self.compiled = None;
        self.compiled_key = None;
        for record in &mut self.passes {
            record.execution_order = None;
            record.culled = false;
        }
    }

    /// Back every node that has no physical resource yet. On failure the
    /// resources created by this call are destroyed again.
    fn allocate(&mut self) -> Result<(), GraphError> {
        let mut new_textures = Vec::new();
        let mut new_buffers = Vec::new();
        if let Err(resource) = self.allocate_missing(&mut new_textures, &mut new_buffers) {
            log::error!(
                "Backend failed to allocate '{}', rolling back {} new resources",
                resource,
                new_textures.len() + new_buffers.len()
            );
            for index in new_textures {
                let handle = mem::take(&mut self.physical_textures[index]);
                self.rhi.destroy_image(handle);
            }
            for index in new_buffers {
                let handle = mem::take(&mut self.physical_buffers[index]);
                self.rhi.destroy_buffer(handle);
            }
            return Err(GraphError::BackendAllocationFailure { resource });
        }
        Ok(())
    }

    fn allocate_missing(
        &mut self,
        new_textures: &mut Vec<usize>,
        new_buffers: &mut Vec<usize>,
    ) -> Result<(), String> {
        self.physical_textures
            .resize(self.builder.textures().len(), TextureHandle::NULL);
        self.physical_buffers
            .resize(self.builder.buffers().len(), BufferHandle::NULL);
        let unused = self.disabled_only_resources();
        let session = self.builder.session();

        for (index, node) in self.builder.textures().iter().enumerate() {
            if let Some(external) = node.imported() {
                self.physical_textures[index] = external;
                continue;
            }
            if !self.physical_textures[index].is_null() {
                continue;
            }
            let id = ResourceId::Texture(TextureId::new(index as u32, session));
            if unused.contains(&id) {
                log::trace!("Deferring texture '{}', only disabled passes use it", node.name());
                continue;
            }
            let handle = self.rhi.create_image(&node.descriptor().to_create_info());
            if handle.is_null() {
                return Err(node.name().to_string());
            }
            log::trace!("Allocated texture '{}' -> {:?}", node.name(), handle);
            self.physical_textures[index] = handle;
            new_textures.push(index);
        }

        for (index, node) in self.builder.buffers().iter().enumerate() {
            if let Some(external) = node.imported() {
                self.physical_buffers[index] = external;
                continue;
            }
            if !self.physical_buffers[index].is_null() {
                continue;
            }
            let id = ResourceId::Buffer(BufferId::new(index as u32, session));
            if unused.contains(&id) {
                log::trace!("Deferring buffer '{}', only disabled passes use it", node.name());
                continue;
            }
            let handle = self.rhi.create_buffer(&node.descriptor().to_create_info());
            if handle.is_null() {
                return Err(node.name().to_string());
            }
            log::trace!("Allocated buffer '{}' -> {:?}", node.name(), handle);
            self.physical_buffers[index] = handle;
            new_buffers.push(index);
        }
        Ok(())
    }

    /// Resources referenced by disabled passes and by no enabled pass.
    ///
    /// They are allocated once a pass using them is enabled again.
    fn disabled_only_resources(&self) -> HashSet<ResourceId> {
        let mut enabled = HashSet::new();
        let mut disabled = HashSet::new();
        for record in &self.passes {
            let set = if record.enabled {
                &mut enabled
            } else {
                &mut disabled
            };
            set.extend(record.dependencies.iter().map(|dep| dep.resource));
        }
        disabled.retain(|resource| !enabled.contains(resource));
        disabled
    }

    /// Destroy every owned physical resource. Imported ones are left alone.
    fn release_resources(&mut self) {
        let textures = mem::take(&mut self.physical_textures);
        for (node, handle) in self.builder.textures().iter().zip(textures) {
            if !node.is_imported() && !handle.is_null() {
                log::trace!("Destroying texture '{}' ({:?})", node.name(), handle);
                self.rhi.destroy_image(handle);
            }
        }
        let buffers = mem::take(&mut self.physical_buffers);
        for (node, handle) in self.builder.buffers().iter().zip(buffers) {
            if !node.is_imported() && !handle.is_null() {
                log::trace!("Destroying buffer '{}' ({:?})", node.name(), handle);
                self.rhi.destroy_buffer(handle);
            }
        }
    }
}

impl<R: Rhi> Drop for RenderGraph<R> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

fn ownership(imported: bool) -> &'static str {
    if imported {
        "imported"
    } else {
        "transient"
    }
}

fn lifetime(first: Option<usize>, last: Option<usize>, read: bool, written: bool) -> String {
    let access = match (read, written) {
        (true, true) => "rw",
        (true, false) => "r",
        (false, true) => "w",
        (false, false) => "-",
    };
    match (first, last) {
        (Some(first), Some(last)) => format!("{first}..={last} ({access})"),
        _ => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{TextureFormat, TextureUsage};
    use crate::backend::DummyBackend;

    fn target(name: &str) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            name,
            32,
            32,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        )
    }

    fn writer(texture: TextureId) -> impl RenderPass {
        CallbackPass::new("writer", move |b| b.write_texture(texture), |_ctx| {})
    }

    #[test]
    fn test_declare_failure_keeps_pass_disabled() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let err = graph
            .add_pass(CallbackPass::new(
                "broken",
                |b| b.read_texture(TextureId::INVALID),
                |_ctx| {},
            ))
            .unwrap_err();

        assert!(matches!(
            err,
            GraphError::PassDeclarationFailed { ref pass, .. } if pass == "broken"
        ));
        assert_eq!(graph.passes().len(), 1);
        assert!(!graph.passes()[0].is_enabled());

        graph.compile().unwrap();
        assert!(graph.execution_order().is_empty());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let color = graph.builder_mut().create_texture(target("color"));
        graph.add_pass(writer(color)).unwrap();

        graph.compile().unwrap();
        let handle = graph.texture(color);
        graph.compile().unwrap();

        assert_eq!(graph.rhi().image_creations(), 1);
        assert_eq!(graph.texture(color), handle);
    }

    #[test]
    fn test_recompile_allocates_only_new_nodes() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let a = graph.builder_mut().create_texture(target("a"));
        graph.add_pass(writer(a)).unwrap();
        graph.compile().unwrap();

        let b = graph.builder_mut().create_texture(target("b"));
        graph.add_pass(writer(b)).unwrap();
        assert!(!graph.is_compiled());

        graph.compile().unwrap();
        assert_eq!(graph.rhi().image_creations(), 2);
        assert_eq!(graph.execution_order().len(), 2);
    }

    #[test]
    fn test_execute_requires_compile() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let color = graph.builder_mut().create_texture(target("color"));
        graph.add_pass(writer(color)).unwrap();
        assert_eq!(graph.execute(0), Err(GraphError::NotCompiled));

        graph.compile().unwrap();
        graph.execute(0).unwrap();

        graph.set_pass_enabled(PassHandle::new(0), false).unwrap();
        assert_eq!(graph.execute(1), Err(GraphError::NotCompiled));
    }

    #[test]
    fn test_disabled_pass_resources_wait_for_enable() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let shared = graph.builder_mut().create_texture(target("shared"));
        let extra = graph.builder_mut().create_texture(target("extra"));
        graph.add_pass(writer(shared)).unwrap();
        let optional = graph
            .add_pass(CallbackPass::new(
                "optional",
                move |b| {
                    b.read_texture(shared)?;
                    b.write_texture(extra)
                },
                |_ctx| {},
            ))
            .unwrap();
        graph.set_pass_enabled(optional, false).unwrap();

        graph.compile().unwrap();
        assert!(graph.texture(shared).is_some());
        assert_eq!(graph.texture(extra), None);
        assert_eq!(graph.rhi().live_image_count(), 1);

        graph.set_pass_enabled(optional, true).unwrap();
        graph.compile().unwrap();
        assert!(graph.texture(extra).is_some());
        assert_eq!(graph.rhi().live_image_count(), 2);
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let color = graph.builder_mut().create_texture(target("color"));
        graph.add_pass(writer(color)).unwrap();
        graph.compile().unwrap();
        assert_eq!(graph.rhi().live_image_count(), 1);

        graph.reset();
        assert_eq!(graph.rhi().live_image_count(), 0);
        assert!(graph.passes().is_empty());
        assert_eq!(graph.texture(color), None);

        let fresh = graph.builder_mut().create_texture(target("fresh"));
        assert_eq!(fresh.index(), color.index());
        assert_ne!(fresh, color);
        assert!(graph.builder().validate(color.into()).is_err());
    }

    #[test]
    fn test_invalid_pass_handle() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        let bogus = PassHandle::new(5);
        assert_eq!(
            graph.set_pass_enabled(bogus, false),
            Err(GraphError::InvalidPassHandle(bogus))
        );
        assert_eq!(
            graph.initialize_pass(bogus),
            Err(GraphError::InvalidPassHandle(bogus))
        );
    }

    #[test]
    fn test_dumps_mention_passes_and_resources() {
        let mut graph = RenderGraph::new(DummyBackend::new());
        assert_eq!(graph.dump_execution_order(), "Render graph is not compiled");

        let color = graph.builder_mut().create_texture(target("color"));
        graph.add_pass(writer(color)).unwrap();
        graph.compile().unwrap();

        let order = graph.dump_execution_order();
        assert!(order.contains("0: writer"));
        let usage = graph.dump_resource_usage();
        assert!(usage.contains("'color' 32x32x1"));
        assert!(usage.contains("transient"));
        assert!(usage.contains("0..=0 (w)"));
    }
}
