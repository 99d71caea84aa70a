//! Render pass definitions for the render graph

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::backend::traits::Rhi;
use crate::backend::types::{BufferHandle, TextureHandle};
use crate::render_graph::builder::PassBuilder;
use crate::render_graph::error::GraphError;
use crate::render_graph::resource::*;

/// Unique identifier for a render pass (its declaration index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    rhi: &'a mut dyn Rhi,
    frame_index: u64,
    pass_name: &'a str,
    viewport: (u32, u32),
    textures: &'a [TextureHandle],
    buffers: &'a [BufferHandle],
    session: u32,
}

impl<'a> PassExecuteContext<'a> {
    pub(crate) fn new(
        rhi: &'a mut dyn Rhi,
        frame_index: u64,
        pass_name: &'a str,
        viewport: (u32, u32),
        textures: &'a [TextureHandle],
        buffers: &'a [BufferHandle],
        session: u32,
    ) -> Self {
        Self {
            rhi,
            frame_index,
            pass_name,
            viewport,
            textures,
            buffers,
            session,
        }
    }

    /// Backend to record commands into
    pub fn rhi(&mut self) -> &mut dyn Rhi {
        &mut *self.rhi
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Physical texture behind a logical handle
    pub fn texture(&self, id: TextureId) -> Option<TextureHandle> {
        if id.session() != self.session {
            return None;
        }
        self.textures
            .get(id.index())
            .copied()
            .filter(|handle| !handle.is_null())
    }

    /// Physical buffer behind a logical handle
    pub fn buffer(&self, id: BufferId) -> Option<BufferHandle> {
        if id.session() != self.session {
            return None;
        }
        self.buffers
            .get(id.index())
            .copied()
            .filter(|handle| !handle.is_null())
    }
}

/// Trait for render passes
///
/// A pass goes through three phases: `initialize` (one-time backend setup,
/// may fail), `declare` (resource declaration, no GPU work) and `execute`
/// (once per frame, in the order the graph derived).
pub trait RenderPass: Send {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Viewport dimensions this pass renders at
    fn viewport(&self) -> (u32, u32) {
        (0, 0)
    }

    /// One-time backend setup (pipelines, samplers, ...). Returning `false`
    /// reports failure; the caller decides whether to disable the pass.
    fn initialize(&mut self, _rhi: &mut dyn Rhi) -> bool {
        true
    }

    /// Passes with effects outside the graph (readbacks, presentation) are
    /// never culled.
    fn has_side_effects(&self) -> bool {
        false
    }

    /// Declare phase - create resources and record dependencies
    fn declare(&mut self, builder: &mut PassBuilder<'_>) -> Result<(), GraphError>;

    /// Execute phase - record commands
    fn execute(&self, ctx: &mut PassExecuteContext<'_>);

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A render pass that publishes strongly typed data from its declare phase
///
/// Consumers read the data (usually the logical handles the pass produced)
/// through [`RenderGraph::pass_data`](crate::render_graph::RenderGraph::pass_data)
/// right after the pass is added.
pub trait TypedRenderPass: Send + 'static {
    type Data: Default + Send + 'static;

    fn name(&self) -> &str;

    fn viewport(&self) -> (u32, u32) {
        (0, 0)
    }

    fn initialize(&mut self, _rhi: &mut dyn Rhi) -> bool {
        true
    }

    fn has_side_effects(&self) -> bool {
        false
    }

    fn declare(
        &mut self,
        builder: &mut PassBuilder<'_>,
        data: &mut Self::Data,
    ) -> Result<(), GraphError>;

    fn execute(&self, data: &Self::Data, ctx: &mut PassExecuteContext<'_>);
}

/// Owns a [`TypedRenderPass`] together with its published data.
pub struct TypedPass<P: TypedRenderPass> {
    pass: P,
    data: P::Data,
}

impl<P: TypedRenderPass> TypedPass<P> {
    pub fn new(pass: P) -> Self {
        Self {
            pass,
            data: P::Data::default(),
        }
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    pub fn pass_mut(&mut self) -> &mut P {
        &mut self.pass
    }

    pub fn data(&self) -> &P::Data {
        &self.data
    }
}

impl<P: TypedRenderPass> RenderPass for TypedPass<P> {
    fn name(&self) -> &str {
        self.pass.name()
    }

    fn viewport(&self) -> (u32, u32) {
        self.pass.viewport()
    }

    fn initialize(&mut self, rhi: &mut dyn Rhi) -> bool {
        self.pass.initialize(rhi)
    }

    fn has_side_effects(&self) -> bool {
        self.pass.has_side_effects()
    }

    fn declare(&mut self, builder: &mut PassBuilder<'_>) -> Result<(), GraphError> {
        self.pass.declare(builder, &mut self.data)
    }

    fn execute(&self, ctx: &mut PassExecuteContext<'_>) {
        self.pass.execute(&self.data, ctx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Handle to a pass added with `add_typed_pass`; remembers the pass type so
/// its data can be fetched without a manual downcast.
pub struct TypedPassHandle<P> {
    handle: PassHandle,
    _marker: PhantomData<fn() -> P>,
}

impl<P> TypedPassHandle<P> {
    pub(crate) fn new(handle: PassHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> PassHandle {
        self.handle
    }
}

impl<P> Clone for TypedPassHandle<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for TypedPassHandle<P> {}

impl<P> fmt::Debug for TypedPassHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedPassHandle").field(&self.handle).finish()
    }
}

impl<P> From<TypedPassHandle<P>> for PassHandle {
    fn from(handle: TypedPassHandle<P>) -> Self {
        handle.handle
    }
}

/// Closure-based pass for small utility passes.
pub struct CallbackPass<D, E> {
    name: String,
    viewport: (u32, u32),
    side_effects: bool,
    declare: D,
    execute: E,
}

impl<D, E> CallbackPass<D, E>
where
    D: FnMut(&mut PassBuilder<'_>) -> Result<(), GraphError> + Send + 'static,
    E: Fn(&mut PassExecuteContext<'_>) + Send + 'static,
{
    pub fn new(name: impl Into<String>, declare: D, execute: E) -> Self {
        Self {
            name: name.into(),
            viewport: (0, 0),
            side_effects: false,
            declare,
            execute,
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    /// Keep this pass even when it does not contribute to the final output.
    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = true;
        self
    }
}

impl<D, E> RenderPass for CallbackPass<D, E>
where
    D: FnMut(&mut PassBuilder<'_>) -> Result<(), GraphError> + Send + 'static,
    E: Fn(&mut PassExecuteContext<'_>) + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn has_side_effects(&self) -> bool {
        self.side_effects
    }

    fn declare(&mut self, builder: &mut PassBuilder<'_>) -> Result<(), GraphError> {
        (self.declare)(builder)
    }

    fn execute(&self, ctx: &mut PassExecuteContext<'_>) {
        (self.execute)(ctx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A pass in the graph together with its bookkeeping
pub struct PassRecord {
    pub(crate) name: String,
    pub(crate) pass: Box<dyn RenderPass>,
    pub(crate) dependencies: Vec<ResourceDependency>,
    pub(crate) execution_order: Option<usize>,
    pub(crate) enabled: bool,
    pub(crate) culled: bool,
}

impl PassRecord {
    pub(crate) fn new(pass: Box<dyn RenderPass>) -> Self {
        Self {
            name: pass.name().to_string(),
            pass,
            dependencies: Vec::new(),
            execution_order: None,
            enabled: true,
            culled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass(&self) -> &dyn RenderPass {
        self.pass.as_ref()
    }

    pub fn dependencies(&self) -> &[ResourceDependency] {
        &self.dependencies
    }

    /// Position in the last successful compile, `None` if culled, disabled
    /// or not compiled.
    pub fn execution_order(&self) -> Option<usize> {
        self.execution_order
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_culled(&self) -> bool {
        self.culled
    }

    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.dependencies
            .iter()
            .any(|d| d.resource == resource && d.access.reads())
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.dependencies
            .iter()
            .any(|d| d.resource == resource && d.access.writes())
    }
}

impl fmt::Debug for PassRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassRecord")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("execution_order", &self.execution_order)
            .field("enabled", &self.enabled)
            .field("culled", &self.culled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[derive(Default)]
    struct Counter {
        declared: u32,
    }

    struct CountingPass;

    impl TypedRenderPass for CountingPass {
        type Data = Counter;

        fn name(&self) -> &str {
            "counting"
        }

        fn declare(
            &mut self,
            _builder: &mut PassBuilder<'_>,
            data: &mut Counter,
        ) -> Result<(), GraphError> {
            data.declared += 1;
            Ok(())
        }

        fn execute(&self, _data: &Counter, _ctx: &mut PassExecuteContext<'_>) {}
    }

    #[test]
    fn typed_pass_downcasts() {
        let pass: Box<dyn RenderPass> = Box::new(TypedPass::new(CountingPass));
        assert_eq!(pass.name(), "counting");
        let typed = pass.as_any().downcast_ref::<TypedPass<CountingPass>>();
        assert!(typed.is_some());
        assert_eq!(typed.map(|t| t.data().declared), Some(0));
    }

    #[test]
    fn execute_context_resolves_only_current_session() {
        let mut rhi = DummyBackend::new();
        let textures = [TextureHandle::from_raw(7), TextureHandle::NULL];
        let buffers = [BufferHandle::from_raw(9)];
        let ctx = PassExecuteContext::new(&mut rhi, 3, "p", (8, 8), &textures, &buffers, 1);

        assert_eq!(ctx.frame_index(), 3);
        assert_eq!(ctx.texture(TextureId::new(0, 1)), Some(TextureHandle::from_raw(7)));
        assert_eq!(ctx.texture(TextureId::new(1, 1)), None);
        assert_eq!(ctx.texture(TextureId::new(0, 0)), None);
        assert_eq!(ctx.buffer(BufferId::new(0, 1)), Some(BufferHandle::from_raw(9)));
        assert_eq!(ctx.buffer(BufferId::new(4, 1)), None);
    }

    #[test]
    fn callback_pass_flags() {
        let pass = CallbackPass::new("present", |_b| Ok(()), |_ctx| {})
            .with_viewport(640, 480)
            .with_side_effects();
        assert_eq!(pass.viewport(), (640, 480));
        assert!(pass.has_side_effects());
        assert_eq!(RenderPass::name(&pass), "present");
    }
}
