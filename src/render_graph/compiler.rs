//! Render graph compilation.
//!
//! Turns the declared passes into an execution plan ([`CompiledGraph`]):
//!
//! 1. **Edges** - derive pass dependencies from resource reads and writes
//! 2. **Culling** - drop passes that do not contribute to the final output
//! 3. **Topological Sort** - order the surviving passes (Kahn, FIFO)
//! 4. **Cycle Detection** - fail closed if the survivors are not a DAG
//!
//! Physical allocation happens afterwards in
//! [`RenderGraph::compile`](crate::render_graph::RenderGraph::compile), since
//! it needs the backend.

use std::collections::{HashMap, VecDeque};

use crate::render_graph::builder::GraphBuilder;
use crate::render_graph::error::GraphError;
use crate::render_graph::graph::GraphConfig;
use crate::render_graph::pass::{PassHandle, PassRecord};
use crate::render_graph::resource::ResourceId;

/// A compiled render graph ready for execution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    /// Execution order of the surviving passes.
    pass_order: Vec<PassHandle>,
    /// Enabled passes removed because they do not reach the final output.
    culled: Vec<PassHandle>,
    /// Dependency edges as `(dependent, dependency)`.
    edges: Vec<(PassHandle, PassHandle)>,
}

impl CompiledGraph {
    pub fn pass_order(&self) -> &[PassHandle] {
        &self.pass_order
    }

    pub fn culled(&self) -> &[PassHandle] {
        &self.culled
    }

    pub fn edges(&self) -> &[(PassHandle, PassHandle)] {
        &self.edges
    }

    pub fn pass_count(&self) -> usize {
        self.pass_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pass_order.is_empty()
    }

    /// Position of a pass in the execution order.
    pub fn position(&self, pass: PassHandle) -> Option<usize> {
        self.pass_order.iter().position(|&p| p == pass)
    }
}

/// Compile the declared passes into an execution order.
///
/// Disabled passes take no part: they produce no edges and never run.
pub fn compile(
    passes: &[PassRecord],
    builder: &GraphBuilder,
    config: &GraphConfig,
) -> Result<CompiledGraph, GraphError> {
    let PassEdges {
        mut edges,
        write_after_read,
    } = build_edges(passes, builder, config);

    let alive = if config.cull_passes {
        cull(passes, &edges, builder)
    } else {
        passes.iter().map(|p| p.enabled).collect()
    };

    let culled = passes
        .iter()
        .enumerate()
        .filter(|&(i, p)| p.enabled && !alive[i])
        .map(|(i, _)| PassHandle::new(i))
        .collect::<Vec<_>>();
    for &handle in &culled {
        log::debug!("Culled pass '{}'", passes[handle.index()].name);
    }

    // Ordering-only edges are added after culling and never keep a reader alive
    for (dependent, dependency) in write_after_read {
        push_edge(&mut edges, dependent, dependency);
    }

    let pass_order = topological_sort(passes.len(), &alive, &edges).map_err(|stuck| {
        let names = stuck
            .iter()
            .map(|h| passes[h.index()].name.clone())
            .collect::<Vec<_>>();
        log::error!("Render graph has a cycle between: {}", names.join(", "));
        GraphError::CyclicDependency { passes: names }
    })?;

    Ok(CompiledGraph {
        pass_order,
        culled,
        edges,
    })
}

/// Edges derived from the declared accesses of the enabled passes.
#[derive(Debug, Default)]
pub(crate) struct PassEdges {
    /// Readers depending on the writers whose contents they consume.
    pub edges: Vec<(PassHandle, PassHandle)>,
    /// Later writers waiting for earlier readers of the same resource.
    pub write_after_read: Vec<(PassHandle, PassHandle)>,
}

/// Derive `(dependent, dependency)` edges between enabled passes.
///
/// A read of R by pass i depends on every earlier pass writing R, and every
/// later pass writing R depends on i. A pure read of a transient resource
/// with no earlier writer is a forward reference and depends on every later
/// writer instead, so passes may be declared before their producers.
pub(crate) fn build_edges(
    passes: &[PassRecord],
    builder: &GraphBuilder,
    config: &GraphConfig,
) -> PassEdges {
    // Writers per resource, in declaration order
    let mut writers: HashMap<ResourceId, Vec<usize>> = HashMap::new();
    for (index, record) in passes.iter().enumerate().filter(|(_, p)| p.enabled) {
        for dep in record.dependencies.iter().filter(|d| d.access.writes()) {
            let list = writers.entry(dep.resource).or_default();
            if list.last() != Some(&index) {
                list.push(index);
            }
        }
    }

    let mut result = PassEdges::default();
    for (index, record) in passes.iter().enumerate().filter(|(_, p)| p.enabled) {
        let reader = PassHandle::new(index);
        for dep in record.dependencies.iter().filter(|d| d.access.reads()) {
            let resource_writers = writers.get(&dep.resource).map(Vec::as_slice).unwrap_or(&[]);
            let (earlier, later): (Vec<usize>, Vec<usize>) = resource_writers
                .iter()
                .filter(|&&w| w != index)
                .partition(|&&w| w < index);

            let forward = earlier.is_empty()
                && !builder.is_imported(dep.resource)
                && !dep.access.writes()
                && !record.writes_resource(dep.resource);

            if forward {
                for &writer in &later {
                    push_edge(&mut result.edges, reader, PassHandle::new(writer));
                }
            } else {
                for &writer in &earlier {
                    push_edge(&mut result.edges, reader, PassHandle::new(writer));
                }
                for &writer in &later {
                    push_edge(&mut result.write_after_read, PassHandle::new(writer), reader);
                }
            }

            let undefined = earlier.is_empty()
                && !builder.is_imported(dep.resource)
                && (!forward || later.is_empty());
            if undefined && config.warn_undefined_reads {
                log::warn!(
                    "Pass '{}' reads '{}' before anything writes it",
                    record.name,
                    builder.resource_name(dep.resource)
                );
            }
        }
    }
    result
}

fn push_edge(
    edges: &mut Vec<(PassHandle, PassHandle)>,
    dependent: PassHandle,
    dependency: PassHandle,
) {
    if dependent != dependency && !edges.contains(&(dependent, dependency)) {
        edges.push((dependent, dependency));
    }
}

/// Reverse reachability from the final output.
///
/// Roots are enabled passes writing the final output plus enabled passes with
/// side effects. Without a final output nothing is culled.
pub(crate) fn cull(
    passes: &[PassRecord],
    edges: &[(PassHandle, PassHandle)],
    builder: &GraphBuilder,
) -> Vec<bool> {
    let Some(output) = builder.final_output() else {
        log::debug!("No final output set, skipping pass culling");
        return passes.iter().map(|p| p.enabled).collect();
    };

    let mut alive = vec![false; passes.len()];
    let mut stack = Vec::new();
    for (index, record) in passes.iter().enumerate().filter(|(_, p)| p.enabled) {
        if record.writes_resource(output) || record.pass.has_side_effects() {
            alive[index] = true;
            stack.push(index);
        }
    }
    if stack.is_empty() {
        log::warn!(
            "No enabled pass writes the final output '{}'",
            builder.resource_name(output)
        );
    }

    while let Some(index) = stack.pop() {
        for &(dependent, dependency) in edges {
            if dependent.index() == index && !alive[dependency.index()] {
                alive[dependency.index()] = true;
                stack.push(dependency.index());
            }
        }
    }
    alive
}

/// Kahn's algorithm over the passes marked alive.
///
/// The queue is seeded in declaration order and processed FIFO, so
/// independent passes keep their relative declaration order. On a cycle the
/// passes that could not be ordered are returned.
pub(crate) fn topological_sort(
    pass_count: usize,
    alive: &[bool],
    edges: &[(PassHandle, PassHandle)],
) -> Result<Vec<PassHandle>, Vec<PassHandle>> {
    let live_edges = || {
        edges
            .iter()
            .filter(|(dependent, dependency)| alive[dependent.index()] && alive[dependency.index()])
    };

    let mut in_degree = vec![0u32; pass_count];
    for &(dependent, _dependency) in live_edges() {
        in_degree[dependent.index()] += 1;
    }

    let mut queue: VecDeque<PassHandle> = (0..pass_count)
        .filter(|&i| alive[i] && in_degree[i] == 0)
        .map(PassHandle::new)
        .collect();

    let mut order = Vec::with_capacity(pass_count);
    while let Some(handle) = queue.pop_front() {
        order.push(handle);

        for &(dependent, dependency) in live_edges() {
            if dependency == handle {
                in_degree[dependent.index()] -= 1;
                if in_degree[dependent.index()] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    let alive_count = alive.iter().filter(|&&a| a).count();
    if order.len() != alive_count {
        let stuck = (0..pass_count)
            .filter(|&i| alive[i] && in_degree[i] > 0)
            .map(PassHandle::new)
            .collect();
        return Err(stuck);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{TextureFormat, TextureUsage};
    use crate::render_graph::builder::PassBuilder;
    use crate::render_graph::pass::CallbackPass;
    use crate::render_graph::resource::{TextureDescriptor, TextureId};

    struct Fixture {
        builder: GraphBuilder,
        passes: Vec<PassRecord>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                builder: GraphBuilder::new(0),
                passes: Vec::new(),
            }
        }

        fn texture(&mut self, name: &str) -> TextureId {
            self.builder.create_texture(TextureDescriptor::new_2d(
                name,
                16,
                16,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
            ))
        }

        fn pass(&mut self, name: &str, reads: &[TextureId], writes: &[TextureId]) -> PassHandle {
            let handle = PassHandle::new(self.passes.len());
            let mut record = PassRecord::new(Box::new(CallbackPass::new(
                name,
                |_b: &mut PassBuilder<'_>| Ok(()),
                |_ctx| {},
            )));
            {
                let mut pass = PassBuilder::new(
                    &mut self.builder,
                    &mut record.dependencies,
                    handle,
                    name,
                    (16, 16),
                );
                for &r in reads {
                    pass.read_texture(r).unwrap();
                }
                for &w in writes {
                    pass.write_texture(w).unwrap();
                }
            }
            self.passes.push(record);
            handle
        }

        fn compile(&self) -> Result<CompiledGraph, GraphError> {
            compile(&self.passes, &self.builder, &GraphConfig::default())
        }
    }

    #[test]
    fn test_compile_empty_graph() {
        let fixture = Fixture::new();
        let compiled = fixture.compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.pass_count(), 0);
    }

    #[test]
    fn test_compile_linear_chain() {
        let mut f = Fixture::new();
        let t0 = f.texture("t0");
        let t1 = f.texture("t1");
        let a = f.pass("A", &[], &[t0]);
        let b = f.pass("B", &[t0], &[t1]);
        let c = f.pass("C", &[t1], &[]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b, c]);
        assert_eq!(compiled.edges(), &[(b, a), (c, b)]);
    }

    #[test]
    fn test_compile_diamond_dependency() {
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D
        let mut f = Fixture::new();
        let base = f.texture("base");
        let left = f.texture("left");
        let right = f.texture("right");
        let a = f.pass("A", &[], &[base]);
        let b = f.pass("B", &[base], &[left]);
        let c = f.pass("C", &[base], &[right]);
        let d = f.pass("D", &[left, right], &[]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b, c, d]);
    }

    #[test]
    fn test_compile_independent_passes_keep_declaration_order() {
        let mut f = Fixture::new();
        let x = f.texture("x");
        let y = f.texture("y");
        let a = f.pass("A", &[], &[x]);
        let b = f.pass("B", &[], &[y]);
        let c = f.pass("C", &[], &[]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b, c]);
    }

    #[test]
    fn test_forward_reference_orders_producer_first() {
        let mut f = Fixture::new();
        let gbuffer = f.texture("gbuffer");
        let lighting = f.pass("lighting", &[gbuffer], &[]);
        let geometry = f.pass("geometry", &[], &[gbuffer]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[geometry, lighting]);
    }

    #[test]
    fn test_compile_cycle_two_nodes() {
        let mut f = Fixture::new();
        let x = f.texture("X");
        let y = f.texture("Y");
        f.pass("A", &[y], &[x]);
        f.pass("B", &[x], &[y]);

        let err = f.compile().unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                passes: vec!["A".to_string(), "B".to_string()]
            }
        );
    }

    #[test]
    fn test_compile_partial_cycle() {
        // Root -> (A <-> B); Root itself is orderable but the graph still fails.
        let mut f = Fixture::new();
        let root = f.texture("root");
        let x = f.texture("X");
        let y = f.texture("Y");
        f.pass("Root", &[], &[root]);
        f.pass("A", &[root, y], &[x]);
        f.pass("B", &[x], &[y]);

        match f.compile() {
            Err(GraphError::CyclicDependency { passes }) => {
                assert_eq!(passes, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_read_write_has_no_forward_edge() {
        let mut f = Fixture::new();
        let accum = f.texture("accum");
        let a = f.pass("A", &[accum], &[accum]);
        let b = f.pass("B", &[accum], &[accum]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b]);
        assert_eq!(compiled.edges(), &[(b, a)]);
    }

    #[test]
    fn test_overwrite_waits_for_earlier_reader() {
        let mut f = Fixture::new();
        let t = f.texture("t");
        let produce = f.pass("produce", &[], &[t]);
        let consume = f.pass("consume", &[t], &[]);
        let overwrite = f.pass("overwrite", &[], &[t]);

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[produce, consume, overwrite]);
        assert_eq!(compiled.edges(), &[(consume, produce), (overwrite, consume)]);
    }

    #[test]
    fn test_overwrite_does_not_keep_reader_alive() {
        let mut f = Fixture::new();
        let out = f.texture("out");
        let debug = f.texture("debug");
        let draw = f.pass("draw", &[], &[out]);
        let inspect = f.pass("inspect", &[out], &[debug]);
        let composite = f.pass("composite", &[], &[out]);
        f.builder.set_final_output(out).unwrap();

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[draw, composite]);
        assert_eq!(compiled.culled(), &[inspect]);
    }

    #[test]
    fn test_culling_removes_unreachable() {
        let mut f = Fixture::new();
        let scene = f.texture("scene");
        let debug = f.texture("debug");
        let out = f.texture("out");
        let draw = f.pass("draw", &[], &[scene]);
        let overlay = f.pass("debug_overlay", &[], &[debug]);
        let post = f.pass("post", &[scene], &[out]);
        f.builder.set_final_output(out).unwrap();

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[draw, post]);
        assert_eq!(compiled.culled(), &[overlay]);
    }

    #[test]
    fn test_culling_disabled_by_config() {
        let mut f = Fixture::new();
        let out = f.texture("out");
        let unused = f.texture("unused");
        f.pass("a", &[], &[unused]);
        f.pass("b", &[], &[out]);
        f.builder.set_final_output(out).unwrap();

        let config = GraphConfig {
            cull_passes: false,
            ..Default::default()
        };
        let compiled = compile(&f.passes, &f.builder, &config).unwrap();
        assert_eq!(compiled.pass_count(), 2);
        assert!(compiled.culled().is_empty());
    }

    #[test]
    fn test_disabled_pass_breaks_no_chain() {
        let mut f = Fixture::new();
        let t = f.texture("t");
        let a = f.pass("A", &[], &[t]);
        let b = f.pass("B", &[t], &[]);
        f.passes[a.index()].enabled = false;

        let compiled = f.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[b]);
        assert!(compiled.edges().is_empty());
    }

    #[test]
    fn test_topological_sort_multiple_roots() {
        // A   B
        //  \ /
        //   C
        let edges = [
            (PassHandle::new(2), PassHandle::new(0)),
            (PassHandle::new(2), PassHandle::new(1)),
        ];
        let order = topological_sort(3, &[true; 3], &edges).unwrap();
        assert_eq!(
            order,
            vec![PassHandle::new(0), PassHandle::new(1), PassHandle::new(2)]
        );
    }
}
