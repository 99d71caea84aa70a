//! Render graph error types

use thiserror::Error;

use crate::render_graph::pass::PassHandle;
use crate::render_graph::resource::ResourceId;

/// Errors that can occur during graph construction, compilation or execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A resource handle is out of range or belongs to an earlier compile cycle.
    #[error("invalid resource handle: {0:?}")]
    InvalidHandle(ResourceId),

    /// A pass handle does not refer to a pass of this graph.
    #[error("invalid pass handle: {0:?}")]
    InvalidPassHandle(PassHandle),

    /// The graph contains a cyclic dependency between the named passes.
    #[error("render graph contains cyclic dependency between passes: {}", passes.join(", "))]
    CyclicDependency { passes: Vec<String> },

    /// The backend returned a null handle while allocating a resource.
    #[error("backend failed to allocate resource '{resource}'")]
    BackendAllocationFailure { resource: String },

    /// `execute` was called on a graph that has not been (successfully) compiled
    /// since its last structural change.
    #[error("render graph is not compiled")]
    NotCompiled,

    /// A pass rejected its own declaration; the pass is kept but disabled.
    #[error("pass '{pass}' failed to declare its resources: {source}")]
    PassDeclarationFailed {
        pass: String,
        #[source]
        source: Box<GraphError>,
    },
}
