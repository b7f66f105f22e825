//! Graph representation and algorithms module

pub mod compressed;
pub mod builder;
pub mod algorithms;

pub use builder::GraphBuilder;
pub use compressed::CompressedGraph;

/// Handle of a named transaction attribute
pub type AttributeId = usize;

/// Read-only view of a host graph used by the merge run.
///
/// Vertices are addressed two ways: a dense position in `0..vertex_count()`
/// and a stable id in `0..vertex_capacity()`. Links are the unordered vertex
/// pairs that carry one or more transactions and are addressed by position.
pub trait GraphSnapshot {
    fn vertex_count(&self) -> usize;

    /// Upper bound (exclusive) on vertex ids.
    fn vertex_capacity(&self) -> usize;

    /// Id of the vertex at `position`.
    fn vertex(&self, position: usize) -> u32;

    fn vertex_position(&self, vertex: u32) -> Option<usize>;

    fn link_count(&self) -> usize;

    /// Endpoint with the larger vertex id.
    fn link_high_vertex(&self, link: usize) -> u32;

    /// Endpoint with the smaller vertex id.
    fn link_low_vertex(&self, link: usize) -> u32;

    fn link_transaction_count(&self, link: usize) -> usize;

    fn link_transaction(&self, link: usize, index: usize) -> u32;

    /// Looks up a float transaction attribute, `None` when it does not exist.
    fn transaction_attribute(&self, name: &str) -> Option<AttributeId>;

    fn transaction_float(&self, attribute: AttributeId, transaction: u32) -> f32;

    /// Monotonic counter bumped on every topology change.
    fn structure_modification_counter(&self) -> i64;

    fn is_self_loop(&self, link: usize) -> bool {
        self.link_high_vertex(link) == self.link_low_vertex(link)
    }
}
