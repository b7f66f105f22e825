//! Hierarchical cluster analysis module

pub mod color;
pub mod merger;
pub mod metrics;
pub mod queue;
pub mod state;
pub mod weights;

use serde::{Serialize, Deserialize};
use crate::cluster::color::Color;

/// Step value of a group that has not been merged
pub const UNSET_STEP: u32 = u32::MAX;

/// One node of the merge forest.
///
/// Groups live in a dense array indexed by vertex position; `parent` is the
/// position of the group this one was merged into.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Vertex id anchoring the group
    pub vertex: u32,

    /// Cumulative normalized weight absorbed so far
    pub weight: f64,

    pub parent: Option<usize>,

    /// Step at which the group was merged into its parent
    pub merge_step: u32,

    /// First step at which the group took part in any merge
    pub single_step: u32,

    pub color: Color,
}

impl Group {
    pub fn new(vertex: u32, weight: f64) -> Self {
        Self {
            vertex,
            weight,
            parent: None,
            merge_step: UNSET_STEP,
            single_step: UNSET_STEP,
            color: Color::default(),
        }
    }

    pub fn is_merged(&self) -> bool {
        self.merge_step != UNSET_STEP
    }
}

/// Observer and cancellation handle for a merge run
pub trait Interaction {
    /// Report progress, `total` is the expected number of merges.
    fn set_progress(&self, step: u32, total: u32, label: &str, indeterminate: bool);

    /// Checked once per merge iteration.
    fn is_cancelled(&self) -> bool;
}

/// Interaction that never cancels and ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInteraction;

impl Interaction for NoInteraction {
    fn set_progress(&self, _step: u32, _total: u32, _label: &str, _indeterminate: bool) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A cluster at the current cut, as reported in result files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable cluster number of this cut
    pub id: u32,

    /// Vertex id representing the cluster
    pub root: u32,

    /// Members of this cluster (vertex ids)
    pub members: Vec<u32>,

    /// Size of the cluster
    pub size: usize,

    /// Density: internal links / potential links
    pub density: f32,

    /// Display color of the cluster
    pub color: String,

    /// Members with the most internal links
    pub central_vertices: Vec<u32>,
}
