//! Memory-efficient transaction graph representation

use std::mem;
use serde::{Serialize, Deserialize};
use crate::graph::{AttributeId, GraphSnapshot};

/// Marker for an unused slot in the id to position table
pub const NO_POSITION: u32 = u32::MAX;

/// Named float values, one per transaction id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionAttribute {
    pub name: String,
    pub values: Vec<f32>,
}

/// Undirected graph where every link aggregates the transactions between
/// one vertex pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedGraph {
    /// Vertex id at each dense position
    pub vertex_ids: Vec<u32>,

    /// Position of each vertex id, `NO_POSITION` for gaps
    pub positions: Vec<u32>,

    /// Larger endpoint id of each link
    pub link_high: Vec<u32>,

    /// Smaller endpoint id of each link
    pub link_low: Vec<u32>,

    /// Offset array: link_offsets[i] to link_offsets[i+1] is the transaction
    /// range of link i
    pub link_offsets: Vec<u32>,

    /// Concatenated transaction ids of all links
    pub link_transactions: Vec<u32>,

    /// Float transaction attributes
    pub attributes: Vec<TransactionAttribute>,

    /// Optional mapping from positions to original string labels
    pub labels: Option<Vec<String>>,

    pub structure_modification_counter: i64,
}

impl CompressedGraph {
    /// Create an empty graph with pre-allocated capacity
    pub fn with_capacity(vertex_count: usize, link_count: usize) -> Self {
        Self {
            vertex_ids: Vec::with_capacity(vertex_count),
            positions: Vec::with_capacity(vertex_count),
            link_high: Vec::with_capacity(link_count),
            link_low: Vec::with_capacity(link_count),
            link_offsets: Vec::with_capacity(link_count + 1),
            link_transactions: Vec::new(),
            attributes: Vec::new(),
            labels: None,
            structure_modification_counter: 0,
        }
    }

    /// Transactions carried by a link
    pub fn transactions(&self, link: usize) -> &[u32] {
        let start = self.link_offsets[link] as usize;
        let end = self.link_offsets[link + 1] as usize;
        &self.link_transactions[start..end]
    }

    pub fn transaction_count(&self) -> usize {
        self.link_transactions.len()
    }

    /// Label of the vertex at `position`, falling back to its id
    pub fn label(&self, position: usize) -> String {
        match &self.labels {
            Some(labels) => labels[position].clone(),
            None => self.vertex_ids[position].to_string(),
        }
    }

    /// Number of non-self-loop links touching each vertex position
    pub fn degrees(&self) -> Vec<u32> {
        let mut degrees = vec![0u32; self.vertex_ids.len()];
        for link in 0..self.link_high.len() {
            if self.is_self_loop(link) {
                continue;
            }
            for vertex in [self.link_high[link], self.link_low[link]] {
                if let Some(position) = self.vertex_position(vertex) {
                    degrees[position] += 1;
                }
            }
        }
        degrees
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        let base = mem::size_of::<Self>();
        let vertices = (self.vertex_ids.capacity() + self.positions.capacity()) * mem::size_of::<u32>();
        let links = (self.link_high.capacity()
            + self.link_low.capacity()
            + self.link_offsets.capacity()
            + self.link_transactions.capacity())
            * mem::size_of::<u32>();

        let attributes = self.attributes.iter()
            .map(|a| a.name.capacity() + a.values.capacity() * mem::size_of::<f32>())
            .sum::<usize>();

        let labels = self.labels.as_ref()
            .map(|labels| labels.iter().map(|s| s.capacity()).sum::<usize>())
            .unwrap_or(0);

        base + vertices + links + attributes + labels
    }
}

impl GraphSnapshot for CompressedGraph {
    fn vertex_count(&self) -> usize {
        self.vertex_ids.len()
    }

    fn vertex_capacity(&self) -> usize {
        self.positions.len()
    }

    fn vertex(&self, position: usize) -> u32 {
        self.vertex_ids[position]
    }

    fn vertex_position(&self, vertex: u32) -> Option<usize> {
        match self.positions.get(vertex as usize) {
            Some(&position) if position != NO_POSITION => Some(position as usize),
            _ => None,
        }
    }

    fn link_count(&self) -> usize {
        self.link_high.len()
    }

    fn link_high_vertex(&self, link: usize) -> u32 {
        self.link_high[link]
    }

    fn link_low_vertex(&self, link: usize) -> u32 {
        self.link_low[link]
    }

    fn link_transaction_count(&self, link: usize) -> usize {
        (self.link_offsets[link + 1] - self.link_offsets[link]) as usize
    }

    fn link_transaction(&self, link: usize, index: usize) -> u32 {
        self.transactions(link)[index]
    }

    fn transaction_attribute(&self, name: &str) -> Option<AttributeId> {
        self.attributes.iter().position(|a| a.name == name)
    }

    fn transaction_float(&self, attribute: AttributeId, transaction: u32) -> f32 {
        self.attributes[attribute].values[transaction as usize]
    }

    fn structure_modification_counter(&self) -> i64 {
        self.structure_modification_counter
    }
}
