//! Graph construction module

use std::collections::{HashMap, HashSet};
use anyhow::{anyhow, Result};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use crate::graph::compressed::{CompressedGraph, TransactionAttribute, NO_POSITION};

/// Name of the attribute that carries transaction weights
pub const WEIGHT_ATTRIBUTE: &str = "weight";

/// Builder for incrementally constructing a CompressedGraph
pub struct GraphBuilder {
    /// Mapping from string labels to vertex ids, only for labelled vertices
    label_to_id: HashMap<String, u32>,

    /// Vertex ids in insertion order
    vertex_ids: Vec<u32>,

    /// Set of ids already in use
    known_ids: HashSet<u32>,

    /// Label of each inserted vertex
    labels: Vec<String>,

    /// Whether any vertex was created from a string label
    labelled: bool,

    /// Next id handed out to a labelled vertex
    next_id: u32,

    /// Endpoint ids of each transaction
    transactions: Vec<(u32, u32)>,

    /// Float attributes by name, one value per transaction
    attributes: Vec<TransactionAttribute>,

    structure_modification_counter: i64,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl GraphBuilder {
    /// Create a new graph builder with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            label_to_id: HashMap::with_capacity(capacity),
            vertex_ids: Vec::with_capacity(capacity),
            known_ids: HashSet::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
            labelled: false,
            next_id: 0,
            transactions: Vec::new(),
            attributes: Vec::new(),
            structure_modification_counter: 0,
        }
    }

    /// Get or create a vertex for the given string label
    pub fn get_or_create_vertex(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.label_to_id.get(label) {
            return id;
        }

        while self.known_ids.contains(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.labelled = true;
        self.label_to_id.insert(label.to_string(), id);
        self.insert_vertex(id, label.to_string());
        id
    }

    /// Add a vertex with an explicit id, returns false if the id is taken
    pub fn add_vertex(&mut self, id: u32) -> bool {
        if self.known_ids.contains(&id) {
            return false;
        }
        self.insert_vertex(id, id.to_string());
        true
    }

    /// Numeric ids are never interned as labels
    fn insert_vertex(&mut self, id: u32, label: String) {
        self.known_ids.insert(id);
        self.vertex_ids.push(id);
        self.labels.push(label);
    }

    /// Add a transaction between two labelled vertices, returns its id
    pub fn add_transaction(&mut self, source: &str, target: &str) -> u32 {
        let source = self.get_or_create_vertex(source);
        let target = self.get_or_create_vertex(target);
        self.push_transaction(source, target)
    }

    /// Add a transaction between two vertex ids, creating missing vertices
    pub fn add_transaction_between(&mut self, source: u32, target: u32) -> u32 {
        for id in [source, target] {
            if !self.known_ids.contains(&id) {
                self.insert_vertex(id, id.to_string());
            }
        }
        self.push_transaction(source, target)
    }

    fn push_transaction(&mut self, source: u32, target: u32) -> u32 {
        let id = self.transactions.len() as u32;
        self.transactions.push((source, target));
        for attribute in &mut self.attributes {
            attribute.values.push(0.0);
        }
        id
    }

    /// Set a float attribute on a transaction, creating the attribute on first use
    pub fn set_transaction_float(&mut self, name: &str, transaction: u32, value: f32) -> Result<()> {
        if transaction as usize >= self.transactions.len() {
            return Err(anyhow!("Unknown transaction {}", transaction));
        }

        let index = match self.attributes.iter().position(|a| a.name == name) {
            Some(index) => index,
            None => {
                self.attributes.push(TransactionAttribute {
                    name: name.to_string(),
                    values: vec![0.0; self.transactions.len()],
                });
                self.attributes.len() - 1
            }
        };
        self.attributes[index].values[transaction as usize] = value;
        Ok(())
    }

    pub fn set_structure_modification_counter(&mut self, counter: i64) {
        self.structure_modification_counter = counter;
    }

    /// Build the compressed graph
    pub fn build(self) -> CompressedGraph {
        let capacity = self.vertex_ids.iter().map(|&id| id as usize + 1).max().unwrap_or(0);

        let mut positions = vec![NO_POSITION; capacity];
        for (position, &id) in self.vertex_ids.iter().enumerate() {
            positions[id as usize] = position as u32;
        }

        // Order transactions by their unordered endpoint pair so that each
        // link's transactions are contiguous
        let keys: Vec<(u32, u32)> = self.transactions.iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();
        let mut order: Vec<u32> = (0..self.transactions.len() as u32).collect();
        order.sort_by_key(|&tx| (keys[tx as usize], tx));

        let mut graph = CompressedGraph::with_capacity(self.vertex_ids.len(), order.len());
        graph.link_offsets.push(0);

        let mut current: Option<(u32, u32)> = None;
        for &tx in &order {
            let key = keys[tx as usize];
            if current != Some(key) {
                if current.is_some() {
                    graph.link_offsets.push(graph.link_transactions.len() as u32);
                }
                graph.link_low.push(key.0);
                graph.link_high.push(key.1);
                current = Some(key);
            }
            graph.link_transactions.push(tx);
        }
        if current.is_some() {
            graph.link_offsets.push(graph.link_transactions.len() as u32);
        }

        graph.vertex_ids = self.vertex_ids;
        graph.positions = positions;
        graph.attributes = self.attributes;
        graph.labels = if self.labelled { Some(self.labels) } else { None };
        graph.structure_modification_counter = self.structure_modification_counter;

        graph
    }

    /// Convert a petgraph graph, node indices become vertex ids and edge
    /// weights become the `weight` attribute
    pub fn from_petgraph<N>(source: &UnGraph<N, f32>) -> Result<CompressedGraph> {
        let mut builder = Self::with_capacity(source.node_count());
        for node in source.node_indices() {
            builder.add_vertex(node.index() as u32);
        }
        for edge in source.edge_references() {
            let tx = builder.add_transaction_between(edge.source().index() as u32, edge.target().index() as u32);
            builder.set_transaction_float(WEIGHT_ATTRIBUTE, tx, *edge.weight())?;
        }
        Ok(builder.build())
    }
}
