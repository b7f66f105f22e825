//! Fast Newman agglomerative modularity clustering
//!
//! Every vertex starts in its own group. The link with the largest
//! modularity gain `deltaQ = 2 * (e_ij - a_i * a_j)` is merged repeatedly
//! until no links remain, where `e_ij` is the share of edge weight between
//! two groups (each edge split evenly between both directions) and `a_i` is
//! the share of edge ends held by a group. The step at which the running
//! modularity gain peaked is recorded as the optimum cut.
//!
//! Links flagged as initial are merged before anything else, all at step 0,
//! and do not count towards modularity.

use std::collections::{HashMap, HashSet};
use std::mem;
use log;
use crate::cluster::color::Palette;
use crate::cluster::queue::{LinkQueue, QueueKey};
use crate::cluster::weights::Weights;
use crate::cluster::{Group, Interaction};
use crate::error::{Error, Result};
use crate::graph::GraphSnapshot;

/// Options for a single merge run
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Float transaction attribute holding edge weights
    pub weight_attribute: Option<String>,

    /// Link positions that must be merged before any other link
    pub initial_links: Option<HashSet<usize>>,
}

/// Output of a merge run
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Group forest indexed by vertex position, sized to vertex capacity
    pub groups: Vec<Option<Group>>,

    /// Number of modularity-driven merge steps
    pub steps: u32,

    /// Step with the largest cumulative modularity gain
    pub optimum_step: u32,

    /// Cumulative modularity gain at the optimum step
    pub optimum_gain: f64,

    pub vertex_capacity: usize,

    /// Structure modification counter of the clustered graph
    pub structure_modification_counter: i64,
}

/// Candidate merge between two groups
#[derive(Debug, Clone)]
struct Link {
    high: usize,
    low: usize,
    weight: f64,
    delta_q: f64,
    initial: bool,
}

/// Working state of one run, discarded afterwards
struct MergeRun {
    groups: Vec<Group>,
    colored: Vec<bool>,
    /// Neighbouring group -> connecting link, only kept for root groups
    adjacency: Vec<HashMap<usize, usize>>,
    links: Vec<Link>,
    queue: LinkQueue,
    palette: Palette,
}

impl MergeRun {
    fn key(&self, link: usize) -> QueueKey {
        QueueKey {
            initial: self.links[link].initial,
            delta_q: self.links[link].delta_q,
            link,
        }
    }

    fn delta_q(&self, link: usize) -> f64 {
        let l = &self.links[link];
        2.0 * (l.weight - self.groups[l.high].weight * self.groups[l.low].weight)
    }

    fn rekey(&mut self, link: usize) {
        self.queue.remove(&self.key(link));
        self.links[link].delta_q = self.delta_q(link);
        self.queue.insert(self.key(link));
    }

    fn add_link(&mut self, high: usize, low: usize, weight: f64, initial: bool) {
        if let Some(&existing) = self.adjacency[high].get(&low) {
            self.links[existing].weight += weight;
            self.links[existing].initial |= initial;
            return;
        }

        let index = self.links.len();
        self.links.push(Link { high, low, weight, delta_q: 0.0, initial });
        self.adjacency[high].insert(low, index);
        self.adjacency[low].insert(high, index);
    }

    /// Merge the two groups joined by `link`, which has already been taken
    /// off the queue.
    fn merge(&mut self, link: usize, step: u32) {
        let (high, low) = (self.links[link].high, self.links[link].low);
        let (parent, child) = if self.groups[low].weight > self.groups[high].weight {
            (low, high)
        } else {
            (high, low)
        };

        self.adjacency[parent].remove(&child);
        self.adjacency[child].remove(&parent);

        self.groups[child].color = self.palette.next_color();
        self.colored[child] = true;
        for g in [parent, child] {
            self.groups[g].single_step = self.groups[g].single_step.min(step);
        }

        self.groups[child].parent = Some(parent);
        self.groups[child].merge_step = step;
        self.groups[parent].weight += self.groups[child].weight;

        // The child is no longer a root so its adjacency is released here
        let child_links = mem::take(&mut self.adjacency[child]);
        for (neighbor, child_link) in child_links {
            self.adjacency[neighbor].remove(&child);

            match self.adjacency[parent].get(&neighbor).copied() {
                None => {
                    let l = &mut self.links[child_link];
                    if l.high == child {
                        l.high = parent;
                    } else {
                        l.low = parent;
                    }
                    self.adjacency[parent].insert(neighbor, child_link);
                    self.adjacency[neighbor].insert(parent, child_link);
                }
                Some(existing) => {
                    self.queue.remove(&self.key(child_link));
                    self.queue.remove(&self.key(existing));
                    let (weight, initial) = (self.links[child_link].weight, self.links[child_link].initial);
                    self.links[existing].weight += weight;
                    self.links[existing].initial |= initial;
                    self.queue.insert(self.key(existing));
                }
            }
        }

        // The parent's weight changed, so every one of its links is re-keyed
        let parent_links: Vec<usize> = self.adjacency[parent].values().copied().collect();
        for l in parent_links {
            self.rekey(l);
        }
    }
}

/// Fast Newman clustering over a graph snapshot
#[derive(Debug, Clone, Default)]
pub struct FastNewman {
    options: MergeOptions,
}

impl FastNewman {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Run the merge loop to completion.
    ///
    /// Returns `Error::Cancelled` if the interaction asks to stop; no result
    /// is produced in that case.
    pub fn run<G, I>(&self, graph: &G, interaction: &I) -> Result<MergeResult>
    where
        G: GraphSnapshot,
        I: Interaction + ?Sized,
    {
        let vertex_count = graph.vertex_count();
        let vertex_capacity = graph.vertex_capacity().max(vertex_count);
        let total = vertex_count.saturating_sub(1) as u32;

        log::info!(
            "Clustering {} vertices with {} links",
            vertex_count,
            graph.link_count()
        );
        interaction.set_progress(0, total, "Building clusters", true);

        let weights = Weights::compute(graph, self.options.weight_attribute.as_deref());

        let mut run = MergeRun {
            groups: (0..vertex_count)
                .map(|position| Group::new(graph.vertex(position), weights.vertex[position]))
                .collect(),
            colored: vec![false; vertex_count],
            adjacency: vec![HashMap::new(); vertex_count],
            links: Vec::with_capacity(graph.link_count()),
            queue: LinkQueue::new(),
            palette: Palette::new(vertex_count),
        };

        if weights.is_degenerate() {
            log::debug!("No edge weight to cluster on, every vertex stays a singleton");
        } else {
            for link in 0..graph.link_count() {
                if graph.is_self_loop(link) {
                    continue;
                }
                let high = graph.vertex_position(graph.link_high_vertex(link));
                let low = graph.vertex_position(graph.link_low_vertex(link));
                let (Some(high), Some(low)) = (high, low) else {
                    continue;
                };
                let initial = self.options.initial_links.as_ref()
                    .map_or(false, |initial| initial.contains(&link));
                run.add_link(high, low, weights.link[link] / 2.0, initial);
            }
        }

        for link in 0..run.links.len() {
            run.links[link].delta_q = run.delta_q(link);
            run.queue.insert(run.key(link));
        }

        let mut step = 0u32;
        let mut initialising = true;
        let mut q = 0.0f64;
        let mut max_q = 0.0f64;
        let mut optimum_step = 0u32;
        let mut merges = 0u32;

        loop {
            if interaction.is_cancelled() {
                log::info!("Clustering cancelled after {} merges", merges);
                return Err(Error::Cancelled);
            }
            let Some(key) = run.queue.pop_first() else {
                break;
            };

            if initialising && !key.initial {
                initialising = false;
                step += 1;
                log::debug!("Initial merges finished after {} merges", merges);
            }

            if !initialising {
                q += key.delta_q;
                if q > max_q {
                    max_q = q;
                    optimum_step = step;
                }
            }

            run.merge(key.link, step);
            merges += 1;
            interaction.set_progress(merges, total, "Merging clusters", false);

            if !initialising {
                step += 1;
            }
        }

        // Isolated vertices and final roots take the remaining colors
        for position in 0..vertex_count {
            if !run.colored[position] {
                run.groups[position].color = run.palette.next_color();
            }
        }

        let steps = if initialising { 0 } else { step - 1 };
        log::info!(
            "Clustering finished: {} merges, {} steps, optimum at step {} (gain {:.4})",
            merges,
            steps,
            optimum_step,
            max_q
        );

        let mut groups: Vec<Option<Group>> = run.groups.into_iter().map(Some).collect();
        groups.resize(vertex_capacity, None);

        Ok(MergeResult {
            groups,
            steps,
            optimum_step,
            optimum_gain: max_q,
            vertex_capacity,
            structure_modification_counter: graph.structure_modification_counter(),
        })
    }
}
