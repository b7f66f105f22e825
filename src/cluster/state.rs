//! Queryable result of a merge run

use std::collections::BTreeSet;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};
use crate::cluster::merger::MergeResult;
use crate::cluster::Group;
use crate::error::{Error, Result};

/// Vertex count above which per-vertex passes run in parallel
const PARALLEL_THRESHOLD: usize = 10_000;

/// How vertices outside the displayed clusters are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExcludedState {
    #[default]
    Show,
    Hidden,
    Dimmed,
}

/// Merge forest plus the display state of a cut through it.
///
/// The forest and step counts are fixed once built; only the current step,
/// display flags and redraw bookkeeping change afterwards.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub(crate) groups: Vec<Option<Group>>,
    pub(crate) steps: u32,
    pub(crate) current_step: u32,
    pub(crate) optimum_step: u32,
    pub(crate) exclude_single_vertices: bool,
    pub(crate) excluded_state: ExcludedState,
    /// Cluster number by root vertex id
    pub(crate) cluster_numbers: Vec<u32>,
    /// Redraw token that last numbered each root vertex id
    pub(crate) cluster_seen_before: Vec<u64>,
    pub(crate) redraw_count: u64,
    pub(crate) modification_counter: i64,
    pub(crate) structure_modification_counter: i64,
    pub(crate) interactive: bool,
    pub(crate) colored: bool,
    numbering_token: u64,
    next_cluster: u32,
}

impl ClusterState {
    /// Package a merge run, starting at its optimum cut
    pub fn from_merge(result: MergeResult, interactive: bool) -> Self {
        let capacity = result.vertex_capacity;
        Self::from_parts(
            result.groups,
            result.steps,
            result.optimum_step,
            result.optimum_step,
            capacity,
            result.structure_modification_counter,
            interactive,
        )
    }

    pub(crate) fn from_parts(
        groups: Vec<Option<Group>>,
        steps: u32,
        current_step: u32,
        optimum_step: u32,
        vertex_capacity: usize,
        structure_modification_counter: i64,
        interactive: bool,
    ) -> Self {
        Self {
            groups,
            steps,
            current_step,
            optimum_step,
            exclude_single_vertices: false,
            excluded_state: ExcludedState::default(),
            cluster_numbers: vec![0; vertex_capacity],
            cluster_seen_before: vec![0; vertex_capacity],
            redraw_count: 0,
            modification_counter: -1,
            structure_modification_counter,
            interactive,
            colored: true,
            numbering_token: 0,
            next_cluster: 0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn optimum_step(&self) -> u32 {
        self.optimum_step
    }

    pub fn groups(&self) -> &[Option<Group>] {
        &self.groups
    }

    pub fn group(&self, position: usize) -> Option<&Group> {
        self.groups.get(position).and_then(Option::as_ref)
    }

    /// Move the cut, `step` must lie in `[0, steps]`
    pub fn set_current_step(&mut self, step: u32) -> Result<()> {
        if step > self.steps {
            return Err(Error::StepOutOfRange { requested: step, steps: self.steps });
        }
        self.current_step = step;
        Ok(())
    }

    pub fn reset_to_optimum(&mut self) {
        self.current_step = self.optimum_step;
    }

    /// Number of groups still unmerged at the current step
    pub fn current_number_of_clusters(&self) -> usize {
        self.groups.iter()
            .flatten()
            .filter(|g| g.merge_step > self.current_step)
            .count()
    }

    /// Position of the group representing `position`'s cluster at the
    /// current cut, `None` if the slot holds no group.
    pub fn resolve_to_current_cut(&self, position: usize) -> Result<Option<usize>> {
        let Some(mut group) = self.group(position) else {
            return Ok(None);
        };

        let mut current = position;
        let mut hops = 0;
        while group.merge_step <= self.current_step {
            let parent = group.parent.ok_or(Error::CorruptForest {
                position: current,
                reason: "merged group has no parent",
            })?;
            hops += 1;
            if hops > self.groups.len() {
                return Err(Error::CorruptForest {
                    position,
                    reason: "parent chain does not terminate",
                });
            }
            group = self.group(parent).ok_or(Error::CorruptForest {
                position: current,
                reason: "parent slot is empty",
            })?;
            current = parent;
        }
        Ok(Some(current))
    }

    /// Resolve every position to its cluster at the current cut
    pub fn cluster_assignments(&self) -> Result<Vec<Option<usize>>> {
        if self.groups.len() < PARALLEL_THRESHOLD {
            return (0..self.groups.len())
                .map(|position| self.resolve_to_current_cut(position))
                .collect();
        }

        (0..self.groups.len())
            .into_par_iter()
            .map(|position| self.resolve_to_current_cut(position))
            .collect()
    }

    /// Distinct vertex ids representing the clusters of the current cut
    pub fn current_cluster_roots(&self) -> Result<Vec<u32>> {
        let mut roots = BTreeSet::new();
        for root in self.cluster_assignments()?.into_iter().flatten() {
            if let Some(group) = self.group(root) {
                roots.insert(group.vertex);
            }
        }
        Ok(roots.into_iter().collect())
    }

    /// Whether `position` is hidden by the exclude-single-vertices rule:
    /// its group has not joined any cluster at or before the current step.
    pub fn is_single_vertex(&self, position: usize) -> bool {
        self.exclude_single_vertices
            && self.group(position).map_or(false, |g| g.single_step > self.current_step)
    }

    /// Start a new redraw epoch and return its token
    pub fn begin_redraw(&mut self) -> u64 {
        self.redraw_count += 1;
        self.redraw_count
    }

    /// Small cluster number for the root group at `root`, stable for all
    /// calls sharing `redraw_token`.
    pub fn assign_stable_cluster_number(&mut self, root: usize, redraw_token: u64) -> Option<u32> {
        let vertex = self.group(root)?.vertex as usize;

        if redraw_token != self.numbering_token {
            self.numbering_token = redraw_token;
            self.next_cluster = 0;
        }
        if vertex >= self.cluster_numbers.len() {
            self.cluster_numbers.resize(vertex + 1, 0);
            self.cluster_seen_before.resize(vertex + 1, 0);
        }

        if self.cluster_seen_before[vertex] < redraw_token {
            self.cluster_seen_before[vertex] = redraw_token;
            self.cluster_numbers[vertex] = self.next_cluster;
            self.next_cluster += 1;
        }
        Some(self.cluster_numbers[vertex])
    }

    pub fn cluster_numbers(&self) -> &[u32] {
        &self.cluster_numbers
    }

    pub fn cluster_seen_before(&self) -> &[u64] {
        &self.cluster_seen_before
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraw_count
    }

    pub fn exclude_single_vertices(&self) -> bool {
        self.exclude_single_vertices
    }

    pub fn set_exclude_single_vertices(&mut self, exclude: bool) {
        self.exclude_single_vertices = exclude;
    }

    pub fn excluded_state(&self) -> ExcludedState {
        self.excluded_state
    }

    pub fn set_excluded_state(&mut self, state: ExcludedState) {
        self.excluded_state = state;
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn is_colored(&self) -> bool {
        self.colored
    }

    pub fn set_colored(&mut self, colored: bool) {
        self.colored = colored;
    }

    pub fn modification_counter(&self) -> i64 {
        self.modification_counter
    }

    pub fn set_modification_counter(&mut self, counter: i64) {
        self.modification_counter = counter;
    }

    pub fn structure_modification_counter(&self) -> i64 {
        self.structure_modification_counter
    }

    /// True when the graph topology changed since this state was computed
    pub fn is_stale(&self, structure_modification_counter: i64) -> bool {
        structure_modification_counter != self.structure_modification_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::merger::FastNewman;
    use crate::cluster::{NoInteraction, UNSET_STEP};
    use crate::graph::GraphBuilder;

    fn path_state() -> ClusterState {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("b", "c");
        builder.add_transaction("c", "d");
        builder.set_structure_modification_counter(7);
        let result = FastNewman::default().run(&builder.build(), &NoInteraction).unwrap();
        ClusterState::from_merge(result, true)
    }

    fn group(vertex: u32, parent: Option<usize>, merge_step: u32) -> Option<Group> {
        let mut g = Group::new(vertex, 0.0);
        g.parent = parent;
        g.merge_step = merge_step;
        Some(g)
    }

    #[test]
    fn cluster_count_shrinks_with_each_step() {
        let mut state = path_state();
        let counts: Vec<usize> = (0..=state.steps())
            .map(|step| {
                state.set_current_step(step).unwrap();
                state.current_number_of_clusters()
            })
            .collect();
        assert_eq!(counts, vec![4, 3, 2, 1]);
    }

    #[test]
    fn starts_at_optimum_and_rejects_steps_past_the_end() {
        let mut state = path_state();
        assert_eq!(state.current_step(), state.optimum_step());
        assert!(matches!(
            state.set_current_step(4),
            Err(Error::StepOutOfRange { requested: 4, steps: 3 })
        ));
        assert_eq!(state.current_step(), 2);
    }

    #[test]
    fn resolve_walks_to_the_cut() {
        let mut state = path_state();
        state.set_current_step(0).unwrap();
        for position in 0..4 {
            assert_eq!(state.resolve_to_current_cut(position).unwrap(), Some(position));
        }
        state.set_current_step(2).unwrap();
        assert_eq!(state.resolve_to_current_cut(0).unwrap(), Some(1));
        assert_eq!(state.resolve_to_current_cut(3).unwrap(), Some(2));
        assert_eq!(state.current_cluster_roots().unwrap(), vec![1, 2]);
        state.set_current_step(3).unwrap();
        let assignments = state.cluster_assignments().unwrap();
        assert!(assignments.iter().all(|&root| root == Some(2)));
    }

    #[test]
    fn cyclic_forest_is_reported() {
        let groups = vec![group(0, Some(1), 0), group(1, Some(0), 0)];
        let state = ClusterState::from_parts(groups, 1, 1, 0, 2, 0, true);
        assert!(matches!(
            state.resolve_to_current_cut(0),
            Err(Error::CorruptForest { .. })
        ));
    }

    #[test]
    fn merged_root_is_reported() {
        let groups = vec![group(0, None, 0), None];
        let state = ClusterState::from_parts(groups, 1, 1, 0, 2, 0, true);
        assert!(state.resolve_to_current_cut(0).is_err());
        assert_eq!(state.resolve_to_current_cut(1).unwrap(), None);
    }

    #[test]
    fn cluster_numbers_are_stable_within_a_redraw() {
        let groups = vec![group(0, None, UNSET_STEP), group(5, None, UNSET_STEP)];
        let mut state = ClusterState::from_parts(groups, 0, 0, 0, 6, 0, true);

        let token = state.begin_redraw();
        assert_eq!(state.assign_stable_cluster_number(1, token), Some(0));
        assert_eq!(state.assign_stable_cluster_number(0, token), Some(1));
        assert_eq!(state.assign_stable_cluster_number(1, token), Some(0));

        let token = state.begin_redraw();
        assert_eq!(state.assign_stable_cluster_number(0, token), Some(0));
        assert_eq!(state.cluster_seen_before()[0], 2);
        assert_eq!(state.redraw_count(), 2);
    }

    #[test]
    fn display_flags_leave_forest_alone() {
        let mut state = path_state();
        let before = state.groups().to_vec();
        state.set_interactive(false);
        state.set_colored(false);
        state.set_exclude_single_vertices(true);
        state.set_excluded_state(ExcludedState::Dimmed);
        assert_eq!(state.groups(), before.as_slice());
        assert_eq!(state.current_step(), 2);
        assert!(!state.is_stale(7));
        assert!(state.is_stale(8));
    }
}
