//! Cluster states attached to named graphs
//!
//! A recluster computes a fresh state off to the side and swaps it in only
//! when the run succeeds, so readers never observe a half-built forest and a
//! failed or cancelled run leaves the previous state in place.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use crate::cluster::merger::{FastNewman, MergeOptions};
use crate::cluster::state::ClusterState;
use crate::cluster::Interaction;
use crate::error::{Error, Result};
use crate::graph::GraphSnapshot;

/// Lifecycle of a graph's clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detached,
    Interactive,
    NonInteractive,
}

#[derive(Debug, Default)]
pub struct ClusterRegistry {
    states: DashMap<String, ClusterState>,
    running: DashMap<String, ()>,
}

/// Clears the in-flight mark for a key when the run ends
struct RunGuard<'a> {
    running: &'a DashMap<String, ()>,
    key: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a state to `key`, returning the state it replaces
    pub fn attach(&self, key: &str, state: ClusterState) -> Option<ClusterState> {
        self.states.insert(key.to_string(), state)
    }

    pub fn detach(&self, key: &str) -> Option<ClusterState> {
        self.states.remove(key).map(|(_, state)| state)
    }

    pub fn phase(&self, key: &str) -> Phase {
        match self.states.get(key) {
            None => Phase::Detached,
            Some(state) if state.is_interactive() => Phase::Interactive,
            Some(_) => Phase::NonInteractive,
        }
    }

    pub fn with_state<R>(&self, key: &str, f: impl FnOnce(&ClusterState) -> R) -> Option<R> {
        self.states.get(key).map(|state| f(&state))
    }

    pub fn with_state_mut<R>(&self, key: &str, f: impl FnOnce(&mut ClusterState) -> R) -> Option<R> {
        self.states.get_mut(key).map(|mut state| f(&mut state))
    }

    pub fn is_reclustering(&self, key: &str) -> bool {
        self.running.contains_key(key)
    }

    /// Run a merge for `key` and attach the result.
    ///
    /// Display settings and the modification counter carry over from the
    /// state being replaced. Returns the number of merge steps.
    pub fn recluster<G, I>(
        &self,
        key: &str,
        graph: &G,
        options: MergeOptions,
        interactive: bool,
        interaction: &I,
    ) -> Result<u32>
    where
        G: GraphSnapshot,
        I: Interaction + ?Sized,
    {
        let _guard = {
            match self.running.entry(key.to_string()) {
                Entry::Occupied(_) => return Err(Error::ReclusterInProgress(key.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(());
                }
            }
            RunGuard { running: &self.running, key: key.to_string() }
        };

        log::info!("Reclustering '{}'", key);
        let result = match FastNewman::new(options).run(graph, interaction) {
            Ok(result) => result,
            Err(e) => {
                if e.is_cancelled() {
                    log::info!("Recluster of '{}' cancelled, keeping previous state", key);
                } else {
                    log::warn!("Recluster of '{}' failed: {}", key, e);
                }
                return Err(e);
            }
        };

        let mut state = ClusterState::from_merge(result, interactive);
        if let Some(previous) = self.states.get(key) {
            state.set_exclude_single_vertices(previous.exclude_single_vertices());
            state.set_excluded_state(previous.excluded_state());
            state.set_colored(previous.is_colored());
            state.set_modification_counter(previous.modification_counter() + 1);
        }
        let steps = state.steps();
        self.attach(key, state);

        log::info!("Attached clustering of '{}' with {} steps", key, steps);
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::cluster::state::ExcludedState;
    use crate::cluster::NoInteraction;
    use crate::graph::{CompressedGraph, GraphBuilder};

    fn path() -> CompressedGraph {
        let mut builder = GraphBuilder::default();
        builder.add_transaction("a", "b");
        builder.add_transaction("b", "c");
        builder.add_transaction("c", "d");
        builder.build()
    }

    struct Cancelling;

    impl Interaction for Cancelling {
        fn set_progress(&self, _: u32, _: u32, _: &str, _: bool) {}

        fn is_cancelled(&self) -> bool {
            true
        }
    }

    /// Tries a nested recluster on the same key from inside a running one
    struct Reentrant<'a> {
        registry: &'a ClusterRegistry,
        graph: &'a CompressedGraph,
        rejected: AtomicBool,
    }

    impl Interaction for Reentrant<'_> {
        fn set_progress(&self, _: u32, _: u32, _: &str, _: bool) {}

        fn is_cancelled(&self) -> bool {
            let nested = self.registry.recluster("g", self.graph, MergeOptions::default(), true, &NoInteraction);
            if matches!(nested, Err(Error::ReclusterInProgress(_))) {
                self.rejected.store(true, Ordering::SeqCst);
            }
            false
        }
    }

    #[test]
    fn recluster_attaches_and_detaches() {
        let registry = ClusterRegistry::new();
        let graph = path();
        assert_eq!(registry.phase("g"), Phase::Detached);

        let steps = registry.recluster("g", &graph, MergeOptions::default(), false, &NoInteraction).unwrap();
        assert_eq!(steps, 3);
        assert_eq!(registry.phase("g"), Phase::NonInteractive);
        assert_eq!(registry.with_state("g", |s| s.optimum_step()), Some(2));

        registry.with_state_mut("g", |s| s.set_interactive(true));
        assert_eq!(registry.phase("g"), Phase::Interactive);

        assert!(registry.detach("g").is_some());
        assert_eq!(registry.phase("g"), Phase::Detached);
    }

    #[test]
    fn attach_replaces_wholesale() {
        let registry = ClusterRegistry::new();
        let graph = path();
        let result = FastNewman::default().run(&graph, &NoInteraction).unwrap();
        assert!(registry.attach("g", ClusterState::from_merge(result.clone(), true)).is_none());

        let previous = registry.attach("g", ClusterState::from_merge(result, false)).unwrap();
        assert!(previous.is_interactive());
        assert_eq!(registry.phase("g"), Phase::NonInteractive);
    }

    #[test]
    fn cancelled_recluster_keeps_previous_state() {
        let registry = ClusterRegistry::new();
        let graph = path();
        registry.recluster("g", &graph, MergeOptions::default(), true, &NoInteraction).unwrap();
        registry.with_state_mut("g", |s| s.set_current_step(1).unwrap());

        let err = registry.recluster("g", &graph, MergeOptions::default(), true, &Cancelling).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(registry.with_state("g", |s| s.current_step()), Some(1));
        assert!(!registry.is_reclustering("g"));
    }

    #[test]
    fn display_settings_carry_over() {
        let registry = ClusterRegistry::new();
        let graph = path();
        registry.recluster("g", &graph, MergeOptions::default(), true, &NoInteraction).unwrap();
        registry.with_state_mut("g", |s| {
            s.set_exclude_single_vertices(true);
            s.set_excluded_state(ExcludedState::Dimmed);
        });

        registry.recluster("g", &graph, MergeOptions::default(), true, &NoInteraction).unwrap();
        let (exclude, excluded, counter) = registry
            .with_state("g", |s| (s.exclude_single_vertices(), s.excluded_state(), s.modification_counter()))
            .unwrap();
        assert!(exclude);
        assert_eq!(excluded, ExcludedState::Dimmed);
        assert_eq!(counter, 0);
    }

    #[test]
    fn concurrent_recluster_is_rejected() {
        let registry = ClusterRegistry::new();
        let graph = path();
        let interaction = Reentrant { registry: &registry, graph: &graph, rejected: AtomicBool::new(false) };

        registry.recluster("g", &graph, MergeOptions::default(), true, &interaction).unwrap();
        assert!(interaction.rejected.load(Ordering::SeqCst));
        assert!(!registry.is_reclustering("g"));
    }
}
