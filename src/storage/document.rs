//! Persisted form of a cluster state
//!
//! Vertex ids may be renumbered when a graph is reloaded, so every id in the
//! document goes through a [`VertexIdMap`] on the way back in. Group slots
//! stay indexed by vertex position and empty slots are kept as `null`.

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::cluster::state::{ClusterState, ExcludedState};
use crate::cluster::Group;
use crate::error::{Error, Result};

/// Translation from stored vertex ids to the ids of the loaded graph
#[derive(Debug, Clone, Default)]
pub struct VertexIdMap {
    ids: HashMap<u32, u32>,
    capacity: usize,
}

impl VertexIdMap {
    /// Every id maps to itself, for `0..capacity`
    pub fn identity(capacity: usize) -> Self {
        Self::from_pairs((0..capacity as u32).map(|id| (id, id)))
    }

    pub fn from_pairs<I: IntoIterator<Item = (u32, u32)>>(pairs: I) -> Self {
        let ids: HashMap<u32, u32> = pairs.into_iter().collect();
        let capacity = ids.values().map(|&id| id as usize + 1).max().unwrap_or(0);
        Self { ids, capacity }
    }

    pub fn translate(&self, stored: u32) -> Option<u32> {
        self.ids.get(&stored).copied()
    }

    /// Size needed for arrays indexed by translated ids
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Serialized group, `parent` is a stored vertex id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDocument {
    pub vertex: u32,
    pub merge_step: u32,
    pub single_step: u32,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
}

fn not_found() -> i64 {
    -1
}

fn enabled() -> bool {
    true
}

/// Serialized cluster state with the fixed field names of the format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "not_found")]
    pub mod_count: i64,
    #[serde(default = "not_found")]
    pub struc_mod_count: i64,
    pub steps: u32,
    pub current_step: u32,
    #[serde(default)]
    pub optimum_step: u32,
    pub exclude_single_vertices: bool,
    pub exclude_elements_dimmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_elements_state: Option<ExcludedState>,
    pub redraw_count: u64,
    #[serde(default = "enabled")]
    pub interactive: bool,
    #[serde(default = "enabled")]
    pub colored: bool,
    pub cluster_numbers: Vec<u32>,
    pub cluster_seen_before: Vec<u64>,
    pub groups: Vec<Option<GroupDocument>>,
}

/// Capture a state in its persisted form
pub fn to_document(state: &ClusterState) -> StateDocument {
    let groups = state.groups.iter()
        .map(|slot| {
            slot.as_ref().map(|group| GroupDocument {
                vertex: group.vertex,
                merge_step: group.merge_step,
                single_step: group.single_step,
                color: group.color.to_string(),
                parent: group.parent
                    .and_then(|p| state.group(p))
                    .map(|parent| parent.vertex),
            })
        })
        .collect();

    StateDocument {
        mod_count: state.modification_counter,
        struc_mod_count: state.structure_modification_counter,
        steps: state.steps,
        current_step: state.current_step,
        optimum_step: state.optimum_step,
        exclude_single_vertices: state.exclude_single_vertices,
        exclude_elements_dimmed: state.excluded_state == ExcludedState::Dimmed,
        excluded_elements_state: Some(state.excluded_state),
        redraw_count: state.redraw_count,
        interactive: state.interactive,
        colored: state.colored,
        cluster_numbers: state.cluster_numbers.clone(),
        cluster_seen_before: state.cluster_seen_before.clone(),
        groups,
    }
}

/// Rebuild a state, translating stored vertex ids through `ids`
pub fn from_document(document: StateDocument, ids: &VertexIdMap) -> Result<ClusterState> {
    if document.current_step > document.steps {
        return Err(Error::corrupt(format!(
            "current step {} exceeds {} steps",
            document.current_step, document.steps
        )));
    }
    if document.optimum_step > document.steps {
        return Err(Error::corrupt(format!(
            "optimum step {} exceeds {} steps",
            document.optimum_step, document.steps
        )));
    }

    // First pass: create every group and index positions by translated id
    let mut positions: HashMap<u32, usize> = HashMap::with_capacity(document.groups.len());
    let mut groups: Vec<Option<Group>> = Vec::with_capacity(document.groups.len());
    let mut parents: Vec<Option<u32>> = Vec::with_capacity(document.groups.len());

    for (position, slot) in document.groups.iter().enumerate() {
        let Some(stored) = slot else {
            groups.push(None);
            parents.push(None);
            continue;
        };

        let vertex = ids.translate(stored.vertex).ok_or_else(|| {
            Error::corrupt(format!("group vertex {} is not in the id table", stored.vertex))
        })?;
        if positions.insert(vertex, position).is_some() {
            return Err(Error::corrupt(format!("vertex {} anchors more than one group", vertex)));
        }

        let mut group = Group::new(vertex, 0.0);
        group.merge_step = stored.merge_step;
        group.single_step = stored.single_step;
        group.color = stored.color.parse()?;
        groups.push(Some(group));
        parents.push(stored.parent);
    }

    // Second pass: parents may appear after their children
    for (position, parent) in parents.iter().enumerate() {
        let Some(parent) = parent else {
            continue;
        };
        let translated = ids.translate(*parent)
            .ok_or_else(|| Error::corrupt(format!("parent vertex {} is not in the id table", parent)))?;
        let parent_position = *positions.get(&translated)
            .ok_or_else(|| Error::corrupt(format!("parent vertex {} has no group", parent)))?;
        if let Some(group) = groups[position].as_mut() {
            group.parent = Some(parent_position);
        }
    }

    check_acyclic(&groups)?;

    let capacity = ids.capacity();
    let mut state = ClusterState::from_parts(
        groups,
        document.steps,
        document.current_step,
        document.optimum_step,
        capacity,
        document.struc_mod_count,
        document.interactive,
    );

    state.modification_counter = document.mod_count;
    state.exclude_single_vertices = document.exclude_single_vertices;
    state.excluded_state = document.excluded_elements_state.unwrap_or(if document.exclude_elements_dimmed {
        ExcludedState::Dimmed
    } else {
        ExcludedState::Hidden
    });
    state.redraw_count = document.redraw_count;
    state.colored = document.colored;

    for (stored, &number) in document.cluster_numbers.iter().enumerate() {
        if let Some(id) = ids.translate(stored as u32) {
            state.cluster_numbers[id as usize] = number;
        }
    }
    for (stored, &seen) in document.cluster_seen_before.iter().enumerate() {
        if let Some(id) = ids.translate(stored as u32) {
            state.cluster_seen_before[id as usize] = seen;
        }
    }

    Ok(state)
}

/// Every parent chain must reach a root within `groups.len()` hops
fn check_acyclic(groups: &[Option<Group>]) -> Result<()> {
    // 0 = unvisited, 1 = on the current chain, 2 = known to reach a root
    let mut marks = vec![0u8; groups.len()];

    for start in 0..groups.len() {
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(position) = current {
            match marks[position] {
                2 => break,
                1 => {
                    return Err(Error::corrupt(format!(
                        "parent chain from position {} contains a cycle",
                        start
                    )))
                }
                _ => {}
            }
            marks[position] = 1;
            chain.push(position);
            current = groups[position].as_ref().and_then(|g| g.parent);
        }
        for position in chain {
            marks[position] = 2;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::UNSET_STEP;

    fn group(vertex: u32, parent: Option<u32>) -> Option<GroupDocument> {
        Some(GroupDocument {
            vertex,
            merge_step: if parent.is_some() { 1 } else { UNSET_STEP },
            single_step: 1,
            color: "#ff0000".to_string(),
            parent,
        })
    }

    fn document(groups: Vec<Option<GroupDocument>>) -> StateDocument {
        StateDocument {
            mod_count: 3,
            struc_mod_count: 4,
            steps: 1,
            current_step: 1,
            optimum_step: 1,
            exclude_single_vertices: false,
            exclude_elements_dimmed: true,
            excluded_elements_state: None,
            redraw_count: 2,
            interactive: true,
            colored: true,
            cluster_numbers: vec![0, 1, 2],
            cluster_seen_before: vec![2, 2, 0],
            groups,
        }
    }

    #[test]
    fn parents_resolve_after_all_groups_exist() {
        let doc = document(vec![group(0, Some(2)), None, group(2, None)]);
        let state = from_document(doc, &VertexIdMap::identity(3)).unwrap();
        assert_eq!(state.group(0).unwrap().parent, Some(2));
        assert!(state.group(1).is_none());
        assert_eq!(state.excluded_state(), ExcludedState::Dimmed);
    }

    #[test]
    fn renumbered_ids_are_translated() {
        let doc = document(vec![group(0, Some(2)), None, group(2, None)]);
        let ids = VertexIdMap::from_pairs([(0, 10), (2, 12), (1, 11)]);
        let state = from_document(doc, &ids).unwrap();
        assert_eq!(state.group(0).unwrap().vertex, 10);
        assert_eq!(state.group(0).unwrap().parent, Some(2));
        assert_eq!(state.cluster_numbers()[11], 1);
        assert_eq!(state.cluster_seen_before()[10], 2);
    }

    #[test]
    fn unknown_parent_is_corrupt() {
        let doc = document(vec![group(0, Some(7)), None, group(2, None)]);
        let err = from_document(doc, &VertexIdMap::identity(3)).unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[test]
    fn cycles_are_corrupt() {
        let doc = document(vec![group(0, Some(2)), None, group(2, Some(0))]);
        assert!(from_document(doc, &VertexIdMap::identity(3)).is_err());
    }

    #[test]
    fn missing_required_field_fails() {
        let json = r#"{"steps": 1, "current_step": 0, "groups": []}"#;
        assert!(serde_json::from_str::<StateDocument>(json).is_err());
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{
            "steps": 0, "current_step": 0, "exclude_single_vertices": false,
            "exclude_elements_dimmed": false, "redraw_count": 0,
            "cluster_numbers": [], "cluster_seen_before": [], "groups": [null]
        }"#;
        let doc: StateDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.mod_count, -1);
        assert_eq!(doc.struc_mod_count, -1);
        assert!(doc.interactive && doc.colored);
        assert_eq!(doc.optimum_step, 0);
        let state = from_document(doc, &VertexIdMap::identity(0)).unwrap();
        assert_eq!(state.excluded_state(), ExcludedState::Hidden);
        assert_eq!(state.groups().len(), 1);
    }
}
