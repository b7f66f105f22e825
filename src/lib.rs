//! Core library for hierarchical Fast Newman clustering of transaction graphs

pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod cluster;
pub mod registry;
pub mod storage;
pub mod viz;

pub use cluster::merger::{FastNewman, MergeOptions, MergeResult};
pub use cluster::state::{ClusterState, ExcludedState};
pub use cluster::{Interaction, NoInteraction};
pub use error::{Error, Result};
pub use graph::{CompressedGraph, GraphSnapshot};
