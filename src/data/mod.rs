//! Data loading

pub mod parquet;
