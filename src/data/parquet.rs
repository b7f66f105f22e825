//! Parquet file handling for transaction graphs

use std::path::Path;
use anyhow::Result;
use polars::prelude::*;
use crate::graph::builder::WEIGHT_ATTRIBUTE;
use crate::graph::{CompressedGraph, GraphBuilder, GraphSnapshot};

/// Column layout of a transaction table
#[derive(Debug, Clone)]
pub struct TransactionColumns {
    pub source: String,
    pub target: String,
    /// Float column stored as the `weight` transaction attribute
    pub weight: Option<String>,
    /// Keep only rows where this column equals this value
    pub filter: Option<(String, String)>,
}

impl Default for TransactionColumns {
    fn default() -> Self {
        Self {
            source: "Fid".to_string(),
            target: "TargetFid".to_string(),
            weight: None,
            filter: None,
        }
    }
}

/// Load one transaction per row, endpoints identified by their labels
pub fn load_transactions(path: &str, columns: &TransactionColumns) -> Result<CompressedGraph> {
    log::info!("Reading parquet file: {}", path);

    if !Path::new(path).exists() {
        return Err(anyhow::anyhow!("File not found: {}", path));
    }

    let mut frame = LazyFrame::scan_parquet(path, Default::default())?;
    if let Some((column, value)) = &columns.filter {
        frame = frame.filter(col(column.as_str()).eq(lit(value.as_str())));
    }

    let mut selection = vec![
        col(columns.source.as_str()).cast(DataType::String).alias("source"),
        col(columns.target.as_str()).cast(DataType::String).alias("target"),
    ];
    if let Some(weight) = &columns.weight {
        selection.push(col(weight.as_str()).cast(DataType::Float32).alias("weight"));
    }
    let df = frame.select(selection).collect()?;

    log::debug!("Transaction schema: {:?}", df.schema());
    log::info!("Loaded {} transactions", df.height());

    let sources = df.column("source")?.str()?;
    let targets = df.column("target")?.str()?;
    let weights = match columns.weight {
        Some(_) => Some(df.column("weight")?.f32()?),
        None => None,
    };

    let mut builder = GraphBuilder::with_capacity(df.height());
    let mut skipped = 0usize;

    for row in 0..df.height() {
        let (Some(source), Some(target)) = (sources.get(row), targets.get(row)) else {
            skipped += 1;
            continue;
        };
        let transaction = builder.add_transaction(source, target);
        if let Some(weights) = weights {
            // Missing weights count as zero
            let weight = weights.get(row).unwrap_or(0.0);
            builder.set_transaction_float(WEIGHT_ATTRIBUTE, transaction, weight)?;
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} rows with a missing endpoint", skipped);
    }

    let graph = builder.build();
    log::info!(
        "Built graph with {} vertices, {} links and {} transactions",
        graph.vertex_count(),
        graph.link_count(),
        graph.transaction_count()
    );

    Ok(graph)
}
