//! Pass manager: ordering, optional JSON-config override, and the driver
//! loop that turns a linked graph into partitions.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::ir::graph::Graph;
use crate::pass::{registered_passes, FusionPass, PassResult};

fn default_enable() -> bool {
    true
}

/// One entry of the persisted pass list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassConfigEntry {
    pub pass_name: String,
    pub pass_type: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub priority: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassConfig {
    pub passes: Vec<PassConfigEntry>,
}

/// Orders registered passes and drives them over a graph.
pub struct PassManager {
    passes: Vec<Arc<FusionPass>>,
}

impl PassManager {
    /// Snapshots the process-wide pass registry.
    pub fn new() -> Self {
        Self {
            passes: registered_passes(),
        }
    }

    pub fn get_passes(&self) -> &[Arc<FusionPass>] {
        &self.passes
    }

    /// The effective pass list: config order verbatim minus disabled
    /// entries when a config is supplied, priority-descending otherwise.
    pub fn effective_passes(&self, config: Option<&Path>) -> GraphResult<Vec<Arc<FusionPass>>> {
        match config {
            None => {
                let mut ordered = self.passes.clone();
                ordered.sort_by(|a, b| {
                    b.priority()
                        .partial_cmp(&a.priority())
                        .unwrap_or(Ordering::Equal)
                });
                Ok(ordered)
            }
            Some(path) => {
                let config = load_config(path)?;
                let mut ordered = Vec::with_capacity(config.passes.len());
                for entry in &config.passes {
                    if !entry.enable {
                        continue;
                    }
                    match self.passes.iter().find(|p| p.name() == entry.pass_name) {
                        Some(pass) => ordered.push(pass.clone()),
                        None => {
                            eprintln!(
                                "[pass_manager] ignoring unknown pass {} from {}",
                                entry.pass_name,
                                path.display()
                            );
                        }
                    }
                }
                Ok(ordered)
            }
        }
    }

    /// Runs the effective pass list over `graph`, then wraps every
    /// still-unclaimed op in a single-op partition.
    pub fn run_passes(&self, graph: &mut Graph, config: Option<&Path>) -> GraphResult<()> {
        graph.ensure_linked()?;
        let log_stats = std::env::var("OPGRAPH_PASS_STATS").is_ok();

        let mut totals = PassResult::default();
        for pass in self.effective_passes(config)? {
            let stats = pass.run(graph)?;
            totals = totals.merge(stats);
            if log_stats {
                println!(
                    "[pass_manager] pass={} rewrites={} partitions={}",
                    pass.name(),
                    stats.rewrites_applied,
                    graph.num_partitions()
                );
            }
        }

        graph.materialize_single_op_partitions();
        if log_stats {
            println!(
                "[pass_manager] done rewrites={} partitions={}",
                totals.rewrites_applied,
                graph.num_partitions()
            );
        }
        Ok(())
    }

    /// Dumps the current ordering and metadata to JSON for later replay.
    pub fn print_passes(&self, path: &Path) -> GraphResult<()> {
        let ordered = self.effective_passes(None)?;
        let config = PassConfig {
            passes: ordered
                .iter()
                .map(|pass| PassConfigEntry {
                    pass_name: pass.name().to_string(),
                    pass_type: pass.pass_type().as_str().to_string(),
                    enable: true,
                    priority: pass.priority(),
                })
                .collect(),
        };
        let payload = serde_json::to_string_pretty(&config).map_err(|err| {
            GraphError::invalid_argument(format!("cannot serialize pass list: {err}"))
        })?;
        fs::write(path, payload).map_err(|err| {
            GraphError::invalid_argument(format!("cannot write {}: {err}", path.display()))
        })
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

fn load_config(path: &Path) -> GraphResult<PassConfig> {
    let payload = fs::read_to_string(path).map_err(|err| {
        GraphError::invalid_argument(format!("cannot read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&payload).map_err(|err| {
        GraphError::invalid_argument(format!("malformed pass config {}: {err}", path.display()))
    })
}
