//! Pattern passes and the process-wide pass registry.
//!
//! A pass bundles a name, a priority, and one or more alternative patterns
//! that rewrite to a single fused kind. The registry is populated with the
//! builtin table on first access; registration afterwards is append-only
//! and names are unique.

mod fusions;
pub mod manager;

use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{GraphError, GraphResult};
use crate::ir::graph::Graph;
use crate::ir::op::OpKind;
use crate::pattern::Pattern;

/// Category tag recorded in the persisted pass list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    Fusion,
}

impl PassType {
    pub fn as_str(self) -> &'static str {
        match self {
            PassType::Fusion => "fusion",
        }
    }
}

/// Statistics returned by a pass after it runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    pub changed: bool,
    pub rewrites_applied: usize,
}

impl PassResult {
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
        }
    }
}

/// A named pattern pass producing partitions of one fused kind.
pub struct FusionPass {
    name: String,
    pass_type: PassType,
    priority: f32,
    fused_kind: OpKind,
    patterns: Vec<Pattern>,
}

impl FusionPass {
    pub fn new(
        name: impl Into<String>,
        priority: f32,
        fused_kind: OpKind,
        patterns: Vec<Pattern>,
    ) -> Self {
        Self {
            name: name.into(),
            pass_type: PassType::Fusion,
            priority,
            fused_kind,
            patterns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn fused_kind(&self) -> OpKind {
        self.fused_kind
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Runs the pass over `graph`.
    ///
    /// Root candidates are visited in reverse topological order; when two
    /// candidates would yield overlapping matches the first encountered
    /// wins and the other is skipped. Alternative patterns are tried in
    /// declaration order per candidate. Every applied match atomically
    /// moves its ops into a new partition.
    pub fn run(&self, graph: &mut Graph) -> GraphResult<PassResult> {
        graph.ensure_linked()?;
        let order: Vec<_> = graph.links_ref().topo_order().to_vec();

        let mut rewrites = 0usize;
        for &node in order.iter().rev() {
            if graph.is_claimed(node) {
                continue;
            }
            for pattern in &self.patterns {
                if graph.op(node).kind() != pattern.node(pattern.root()).kind {
                    continue;
                }
                if let Some(matched) = pattern.match_rooted(graph, node) {
                    graph.apply_rewrite(&matched.bindings, matched.root, self.fused_kind)?;
                    rewrites += 1;
                    break;
                }
            }
        }
        Ok(PassResult {
            changed: rewrites > 0,
            rewrites_applied: rewrites,
        })
    }
}

struct PassRegistry {
    passes: RwLock<Vec<Arc<FusionPass>>>,
}

impl PassRegistry {
    fn with_builtins() -> Self {
        let passes = fusions::builtin_passes()
            .into_iter()
            .map(Arc::new)
            .collect();
        Self {
            passes: RwLock::new(passes),
        }
    }

    fn register(&self, pass: FusionPass) -> GraphResult<()> {
        let mut passes = self
            .passes
            .write()
            .map_err(|_| GraphError::invalid_argument("pass registry lock poisoned"))?;
        if passes.iter().any(|existing| existing.name() == pass.name()) {
            return Err(GraphError::invalid_argument(format!(
                "pass {} is already registered",
                pass.name()
            )));
        }
        passes.push(Arc::new(pass));
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<FusionPass>> {
        self.passes.read().map(|p| p.clone()).unwrap_or_default()
    }

    fn find(&self, name: &str) -> Option<Arc<FusionPass>> {
        self.passes
            .read()
            .ok()?
            .iter()
            .find(|pass| pass.name() == name)
            .cloned()
    }
}

static GLOBAL_PASSES: OnceLock<PassRegistry> = OnceLock::new();

fn global_passes() -> &'static PassRegistry {
    GLOBAL_PASSES.get_or_init(PassRegistry::with_builtins)
}

/// Appends a pass to the process-wide registry. Names must be unique.
pub fn register_pass(pass: FusionPass) -> GraphResult<()> {
    global_passes().register(pass)
}

/// Looks up a registered pass by name.
pub fn get_pass(name: &str) -> Option<Arc<FusionPass>> {
    global_passes().find(name)
}

/// Snapshot of every registered pass in registration order.
pub fn registered_passes() -> Vec<Arc<FusionPass>> {
    global_passes().snapshot()
}
