//! Topological matching of patterns against a linked graph.
//!
//! Matching walks backwards along pattern edges from a root candidate.
//! Commutative nodes fork the match state and try both operand orders;
//! the first ordering that completes wins.

use std::collections::HashSet;

use crate::ir::graph::{Graph, NodeId};
use crate::pattern::{Pattern, PatternNodeId, PatternValue};

/// A successful binding of every pattern node to a distinct graph op.
#[derive(Debug, Clone)]
pub(crate) struct PatternMatch {
    /// Bound graph node per pattern node, in declaration order.
    pub(crate) bindings: Vec<NodeId>,
    /// Graph node bound to the pattern root.
    pub(crate) root: NodeId,
}

impl Pattern {
    /// Attempts a match rooted at `root`. Returns `None` when any
    /// constraint fails; match failure is never an error.
    pub(crate) fn match_rooted(&self, graph: &Graph, root: NodeId) -> Option<PatternMatch> {
        let mut state = MatchState {
            bound: vec![None; self.nodes.len()],
            inputs: vec![None; self.input_count],
            used: HashSet::new(),
        };
        state.bind(self, self.root, root, graph)?;

        let bindings: Option<Vec<NodeId>> = state.bound.iter().copied().collect();
        let bindings = bindings?;
        if !interior_values_stay_inside(graph, &bindings, root) {
            return None;
        }
        Some(PatternMatch { bindings, root })
    }
}

/// Fan-out safety: no matched op other than the root may have an output
/// consumed outside the match.
fn interior_values_stay_inside(graph: &Graph, bindings: &[NodeId], root: NodeId) -> bool {
    let members: HashSet<NodeId> = bindings.iter().copied().collect();
    let links = graph.links_ref();
    for &node in bindings {
        if node == root {
            continue;
        }
        for tensor in graph.op(node).outputs() {
            let escapes = links
                .consumers(tensor.id)
                .iter()
                .any(|(consumer, _)| !members.contains(consumer));
            if escapes {
                return false;
            }
        }
    }
    true
}

#[derive(Clone)]
struct MatchState {
    bound: Vec<Option<NodeId>>,
    inputs: Vec<Option<u64>>,
    used: HashSet<NodeId>,
}

impl MatchState {
    fn bind(
        &mut self,
        pattern: &Pattern,
        pnode: PatternNodeId,
        candidate: NodeId,
        graph: &Graph,
    ) -> Option<()> {
        let template = pattern.node(pnode);

        if let Some(existing) = self.bound[pnode.index()] {
            return (existing == candidate).then_some(());
        }
        if self.used.contains(&candidate) || graph.is_claimed(candidate) {
            return None;
        }

        let op = graph.op(candidate);
        if op.kind() != template.kind {
            return None;
        }
        if template.exact_arity {
            if op.num_inputs() != template.inputs.len() {
                return None;
            }
        } else if op.num_inputs() < template.inputs.len() {
            return None;
        }
        for (name, expected) in &template.attr_eq {
            if op.attr(name) != Some(expected) {
                return None;
            }
        }

        let mut base = self.clone();
        base.bound[pnode.index()] = Some(candidate);
        base.used.insert(candidate);

        let try_commutative =
            template.commutative && template.inputs.len() == 2 && op.num_inputs() == 2;
        if !try_commutative {
            for (slot, edge) in template.inputs.iter().enumerate() {
                base.match_edge(pattern, edge, candidate, slot, graph)?;
            }
            *self = base;
            return Some(());
        }

        for order in [[0usize, 1], [1, 0]] {
            let mut fork = base.clone();
            let ok = order.into_iter().enumerate().all(|(templ_slot, real_slot)| {
                fork.match_edge(
                    pattern,
                    &template.inputs[templ_slot],
                    candidate,
                    real_slot,
                    graph,
                )
                .is_some()
            });
            if ok {
                *self = fork;
                return Some(());
            }
        }
        None
    }

    fn match_edge(
        &mut self,
        pattern: &Pattern,
        edge: &PatternValue,
        consumer: NodeId,
        slot: usize,
        graph: &Graph,
    ) -> Option<()> {
        let tensor_id = graph.op(consumer).inputs().get(slot)?.id;
        match edge {
            PatternValue::Input(index) => {
                let bound = &mut self.inputs[*index as usize];
                match *bound {
                    Some(existing) => (existing == tensor_id).then_some(()),
                    None => {
                        *bound = Some(tensor_id);
                        Some(())
                    }
                }
            }
            PatternValue::Node(pnode) => {
                let (producer, _) = graph.links_ref().producer(tensor_id)?;
                self.bind(pattern, *pnode, producer, graph)
            }
        }
    }
}
