//! Declarative subgraph patterns.
//!
//! A pattern is a rooted DAG of pattern nodes built with [`Pattern::builder`].
//! Passes hold patterns as data; the matcher in [`matcher`] is a single
//! general routine.

mod matcher;

use crate::ir::attribute::AttrValue;
use crate::ir::op::OpKind;

/// Identifier of a node inside one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternNodeId(pub u32);

impl PatternNodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value reference on a pattern edge: either another pattern node's output
/// or a pattern-external input slot.
///
/// External inputs with the same index must resolve to the same tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternValue {
    Node(PatternNodeId),
    Input(u32),
}

#[derive(Debug, Clone)]
pub struct PatternNode {
    pub(crate) kind: OpKind,
    pub(crate) inputs: Vec<PatternValue>,
    /// When set, the candidate op must have exactly `inputs.len()` input
    /// slots; otherwise the listed slots are a constrained prefix.
    pub(crate) exact_arity: bool,
    /// Opt-in order-free matching for 2-input nodes; both operand orders
    /// are tried and the first that succeeds wins.
    pub(crate) commutative: bool,
    pub(crate) attr_eq: Vec<(&'static str, AttrValue)>,
}

/// A rooted topological pattern plus the constraints checked per node.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub(crate) nodes: Vec<PatternNode>,
    pub(crate) root: PatternNodeId,
    pub(crate) input_count: usize,
}

impl Pattern {
    pub fn builder() -> PatternBuilder {
        PatternBuilder { nodes: Vec::new() }
    }

    pub fn root(&self) -> PatternNodeId {
        self.root
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: PatternNodeId) -> &PatternNode {
        &self.nodes[id.index()]
    }
}

pub struct PatternBuilder {
    nodes: Vec<PatternNode>,
}

impl PatternBuilder {
    /// Adds a pattern node with exact input arity.
    pub fn node(
        &mut self,
        kind: OpKind,
        inputs: impl Into<Vec<PatternValue>>,
    ) -> PatternNodeId {
        let id = PatternNodeId(self.nodes.len() as u32);
        self.nodes.push(PatternNode {
            kind,
            inputs: inputs.into(),
            exact_arity: true,
            commutative: false,
            attr_eq: Vec::new(),
        });
        id
    }

    /// Relaxes a node so the listed inputs constrain only a slot prefix.
    pub fn prefix_arity(&mut self, node: PatternNodeId) -> &mut Self {
        self.nodes[node.index()].exact_arity = false;
        self
    }

    /// Marks a 2-input node as order-free.
    pub fn commutative(&mut self, node: PatternNodeId) -> &mut Self {
        self.nodes[node.index()].commutative = true;
        self
    }

    /// Requires a scalar attribute to equal `value` on the matched op.
    pub fn attr_eq(
        &mut self,
        node: PatternNodeId,
        name: &'static str,
        value: impl Into<AttrValue>,
    ) -> &mut Self {
        self.nodes[node.index()].attr_eq.push((name, value.into()));
        self
    }

    pub fn finish(self, root: PatternNodeId) -> Pattern {
        let input_count = self
            .nodes
            .iter()
            .flat_map(|node| &node.inputs)
            .filter_map(|value| match value {
                PatternValue::Input(index) => Some(*index as usize + 1),
                PatternValue::Node(_) => None,
            })
            .max()
            .unwrap_or(0);
        Pattern {
            nodes: self.nodes,
            root,
            input_count,
        }
    }
}
