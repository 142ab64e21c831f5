//! Graph container and the link pass.
//!
//! Ops live in an arena and are referenced by index; value edges are
//! `(node, slot)` pairs resolved by tensor id. Rewrites never remove ops
//! from the arena: claimed ops leave the active list but stay visible for
//! introspection, and the partitions produced by rewrites are owned by the
//! graph.

use std::collections::{HashMap, HashSet, VecDeque};

use smallvec::SmallVec;

use crate::error::{GraphError, GraphResult};
use crate::ir::op::{Op, OpKind};
use crate::ir::partition::Partition;
use crate::ir::tensor::{EngineKind, LogicalTensor};
use crate::pass::manager::PassManager;

/// Stable identifier of an op slot in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Client-chosen strategy controlling which passes to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPolicy {
    /// Run the registered fusion passes, then wrap leftovers one op each.
    Fusion,
    /// Skip fusion entirely; every op becomes its own partition.
    Debug,
}

struct OpEntry {
    op: Op,
    claimed_by: Option<usize>,
    deleted: bool,
}

/// Producer/consumer indices derived by the link pass.
pub(crate) struct LinkState {
    producer_of: HashMap<u64, (NodeId, usize)>,
    consumers_of: HashMap<u64, SmallVec<[(NodeId, usize); 4]>>,
    topo: Vec<NodeId>,
}

impl LinkState {
    pub(crate) fn producer(&self, tensor_id: u64) -> Option<(NodeId, usize)> {
        self.producer_of.get(&tensor_id).copied()
    }

    pub(crate) fn consumers(&self, tensor_id: u64) -> &[(NodeId, usize)] {
        self.consumers_of
            .get(&tensor_id)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn topo_order(&self) -> &[NodeId] {
        &self.topo
    }
}

/// An ordered collection of ops plus the partitions produced over them.
pub struct Graph {
    engine: EngineKind,
    entries: Vec<OpEntry>,
    tensors: HashMap<u64, LogicalTensor>,
    partitions: Vec<Partition>,
    links: Option<LinkState>,
    internal_ids: u64,
}

impl Graph {
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            entries: Vec::new(),
            tensors: HashMap::new(),
            partitions: Vec::new(),
            links: None,
            internal_ids: 0,
        }
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine
    }

    /// Inserts an op into the graph.
    ///
    /// When a schema is registered for the op's kind, missing attributes are
    /// populated from schema defaults and the result is verified. The graph
    /// is left unchanged on any error. Adding after `build_graph` is allowed
    /// and invalidates link state until the next access.
    pub fn add_op(&mut self, op: &Op) -> GraphResult<()> {
        if self.live_entries().any(|(_, entry)| entry.op.id() == op.id()) {
            return Err(GraphError::DuplicateId { id: op.id() });
        }

        let mut op = op.clone();
        if let Some(schema) = crate::schema::lookup_schema(op.kind()) {
            schema.set_default_attributes(&mut op);
            if !schema.verify(&op) {
                return Err(GraphError::InvalidOp {
                    id: op.id(),
                    name: op.name().to_string(),
                });
            }
        }

        let mut staged: HashMap<u64, LogicalTensor> = HashMap::new();
        for tensor in op.inputs().iter().chain(op.outputs()) {
            tensor.validate()?;
            let known = self.tensors.get(&tensor.id).or_else(|| staged.get(&tensor.id));
            match known {
                Some(existing) if existing != tensor => {
                    return Err(GraphError::invalid_argument(format!(
                        "tensor {} redefined with different structure",
                        tensor.id
                    )));
                }
                Some(_) => {}
                None => {
                    staged.insert(tensor.id, tensor.clone());
                }
            }
        }

        self.tensors.extend(staged);
        self.entries.push(OpEntry {
            op,
            claimed_by: None,
            deleted: false,
        });
        self.links = None;
        Ok(())
    }

    /// Link pass: resolves every input slot to its unique producer and
    /// validates that the value graph is acyclic.
    pub fn build_graph(&mut self) -> GraphResult<()> {
        let links = self.compute_links()?;
        self.links = Some(links);
        Ok(())
    }

    pub fn num_ops(&self) -> usize {
        self.live_entries().count()
    }

    /// All ops in insertion order, claimed ones included.
    pub fn get_ops(&self) -> Vec<&Op> {
        self.live_entries().map(|(_, entry)| &entry.op).collect()
    }

    /// Active ops none of whose input slots have an in-graph producer.
    pub fn get_inputs(&mut self) -> GraphResult<Vec<&Op>> {
        self.ensure_linked()?;
        let links = self.links_ref();
        let mut inputs = Vec::new();
        for (_, entry) in self.live_entries() {
            if entry.claimed_by.is_some() {
                continue;
            }
            let linked = entry
                .op
                .inputs()
                .iter()
                .filter(|t| links.producer(t.id).is_some())
                .count();
            if linked == 0 {
                inputs.push(&entry.op);
            }
        }
        Ok(inputs)
    }

    /// Active ops whose outputs have no active consumer.
    pub fn get_outputs(&mut self) -> GraphResult<Vec<&Op>> {
        self.ensure_linked()?;
        let links = self.links_ref();
        let claimed: HashSet<NodeId> = self
            .live_entries()
            .filter(|(_, entry)| entry.claimed_by.is_some())
            .map(|(id, _)| id)
            .collect();
        let mut outputs = Vec::new();
        for (_, entry) in self.live_entries() {
            if entry.claimed_by.is_some() {
                continue;
            }
            let consumed = entry.op.outputs().iter().any(|t| {
                links
                    .consumers(t.id)
                    .iter()
                    .any(|(consumer, _)| !claimed.contains(consumer))
            });
            if !consumed {
                outputs.push(&entry.op);
            }
        }
        Ok(outputs)
    }

    /// Removes an op from the graph and drops any partition references.
    pub fn delete_node(&mut self, op_id: u64) -> GraphResult<()> {
        let Some((node, partition)) = self
            .live_entries()
            .find(|(_, entry)| entry.op.id() == op_id)
            .map(|(id, entry)| (id, entry.claimed_by))
        else {
            return Err(GraphError::invalid_argument(format!(
                "op {op_id} is not in the graph"
            )));
        };
        if let Some(idx) = partition {
            self.partitions[idx].remove_op(op_id);
        }
        self.entries[node.index()].deleted = true;
        self.links = None;
        Ok(())
    }

    /// Runs the partitioning flow for `policy` over this graph.
    pub fn run_pass(&mut self, policy: PartitionPolicy) -> GraphResult<()> {
        match policy {
            PartitionPolicy::Fusion => PassManager::new().run_passes(self, None),
            PartitionPolicy::Debug => {
                self.ensure_linked()?;
                self.materialize_single_op_partitions();
                Ok(())
            }
        }
    }

    pub fn get_partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    // ---- crate-internal surface used by the matcher and rewrites ----

    pub(crate) fn ensure_linked(&mut self) -> GraphResult<()> {
        if self.links.is_none() {
            self.links = Some(self.compute_links()?);
        }
        Ok(())
    }

    pub(crate) fn links_ref(&self) -> &LinkState {
        self.links.as_ref().expect("link pass must have run")
    }

    pub(crate) fn op(&self, node: NodeId) -> &Op {
        &self.entries[node.index()].op
    }

    pub(crate) fn is_claimed(&self, node: NodeId) -> bool {
        self.entries[node.index()].claimed_by.is_some()
    }

    /// Applies one match atomically: spawns the fused op, moves the matched
    /// ops into a new partition, and claims them.
    pub(crate) fn apply_rewrite(
        &mut self,
        matched: &[NodeId],
        root: NodeId,
        fused_kind: OpKind,
    ) -> GraphResult<()> {
        let members: HashSet<NodeId> = matched.iter().copied().collect();
        let links = self.links_ref();

        let mut inputs = Vec::new();
        for node in matched {
            for tensor in self.op(*node).inputs() {
                let internal = links
                    .producer(tensor.id)
                    .is_some_and(|(producer, _)| members.contains(&producer));
                if !internal {
                    inputs.push(tensor.clone());
                }
            }
        }
        let outputs: Vec<LogicalTensor> = self.op(root).outputs().to_vec();

        let mut fused = Op::new(self.alloc_internal_id(), fused_kind, fused_kind.as_str());
        for tensor in &inputs {
            fused.add_input(tensor.clone());
        }
        for tensor in &outputs {
            fused.add_output(tensor.clone());
        }

        let ops: Vec<Op> = matched.iter().map(|node| self.op(*node).clone()).collect();
        let partition_index = self.partitions.len();
        self.partitions.push(Partition::from_parts(
            partition_index,
            self.engine,
            fused,
            ops,
            inputs,
            outputs,
        ));
        for node in matched {
            self.entries[node.index()].claimed_by = Some(partition_index);
        }
        Ok(())
    }

    /// Wraps every still-unclaimed op in a partition of its own. Idempotent.
    pub(crate) fn materialize_single_op_partitions(&mut self) {
        let unclaimed: Vec<NodeId> = self
            .live_entries()
            .filter(|(_, entry)| entry.claimed_by.is_none())
            .map(|(id, _)| id)
            .collect();
        for node in unclaimed {
            let op = self.entries[node.index()].op.clone();
            let partition_index = self.partitions.len();
            self.partitions.push(Partition::from_parts(
                partition_index,
                self.engine,
                op.clone(),
                vec![op.clone()],
                op.inputs().to_vec(),
                op.outputs().to_vec(),
            ));
            self.entries[node.index()].claimed_by = Some(partition_index);
        }
    }

    fn live_entries(&self) -> impl Iterator<Item = (NodeId, &OpEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(index, entry)| (NodeId(index as u32), entry))
    }

    fn alloc_internal_id(&mut self) -> u64 {
        self.internal_ids += 1;
        u64::MAX - self.internal_ids
    }

    fn compute_links(&self) -> GraphResult<LinkState> {
        let mut producer_of: HashMap<u64, (NodeId, usize)> = HashMap::new();
        let mut consumers_of: HashMap<u64, SmallVec<[(NodeId, usize); 4]>> = HashMap::new();

        for (id, entry) in self.live_entries() {
            for (slot, tensor) in entry.op.outputs().iter().enumerate() {
                if producer_of.insert(tensor.id, (id, slot)).is_some() {
                    return Err(GraphError::invalid_graph(format!(
                        "tensor {} has more than one producer",
                        tensor.id
                    )));
                }
            }
        }
        for (id, entry) in self.live_entries() {
            for (slot, tensor) in entry.op.inputs().iter().enumerate() {
                if producer_of.contains_key(&tensor.id) {
                    consumers_of.entry(tensor.id).or_default().push((id, slot));
                }
            }
        }

        // Kahn's algorithm over value edges; a leftover node means a cycle.
        let live: Vec<NodeId> = self.live_entries().map(|(id, _)| id).collect();
        let mut indegree: HashMap<NodeId, usize> = HashMap::with_capacity(live.len());
        for &id in &live {
            let op = self.op(id);
            let linked = op
                .inputs()
                .iter()
                .filter(|t| producer_of.contains_key(&t.id))
                .count();
            indegree.insert(id, linked);
        }

        let mut queue: VecDeque<NodeId> = live
            .iter()
            .copied()
            .filter(|id| indegree[id] == 0)
            .collect();
        let mut topo = Vec::with_capacity(live.len());
        while let Some(node) = queue.pop_front() {
            topo.push(node);
            for tensor in self.op(node).outputs() {
                if let Some(consumers) = consumers_of.get(&tensor.id) {
                    for (consumer, _) in consumers {
                        let degree = indegree
                            .get_mut(consumer)
                            .expect("consumer must be a live node");
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*consumer);
                        }
                    }
                }
            }
        }
        if topo.len() != live.len() {
            return Err(GraphError::invalid_graph("value graph contains a cycle"));
        }

        Ok(LinkState {
            producer_of,
            consumers_of,
            topo,
        })
    }
}
