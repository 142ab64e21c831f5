use std::collections::HashMap;

use crate::error::{GraphError, GraphResult};
use crate::ir::op::{Op, OpKind};
use crate::ir::tensor::{EngineKind, LogicalTensor};
use crate::schema::lookup_schema;

/// The result of one successful rewrite: an owning group of ops with a
/// single fused-op representative.
///
/// Partitions are immutable after creation and hold read-only clones of
/// their member ops; boundary tensors reuse the matched value ids, so
/// downstream consumers of the parent graph need no rewiring.
#[derive(Debug, Clone)]
pub struct Partition {
    id: usize,
    engine: EngineKind,
    fused_op: Op,
    ops: Vec<Op>,
    inputs: Vec<LogicalTensor>,
    outputs: Vec<LogicalTensor>,
}

impl Partition {
    pub(crate) fn from_parts(
        id: usize,
        engine: EngineKind,
        fused_op: Op,
        ops: Vec<Op>,
        inputs: Vec<LogicalTensor>,
        outputs: Vec<LogicalTensor>,
    ) -> Self {
        Self {
            id,
            engine,
            fused_op,
            ops,
            inputs,
            outputs,
        }
    }

    pub(crate) fn remove_op(&mut self, op_id: u64) {
        self.ops.retain(|op| op.id() != op_id);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine
    }

    /// The representative op whose kind denotes the fused pattern.
    pub fn fused_op(&self) -> &Op {
        &self.fused_op
    }

    pub fn kind(&self) -> OpKind {
        self.fused_op.kind()
    }

    /// Ordered ids of the member ops.
    pub fn get_ops(&self) -> Vec<u64> {
        self.ops.iter().map(Op::id).collect()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn get_inputs(&self) -> &[LogicalTensor] {
        &self.inputs
    }

    pub fn get_outputs(&self) -> &[LogicalTensor] {
        &self.outputs
    }

    /// Whether the fused-op kind has a backend implementation.
    pub fn is_supported(&self) -> bool {
        self.fused_op.kind().has_backend_kernel()
    }

    /// Propagates shapes from `inputs` through the member ops' shape rules
    /// and writes the results into the caller's `outputs` tensors.
    ///
    /// `inputs` must carry the partition's input ids; `outputs` must carry
    /// the partition's output ids.
    pub fn infer_shape(
        &self,
        inputs: &[LogicalTensor],
        outputs: &mut [LogicalTensor],
    ) -> GraphResult<()> {
        let mut shapes: HashMap<u64, LogicalTensor> = HashMap::with_capacity(inputs.len());
        for tensor in inputs {
            if !self.inputs.iter().any(|t| t.id == tensor.id) {
                return Err(GraphError::invalid_argument(format!(
                    "tensor {} is not an input of partition {}",
                    tensor.id, self.id
                )));
            }
            shapes.insert(tensor.id, tensor.clone());
        }

        for op in &self.ops {
            let schema = lookup_schema(op.kind()).ok_or_else(|| {
                GraphError::unsupported(format!("shape inference for {}", op.kind()))
            })?;
            let op_inputs: Vec<LogicalTensor> = op
                .inputs()
                .iter()
                .map(|t| shapes.get(&t.id).cloned().unwrap_or_else(|| t.clone()))
                .collect();
            let mut op_outputs: Vec<LogicalTensor> = op.outputs().to_vec();
            schema.infer_shape(op, &op_inputs, &mut op_outputs)?;
            for tensor in op_outputs {
                shapes.insert(tensor.id, tensor);
            }
        }

        for out in outputs.iter_mut() {
            let inferred = shapes.get(&out.id).ok_or_else(|| {
                GraphError::invalid_argument(format!(
                    "tensor {} is not an output of partition {}",
                    out.id, self.id
                ))
            })?;
            out.shape = inferred.shape.clone();
        }
        Ok(())
    }
}
