use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Extent value denoting an unknown dimension in a tensor shape.
pub const DIM_UNKNOWN: i64 = -1;

/// Enumerates scalar element types carried on logical tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F16,
    Bf16,
    S8,
    U8,
    S32,
    Boolean,
}

/// Layout classification of a logical tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutKind {
    Undef,
    Any,
    Strided,
    Opaque,
}

/// Engine the graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    Cpu,
    Gpu,
}

/// A named, typed, possibly shape-unknown value on an edge of the IR.
///
/// Identifiers are client-provided and must be unique within a graph; two
/// tensors carrying the same id in one graph must be structurally equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalTensor {
    pub id: u64,
    pub dtype: DataType,
    pub shape: Option<Vec<i64>>,
    pub layout: LayoutKind,
}

impl LogicalTensor {
    pub fn new(id: u64, dtype: DataType) -> Self {
        Self {
            id,
            dtype,
            shape: None,
            layout: LayoutKind::Undef,
        }
    }

    pub fn with_shape(mut self, dims: impl Into<Vec<i64>>) -> Self {
        self.shape = Some(dims.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutKind) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the rank when a shape has been recorded.
    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(|dims| dims.len())
    }

    /// Returns static dimensions when the shape is known and fully static.
    pub fn static_dims(&self) -> Option<&[i64]> {
        let dims = self.shape.as_deref()?;
        dims.iter().all(|&d| d != DIM_UNKNOWN).then_some(dims)
    }

    pub(crate) fn validate(&self) -> GraphResult<()> {
        if let Some(dims) = &self.shape {
            for &dim in dims {
                if dim < DIM_UNKNOWN {
                    return Err(GraphError::invalid_argument(format!(
                        "tensor {} has malformed extent {dim}",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }
}
