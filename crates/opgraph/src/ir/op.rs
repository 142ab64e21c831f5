use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::ir::attribute::{read_attr, AttrValue, FromAttr};
use crate::ir::tensor::LogicalTensor;

/// Closed enumeration of operator kinds.
///
/// Public kinds come first; the `Conv*`/`Matmul*`/`Bn*` tail is the internal
/// range of fused kinds produced by rewrite passes and never constructed by
/// framework adapters directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum OpKind {
    Abs,
    Add,
    AvgPool,
    BatchNormInference,
    BatchNormForwardTraining,
    BatchNormTrainingBackprop,
    BiasAdd,
    BiasAddBackprop,
    Concat,
    Convolution,
    ConvolutionBackpropData,
    ConvolutionBackpropFilters,
    Divide,
    Elu,
    Erf,
    Exp,
    GELU,
    GELUBackprop,
    HardTanh,
    LayerNorm,
    Log,
    LogSoftmax,
    MatMul,
    MaxPool,
    Maximum,
    Minimum,
    Multiply,
    Pow,
    ReLU,
    ReLUBackprop,
    Reshape,
    Sigmoid,
    SoftMax,
    Sqrt,
    Square,
    Tanh,
    Wildcard,
    End,
    // Internal fused kinds.
    ConvBias,
    ConvRelu,
    ConvBiasRelu,
    ConvBn,
    ConvBiasBn,
    ConvBnRelu,
    ConvAdd,
    ConvBnAdd,
    ConvBnAddRelu,
    ConvBiasBnRelu,
    ConvBiasBnAdd,
    ConvBiasBnAddRelu,
    ConvBiasAdd,
    ConvBiasAddRelu,
    ConvBiasAddElu,
    ConvBiasAddRelu6,
    ConvAddRelu,
    ConvAddElu,
    ConvAddRelu6,
    ConvBiasElu,
    ConvBiasSigmoid,
    ConvBiasSwish,
    ConvBiasHardTanh,
    ConvBiasRelu6,
    ConvBiasSquare,
    ConvBiasTanh,
    ConvBiasAbs,
    ConvBiasSqrt,
    BnRelu,
    BnBwdReluBwd,
    MatmulRelu,
    MatmulElu,
    MatmulSigmoid,
    MatmulHardTanh,
    MatmulGelu,
    MatmulAdd,
    MatmulAddGelu,
    MatmulAddRelu,
    MatmulBias,
    MatmulBiasSigmoid,
    MatmulBiasElu,
    MatmulBiasRelu,
    MatmulBiasHardTanh,
    MatmulBiasAdd,
    MatmulBiasAddRelu,
    MatmulBiasSwish,
    MatmulBiasBn,
    MatmulBiasRelu6,
    ConvBwdFBiasaddBwd,
}

impl OpKind {
    /// Returns `true` for fused kinds from the internal range.
    pub fn is_internal(self) -> bool {
        self >= OpKind::ConvBias
    }

    /// Returns `true` when the backend can execute this kind as one kernel.
    ///
    /// Every fused kind has a kernel; public kinds follow the backend's
    /// single-op coverage table.
    pub fn has_backend_kernel(self) -> bool {
        if self.is_internal() {
            return true;
        }
        matches!(
            self,
            OpKind::Abs
                | OpKind::Add
                | OpKind::AvgPool
                | OpKind::BatchNormInference
                | OpKind::BatchNormForwardTraining
                | OpKind::BatchNormTrainingBackprop
                | OpKind::Convolution
                | OpKind::ConvolutionBackpropData
                | OpKind::ConvolutionBackpropFilters
                | OpKind::Elu
                | OpKind::Exp
                | OpKind::GELUBackprop
                | OpKind::HardTanh
                | OpKind::LayerNorm
                | OpKind::Log
                | OpKind::LogSoftmax
                | OpKind::MatMul
                | OpKind::MaxPool
                | OpKind::Maximum
                | OpKind::Minimum
                | OpKind::Multiply
                | OpKind::Pow
                | OpKind::ReLU
                | OpKind::ReLUBackprop
                | OpKind::SoftMax
                | OpKind::Sqrt
                | OpKind::Square
                | OpKind::Tanh
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Abs => "Abs",
            OpKind::Add => "Add",
            OpKind::AvgPool => "AvgPool",
            OpKind::BatchNormInference => "BatchNormInference",
            OpKind::BatchNormForwardTraining => "BatchNormForwardTraining",
            OpKind::BatchNormTrainingBackprop => "BatchNormTrainingBackprop",
            OpKind::BiasAdd => "BiasAdd",
            OpKind::BiasAddBackprop => "BiasAddBackprop",
            OpKind::Concat => "Concat",
            OpKind::Convolution => "Convolution",
            OpKind::ConvolutionBackpropData => "ConvolutionBackpropData",
            OpKind::ConvolutionBackpropFilters => "ConvolutionBackpropFilters",
            OpKind::Divide => "Divide",
            OpKind::Elu => "Elu",
            OpKind::Erf => "Erf",
            OpKind::Exp => "Exp",
            OpKind::GELU => "GELU",
            OpKind::GELUBackprop => "GELUBackprop",
            OpKind::HardTanh => "HardTanh",
            OpKind::LayerNorm => "LayerNorm",
            OpKind::Log => "Log",
            OpKind::LogSoftmax => "LogSoftmax",
            OpKind::MatMul => "MatMul",
            OpKind::MaxPool => "MaxPool",
            OpKind::Maximum => "Maximum",
            OpKind::Minimum => "Minimum",
            OpKind::Multiply => "Multiply",
            OpKind::Pow => "Pow",
            OpKind::ReLU => "ReLU",
            OpKind::ReLUBackprop => "ReLUBackprop",
            OpKind::Reshape => "Reshape",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::SoftMax => "SoftMax",
            OpKind::Sqrt => "Sqrt",
            OpKind::Square => "Square",
            OpKind::Tanh => "Tanh",
            OpKind::Wildcard => "Wildcard",
            OpKind::End => "End",
            OpKind::ConvBias => "conv_bias",
            OpKind::ConvRelu => "conv_relu",
            OpKind::ConvBiasRelu => "conv_bias_relu",
            OpKind::ConvBn => "conv_bn",
            OpKind::ConvBiasBn => "conv_bias_bn",
            OpKind::ConvBnRelu => "conv_bn_relu",
            OpKind::ConvAdd => "conv_add",
            OpKind::ConvBnAdd => "conv_bn_add",
            OpKind::ConvBnAddRelu => "conv_bn_add_relu",
            OpKind::ConvBiasBnRelu => "conv_bias_bn_relu",
            OpKind::ConvBiasBnAdd => "conv_bias_bn_add",
            OpKind::ConvBiasBnAddRelu => "conv_bias_bn_add_relu",
            OpKind::ConvBiasAdd => "conv_bias_add",
            OpKind::ConvBiasAddRelu => "conv_bias_add_relu",
            OpKind::ConvBiasAddElu => "conv_bias_add_elu",
            OpKind::ConvBiasAddRelu6 => "conv_bias_add_relu6",
            OpKind::ConvAddRelu => "conv_add_relu",
            OpKind::ConvAddElu => "conv_add_elu",
            OpKind::ConvAddRelu6 => "conv_add_relu6",
            OpKind::ConvBiasElu => "conv_bias_elu",
            OpKind::ConvBiasSigmoid => "conv_bias_sigmoid",
            OpKind::ConvBiasSwish => "conv_bias_swish",
            OpKind::ConvBiasHardTanh => "conv_bias_hardtanh",
            OpKind::ConvBiasRelu6 => "conv_bias_relu6",
            OpKind::ConvBiasSquare => "conv_bias_square",
            OpKind::ConvBiasTanh => "conv_bias_tanh",
            OpKind::ConvBiasAbs => "conv_bias_abs",
            OpKind::ConvBiasSqrt => "conv_bias_sqrt",
            OpKind::BnRelu => "bn_relu",
            OpKind::BnBwdReluBwd => "bn_bwd_relu_bwd",
            OpKind::MatmulRelu => "matmul_relu",
            OpKind::MatmulElu => "matmul_elu",
            OpKind::MatmulSigmoid => "matmul_sigmoid",
            OpKind::MatmulHardTanh => "matmul_hardtanh",
            OpKind::MatmulGelu => "matmul_gelu",
            OpKind::MatmulAdd => "matmul_add",
            OpKind::MatmulAddGelu => "matmul_add_gelu",
            OpKind::MatmulAddRelu => "matmul_add_relu",
            OpKind::MatmulBias => "matmul_bias",
            OpKind::MatmulBiasSigmoid => "matmul_bias_sigmoid",
            OpKind::MatmulBiasElu => "matmul_bias_elu",
            OpKind::MatmulBiasRelu => "matmul_bias_relu",
            OpKind::MatmulBiasHardTanh => "matmul_bias_hardtanh",
            OpKind::MatmulBiasAdd => "matmul_bias_add",
            OpKind::MatmulBiasAddRelu => "matmul_bias_add_relu",
            OpKind::MatmulBiasSwish => "matmul_bias_swish",
            OpKind::MatmulBiasBn => "matmul_bias_bn",
            OpKind::MatmulBiasRelu6 => "matmul_bias_relu6",
            OpKind::ConvBwdFBiasaddBwd => "conv_bwd_f_biasadd_bwd",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operator instance with ordered value slots and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    id: u64,
    kind: OpKind,
    name: String,
    inputs: Vec<LogicalTensor>,
    outputs: Vec<LogicalTensor>,
    attrs: BTreeMap<String, AttrValue>,
}

impl Op {
    pub fn new(id: u64, kind: OpKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_input(&mut self, tensor: LogicalTensor) -> &mut Self {
        self.inputs.push(tensor);
        self
    }

    pub fn add_output(&mut self, tensor: LogicalTensor) -> &mut Self {
        self.outputs.push(tensor);
        self
    }

    pub fn inputs(&self) -> &[LogicalTensor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[LogicalTensor] {
        &self.outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Inserts or overwrites an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> &mut Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Typed attribute read; an absent name or tag mismatch is
    /// `InvalidArgument`.
    pub fn get_attr<T: FromAttr>(&self, name: &str) -> GraphResult<&T> {
        let value = self
            .attrs
            .get(name)
            .ok_or_else(|| GraphError::invalid_argument(format!("attribute {name} is not set")))?;
        read_attr(name, value)
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }
}
