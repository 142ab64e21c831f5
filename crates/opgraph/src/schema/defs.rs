//! Builtin schema table for the public operator set.

use super::shape_infer::{
    batch_norm_shape, broadcast_shape, concat_shape, conv_shape, identity_shape, matmul_shape,
    pool_shape, reshape_shape,
};
use super::OpSchema;
use crate::ir::attribute::AttrKind;
use crate::ir::op::OpKind;

fn eltwise_unary(kind: OpKind) -> OpSchema {
    OpSchema::new(kind, 1..=1, 1..=1).shape_rule(identity_shape)
}

fn eltwise_binary(kind: OpKind) -> OpSchema {
    OpSchema::new(kind, 2..=2, 1..=1)
        .optional_attr("auto_broadcast", "numpy")
        .shape_rule(broadcast_shape)
}

fn conv_common(schema: OpSchema) -> OpSchema {
    schema
        .required_attr("strides", AttrKind::I64s)
        .required_attr("pads_begin", AttrKind::I64s)
        .required_attr("pads_end", AttrKind::I64s)
        .required_attr("dilations", AttrKind::I64s)
        .optional_attr("data_format", "NXC")
        .optional_attr("filter_format", "XIO")
        .optional_attr("groups", 1i64)
        .optional_attr("auto_pad", "None")
}

fn pool_common(schema: OpSchema) -> OpSchema {
    schema
        .required_attr("kernel", AttrKind::I64s)
        .required_attr("strides", AttrKind::I64s)
        .required_attr("pads_begin", AttrKind::I64s)
        .required_attr("pads_end", AttrKind::I64s)
        .optional_attr("data_format", "NXC")
        .optional_attr("rounding_type", "floor")
        .optional_attr("auto_pad", "None")
        .shape_rule(pool_shape)
}

pub(super) fn builtin_schemas() -> Vec<OpSchema> {
    vec![
        eltwise_unary(OpKind::Abs),
        eltwise_unary(OpKind::Erf),
        eltwise_unary(OpKind::Exp),
        eltwise_unary(OpKind::GELU),
        eltwise_unary(OpKind::Log),
        eltwise_unary(OpKind::ReLU),
        eltwise_unary(OpKind::Sigmoid),
        eltwise_unary(OpKind::Sqrt),
        eltwise_unary(OpKind::Square),
        eltwise_unary(OpKind::Tanh),
        eltwise_unary(OpKind::Elu).required_attr("alpha", AttrKind::F32),
        eltwise_unary(OpKind::HardTanh)
            .required_attr("min", AttrKind::F32)
            .required_attr("max", AttrKind::F32),
        eltwise_binary(OpKind::Add),
        eltwise_binary(OpKind::Divide),
        eltwise_binary(OpKind::Maximum),
        eltwise_binary(OpKind::Minimum),
        eltwise_binary(OpKind::Multiply),
        eltwise_binary(OpKind::Pow),
        conv_common(OpSchema::new(OpKind::Convolution, 2..=3, 1..=1)).shape_rule(conv_shape),
        conv_common(OpSchema::new(OpKind::ConvolutionBackpropData, 2..=3, 1..=1))
            .optional_attr_of("output_shape", AttrKind::I64s),
        conv_common(OpSchema::new(OpKind::ConvolutionBackpropFilters, 2..=3, 1..=1))
            .optional_attr_of("filter_shape", AttrKind::I64s),
        OpSchema::new(OpKind::BatchNormInference, 5..=5, 1..=1)
            .required_attr("epsilon", AttrKind::F32)
            .optional_attr("data_format", "NXC")
            .shape_rule(batch_norm_shape),
        OpSchema::new(OpKind::BatchNormForwardTraining, 3..=5, 1..=5)
            .required_attr("epsilon", AttrKind::F32)
            .optional_attr("momentum", 0.1f32)
            .optional_attr("data_format", "NXC")
            .shape_rule(batch_norm_shape),
        OpSchema::new(OpKind::BatchNormTrainingBackprop, 4..=7, 1..=3)
            .required_attr("epsilon", AttrKind::F32)
            .optional_attr("data_format", "NXC")
            .shape_rule(identity_shape),
        OpSchema::new(OpKind::BiasAdd, 2..=2, 1..=1)
            .optional_attr("data_format", "NXC")
            .shape_rule(identity_shape),
        OpSchema::new(OpKind::BiasAddBackprop, 1..=1, 1..=1)
            .optional_attr("data_format", "NXC"),
        OpSchema::new(OpKind::MatMul, 2..=3, 1..=1)
            .optional_attr("transpose_a", false)
            .optional_attr("transpose_b", false)
            .shape_rule(matmul_shape),
        pool_common(OpSchema::new(OpKind::AvgPool, 1..=1, 1..=1))
            .required_attr("exclude_pad", AttrKind::Bool),
        pool_common(OpSchema::new(OpKind::MaxPool, 1..=1, 1..=1)),
        OpSchema::new(OpKind::Concat, 1..=64, 1..=1)
            .required_attr("axis", AttrKind::I64)
            .shape_rule(concat_shape),
        OpSchema::new(OpKind::Reshape, 1..=1, 1..=1)
            .required_attr("shape", AttrKind::I64s)
            .optional_attr("special_zero", false)
            .shape_rule(reshape_shape),
        OpSchema::new(OpKind::LayerNorm, 1..=3, 1..=3)
            .optional_attr("keep_stats", true)
            .optional_attr("begin_norm_axis", -1i64)
            .optional_attr("use_affine", true)
            .optional_attr("epsilon", 1.0e-5f32)
            .shape_rule(identity_shape),
        OpSchema::new(OpKind::SoftMax, 1..=1, 1..=1)
            .optional_attr("axis", 1i64)
            .shape_rule(identity_shape),
        OpSchema::new(OpKind::LogSoftmax, 1..=1, 1..=1)
            .optional_attr("axis", -1i64)
            .shape_rule(identity_shape),
        OpSchema::new(OpKind::ReLUBackprop, 2..=2, 1..=1).shape_rule(identity_shape),
        OpSchema::new(OpKind::GELUBackprop, 2..=2, 1..=1).shape_rule(identity_shape),
    ]
}
