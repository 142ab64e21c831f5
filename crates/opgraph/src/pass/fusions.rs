//! Builtin fusion pass table.
//!
//! Passes are data: each entry is a fused kind plus one or more alternative
//! patterns. Convolution and matmul passes that involve a bias accept both
//! the `BiasAdd` chain form and the 3-input (bias slot) form. Priorities
//! prefer longer chains so e.g. `conv_bias_bn_relu` wins over
//! `conv_bias_bn` over `conv_bias`.

use crate::ir::op::OpKind;
use crate::pattern::{Pattern, PatternBuilder, PatternNodeId, PatternValue};
use crate::pass::FusionPass;

use PatternValue::{Input, Node};

/// Incrementally builds a producer-to-sink chain pattern.
struct Chain {
    builder: PatternBuilder,
    last: PatternNodeId,
    next_input: u32,
}

impl Chain {
    fn start(kind: OpKind, arity: u32) -> Self {
        let mut builder = Pattern::builder();
        let inputs: Vec<PatternValue> = (0..arity).map(Input).collect();
        let last = builder.node(kind, inputs);
        Chain {
            builder,
            last,
            next_input: arity,
        }
    }

    fn conv(arity: u32) -> Self {
        Chain::start(OpKind::Convolution, arity)
    }

    fn matmul(arity: u32) -> Self {
        Chain::start(OpKind::MatMul, arity)
    }

    fn ext(&mut self) -> PatternValue {
        let value = Input(self.next_input);
        self.next_input += 1;
        value
    }

    fn unary(mut self, kind: OpKind) -> Self {
        self.last = self.builder.node(kind, vec![Node(self.last)]);
        self
    }

    fn relu6(mut self) -> Self {
        let node = self.builder.node(OpKind::HardTanh, vec![Node(self.last)]);
        self.builder
            .attr_eq(node, "min", 0.0f32)
            .attr_eq(node, "max", 6.0f32);
        self.last = node;
        self
    }

    fn bias(mut self) -> Self {
        let bias_in = self.ext();
        self.last = self
            .builder
            .node(OpKind::BiasAdd, vec![Node(self.last), bias_in]);
        self
    }

    fn bn(mut self) -> Self {
        let mut inputs = vec![Node(self.last)];
        for _ in 0..4 {
            inputs.push(self.ext());
        }
        self.last = self.builder.node(OpKind::BatchNormInference, inputs);
        self
    }

    /// Order-free sum with a pattern-external addend.
    fn add(mut self) -> Self {
        let other = self.ext();
        let node = self.builder.node(OpKind::Add, vec![Node(self.last), other]);
        self.builder.commutative(node);
        self.last = node;
        self
    }

    /// Swish epilogue: `Sigmoid(x) * x` with both multiply orders accepted.
    fn swish(mut self) -> Self {
        let pre = self.last;
        let sigmoid = self.builder.node(OpKind::Sigmoid, vec![Node(pre)]);
        let multiply = self
            .builder
            .node(OpKind::Multiply, vec![Node(sigmoid), Node(pre)]);
        self.builder.commutative(multiply);
        self.last = multiply;
        self
    }

    fn finish(self) -> Pattern {
        self.builder.finish(self.last)
    }
}

/// Single-node pattern accepting any input arity.
fn single_any(kind: OpKind) -> Pattern {
    let mut builder = Pattern::builder();
    let node = builder.node(kind, Vec::new());
    builder.prefix_arity(node);
    builder.finish(node)
}

fn gelu_erf_pattern() -> Pattern {
    let mut b = Pattern::builder();
    let divide = b.node(OpKind::Divide, vec![Input(0), Input(1)]);
    let erf = b.node(OpKind::Erf, vec![Node(divide)]);
    let add = b.node(OpKind::Add, vec![Node(erf), Input(2)]);
    b.commutative(add);
    let mul1 = b.node(OpKind::Multiply, vec![Node(add), Input(3)]);
    b.commutative(mul1);
    let mul2 = b.node(OpKind::Multiply, vec![Node(mul1), Input(4)]);
    b.commutative(mul2);
    b.finish(mul2)
}

fn gelu_tanh_pattern() -> Pattern {
    let mut b = Pattern::builder();
    let pow = b.node(OpKind::Pow, vec![Input(0), Input(1)]);
    let mul1 = b.node(OpKind::Multiply, vec![Node(pow), Input(2)]);
    b.commutative(mul1);
    let add1 = b.node(OpKind::Add, vec![Node(mul1), Input(3)]);
    b.commutative(add1);
    let mul2 = b.node(OpKind::Multiply, vec![Node(add1), Input(4)]);
    b.commutative(mul2);
    let tanh = b.node(OpKind::Tanh, vec![Node(mul2)]);
    let add2 = b.node(OpKind::Add, vec![Node(tanh), Input(5)]);
    b.commutative(add2);
    let mul3 = b.node(OpKind::Multiply, vec![Node(add2), Input(6)]);
    b.commutative(mul3);
    let mul4 = b.node(OpKind::Multiply, vec![Node(mul3), Input(7)]);
    b.commutative(mul4);
    b.finish(mul4)
}

fn bn_relu_pattern() -> Pattern {
    let mut b = Pattern::builder();
    let bn = b.node(
        OpKind::BatchNormInference,
        vec![Input(0), Input(1), Input(2), Input(3), Input(4)],
    );
    let relu = b.node(OpKind::ReLU, vec![Node(bn)]);
    b.finish(relu)
}

fn bn_bwd_relu_bwd_pattern() -> Pattern {
    let mut b = Pattern::builder();
    let relu_bwd = b.node(OpKind::ReLUBackprop, vec![Input(0), Input(1)]);
    let bn_bwd = b.node(OpKind::BatchNormTrainingBackprop, vec![Node(relu_bwd)]);
    b.prefix_arity(bn_bwd);
    b.finish(bn_bwd)
}

fn conv_bwd_f_biasadd_bwd_pattern() -> Pattern {
    let mut b = Pattern::builder();
    let conv_bwd = b.node(OpKind::ConvolutionBackpropFilters, vec![Input(0), Input(1)]);
    let bias_bwd = b.node(OpKind::BiasAddBackprop, vec![Node(conv_bwd)]);
    b.finish(bias_bwd)
}

pub(super) fn builtin_passes() -> Vec<FusionPass> {
    use OpKind::*;

    let mut passes = Vec::new();
    let mut add = |name: &str, priority: f32, kind: OpKind, patterns: Vec<Pattern>| {
        passes.push(FusionPass::new(name, priority, kind, patterns));
    };

    // Convolution chains. The bias variants pair the BiasAdd form with the
    // 3-input convolution form.
    add(
        "conv_bias_bn_sum_relu_fusion",
        10.5,
        ConvBiasBnAddRelu,
        vec![
            Chain::conv(2).bias().bn().add().unary(ReLU).finish(),
            Chain::conv(3).bn().add().unary(ReLU).finish(),
        ],
    );
    add(
        "conv_bn_sum_relu_fusion",
        10.4,
        ConvBnAddRelu,
        vec![Chain::conv(2).bn().add().unary(ReLU).finish()],
    );
    add(
        "conv_bias_bn_relu_fusion",
        10.3,
        ConvBiasBnRelu,
        vec![
            Chain::conv(2).bias().bn().unary(ReLU).finish(),
            Chain::conv(3).bn().unary(ReLU).finish(),
        ],
    );
    add(
        "conv_bias_bn_sum_fusion",
        10.2,
        ConvBiasBnAdd,
        vec![
            Chain::conv(2).bias().bn().add().finish(),
            Chain::conv(3).bn().add().finish(),
        ],
    );
    add(
        "conv_bias_sum_relu_fusion",
        10.1,
        ConvBiasAddRelu,
        vec![
            Chain::conv(2).bias().add().unary(ReLU).finish(),
            Chain::conv(3).add().unary(ReLU).finish(),
        ],
    );
    add(
        "conv_bias_sum_elu_fusion",
        10.1,
        ConvBiasAddElu,
        vec![
            Chain::conv(2).bias().add().unary(Elu).finish(),
            Chain::conv(3).add().unary(Elu).finish(),
        ],
    );
    add(
        "conv_bias_sum_relu6_fusion",
        10.1,
        ConvBiasAddRelu6,
        vec![
            Chain::conv(2).bias().add().relu6().finish(),
            Chain::conv(3).add().relu6().finish(),
        ],
    );
    add(
        "conv_bn_relu_fusion",
        9.8,
        ConvBnRelu,
        vec![Chain::conv(2).bn().unary(ReLU).finish()],
    );
    add(
        "conv_bn_sum_fusion",
        9.7,
        ConvBnAdd,
        vec![Chain::conv(2).bn().add().finish()],
    );
    add(
        "conv_bias_bn_fusion",
        9.6,
        ConvBiasBn,
        vec![
            Chain::conv(2).bias().bn().finish(),
            Chain::conv(3).bn().finish(),
        ],
    );
    add(
        "conv_bias_swish_fusion",
        9.5,
        ConvBiasSwish,
        vec![
            Chain::conv(2).bias().swish().finish(),
            Chain::conv(3).swish().finish(),
        ],
    );
    add(
        "conv_bias_relu6_fusion",
        9.45,
        ConvBiasRelu6,
        vec![
            Chain::conv(2).bias().relu6().finish(),
            Chain::conv(3).relu6().finish(),
        ],
    );
    add(
        "conv_bias_relu_fusion",
        9.4,
        ConvBiasRelu,
        vec![
            Chain::conv(2).bias().unary(ReLU).finish(),
            Chain::conv(3).unary(ReLU).finish(),
        ],
    );
    add(
        "conv_bias_elu_fusion",
        9.4,
        ConvBiasElu,
        vec![
            Chain::conv(2).bias().unary(Elu).finish(),
            Chain::conv(3).unary(Elu).finish(),
        ],
    );
    add(
        "conv_bias_sigmoid_fusion",
        9.4,
        ConvBiasSigmoid,
        vec![
            Chain::conv(2).bias().unary(Sigmoid).finish(),
            Chain::conv(3).unary(Sigmoid).finish(),
        ],
    );
    add(
        "conv_bias_hardtanh_fusion",
        9.35,
        ConvBiasHardTanh,
        vec![
            Chain::conv(2).bias().unary(HardTanh).finish(),
            Chain::conv(3).unary(HardTanh).finish(),
        ],
    );
    add(
        "conv_bias_sum_fusion",
        9.3,
        ConvBiasAdd,
        vec![
            Chain::conv(2).bias().add().finish(),
            Chain::conv(3).add().finish(),
        ],
    );
    add(
        "conv_bias_square_fusion",
        9.3,
        ConvBiasSquare,
        vec![
            Chain::conv(2).bias().unary(Square).finish(),
            Chain::conv(3).unary(Square).finish(),
        ],
    );
    add(
        "conv_bias_tanh_fusion",
        9.3,
        ConvBiasTanh,
        vec![
            Chain::conv(2).bias().unary(Tanh).finish(),
            Chain::conv(3).unary(Tanh).finish(),
        ],
    );
    add(
        "conv_bias_abs_fusion",
        9.3,
        ConvBiasAbs,
        vec![
            Chain::conv(2).bias().unary(Abs).finish(),
            Chain::conv(3).unary(Abs).finish(),
        ],
    );
    add(
        "conv_bias_sqrt_fusion",
        9.3,
        ConvBiasSqrt,
        vec![
            Chain::conv(2).bias().unary(Sqrt).finish(),
            Chain::conv(3).unary(Sqrt).finish(),
        ],
    );
    add(
        "conv_sum_relu_fusion",
        9.2,
        ConvAddRelu,
        vec![Chain::conv(2).add().unary(ReLU).finish()],
    );
    add(
        "conv_sum_elu_fusion",
        9.2,
        ConvAddElu,
        vec![Chain::conv(2).add().unary(Elu).finish()],
    );
    add(
        "conv_sum_relu6_fusion",
        9.2,
        ConvAddRelu6,
        vec![Chain::conv(2).add().relu6().finish()],
    );
    add(
        "conv_bn_fusion",
        8.8,
        ConvBn,
        vec![Chain::conv(2).bn().finish()],
    );
    add(
        "conv_bias_fusion",
        8.5,
        ConvBias,
        vec![Chain::conv(2).bias().finish(), Chain::conv(3).finish()],
    );
    add(
        "conv_sum_fusion",
        8.2,
        ConvAdd,
        vec![Chain::conv(2).add().finish()],
    );
    add(
        "conv_relu_fusion",
        8.1,
        ConvRelu,
        vec![Chain::conv(2).unary(ReLU).finish()],
    );

    // GELU decompositions rewrite to the canonical GELU op.
    add(
        "gelu_fusion",
        10.8,
        GELU,
        vec![gelu_erf_pattern(), gelu_tanh_pattern()],
    );

    // MatMul chains.
    add(
        "matmul_bias_sum_relu_fusion",
        10.1,
        MatmulBiasAddRelu,
        vec![
            Chain::matmul(2).bias().add().unary(ReLU).finish(),
            Chain::matmul(3).add().unary(ReLU).finish(),
        ],
    );
    add(
        "matmul_bias_bn_fusion",
        9.6,
        MatmulBiasBn,
        vec![
            Chain::matmul(2).bias().bn().finish(),
            Chain::matmul(3).bn().finish(),
        ],
    );
    add(
        "matmul_bias_swish_fusion",
        9.5,
        MatmulBiasSwish,
        vec![
            Chain::matmul(2).bias().swish().finish(),
            Chain::matmul(3).swish().finish(),
        ],
    );
    add(
        "matmul_bias_relu6_fusion",
        9.45,
        MatmulBiasRelu6,
        vec![
            Chain::matmul(2).bias().relu6().finish(),
            Chain::matmul(3).relu6().finish(),
        ],
    );
    add(
        "matmul_bias_sigmoid_fusion",
        9.4,
        MatmulBiasSigmoid,
        vec![
            Chain::matmul(2).bias().unary(Sigmoid).finish(),
            Chain::matmul(3).unary(Sigmoid).finish(),
        ],
    );
    add(
        "matmul_bias_elu_fusion",
        9.4,
        MatmulBiasElu,
        vec![
            Chain::matmul(2).bias().unary(Elu).finish(),
            Chain::matmul(3).unary(Elu).finish(),
        ],
    );
    add(
        "matmul_bias_relu_fusion",
        9.4,
        MatmulBiasRelu,
        vec![
            Chain::matmul(2).bias().unary(ReLU).finish(),
            Chain::matmul(3).unary(ReLU).finish(),
        ],
    );
    add(
        "matmul_bias_hardtanh_fusion",
        9.35,
        MatmulBiasHardTanh,
        vec![
            Chain::matmul(2).bias().unary(HardTanh).finish(),
            Chain::matmul(3).unary(HardTanh).finish(),
        ],
    );
    add(
        "matmul_bias_sum_fusion",
        9.3,
        MatmulBiasAdd,
        vec![
            Chain::matmul(2).bias().add().finish(),
            Chain::matmul(3).add().finish(),
        ],
    );
    add(
        "matmul_sum_gelu_fusion",
        9.2,
        MatmulAddGelu,
        vec![Chain::matmul(2).add().unary(GELU).finish()],
    );
    add(
        "matmul_sum_relu_fusion",
        9.2,
        MatmulAddRelu,
        vec![Chain::matmul(2).add().unary(ReLU).finish()],
    );
    add(
        "matmul_bias_fusion",
        8.5,
        MatmulBias,
        vec![Chain::matmul(2).bias().finish(), Chain::matmul(3).finish()],
    );
    add(
        "matmul_sum_fusion",
        8.3,
        MatmulAdd,
        vec![Chain::matmul(2).add().finish()],
    );
    add(
        "matmul_relu_fusion",
        8.1,
        MatmulRelu,
        vec![Chain::matmul(2).unary(ReLU).finish()],
    );
    add(
        "matmul_elu_fusion",
        8.1,
        MatmulElu,
        vec![Chain::matmul(2).unary(Elu).finish()],
    );
    add(
        "matmul_sigmoid_fusion",
        8.1,
        MatmulSigmoid,
        vec![Chain::matmul(2).unary(Sigmoid).finish()],
    );
    add(
        "matmul_hardtanh_fusion",
        8.1,
        MatmulHardTanh,
        vec![Chain::matmul(2).unary(HardTanh).finish()],
    );
    add(
        "matmul_gelu_fusion",
        8.1,
        MatmulGelu,
        vec![Chain::matmul(2).unary(GELU).finish()],
    );

    // Normalization and backward chains.
    add("bn_relu_fusion", 8.2, BnRelu, vec![bn_relu_pattern()]);
    add(
        "bn_bwd_relu_bwd_fusion",
        8.2,
        BnBwdReluBwd,
        vec![bn_bwd_relu_bwd_pattern()],
    );
    add(
        "conv_bwd_f_biasadd_bwd_fusion",
        8.2,
        ConvBwdFBiasaddBwd,
        vec![conv_bwd_f_biasadd_bwd_pattern()],
    );

    // Single-op fallbacks used by tools and tests.
    add("conv_pass", 2.0, Convolution, vec![single_any(Convolution)]);
    add("matmul_pass", 2.0, MatMul, vec![single_any(MatMul)]);
    add("sum_pass", 1.0, Add, vec![single_any(Add)]);
    add("relu_pass", 1.0, ReLU, vec![single_any(ReLU)]);
    add(
        "bn_pass",
        1.0,
        BatchNormInference,
        vec![single_any(BatchNormInference)],
    );

    passes
}
