use opgraph::pass::FusionPass;
use opgraph::pattern::{Pattern, PatternValue};
use opgraph::{DataType, EngineKind, Graph, LogicalTensor, Op, OpKind};

use PatternValue::{Input, Node};

fn lt(id: u64) -> LogicalTensor {
    LogicalTensor::new(id, DataType::F32)
}

/// `MatMul -> Add` with a configurable commutativity flag on the Add edge.
fn matmul_add_pattern(commutative: bool) -> Pattern {
    let mut b = Pattern::builder();
    let matmul = b.node(OpKind::MatMul, vec![Input(0), Input(1)]);
    let add = b.node(OpKind::Add, vec![Node(matmul), Input(2)]);
    if commutative {
        b.commutative(add);
    }
    b.finish(add)
}

/// Builds `MatMul -> Add` where the matmul output feeds the given Add slot.
fn matmul_add_graph(matmul_slot: usize) -> Graph {
    let mut graph = Graph::new(EngineKind::Cpu);
    let mut matmul = Op::new(0, OpKind::MatMul, "matmul");
    matmul.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut add = Op::new(1, OpKind::Add, "add");
    if matmul_slot == 0 {
        add.add_input(lt(2)).add_input(lt(3));
    } else {
        add.add_input(lt(3)).add_input(lt(2));
    }
    add.add_output(lt(4));

    graph.add_op(&matmul).expect("matmul must be accepted");
    graph.add_op(&add).expect("add must be accepted");
    graph.build_graph().expect("link must succeed");
    graph
}

#[test]
fn commutative_edge_accepts_both_operand_orders() {
    let pass = FusionPass::new(
        "test_matmul_add_commutative",
        1.0,
        OpKind::MatmulAdd,
        vec![matmul_add_pattern(true)],
    );
    for slot in [0, 1] {
        let mut graph = matmul_add_graph(slot);
        pass.run(&mut graph).expect("pass must run");
        assert_eq!(graph.num_partitions(), 1, "slot {slot}");
    }
}

#[test]
fn slot_constrained_edge_rejects_swapped_operands() {
    let pass = FusionPass::new(
        "test_matmul_add_ordered",
        1.0,
        OpKind::MatmulAdd,
        vec![matmul_add_pattern(false)],
    );

    let mut graph = matmul_add_graph(0);
    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 1);

    let mut graph = matmul_add_graph(1);
    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 0);
}

#[test]
fn exact_arity_distinguishes_op_forms() {
    let mut b = Pattern::builder();
    let matmul = b.node(OpKind::MatMul, vec![Input(0), Input(1)]);
    let pass = FusionPass::new(
        "test_matmul_two_input",
        1.0,
        OpKind::MatMul,
        vec![b.finish(matmul)],
    );

    let mut graph = Graph::new(EngineKind::Cpu);
    let mut matmul = Op::new(0, OpKind::MatMul, "matmul");
    matmul
        .add_input(lt(0))
        .add_input(lt(1))
        .add_input(lt(2)) // bias slot
        .add_output(lt(3));
    graph.add_op(&matmul).expect("matmul must be accepted");
    graph.build_graph().expect("link must succeed");

    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 0);
}

#[test]
fn interior_fan_out_rejects_match() {
    let mut b = Pattern::builder();
    let matmul = b.node(OpKind::MatMul, vec![Input(0), Input(1)]);
    let relu = b.node(OpKind::ReLU, vec![Node(matmul)]);
    let pass = FusionPass::new(
        "test_matmul_relu",
        1.0,
        OpKind::MatmulRelu,
        vec![b.finish(relu)],
    );

    let mut graph = Graph::new(EngineKind::Cpu);
    let mut matmul = Op::new(0, OpKind::MatMul, "matmul");
    matmul.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut relu = Op::new(1, OpKind::ReLU, "relu");
    relu.add_input(lt(2)).add_output(lt(3));
    let mut tanh = Op::new(2, OpKind::Tanh, "tanh");
    tanh.add_input(lt(2)).add_output(lt(4));

    graph.add_op(&matmul).expect("matmul must be accepted");
    graph.add_op(&relu).expect("relu must be accepted");
    graph.add_op(&tanh).expect("tanh must be accepted");
    graph.build_graph().expect("link must succeed");

    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 0);
}

#[test]
fn claimed_ops_are_not_rematched() {
    let pass = FusionPass::new(
        "test_matmul_add_repeat",
        1.0,
        OpKind::MatmulAdd,
        vec![matmul_add_pattern(true)],
    );
    let mut graph = matmul_add_graph(0);

    let first = pass.run(&mut graph).expect("pass must run");
    assert_eq!(first.rewrites_applied, 1);

    let second = pass.run(&mut graph).expect("pass must run");
    assert_eq!(second.rewrites_applied, 0);
    assert_eq!(graph.num_partitions(), 1);
}

#[test]
fn repeated_external_reference_binds_one_value() {
    let mut b = Pattern::builder();
    // Both Add slots must carry the same tensor.
    let add = b.node(OpKind::Add, vec![Input(0), Input(0)]);
    let pass = FusionPass::new(
        "test_self_add",
        1.0,
        OpKind::Add,
        vec![b.finish(add)],
    );

    let mut graph = Graph::new(EngineKind::Cpu);
    let mut add = Op::new(0, OpKind::Add, "add");
    add.add_input(lt(0)).add_input(lt(0)).add_output(lt(1));
    graph.add_op(&add).expect("add must be accepted");
    graph.build_graph().expect("link must succeed");
    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 1);

    let mut graph = Graph::new(EngineKind::Cpu);
    let mut add = Op::new(0, OpKind::Add, "add");
    add.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    graph.add_op(&add).expect("add must be accepted");
    graph.build_graph().expect("link must succeed");
    pass.run(&mut graph).expect("pass must run");
    assert_eq!(graph.num_partitions(), 0);
}

#[test]
fn attribute_predicate_gates_match() {
    let mut b = Pattern::builder();
    let hardtanh = b.node(OpKind::HardTanh, vec![Input(0)]);
    b.attr_eq(hardtanh, "min", 0.0f32)
        .attr_eq(hardtanh, "max", 6.0f32);
    let pass = FusionPass::new(
        "test_relu6_bounds",
        1.0,
        OpKind::HardTanh,
        vec![b.finish(hardtanh)],
    );

    for (max, expected) in [(6.0f32, 1usize), (5.0f32, 0)] {
        let mut graph = Graph::new(EngineKind::Cpu);
        let mut hardtanh = Op::new(0, OpKind::HardTanh, "hardtanh");
        hardtanh
            .set_attr("min", 0.0f32)
            .set_attr("max", max)
            .add_input(lt(0))
            .add_output(lt(1));
        graph.add_op(&hardtanh).expect("hardtanh must be accepted");
        graph.build_graph().expect("link must succeed");
        pass.run(&mut graph).expect("pass must run");
        assert_eq!(graph.num_partitions(), expected, "max={max}");
    }
}
