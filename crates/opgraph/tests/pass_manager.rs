use std::fs;
use std::path::PathBuf;

use opgraph::pass::manager::{PassConfig, PassManager};
use opgraph::schema::lookup_schema;
use opgraph::{DataType, EngineKind, Graph, LogicalTensor, Op, OpKind, PartitionPolicy};

fn lt(id: u64) -> LogicalTensor {
    LogicalTensor::new(id, DataType::F32)
}

fn conv_op(id: u64) -> Op {
    let mut conv = Op::new(id, OpKind::Convolution, "conv");
    conv.set_attr("strides", vec![1i64, 1])
        .set_attr("pads_begin", vec![0i64, 0])
        .set_attr("pads_end", vec![0i64, 0])
        .set_attr("dilations", vec![1i64, 1]);
    conv
}

/// `Convolution(2) -> BatchNormInference -> ReLU` over tensors 0..=8.
fn conv_bn_relu_graph() -> Graph {
    let mut graph = Graph::new(EngineKind::Cpu);
    let mut conv = conv_op(0);
    conv.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut bn = Op::new(1, OpKind::BatchNormInference, "bn");
    bn.set_attr("epsilon", 0.001f32);
    bn.add_input(lt(2))
        .add_input(lt(3))
        .add_input(lt(4))
        .add_input(lt(5))
        .add_input(lt(6))
        .add_output(lt(7));
    let mut relu = Op::new(2, OpKind::ReLU, "relu");
    relu.add_input(lt(7)).add_output(lt(8));

    graph.add_op(&conv).expect("conv must be accepted");
    graph.add_op(&bn).expect("bn must be accepted");
    graph.add_op(&relu).expect("relu must be accepted");
    graph.build_graph().expect("link must succeed");
    graph
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("opgraph_{tag}_{}.json", std::process::id()))
}

#[test]
fn priority_ordering_prefers_longer_chains() {
    let pm = PassManager::new();
    let ordered = pm.effective_passes(None).expect("default ordering");
    let position = |name: &str| {
        ordered
            .iter()
            .position(|pass| pass.name() == name)
            .unwrap_or_else(|| panic!("pass {name} must be registered"))
    };

    assert!(position("conv_bias_bn_relu_fusion") < position("conv_bias_bn_fusion"));
    assert!(position("conv_bias_bn_fusion") < position("conv_bias_fusion"));
    assert!(position("conv_bn_relu_fusion") < position("conv_bn_fusion"));
    assert!(position("conv_bias_relu6_fusion") < position("conv_bias_hardtanh_fusion"));
    assert!(position("conv_bias_fusion") < position("conv_pass"));
}

#[test]
fn run_passes_partitions_whole_graph() {
    // conv1 -> bn -> relu feeding an Add whose other operand is conv2.
    let mut graph = Graph::new(EngineKind::Cpu);
    let mut conv1 = conv_op(0);
    conv1.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut bn = Op::new(1, OpKind::BatchNormInference, "bn");
    bn.set_attr("epsilon", 0.001f32);
    bn.add_input(lt(2))
        .add_input(lt(3))
        .add_input(lt(4))
        .add_input(lt(5))
        .add_input(lt(6))
        .add_output(lt(7));
    let mut relu = Op::new(2, OpKind::ReLU, "relu");
    relu.add_input(lt(7)).add_output(lt(8));
    let mut conv2 = conv_op(3);
    conv2.add_input(lt(9)).add_input(lt(10)).add_output(lt(11));
    let mut add = Op::new(4, OpKind::Add, "add");
    add.add_input(lt(11)).add_input(lt(8)).add_output(lt(12));

    for op in [&conv1, &bn, &relu, &conv2, &add] {
        graph.add_op(op).expect("op must be accepted");
    }
    graph.build_graph().expect("link must succeed");
    assert_eq!(graph.num_ops(), 5);

    PassManager::new()
        .run_passes(&mut graph, None)
        .expect("pass run must succeed");

    assert_eq!(graph.num_ops(), 5);
    assert_eq!(graph.num_partitions(), 2);
    let kinds: Vec<OpKind> = graph
        .get_partitions()
        .iter()
        .map(|p| p.fused_op().kind())
        .collect();
    assert!(kinds.contains(&OpKind::ConvBnRelu));
    assert!(kinds.contains(&OpKind::ConvAdd));

    // Exclusivity: every op lands in exactly one partition.
    let mut member_ids: Vec<u64> = graph
        .get_partitions()
        .iter()
        .flat_map(|p| p.get_ops())
        .collect();
    member_ids.sort_unstable();
    assert_eq!(member_ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn run_passes_wraps_leftovers_in_single_op_partitions() {
    let mut graph = Graph::new(EngineKind::Cpu);
    let mut conv = conv_op(0);
    conv.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut sigmoid = Op::new(1, OpKind::Sigmoid, "sigmoid");
    sigmoid.add_input(lt(3)).add_output(lt(4));

    graph.add_op(&conv).expect("conv must be accepted");
    graph.add_op(&sigmoid).expect("sigmoid must be accepted");
    graph.build_graph().expect("link must succeed");

    PassManager::new()
        .run_passes(&mut graph, None)
        .expect("pass run must succeed");

    assert_eq!(graph.num_partitions(), 2);
    for partition in graph.get_partitions() {
        assert_eq!(partition.num_ops(), 1);
    }
    let supported: Vec<bool> = graph
        .get_partitions()
        .iter()
        .map(|p| p.is_supported())
        .collect();
    // Convolution has a kernel; a lone Sigmoid does not.
    assert!(supported.contains(&true));
    assert!(supported.contains(&false));
}

#[test]
fn run_passes_twice_is_idempotent() {
    let mut graph = conv_bn_relu_graph();
    let pm = PassManager::new();
    pm.run_passes(&mut graph, None).expect("first run");
    let first: Vec<(OpKind, Vec<u64>)> = graph
        .get_partitions()
        .iter()
        .map(|p| (p.fused_op().kind(), p.get_ops()))
        .collect();

    pm.run_passes(&mut graph, None).expect("second run");
    let second: Vec<(OpKind, Vec<u64>)> = graph
        .get_partitions()
        .iter()
        .map(|p| (p.fused_op().kind(), p.get_ops()))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn debug_policy_skips_fusion() {
    let mut graph = conv_bn_relu_graph();
    graph
        .run_pass(PartitionPolicy::Debug)
        .expect("debug partitioning");

    assert_eq!(graph.num_partitions(), 3);
    let kinds: Vec<OpKind> = graph
        .get_partitions()
        .iter()
        .map(|p| p.fused_op().kind())
        .collect();
    assert_eq!(
        kinds,
        vec![OpKind::Convolution, OpKind::BatchNormInference, OpKind::ReLU]
    );
}

#[test]
fn fusion_policy_produces_fused_partition() {
    let mut graph = conv_bn_relu_graph();
    graph
        .run_pass(PartitionPolicy::Fusion)
        .expect("fusion partitioning");

    assert_eq!(graph.num_partitions(), 1);
    let partition = &graph.get_partitions()[0];
    assert_eq!(partition.fused_op().kind(), OpKind::ConvBnRelu);
    assert_eq!(partition.get_ops(), vec![0, 1, 2]);
    assert_eq!(partition.get_inputs().len(), 6);
    assert_eq!(partition.get_outputs().len(), 1);
    assert!(partition.is_supported());
}

#[test]
fn external_values_are_conserved() {
    let mut graph = conv_bn_relu_graph();
    graph
        .run_pass(PartitionPolicy::Fusion)
        .expect("fusion partitioning");

    let mut boundary: Vec<u64> = graph
        .get_partitions()
        .iter()
        .flat_map(|p| {
            p.get_inputs()
                .iter()
                .chain(p.get_outputs())
                .map(|t| t.id)
                .collect::<Vec<_>>()
        })
        .collect();
    boundary.sort_unstable();
    // Graph inputs 0,1,3..=6 plus the graph output 8.
    assert_eq!(boundary, vec![0, 1, 3, 4, 5, 6, 8]);
}

#[test]
fn schemas_hold_after_pass_execution() {
    let mut graph = conv_bn_relu_graph();
    graph
        .run_pass(PartitionPolicy::Fusion)
        .expect("fusion partitioning");

    for op in graph.get_ops() {
        if let Some(schema) = lookup_schema(op.kind()) {
            assert!(schema.verify(op), "schema must hold for {}", op.name());
        }
    }
}

#[test]
fn pass_list_round_trips_through_json() {
    let path = temp_path("round_trip");
    let pm = PassManager::new();
    pm.print_passes(&path).expect("print must succeed");

    let payload = fs::read_to_string(&path).expect("dump must be readable");
    let parsed: PassConfig = serde_json::from_str(&payload).expect("dump must parse");
    assert!(!parsed.passes.is_empty());
    assert!(parsed.passes.iter().all(|entry| entry.enable));
    assert!(parsed
        .passes
        .iter()
        .all(|entry| entry.pass_type == "fusion"));

    let from_config: Vec<String> = pm
        .effective_passes(Some(path.as_path()))
        .expect("config ordering")
        .iter()
        .map(|pass| pass.name().to_string())
        .collect();
    let from_priority: Vec<String> = pm
        .effective_passes(None)
        .expect("default ordering")
        .iter()
        .map(|pass| pass.name().to_string())
        .collect();
    assert_eq!(from_config, from_priority);

    fs::remove_file(&path).ok();
}

#[test]
fn config_disables_and_ignores_unknown_passes() {
    let path = temp_path("disable");
    fs::write(
        &path,
        r#"{
  "passes": [
    {"pass_name": "conv_relu_fusion", "pass_type": "fusion", "enable": false, "priority": 8.1},
    {"pass_name": "not_a_registered_pass", "pass_type": "fusion", "enable": true, "priority": 1.0},
    {"pass_name": "conv_bn_fusion", "pass_type": "fusion", "priority": 8.8}
  ]
}"#,
    )
    .expect("config must be writable");

    let pm = PassManager::new();
    let effective: Vec<String> = pm
        .effective_passes(Some(path.as_path()))
        .expect("config ordering")
        .iter()
        .map(|pass| pass.name().to_string())
        .collect();
    assert_eq!(effective, vec!["conv_bn_fusion".to_string()]);

    // conv -> relu: with conv_relu_fusion disabled nothing fuses and both
    // ops fall back to single-op partitions.
    let mut graph = Graph::new(EngineKind::Cpu);
    let mut conv = conv_op(0);
    conv.add_input(lt(0)).add_input(lt(1)).add_output(lt(2));
    let mut relu = Op::new(1, OpKind::ReLU, "relu");
    relu.add_input(lt(2)).add_output(lt(3));
    graph.add_op(&conv).expect("conv must be accepted");
    graph.add_op(&relu).expect("relu must be accepted");
    graph.build_graph().expect("link must succeed");

    pm.run_passes(&mut graph, Some(path.as_path()))
        .expect("config run must succeed");
    assert_eq!(graph.num_partitions(), 2);
    let kinds: Vec<OpKind> = graph
        .get_partitions()
        .iter()
        .map(|p| p.fused_op().kind())
        .collect();
    assert_eq!(kinds, vec![OpKind::Convolution, OpKind::ReLU]);

    fs::remove_file(&path).ok();
}

#[test]
fn partition_infer_shape_propagates_through_members() {
    let mut graph = conv_bn_relu_graph();
    graph
        .run_pass(PartitionPolicy::Fusion)
        .expect("fusion partitioning");
    let partition = &graph.get_partitions()[0];

    let inputs = vec![
        lt(0).with_shape([1, 4, 4, 3]),
        lt(1).with_shape([1, 1, 3, 8]),
        lt(3).with_shape([8]),
        lt(4).with_shape([8]),
        lt(5).with_shape([8]),
        lt(6).with_shape([8]),
    ];
    let mut outputs = vec![lt(8)];
    partition
        .infer_shape(&inputs, &mut outputs)
        .expect("shape inference must succeed");
    assert_eq!(outputs[0].shape.as_deref(), Some(&[1i64, 4, 4, 8][..]));
}
