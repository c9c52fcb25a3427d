use std::collections::HashMap;

use emlc::backend::{BinaryOp, CallbackHandler, Target, UnaryOp};
use emlc::graph::GraphError;
use emlc::layout::PortMemoryLayout;
use emlc::nn::layers::{BiasLayer, LayerShape};
use emlc::nodes::{
    BiasLayerNode, BinaryOperationNode, ConstantNode, InputNode, OutputNode, SinkNode,
    SourceNode, UnaryOperationNode,
};
use emlc::{CompileError, Map, MapCompiler, MapCompilerOptions, Model, NodeId, Tensor};

struct Diamond {
    map: Map,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    d: NodeId,
}

fn diamond() -> Diamond {
    let mut model = Model::new();
    let a = model.add(InputNode::new(vec![2, 3]).expect("a")).expect("add a");
    let b = UnaryOperationNode::new(&model, a.output(), UnaryOp::Exp).expect("b");
    let b = model.add(b).expect("add b");
    let c = UnaryOperationNode::new(&model, a.output(), UnaryOp::Abs).expect("c");
    let c = model.add(c).expect("add c");
    let d = BinaryOperationNode::new(&model, b.output(), c.output(), BinaryOp::Add).expect("d");
    let d = model.add(d).expect("add d");
    let out = OutputNode::new(&model, d.output()).expect("out");
    let out = model.add(out).expect("add out");

    let mut map = Map::new(model);
    map.add_input("a", a).expect("bind a");
    map.add_output("d", out.output()).expect("bind d");
    Diamond { map, a, b, c, d }
}

fn section_index(compiled: &emlc::CompiledMap, node: NodeId) -> usize {
    let prefix = format!("{node} ");
    compiled
        .routine()
        .sections()
        .iter()
        .position(|section| section.label.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no section for {node}"))
}

#[test]
fn diamond_emits_producers_before_consumers() {
    let Diamond { map, a, b, c, d } = diamond();
    let compiled = MapCompiler::default().compile(&map).expect("compile diamond");
    let (ia, ib, ic, id) = (
        section_index(&compiled, a),
        section_index(&compiled, b),
        section_index(&compiled, c),
        section_index(&compiled, d),
    );
    assert!(ia < ib && ia < ic, "A must precede B and C");
    assert!(ib < id && ic < id, "B and C must precede D");
    assert_eq!(
        compiled.routine().sections()[ia].label,
        format!("{a} InputNode<float>")
    );
}

#[test]
fn diamond_matches_interpretation() {
    let Diamond { map, .. } = diamond();
    let values = vec![-1.5, -0.5, 0.0, 0.25, 1.0, 2.0];
    let expected = map
        .compute(&[Tensor::from_vec(vec![2, 3], values.clone()).expect("tensor")])
        .expect("interpret");
    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let actual = compiled.compute(&[&values]).expect("run");
    for (a, e) in actual[0].iter().zip(expected[0].data()) {
        assert!((a - e).abs() <= 1e-6, "{a} vs {e}");
    }
}

#[test]
fn unsupported_primitive_fails_before_emission() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![4]).expect("x")).expect("add x");
    let t = UnaryOperationNode::new(&model, x.output(), UnaryOp::Tanh).expect("tanh");
    let t = model.add(t).expect("add tanh");
    let m = BinaryOperationNode::new(&model, t.output(), x.output(), BinaryOp::Min).expect("min");
    let m = model.add(m).expect("add min");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", m.output()).expect("bind");

    let options = MapCompilerOptions::default().with_target(Target::embedded());
    let err = MapCompiler::new(options).compile(&map).expect_err("tanh is unavailable");
    match err {
        CompileError::UnsupportedNode { target, types } => {
            assert_eq!(target, "embedded");
            assert_eq!(
                types,
                vec![
                    "UnaryOperationNode<float>".to_string(),
                    "BinaryOperationNode<float>".to_string()
                ]
            );
        }
        other => panic!("expected UnsupportedNode, got {other:?}"),
    }

    MapCompiler::default()
        .compile(&map)
        .expect("host target offers every primitive");
}

#[test]
fn source_nodes_need_callbacks() {
    let mut model = Model::new();
    let src = model
        .add(SourceNode::new("read_sensor", vec![3]).expect("source"))
        .expect("add source");
    let scaled = BinaryOperationNode::new(&model, src.output(), src.output(), BinaryOp::Add)
        .expect("double");
    let scaled = model.add(scaled).expect("add double");
    let sink = SinkNode::new(&model, scaled.output(), "publish").expect("sink");
    let sink = model.add(sink).expect("add sink");
    let mut map = Map::new(model);
    map.add_output("y", sink.output()).expect("bind");

    let err = MapCompiler::default().compile(&map).expect_err("host has no callbacks");
    assert!(matches!(err, CompileError::UnsupportedNode { .. }), "{err}");

    let options = MapCompilerOptions::default().with_target(Target::embedded());
    let compiled = MapCompiler::new(options).compile(&map).expect("embedded compile");

    #[derive(Default)]
    struct Host {
        published: HashMap<String, Vec<f32>>,
    }
    impl CallbackHandler for Host {
        fn source(&mut self, symbol: &str, buffer: &mut [f32]) -> bool {
            if symbol != "read_sensor" {
                return false;
            }
            buffer.copy_from_slice(&[1.0, 2.0, 3.0]);
            true
        }

        fn sink(&mut self, symbol: &str, buffer: &[f32]) {
            self.published.insert(symbol.to_string(), buffer.to_vec());
        }
    }

    let mut host = Host::default();
    let mut out = vec![0.0; 3];
    compiled
        .compute_with_callbacks(&[], &mut [out.as_mut_slice()], &mut host)
        .expect("run with callbacks");
    assert_eq!(out, vec![2.0, 4.0, 6.0]);
    assert_eq!(host.published.get("publish"), Some(&vec![2.0, 4.0, 6.0]));

    let err = map.compute(&[]).expect_err("interpretation cannot call the host");
    assert!(matches!(err, GraphError::UnboundSource { .. }), "{err}");
}

#[test]
fn unbound_input_is_rejected() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![2]).expect("x")).expect("add x");
    let y = model.add(InputNode::new(vec![2]).expect("y")).expect("add y");
    let sum = BinaryOperationNode::new(&model, x.output(), y.output(), BinaryOp::Add).expect("sum");
    let sum = model.add(sum).expect("add sum");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("sum", sum.output()).expect("bind");

    let err = MapCompiler::default().compile(&map).expect_err("y is unbound");
    assert!(
        matches!(err, CompileError::Graph(GraphError::UnboundInput { node }) if node == y),
        "{err}"
    );
}

#[test]
fn binary_constants_accept_only_zero_and_one() {
    ConstantNode::binary(vec![3], vec![0.0, 1.0, 1.0]).expect("valid mask");
    let err = ConstantNode::binary(vec![3], vec![0.0, 0.5, 1.0]).expect_err("0.5 is not a bit");
    assert!(
        matches!(err, GraphError::InvalidValue { value, .. } if value == 0.5),
        "{err}"
    );
}

#[test]
fn bias_over_padded_input_and_constant_operand() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![2, 3]).expect("x")).expect("add x");
    let scale = model
        .add(ConstantNode::new(vec![3], vec![2.0, 3.0, 4.0]).expect("scale"))
        .expect("add scale");
    let padded = PortMemoryLayout::padded(vec![2, 3], &[1, 1]).expect("layout");
    let scaled = BinaryOperationNode::with_output_layout(
        &model,
        x.output(),
        scale.output(),
        BinaryOp::Mul,
        padded.clone(),
    )
    .expect("scaled");
    let scaled = model.add(scaled).expect("add scaled");
    let shape = LayerShape::new(padded, PortMemoryLayout::contiguous(vec![2, 3]).expect("out"));
    let layer = BiasLayer::new(shape, 0, vec![10.0, 20.0]).expect("bias layer");
    let biased = BiasLayerNode::new(&model, scaled.output(), layer).expect("bias node");
    let biased = model.add(biased).expect("add bias");

    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", biased.output()).expect("bind");

    let values = vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let actual = compiled.compute(&[&values]).expect("run");
    assert_eq!(actual[0], vec![12.0, 13.0, 14.0, 24.0, 26.0, 28.0]);

    let expected = map
        .compute(&[Tensor::from_vec(vec![2, 3], values).expect("tensor")])
        .expect("interpret");
    assert_eq!(expected[0].data(), actual[0].as_slice());
}

#[test]
fn artifact_is_shared_across_threads() {
    let Diamond { map, .. } = diamond();
    let compiled = MapCompiler::default().compile(&map).expect("compile");

    let results: Vec<(Vec<f32>, Vec<f32>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let compiled = &compiled;
                let map = &map;
                scope.spawn(move || {
                    let values: Vec<f32> = (0..6).map(|i| (i as f32 - 2.5) * (t as f32 + 1.0)).collect();
                    let compiled_out = compiled.compute(&[&values]).expect("run");
                    let interpreted = map
                        .compute(&[Tensor::from_vec(vec![2, 3], values).expect("tensor")])
                        .expect("interpret");
                    (compiled_out[0].clone(), interpreted[0].data().to_vec())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });

    for (compiled_out, interpreted) in results {
        for (a, e) in compiled_out.iter().zip(&interpreted) {
            assert!((a - e).abs() <= 1e-3 * e.abs().max(1.0), "{a} vs {e}");
        }
    }
}

#[test]
fn wrong_buffer_sizes_are_reported() {
    let Diamond { map, .. } = diamond();
    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let err = compiled.compute(&[&[1.0, 2.0]]).expect_err("input too short");
    assert!(matches!(err, emlc::backend::ExecutionError::InputSize { .. }), "{err}");
    let err = compiled.compute(&[]).expect_err("missing input");
    assert!(matches!(err, emlc::backend::ExecutionError::InputCount { .. }), "{err}");
}
