use emlc::backend::{BinaryOp, Target};
use emlc::nn::layers::{LayerShape, SoftmaxLayer};
use emlc::nodes::{
    BinaryOperationNode, ConstantNode, InputNode, OutputNode, SinkNode, SoftmaxLayerNode,
    SourceNode,
};
use emlc::{Map, MapCompiler, MapCompilerOptions, Model};
use emlc_backend_c::render_c_module;

#[test]
fn softmax_renders_reductions_and_local_scratch() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![4]).expect("x")).expect("add x");
    let layer = SoftmaxLayer::new(LayerShape::contiguous(vec![4]).expect("shape")).expect("layer");
    let node = SoftmaxLayerNode::new(&model, x.output(), layer).expect("softmax");
    let softmax = model.add(node).expect("add softmax");
    let out = OutputNode::new(&model, softmax.output()).expect("out");
    let out = model.add(out).expect("add out");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", out.output()).expect("bind");

    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let module = render_c_module(&compiled).expect("render");

    assert!(module.contains("#include <math.h>"));
    assert!(module.contains("void predict(const float* x, float* y) {"), "{module}");
    assert!(module.contains("float softmax_layer_node_1[4] = { 0 };"), "{module}");
    assert!(module.contains("float acc0 = -INFINITY;"));
    assert!(module.contains("acc0 = fmaxf(acc0, x[i0]);"), "{module}");
    assert!(module.contains("expf("));
    assert!(module.contains("/* n1 SoftmaxLayerNode<float> */"));
    assert!(!module.contains("static float"), "no shared mutable state");
}

#[test]
fn broadcast_constant_becomes_static_table() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![2, 3]).expect("x")).expect("add x");
    let k = model
        .add(ConstantNode::new(vec![3], vec![1.0, 2.0, 0.5]).expect("k"))
        .expect("add k");
    let sum = BinaryOperationNode::new(&model, x.output(), k.output(), BinaryOp::Mul).expect("mul");
    let sum = model.add(sum).expect("add mul");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", sum.output()).expect("bind");

    let options = MapCompilerOptions {
        function_name: "scale_rows".to_string(),
        ..MapCompilerOptions::default()
    };
    let compiled = MapCompiler::new(options).compile(&map).expect("compile");
    let module = render_c_module(&compiled).expect("render");

    assert!(
        module.contains("static const float scale_rows_constant_node_1[3] = { 1.0f, 2.0f, 0.5f };"),
        "{module}"
    );
    assert!(module.contains("void scale_rows(const float* x, float* y) {"), "{module}");
    assert!(module.contains("i0 < 2"));
    assert!(module.contains("i1 < 3"));
    assert!(module.contains("scale_rows_constant_node_1[i1]"), "{module}");
}

#[test]
fn callbacks_are_declared_extern() {
    let mut model = Model::new();
    let src = model
        .add(SourceNode::new("read_adc", vec![8]).expect("source"))
        .expect("add source");
    let doubled = BinaryOperationNode::new(&model, src.output(), src.output(), BinaryOp::Add)
        .expect("double");
    let doubled = model.add(doubled).expect("add double");
    let sink = SinkNode::new(&model, doubled.output(), "write_dac").expect("sink");
    model.add(sink).expect("add sink");
    let map = Map::new(model);

    let options = MapCompilerOptions::default().with_target(Target::embedded());
    let compiled = MapCompiler::new(options).compile(&map).expect("compile");
    let module = render_c_module(&compiled).expect("render");

    assert!(module.contains("extern void read_adc(float* buffer, size_t len);"), "{module}");
    assert!(module.contains("extern void write_dac(const float* buffer, size_t len);"));
    assert!(module.contains("void predict(void) {"), "{module}");
    assert!(module.contains("read_adc(source_node_0, 8);"), "{module}");
}

#[test]
fn bindings_named_like_loop_variables_are_renamed() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![4]).expect("x")).expect("add x");
    let layer = SoftmaxLayer::new(LayerShape::contiguous(vec![4]).expect("shape")).expect("layer");
    let node = SoftmaxLayerNode::new(&model, x.output(), layer).expect("softmax");
    let softmax = model.add(node).expect("add softmax");
    let out = OutputNode::new(&model, softmax.output()).expect("out");
    let out = model.add(out).expect("add out");
    let mut map = Map::new(model);
    map.add_input("i0", x).expect("bind");
    map.add_output("acc0", out.output()).expect("bind");

    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let module = render_c_module(&compiled).expect("render");

    assert!(!module.contains("const float* i0,"), "{module}");
    assert!(!module.contains("float* acc0)"), "{module}");
    assert!(module.contains("for (size_t i0 = 0; i0 < 4; ++i0) {"), "{module}");
    assert!(module.contains("float acc0 = -INFINITY;"), "{module}");
}
