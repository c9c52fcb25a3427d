use emlc::backend::{BinaryOp, UnaryOp};
use emlc::graph::{topological_order, GraphError, GraphResult, ModelTransformer, NodeId};
use emlc::nodes::{
    BinaryOperationNode, ConstantNode, InputNode, OutputNode, SinkNode, SourceNode,
    UnaryOperationNode,
};
use emlc::optimizer::{
    detach_boundary, ConstantFoldingPass, DeadNodeEliminationPass, ModelPass, PassContext,
    PassOutput, PassResult, ReplaceSourceAndSinkNodesPass,
};
use emlc::{Map, MapCompiler, MapCompilerOptions, Model, ModelOptimizer, Tensor};

/// Copies every node except `skip`, leaving its consumers without a producer.
struct DropNode {
    skip: NodeId,
}

impl ModelPass for DropNode {
    fn name(&self) -> &'static str {
        "drop-node"
    }

    fn run(&self, model: &Model, _cx: &PassContext<'_>) -> GraphResult<PassOutput> {
        let mut transformer = ModelTransformer::new(model);
        for id in topological_order(model)? {
            if id != self.skip {
                transformer.copy_node(id)?;
            }
        }
        Ok(PassOutput::new(
            transformer.finish(),
            PassResult {
                changed: true,
                rewrites_applied: 0,
                nodes_removed: 1,
            },
        ))
    }
}

fn chain() -> (Map, NodeId) {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![4]).expect("x")).expect("add x");
    let e = UnaryOperationNode::new(&model, x.output(), UnaryOp::Neg).expect("neg");
    let e = model.add(e).expect("add neg");
    let out = OutputNode::new(&model, e.output()).expect("out");
    let out = model.add(out).expect("add out");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", out.output()).expect("bind");
    (map, e)
}

#[test]
fn removing_a_referenced_node_leaves_the_map_intact() {
    let (map, neg) = chain();
    let before = format!("{:?}", map);
    let optimizer = ModelOptimizer::new(MapCompilerOptions::default())
        .with_pass(DropNode { skip: neg });
    let err = map.optimize(&optimizer).expect_err("consumer of the dropped node dangles");
    assert_eq!(err.pass, "drop-node");
    assert!(
        matches!(err.error, GraphError::DanglingReference { port } if port == neg.output()),
        "{}",
        err.error
    );

    let map = err.into_map();
    assert_eq!(format!("{:?}", map), before);
    let out = map
        .compute(&[Tensor::from_vec(vec![4], vec![1.0, -2.0, 3.0, -4.0]).expect("tensor")])
        .expect("original still evaluates");
    assert_eq!(out[0].data(), &[-1.0, 2.0, -3.0, 4.0]);
}

#[test]
fn stranding_a_declared_output_is_fatal() {
    let (map, _) = chain();
    let before = format!("{:?}", map);
    let out = map.outputs()[0].port.node;
    let optimizer =
        ModelOptimizer::new(MapCompilerOptions::default()).with_pass(DropNode { skip: out });
    let err = map.optimize(&optimizer).expect_err("output node removed");
    assert_eq!(err.pass, "drop-node");
    assert!(
        matches!(&err.error, GraphError::UnreachableOutput { name } if name == "y"),
        "{}",
        err.error
    );

    let map = err.into_map();
    assert_eq!(format!("{:?}", map), before);
    let out = map
        .compute(&[Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]).expect("tensor")])
        .expect("original still evaluates");
    assert_eq!(out[0].data(), &[-1.0, -2.0, -3.0, -4.0]);
}

#[test]
fn dropping_a_bound_input_is_fatal() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![2]).expect("x")).expect("add x");
    let unused = model.add(InputNode::new(vec![2]).expect("z")).expect("add z");
    let out = OutputNode::new(&model, x.output()).expect("out");
    let out = model.add(out).expect("add out");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind x");
    map.add_input("z", unused).expect("bind z");
    map.add_output("y", out.output()).expect("bind y");
    let before = format!("{:?}", map);

    let optimizer =
        ModelOptimizer::new(MapCompilerOptions::default()).with_pass(DropNode { skip: unused });
    let err = map.optimize(&optimizer).expect_err("bound input removed");
    assert!(
        matches!(&err.error, GraphError::UnreachableInput { name } if name == "z"),
        "{}",
        err.error
    );
    assert_eq!(format!("{:?}", err.into_map()), before);
}

fn callback_map() -> Map {
    let mut model = Model::new();
    let src = model
        .add(SourceNode::new("read", vec![2, 2]).expect("source"))
        .expect("add source");
    let abs = UnaryOperationNode::new(&model, src.output(), UnaryOp::Abs).expect("abs");
    let abs = model.add(abs).expect("add abs");
    let sink = SinkNode::new(&model, abs.output(), "write").expect("sink");
    let sink = model.add(sink).expect("add sink");
    let mut map = Map::new(model);
    map.add_output("y", sink.output()).expect("bind");
    map
}

#[test]
fn detaching_boundary_binds_a_single_input() {
    let options = MapCompilerOptions::default();
    let map = detach_boundary(callback_map(), &options).expect("detach");

    assert_eq!(map.inputs().len(), 1);
    assert_eq!(map.inputs()[0].name, "input_1");
    assert_eq!(map.input_layout(0).expect("layout").size(), &[2, 2]);
    let kinds: Vec<&str> = map.model().nodes().map(|(_, node)| node.type_name()).collect();
    assert!(kinds.contains(&"InputNode<float>"));
    assert!(kinds.contains(&"OutputNode<float>"));
    assert!(!kinds.iter().any(|kind| kind.starts_with("SourceNode") || kind.starts_with("SinkNode")));

    let compiled = MapCompiler::new(options.clone()).compile(&map).expect("host compile");
    let out = compiled.compute(&[&[-1.0, 2.0, -3.0, 4.0]]).expect("run");
    assert_eq!(out[0], vec![1.0, 2.0, 3.0, 4.0]);

    let snapshot = format!("{:?}", map);
    let again = detach_boundary(map, &options).expect("detach twice");
    assert_eq!(format!("{:?}", again), snapshot);
}

#[test]
fn detaching_binds_existing_input_nodes_in_model_order() {
    let mut model = Model::new();
    let a = model.add(InputNode::new(vec![3]).expect("a")).expect("add a");
    let b = model.add(InputNode::new(vec![3]).expect("b")).expect("add b");
    let sum = BinaryOperationNode::new(&model, a.output(), b.output(), BinaryOp::Sub).expect("sub");
    let sum = model.add(sum).expect("add sub");
    let mut map = Map::new(model);
    map.add_input("rhs", b).expect("bind b");
    map.add_input("lhs", a).expect("bind a");
    map.add_output("diff", sum.output()).expect("bind");

    let map = detach_boundary(map, &MapCompilerOptions::default()).expect("detach");
    let names: Vec<(&str, NodeId)> = map
        .inputs()
        .iter()
        .map(|input| (input.name.as_str(), input.node))
        .collect();
    assert_eq!(names, vec![("input_1", a), ("input_2", b)]);
}

#[test]
fn replace_pass_reports_rewrites() {
    let map = callback_map();
    let options = MapCompilerOptions::default();
    let cx = PassContext {
        options: &options,
        required_outputs: &[],
        required_inputs: &[],
    };
    let output = ReplaceSourceAndSinkNodesPass
        .run(map.model(), &cx)
        .expect("replace");
    assert!(output.result.changed);
    assert_eq!(output.result.rewrites_applied, 2);
    assert_eq!(output.model.len(), 3);
}

#[test]
fn constant_subgraphs_are_folded() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![3]).expect("x")).expect("add x");
    let c1 = model
        .add(ConstantNode::new(vec![3], vec![1.0, 2.0, 3.0]).expect("c1"))
        .expect("add c1");
    let c2 = model
        .add(ConstantNode::new(vec![3], vec![0.5, 0.5, 0.5]).expect("c2"))
        .expect("add c2");
    let k = BinaryOperationNode::new(&model, c1.output(), c2.output(), BinaryOp::Mul).expect("k");
    let k = model.add(k).expect("add k");
    let y = BinaryOperationNode::new(&model, x.output(), k.output(), BinaryOp::Add).expect("y");
    let y = model.add(y).expect("add y");
    let out = OutputNode::new(&model, y.output()).expect("out");
    let out = model.add(out).expect("add out");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind");
    map.add_output("y", out.output()).expect("bind");

    let input = Tensor::from_vec(vec![3], vec![10.0, 20.0, 30.0]).expect("tensor");
    let before = map.compute(std::slice::from_ref(&input)).expect("interpret");

    let optimizer = ModelOptimizer::default_pipeline(MapCompilerOptions::default());
    let map = map.optimize(&optimizer).expect("optimize");
    assert_eq!(map.model().len(), 4, "x, folded constant, add, output");
    let constants = map
        .model()
        .nodes()
        .filter(|(_, node)| node.constant_value().is_some())
        .count();
    assert_eq!(constants, 1);

    let after = map.compute(std::slice::from_ref(&input)).expect("interpret optimized");
    assert_eq!(after[0], before[0]);
    assert_eq!(after[0].data(), &[10.5, 21.0, 31.5]);
}

#[test]
fn dead_nodes_are_removed_but_bound_inputs_survive() {
    let mut model = Model::new();
    let x = model.add(InputNode::new(vec![2]).expect("x")).expect("add x");
    let unused = model.add(InputNode::new(vec![2]).expect("unused")).expect("add unused");
    let dead = UnaryOperationNode::new(&model, x.output(), UnaryOp::Exp).expect("dead");
    model.add(dead).expect("add dead");
    let live = UnaryOperationNode::new(&model, x.output(), UnaryOp::Neg).expect("live");
    let live = model.add(live).expect("add live");
    let mut map = Map::new(model);
    map.add_input("x", x).expect("bind x");
    map.add_input("unused", unused).expect("bind unused");
    map.add_output("y", live.output()).expect("bind");

    let optimizer = ModelOptimizer::new(MapCompilerOptions::default())
        .with_pass(DeadNodeEliminationPass);
    let map = map.optimize(&optimizer).expect("optimize");
    assert_eq!(map.model().len(), 3);
    assert_eq!(map.inputs().len(), 2);
    assert_eq!(map.inputs()[1].name, "unused");
    assert_eq!(map.outputs()[0].name, "y");
}

#[test]
fn folding_without_constants_changes_nothing() {
    let (map, _) = chain();
    let options = MapCompilerOptions::default();
    let required = [map.outputs()[0].port];
    let cx = PassContext {
        options: &options,
        required_outputs: &required,
        required_inputs: &[],
    };
    let output = ConstantFoldingPass.run(map.model(), &cx).expect("fold");
    assert_eq!(output.result, PassResult::default());
    assert_eq!(output.model.len(), map.model().len());
}
