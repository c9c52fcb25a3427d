use emlc::backend::{BinaryOp, UnaryOp};
use emlc::layout::broadcast_shapes;
use emlc::nn::layers::{LayerShape, SoftmaxLayer};
use emlc::nodes::{
    BinaryOperationNode, ConstantNode, InputNode, OutputNode, SoftmaxLayerNode,
    UnaryOperationNode,
};
use emlc::{Map, MapCompiler, Model, Tensor};
use proptest::prelude::*;

const OPS: [BinaryOp; 6] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Max,
    BinaryOp::Min,
];

/// A shape plus two operand shapes derived from it by dropping leading dimensions and
/// stretching others to 1.
fn broadcast_case() -> impl Strategy<Value = (Vec<usize>, Vec<usize>, Vec<usize>)> {
    prop::collection::vec(1usize..=4, 1..=3).prop_flat_map(|out| {
        let rank = out.len();
        (
            Just(out.clone()),
            operand_shape(out.clone(), rank),
            operand_shape(out, rank),
        )
    })
}

fn operand_shape(out: Vec<usize>, rank: usize) -> impl Strategy<Value = Vec<usize>> {
    (0..rank, prop::collection::vec(any::<bool>(), rank)).prop_map(move |(dropped, unit)| {
        out.iter()
            .zip(&unit)
            .skip(dropped)
            .map(|(dim, stretch)| if *stretch { 1 } else { *dim })
            .collect()
    })
}

fn values(len: usize, seed: &[f32]) -> Vec<f32> {
    (0..len).map(|i| seed[i % seed.len()] + i as f32 * 0.25).collect()
}

fn build(lhs: &[usize], rhs: &[usize], op: BinaryOp, softmax: bool) -> Map {
    let mut model = Model::new();
    let a = model.add(InputNode::new(lhs.to_vec()).expect("lhs")).expect("add lhs");
    let b = model.add(InputNode::new(rhs.to_vec()).expect("rhs")).expect("add rhs");
    let b_abs = UnaryOperationNode::new(&model, b.output(), UnaryOp::Abs).expect("abs");
    let b_abs = model.add(b_abs).expect("add abs");
    // Keep divisors away from zero.
    let one = model
        .add(ConstantNode::new(vec![1], vec![1.0]).expect("one"))
        .expect("add one");
    let shifted = BinaryOperationNode::new(&model, b_abs.output(), one.output(), BinaryOp::Add)
        .expect("shift");
    let shifted = model.add(shifted).expect("add shift");
    let combined = BinaryOperationNode::new(&model, a.output(), shifted.output(), op).expect("op");
    let mut last = model.add(combined).expect("add op");
    if softmax {
        let size = model.port_layout(last.output()).expect("layout").size().to_vec();
        let layer = SoftmaxLayer::new(LayerShape::contiguous(size).expect("shape")).expect("layer");
        let node = SoftmaxLayerNode::new(&model, last.output(), layer).expect("softmax");
        last = model.add(node).expect("add softmax");
    }
    let out = OutputNode::new(&model, last.output()).expect("out");
    let out = model.add(out).expect("add out");

    let mut map = Map::new(model);
    map.add_input("lhs", a).expect("bind lhs");
    map.add_input("rhs", b).expect("bind rhs");
    map.add_output("y", out.output()).expect("bind out");
    map
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compiled_matches_interpreted(
        (_, lhs, rhs) in broadcast_case(),
        op in 0usize..OPS.len(),
        softmax in any::<bool>(),
        seed in prop::collection::vec(-8.0f32..8.0, 1..8),
    ) {
        let map = build(&lhs, &rhs, OPS[op], softmax);
        let lhs_values = values(lhs.iter().product(), &seed);
        let rhs_values = values(rhs.iter().product(), &seed);

        let expected = map
            .compute(&[
                Tensor::from_vec(lhs.clone(), lhs_values.clone()).expect("lhs tensor"),
                Tensor::from_vec(rhs.clone(), rhs_values.clone()).expect("rhs tensor"),
            ])
            .expect("interpret");
        let compiled = MapCompiler::default().compile(&map).expect("compile");
        let actual = compiled.compute(&[&lhs_values, &rhs_values]).expect("run");

        let shape = broadcast_shapes(&lhs, &rhs).expect("broadcast");
        prop_assert_eq!(expected[0].shape(), shape.as_slice());
        prop_assert_eq!(actual[0].len(), expected[0].num_elements());
        for (a, e) in actual[0].iter().zip(expected[0].data()) {
            prop_assert!(a.is_finite());
            prop_assert!((a - e).abs() <= 1e-4 * e.abs().max(1.0), "{} vs {}", a, e);
        }
    }
}
