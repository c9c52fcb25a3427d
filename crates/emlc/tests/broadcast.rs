use emlc::backend::BinaryOp;
use emlc::graph::GraphError;
use emlc::layout::{broadcast_shapes, PortMemoryLayout};
use emlc::nodes::{BinaryOperationNode, InputNode, OutputNode};
use emlc::{Map, MapCompiler, Model, Tensor};

#[test]
fn row_broadcasts_against_matrix() {
    let mut model = Model::new();
    let row = model.add(InputNode::new(vec![4]).expect("row")).expect("add row");
    let matrix = model
        .add(InputNode::new(vec![3, 4]).expect("matrix"))
        .expect("add matrix");
    let node = BinaryOperationNode::new(&model, row.output(), matrix.output(), BinaryOp::Add)
        .expect("broadcastable operands");
    let sum = model.add(node).expect("add sum");
    assert_eq!(model.port_layout(sum.output()).expect("layout").size(), &[3, 4]);
}

#[test]
fn incompatible_trailing_dimension_is_rejected() {
    let mut model = Model::new();
    let row = model.add(InputNode::new(vec![5]).expect("row")).expect("add row");
    let matrix = model
        .add(InputNode::new(vec![3, 4]).expect("matrix"))
        .expect("add matrix");
    let err = BinaryOperationNode::new(&model, row.output(), matrix.output(), BinaryOp::Add)
        .expect_err("[5] does not broadcast against [3, 4]");
    assert!(
        matches!(err, GraphError::ShapeMismatch { .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn broadcast_shapes_stretch_unit_and_missing_dims() {
    assert_eq!(broadcast_shapes(&[3, 1], &[1, 4]).expect("shapes"), vec![3, 4]);
    assert_eq!(broadcast_shapes(&[2, 3, 4], &[4]).expect("shapes"), vec![2, 3, 4]);
    assert!(broadcast_shapes(&[2, 3], &[3, 2]).is_err());
}

#[test]
fn stretched_dimensions_have_zero_increment() {
    let column = PortMemoryLayout::contiguous(vec![3, 1]).expect("layout");
    assert_eq!(column.broadcast_increments(&[3, 4]).expect("incs"), vec![1, 0]);

    let row = PortMemoryLayout::padded(vec![4], &[2]).expect("layout");
    assert_eq!(row.broadcast_increments(&[3, 4]).expect("incs"), vec![0, 1]);
    assert_eq!(row.first_entry_offset(), 2);
    assert_eq!(row.memory_size(), 8);
}

#[test]
fn compiled_broadcast_matches_interpretation() {
    let mut model = Model::new();
    let row = model.add(InputNode::new(vec![4]).expect("row")).expect("add row");
    let matrix = model
        .add(InputNode::new(vec![3, 4]).expect("matrix"))
        .expect("add matrix");
    let node = BinaryOperationNode::new(&model, matrix.output(), row.output(), BinaryOp::Sub)
        .expect("diff");
    let diff = model.add(node).expect("add diff");
    let out = OutputNode::new(&model, diff.output()).expect("output");
    let out = model.add(out).expect("add output");

    let mut map = Map::new(model);
    map.add_input("row", row).expect("bind row");
    map.add_input("matrix", matrix).expect("bind matrix");
    map.add_output("y", out.output()).expect("bind output");

    let row_values = vec![1.0, 2.0, 3.0, 4.0];
    let matrix_values: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let expected = map
        .compute(&[
            Tensor::from_vec(vec![4], row_values.clone()).expect("row tensor"),
            Tensor::from_vec(vec![3, 4], matrix_values.clone()).expect("matrix tensor"),
        ])
        .expect("interpret");

    let compiled = MapCompiler::default().compile(&map).expect("compile");
    let actual = compiled
        .compute(&[&row_values, &matrix_values])
        .expect("run compiled map");

    assert_eq!(actual.len(), 1);
    assert_eq!(actual[0], expected[0].data());
    assert_eq!(actual[0][4], 3.0);
}
