#[path = "../src/model_file.rs"]
#[allow(dead_code)]
mod model_file;

use emlc::Tensor;
use model_file::{parse_map, ModelFile, NodeSpec};

const SOFTMAX_CALLBACKS: &str = r#"{
  "nodes": [
    { "kind": "source", "id": "in", "symbol": "read", "shape": [1, 4] },
    { "kind": "softmax", "id": "sm", "input": "in" },
    { "kind": "sink", "id": "out", "input": "sm", "symbol": "write" }
  ]
}"#;

#[test]
fn sinks_are_exposed_under_their_ids() {
    let map = parse_map(SOFTMAX_CALLBACKS).expect("parse");
    assert_eq!(map.model().len(), 3);
    assert!(map.inputs().is_empty());
    assert_eq!(map.outputs().len(), 1);
    assert_eq!(map.outputs()[0].name, "out");
}

#[test]
fn softmax_axis_defaults_to_last() {
    let file: ModelFile = serde_json::from_str(SOFTMAX_CALLBACKS).expect("json");
    match &file.nodes[1] {
        NodeSpec::Softmax {
            axis,
            output_padding,
            ..
        } => {
            assert_eq!(*axis, -1);
            assert!(output_padding.is_none());
        }
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn explicit_bindings_drive_interpretation() {
    let text = r#"{
      "nodes": [
        { "kind": "input", "id": "x", "shape": [2, 3] },
        { "kind": "constant", "id": "k", "shape": [3], "values": [1, 2, 3] },
        { "kind": "binary", "id": "sum", "op": "add", "lhs": "x", "rhs": "k" },
        { "kind": "unary", "id": "neg", "op": "neg", "input": "sum" }
      ],
      "inputs": [{ "name": "features", "node": "x" }],
      "outputs": [{ "name": "y", "node": "neg" }]
    }"#;
    let map = parse_map(text).expect("parse");
    assert_eq!(map.inputs()[0].name, "features");
    assert_eq!(map.outputs()[0].name, "y");

    let x = Tensor::from_vec(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).expect("x");
    let out = map.compute(&[x]).expect("compute");
    assert_eq!(out[0].data(), &[-1.0, -3.0, -5.0, -4.0, -6.0, -8.0]);
}

#[test]
fn padded_bias_output_layout() {
    let text = r#"{
      "nodes": [
        { "kind": "input", "id": "x", "shape": [2, 2] },
        { "kind": "bias", "id": "b", "input": "x", "axis": 1, "values": [1, 2],
          "output_padding": [1, 0] },
        { "kind": "output", "id": "y", "input": "b" }
      ]
    }"#;
    let map = parse_map(text).expect("parse");
    let layout = map.output_layout(0).expect("layout");
    assert_eq!(layout.size(), &[2, 2]);
    assert_eq!(layout.extent(), &[4, 2]);
}

#[test]
fn unknown_references_are_reported() {
    let text = r#"{
      "nodes": [
        { "kind": "unary", "id": "bad", "op": "exp", "input": "nope" }
      ]
    }"#;
    let err = parse_map(text).expect_err("unknown input");
    assert!(format!("{err:#}").contains("unknown node `nope`"), "{err:#}");
}

#[test]
fn duplicate_ids_are_rejected() {
    let text = r#"{
      "nodes": [
        { "kind": "input", "id": "x", "shape": [2] },
        { "kind": "input", "id": "x", "shape": [2] }
      ]
    }"#;
    let err = parse_map(text).expect_err("duplicate");
    assert!(format!("{err:#}").contains("duplicate node id `x`"), "{err:#}");
}

#[test]
fn binary_constants_accept_only_zero_and_one() {
    let text = r#"{
      "nodes": [
        { "kind": "constant", "id": "mask", "shape": [2], "values": [1, 0.5], "binary": true }
      ]
    }"#;
    assert!(parse_map(text).is_err());
}

#[test]
fn unknown_fields_and_kinds_fail_to_parse() {
    assert!(parse_map(r#"{ "nodes": [], "extra": 1 }"#).is_err());
    assert!(parse_map(r#"{ "nodes": [{ "kind": "conv", "id": "c" }] }"#).is_err());
    assert!(parse_map("not json").is_err());
}
