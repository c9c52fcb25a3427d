use std::fs;
use std::process::Command;

use anyhow::Result;

const MODEL: &str = r#"{
  "nodes": [
    { "kind": "source", "id": "in", "symbol": "read", "shape": [3, 4] },
    { "kind": "bias", "id": "b", "input": "in", "axis": 1, "values": [1, 2, 3, 4] },
    { "kind": "softmax", "id": "sm", "input": "b", "output_padding": [0, 1] },
    { "kind": "sink", "id": "out", "input": "sm", "symbol": "write" }
  ]
}"#;

fn emlc_debug() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_emlc-debug"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn missing_model_exits_with_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = emlc_debug()
        .arg("--model")
        .arg(dir.path().join("absent.json"))
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
    Ok(())
}

#[test]
fn unparsable_model_exits_with_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("broken.json");
    fs::write(&model, "{ \"nodes\": [")?;
    let output = emlc_debug().arg("--model").arg(&model).output()?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[test]
fn oversized_shape_exits_with_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("big.json");
    fs::write(
        &model,
        r#"{ "nodes": [{ "kind": "input", "id": "x", "shape": [4294967296, 4294967296] }] }"#,
    )?;
    let output = emlc_debug().arg("--model").arg(&model).output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("more entries than fit"));
    Ok(())
}

#[test]
fn writes_report_graphs_and_c_module() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("model.json");
    fs::write(&model, MODEL)?;
    let out_dir = dir.path().join("out");

    let output = emlc_debug()
        .arg("--model")
        .arg(&model)
        .arg("--output-dir")
        .arg(&out_dir)
        .args(["--report", "--graph", "--emit-c", "--seed", "abc"])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("4 of 4 ports match on target host"), "{stdout}");

    let report = fs::read_to_string(out_dir.join("report.md"))?;
    assert!(report.contains("- seed: `abc`"));
    assert!(report.contains("BiasLayerNode<float>"));
    assert!(fs::read_to_string(out_dir.join("graph.dot"))?.contains("digraph model"));
    assert!(fs::read_to_string(out_dir.join("graph.dgml"))?.contains("<DirectedGraph"));
    let module = fs::read_to_string(out_dir.join("predict.c"))?;
    assert!(module.contains("void predict(const float* input_1, float* "), "{module}");
    Ok(())
}

#[test]
fn embedded_target_is_accepted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("model.json");
    fs::write(&model, MODEL)?;
    let output = emlc_debug()
        .arg("--model")
        .arg(&model)
        .args(["--target", "embedded", "--tolerance", "1e-3"])
        .current_dir(dir.path())
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains("on target embedded"));
    Ok(())
}
