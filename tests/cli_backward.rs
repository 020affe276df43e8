use std::collections::BTreeMap;
use std::fs;
use std::process::Command;

use skiff::{AttrMap, BlockDesc, OpDesc, OpNode, VarNameMap};
use tempfile::tempdir;

fn single_slot(slot: &str, names: &[&str]) -> VarNameMap {
    BTreeMap::from([(
        slot.to_string(),
        names.iter().map(|n| n.to_string()).collect(),
    )])
}

fn mul_desc() -> OpDesc {
    let mut inputs = single_slot("X", &["a"]);
    inputs.extend(single_slot("Y", &["b"]));
    OpDesc {
        kind: "mul".to_string(),
        inputs,
        outputs: single_slot("Out", &["c"]),
        attrs: AttrMap::new(),
    }
}

fn write_json(path: &std::path::Path, value: &impl serde::Serialize) {
    let json = serde_json::to_string_pretty(value).expect("serialize input graph");
    fs::write(path, json).expect("write input graph");
}

#[test]
fn cli_emits_backward_text() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("forward.json");
    write_json(&input, &OpNode::leaf(mul_desc()));

    let output = Command::new(env!("CARGO_BIN_EXE_skiffc"))
        .arg(&input)
        .output()
        .expect("spawn skiffc");

    assert!(output.status.success(), "skiffc failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mul_grad"), "stdout: {stdout}");
    assert!(stdout.contains("a@GRAD"), "stdout: {stdout}");
}

#[test]
fn cli_emits_backward_json() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("forward.json");
    write_json(&input, &OpNode::leaf(mul_desc()));

    let output = Command::new(env!("CARGO_BIN_EXE_skiffc"))
        .arg(&input)
        .arg("--emit-json")
        .output()
        .expect("spawn skiffc");

    assert!(output.status.success(), "skiffc failed: {output:?}");
    let node: OpNode =
        serde_json::from_slice(&output.stdout).expect("parse emitted backward graph");
    assert_eq!(node.kind(), "mul_grad");
}

#[test]
fn cli_suppresses_no_grad_vars() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("forward.json");
    write_json(&input, &OpNode::leaf(mul_desc()));

    let output = Command::new(env!("CARGO_BIN_EXE_skiffc"))
        .arg(&input)
        .arg("--no-grad")
        .arg("a")
        .arg("--no-grad")
        .arg("b")
        .output()
        .expect("spawn skiffc");

    assert!(output.status.success(), "skiffc failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("net @NOP@ {}"), "stdout: {stdout}");
}

#[test]
fn cli_appends_to_flat_blocks() {
    let mut add_inputs = single_slot("X", &["c"]);
    add_inputs.extend(single_slot("Y", &["d"]));
    let block = BlockDesc {
        ops: vec![
            mul_desc(),
            OpDesc {
                kind: "add".to_string(),
                inputs: add_inputs,
                outputs: single_slot("Out", &["e"]),
                attrs: AttrMap::new(),
            },
        ],
    };

    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("block.json");
    write_json(&input, &block);

    let output = Command::new(env!("CARGO_BIN_EXE_skiffc"))
        .arg(&input)
        .arg("--flat")
        .output()
        .expect("spawn skiffc");

    assert!(output.status.success(), "skiffc failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("add_grad"), "stdout: {stdout}");
    assert!(stdout.contains("mul_grad"), "stdout: {stdout}");
}

#[test]
fn cli_reports_unregistered_kinds() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("forward.json");
    write_json(
        &input,
        &OpNode::leaf(OpDesc {
            kind: "bogus".to_string(),
            inputs: single_slot("X", &["a"]),
            outputs: single_slot("Out", &["b"]),
            attrs: AttrMap::new(),
        }),
    );

    let output = Command::new(env!("CARGO_BIN_EXE_skiffc"))
        .arg(&input)
        .output()
        .expect("spawn skiffc");

    assert!(!output.status.success(), "command unexpectedly succeeded");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no gradient recipe"),
        "stderr should mention the missing recipe; stderr: {stderr}"
    );
}
