use skiff::names::grad_name;
use skiff::registry::standard::{default_grad, STANDARD_OP_KINDS};
use skiff::{AttrMap, AttrValue, BackwardError, GradRegistry, OpDesc, VarNameMap};

fn slots(entries: &[(&str, &[&str])]) -> VarNameMap {
    entries
        .iter()
        .map(|(slot, vars)| {
            (
                slot.to_string(),
                vars.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

fn desc(kind: &str, inputs: &[(&str, &[&str])], outputs: &[(&str, &[&str])]) -> OpDesc {
    OpDesc {
        kind: kind.to_string(),
        inputs: slots(inputs),
        outputs: slots(outputs),
        attrs: AttrMap::new(),
    }
}

fn vars(slot: Option<&[String]>) -> Vec<&str> {
    slot.unwrap_or(&[]).iter().map(String::as_str).collect()
}

#[test]
fn standard_table_covers_expected_kinds() {
    let registry = GradRegistry::with_standard_ops();
    for kind in STANDARD_OP_KINDS {
        assert!(registry.contains(kind), "missing standard recipe for {kind}");
    }
    assert!(!registry.contains("bogus"));
}

#[test]
fn default_scheme_reads_inputs_and_output_gradients() {
    let registry = GradRegistry::with_standard_ops();
    let forward = desc("mul", &[("X", &["a"]), ("Y", &["b"])], &[("Out", &["c"])]);

    let grads = registry.make_gradient(&forward).expect("make_gradient");
    assert_eq!(grads.len(), 1);
    let grad = &grads[0];

    assert_eq!(grad.kind, "mul_grad");
    assert_eq!(vars(grad.input("X")), ["a"]);
    assert_eq!(vars(grad.input("Y")), ["b"]);
    assert_eq!(vars(grad.input("Out@GRAD")), ["c@GRAD"]);
    assert_eq!(vars(grad.output("X@GRAD")), ["a@GRAD"]);
    assert_eq!(vars(grad.output("Y@GRAD")), ["b@GRAD"]);
}

#[test]
fn activation_scheme_reads_the_forward_output() {
    let registry = GradRegistry::with_standard_ops();
    let forward = desc("tanh", &[("X", &["x"])], &[("Out", &["y"])]);

    let grads = registry.make_gradient(&forward).expect("make_gradient");
    let grad = &grads[0];

    assert_eq!(grad.kind, "tanh_grad");
    // The derivative needs the activation output, not its input.
    assert_eq!(vars(grad.input("Out")), ["y"]);
    assert_eq!(vars(grad.input("Out@GRAD")), ["y@GRAD"]);
    assert!(grad.input("X").is_none());
    assert_eq!(vars(grad.output("X@GRAD")), ["x@GRAD"]);
}

#[test]
fn unregistered_kind_is_reported() {
    let registry = GradRegistry::with_standard_ops();
    let err = registry
        .make_gradient(&desc("bogus", &[], &[]))
        .unwrap_err();
    assert!(matches!(
        err,
        BackwardError::UnregisteredGradient { ref kind } if kind == "bogus"
    ));
}

#[test]
fn matmul_requires_its_slots() {
    let registry = GradRegistry::with_standard_ops();
    let missing_y = desc("matmul", &[("X", &["a"])], &[("Out", &["c"])]);

    let err = registry.make_gradient(&missing_y).unwrap_err();
    assert!(matches!(
        err,
        BackwardError::MalformedDescriptor { ref kind, ref slot } if kind == "matmul" && slot == "Y"
    ));
    assert!(format!("{err}").contains("missing slot 'Y'"));
}

#[test]
fn registration_replaces_previous_recipe() {
    let mut registry = GradRegistry::with_standard_ops();
    registry.register("mul", |fwd: &OpDesc| {
        let mut grad = OpDesc::new("custom_mul_grad");
        for (slot, names) in &fwd.inputs {
            grad.outputs.insert(
                format!("{slot}@GRAD"),
                names.iter().map(|n| grad_name(n)).collect(),
            );
        }
        Ok(vec![grad])
    });

    let grads = registry
        .make_gradient(&desc("mul", &[("X", &["a"])], &[("Out", &["c"])]))
        .expect("make_gradient");
    assert_eq!(grads[0].kind, "custom_mul_grad");
}

#[test]
fn attributes_pass_through_unchanged() {
    let mut forward = desc("add", &[("X", &["a"]), ("Y", &["b"])], &[("Out", &["c"])]);
    forward
        .attrs
        .insert("scale".to_string(), AttrValue::Float(0.5));

    let grads = default_grad(&forward).expect("default_grad");
    assert_eq!(grads[0].attrs.get("scale"), Some(&AttrValue::Float(0.5)));
}

#[test]
fn global_registry_serves_the_standard_table() {
    let registry = GradRegistry::global();
    assert!(registry.contains("mul"));
    assert!(registry.contains("recurrent"));
}
