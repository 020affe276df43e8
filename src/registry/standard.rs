// Copyright 2025 SKIFF Authors.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the SKIFF project (Symbolic Kernel-free Intermediate Form for Frameworks).

//! The curated table of built-in gradient recipes.
//!
//! Most kinds use [`default_grad`]: the gradient operator reads the forward
//! inputs plus the gradients of the forward outputs, and writes the gradients
//! of the forward inputs. Activation kinds reference the forward output
//! instead of the inputs, which is all their derivative needs. Keep the kind
//! list ordering stable so CLI output and documentation stay deterministic.

use crate::backward::BackwardError;
use crate::op::names::{grad_name, GRAD_VAR_SUFFIX};
use crate::op::{OpDesc, VarNameMap};

use super::GradRegistry;

/// Kinds covered by the standard recipe table.
pub const STANDARD_OP_KINDS: &[&str] =
    &["add", "sub", "mul", "matmul", "relu", "tanh", "recurrent"];

pub(super) fn register_all(registry: &mut GradRegistry) {
    registry.register("add", default_grad);
    registry.register("sub", default_grad);
    registry.register("mul", default_grad);
    registry.register("matmul", |desc| {
        desc.required_input("X")?;
        desc.required_input("Y")?;
        desc.required_output("Out")?;
        default_grad(desc)
    });
    registry.register("relu", output_grad);
    registry.register("tanh", output_grad);
    // The builder installs the gradient step-net after the descriptor is made.
    registry.register("recurrent", default_grad);
}

/// The default gradient scheme: `<kind>_grad` reading the forward inputs and
/// the output gradients, writing the input gradients.
pub fn default_grad(desc: &OpDesc) -> Result<Vec<OpDesc>, BackwardError> {
    let mut inputs = desc.inputs.clone();
    for (slot, vars) in &desc.outputs {
        inputs.insert(grad_slot(slot), grad_names(vars));
    }
    Ok(vec![OpDesc {
        kind: format!("{}_grad", desc.kind),
        inputs,
        outputs: grad_outputs(desc),
        attrs: desc.attrs.clone(),
    }])
}

/// Gradient scheme for activations: the derivative is a function of the
/// forward output alone, so the forward inputs are not captured.
pub fn output_grad(desc: &OpDesc) -> Result<Vec<OpDesc>, BackwardError> {
    let mut inputs = VarNameMap::new();
    for (slot, vars) in &desc.outputs {
        inputs.insert(slot.clone(), vars.clone());
        inputs.insert(grad_slot(slot), grad_names(vars));
    }
    Ok(vec![OpDesc {
        kind: format!("{}_grad", desc.kind),
        inputs,
        outputs: grad_outputs(desc),
        attrs: desc.attrs.clone(),
    }])
}

fn grad_outputs(desc: &OpDesc) -> VarNameMap {
    let mut outputs = VarNameMap::new();
    for (slot, vars) in &desc.inputs {
        outputs.insert(grad_slot(slot), grad_names(vars));
    }
    outputs
}

fn grad_names(vars: &[String]) -> Vec<String> {
    vars.iter().map(|v| grad_name(v)).collect()
}

fn grad_slot(slot: &str) -> String {
    format!("{slot}{GRAD_VAR_SUFFIX}")
}
