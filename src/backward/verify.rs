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

//! Structural verification of synthesized backward graphs.
//!
//! The verifier enforces the name-resolution invariant: every variable a
//! backward operator reads is the empty sentinel, was written by an earlier
//! backward operator, is a forward variable, or is the gradient of a forward
//! variable (fed from outside the graph). It returns structured errors
//! instead of panicking on a malformed graph.
//!
//! Step-net variables live in their own scope and are not checked against
//! the enclosing graph.

use std::collections::BTreeSet;

use crate::op::names::{grad_name, EMPTY_VAR_NAME};
use crate::op::{OpDesc, OpNode};

/// Structured errors returned by the backward verifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    /// An operator reads a name that nothing defines.
    #[error("operator '{op_kind}' reads '{name}', which no earlier operator produces and the forward graph does not define")]
    UndefinedInput { op_kind: String, name: String },
}

/// Verify a backward tree synthesized for `forward`.
pub fn verify_backward(forward: &OpNode, backward: &OpNode) -> Result<(), VerifyError> {
    let mut defined = BTreeSet::new();
    collect_forward_names(forward, &mut defined);
    check_node(backward, &mut defined)
}

/// Verify descriptors about to be appended to a flat block.
pub fn verify_appended(forward_ops: &[OpDesc], appended: &[OpDesc]) -> Result<(), VerifyError> {
    let mut defined = BTreeSet::new();
    for desc in forward_ops {
        collect_desc_names(desc, &mut defined);
    }
    for desc in appended {
        check_desc(desc, &mut defined)?;
    }
    Ok(())
}

fn collect_forward_names(node: &OpNode, defined: &mut BTreeSet<String>) {
    match node {
        OpNode::Leaf { desc, .. } => collect_desc_names(desc, defined),
        OpNode::Net { ops, .. } => {
            for op in ops {
                collect_forward_names(op, defined);
            }
        }
    }
}

fn collect_desc_names(desc: &OpDesc, defined: &mut BTreeSet<String>) {
    for name in desc.input_names().chain(desc.output_names()) {
        defined.insert(name.to_string());
        // Any forward variable's gradient may be fed from outside the graph.
        defined.insert(grad_name(name));
    }
}

fn check_node(node: &OpNode, defined: &mut BTreeSet<String>) -> Result<(), VerifyError> {
    match node {
        OpNode::Leaf { desc, .. } => check_desc(desc, defined),
        OpNode::Net { ops, .. } => {
            for op in ops {
                check_node(op, defined)?;
            }
            Ok(())
        }
    }
}

fn check_desc(desc: &OpDesc, defined: &mut BTreeSet<String>) -> Result<(), VerifyError> {
    for name in desc.input_names() {
        if name != EMPTY_VAR_NAME && !defined.contains(name) {
            return Err(VerifyError::UndefinedInput {
                op_kind: desc.kind.clone(),
                name: name.to_string(),
            });
        }
    }
    for name in desc.output_names() {
        if name != EMPTY_VAR_NAME {
            defined.insert(name.to_string());
        }
    }
    Ok(())
}
