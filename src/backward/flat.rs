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

//! The flat single-block variant of backward synthesis.
//!
//! One layer of the system represents programs as a flat ordered list of
//! descriptors rather than a nested composite. The algorithm is the nested
//! one modulo output shape: gradient descriptors are appended to the block in
//! the order produced, duplicate writers are resolved in a single alias scope
//! (no uid infix), and accumulate operators are inserted at last-writer + 1
//! with insertions applied in descending position order.

use std::collections::{BTreeMap, BTreeSet};

use crate::op::names::flat_rename_alias;
use crate::op::{BlockDesc, OpDesc};
use crate::registry::GradRegistry;

use super::{
    duplicate_writer_insertions, no_grad, seed_no_grad_names, verify, BackwardError,
    BackwardOptions,
};

/// Append the backward descriptors of every operator in `block`, using the
/// process-wide registry and default options.
pub fn append_backward(
    block: &mut BlockDesc,
    no_grad_vars: &BTreeSet<String>,
) -> Result<(), BackwardError> {
    append_backward_with_options(block, no_grad_vars, &BackwardOptions::default())
}

/// Append the backward descriptors of every operator in `block` with explicit
/// options.
pub fn append_backward_with_options(
    block: &mut BlockDesc,
    no_grad_vars: &BTreeSet<String>,
    opts: &BackwardOptions<'_>,
) -> Result<(), BackwardError> {
    let mut no_grad_names = seed_no_grad_names(no_grad_vars);

    let mut grad_descs: Vec<OpDesc> = Vec::new();
    let mut dup_output_ops: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for desc in block.ops.iter().rev() {
        for grad_desc in grad_descs_for(opts.registry, desc, &mut no_grad_names)? {
            let grad_desc_idx = grad_descs.len();
            let mut seen = BTreeSet::new();
            for name in grad_desc.output_names() {
                if seen.insert(name.to_string()) {
                    dup_output_ops
                        .entry(name.to_string())
                        .or_default()
                        .push(grad_desc_idx);
                }
            }
            grad_descs.push(grad_desc);
        }
    }

    let insertions = duplicate_writer_insertions(
        &dup_output_ops,
        flat_rename_alias,
        |index, from, to| grad_descs[index].rename(from, to),
    );
    for (position, accumulate) in insertions {
        grad_descs.insert(position + 1, accumulate);
    }

    if opts.verify {
        verify::verify_appended(&block.ops, &grad_descs)?;
    }

    block.ops.extend(grad_descs);
    Ok(())
}

/// The gradient descriptors of one forward descriptor: empty when the
/// no-grad rule skips it, otherwise the recipe's output with zero-fill
/// descriptors prepended and suppressed names rewritten.
fn grad_descs_for(
    registry: &GradRegistry,
    desc: &OpDesc,
    no_grad_names: &mut BTreeSet<String>,
) -> Result<Vec<OpDesc>, BackwardError> {
    let inputs: Vec<&str> = desc.input_names().collect();
    let outputs: Vec<&str> = desc.output_names().collect();
    if matches!(
        no_grad::decide(&inputs, &outputs, no_grad_names),
        no_grad::Decision::Skip
    ) {
        return Ok(Vec::new());
    }

    let mut grads = registry.make_gradient(desc)?;
    let mut descs = no_grad::rewrite_suppressed(&mut grads, no_grad_names);
    descs.extend(grads);
    Ok(descs)
}
