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

//! Backward-graph construction.
//!
//! Given a forward operator tree, [`backward`] synthesizes the operator tree
//! computing gradients of the forward outputs with respect to the forward
//! inputs. The transformation walks the forward tree leaf-first in reverse,
//! consults the gradient registry for each leaf, suppresses or zero-fills
//! gradients named in the no-grad set, and resolves multiple writers of the
//! same gradient variable by renaming them to aliases summed by an inserted
//! `accumulate` operator.
//!
//! The transformation is a pure graph-to-graph function: it executes nothing,
//! allocates no tensors, and has no side effects until it returns. The flat
//! single-block variant lives in [`flat`].

use std::collections::{BTreeMap, BTreeSet};

use crate::op::names::{
    grad_name, rename_alias, ACCUMULATE_KIND, EMPTY_VAR_NAME, GENERATED_BACKWARD_KIND,
    RECURRENT_GRAD_KIND, RECURRENT_KIND,
};
use crate::op::{AttrMap, OpDesc, OpNode, VarNameMap};
use crate::registry::GradRegistry;

pub mod flat;
mod no_grad;
pub mod verify;

pub use flat::{append_backward, append_backward_with_options};

/// Errors surfaced by backward synthesis. All are fatal: the transformation
/// has no side effects until it returns, so abandoning it is safe.
#[derive(Debug, thiserror::Error)]
pub enum BackwardError {
    /// No gradient recipe is registered for a forward operator kind.
    #[error("no gradient recipe registered for operator kind '{kind}'")]
    UnregisteredGradient { kind: String },
    /// A descriptor is missing a slot the gradient machinery requires.
    #[error("malformed '{kind}' descriptor: missing slot '{slot}'")]
    MalformedDescriptor { kind: String, slot: String },
    /// Step-net recursion exceeded the configured guard, indicating a cyclic
    /// step-net in the forward graph.
    #[error("step-net recursion exceeded depth {max_depth} at: {}", .path.join(" -> "))]
    CyclicStepNet { max_depth: usize, path: Vec<String> },
    /// The synthesized graph failed post-construction verification.
    #[error("backward verification failed: {0}")]
    Verify(#[from] verify::VerifyError),
}

/// Options controlling backward synthesis.
#[derive(Debug, Clone, Copy)]
pub struct BackwardOptions<'r> {
    /// Registry consulted for gradient recipes.
    pub registry: &'r GradRegistry,
    /// When true, verify the synthesized graph against the forward graph
    /// before returning it.
    pub verify: bool,
    /// Recurrent step-net recursion guard: step-nets nested deeper than this
    /// report a cyclic step-net. Ordinary composite nesting is unbounded.
    pub max_depth: usize,
}

impl Default for BackwardOptions<'static> {
    fn default() -> Self {
        Self {
            registry: GradRegistry::global(),
            verify: true,
            max_depth: 64,
        }
    }
}

/// Result of one backward synthesis run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardProducts {
    /// The synthesized backward graph; a NOP composite when nothing in the
    /// forward graph needs a gradient.
    pub backward: OpNode,
    /// Post-state of the no-grad set: every gradient name the run determined
    /// will not be computed, already suffixed.
    pub no_grad_names: BTreeSet<String>,
}

/// Synthesize the backward graph of `forward` using the process-wide registry
/// and default options. `no_grad_vars` holds forward variable names whose
/// gradients must not be computed.
pub fn backward(
    forward: &OpNode,
    no_grad_vars: &BTreeSet<String>,
) -> Result<BackwardProducts, BackwardError> {
    backward_with_options(forward, no_grad_vars, &BackwardOptions::default())
}

/// Synthesize the backward graph of `forward` with explicit options.
pub fn backward_with_options(
    forward: &OpNode,
    no_grad_vars: &BTreeSet<String>,
    opts: &BackwardOptions<'_>,
) -> Result<BackwardProducts, BackwardError> {
    let mut no_grad_names = seed_no_grad_names(no_grad_vars);
    let mut builder = BackwardBuilder {
        registry: opts.registry,
        max_depth: opts.max_depth,
        next_uid: 0,
        step_path: Vec::new(),
    };
    let backward = builder.build_node(forward, &mut no_grad_names)?;
    if opts.verify {
        verify::verify_backward(forward, &backward)?;
    }
    Ok(BackwardProducts {
        backward,
        no_grad_names,
    })
}

/// The initial no-grad set: the gradient of the empty sentinel plus the
/// gradient of every user-listed forward variable.
pub(crate) fn seed_no_grad_names(no_grad_vars: &BTreeSet<String>) -> BTreeSet<String> {
    let mut no_grad_names = BTreeSet::new();
    no_grad_names.insert(grad_name(EMPTY_VAR_NAME));
    for name in no_grad_vars {
        no_grad_names.insert(grad_name(name));
    }
    no_grad_names
}

struct BackwardBuilder<'r> {
    registry: &'r GradRegistry,
    max_depth: usize,
    /// Counter for rename-alias scopes; unique within one backward run.
    next_uid: u64,
    /// Recurrent kinds on the current step-net recursion stack, reported on
    /// a depth overflow.
    step_path: Vec<String>,
}

impl BackwardBuilder<'_> {
    fn build_node(
        &mut self,
        forward: &OpNode,
        no_grad: &mut BTreeSet<String>,
    ) -> Result<OpNode, BackwardError> {
        if matches!(
            no_grad::decide(&forward.input_names(), &forward.output_names(), no_grad),
            no_grad::Decision::Skip
        ) {
            return Ok(OpNode::nop());
        }

        match forward {
            OpNode::Leaf { desc, step_net } => self.build_leaf(desc, step_net.as_deref(), no_grad),
            OpNode::Net { ops, .. } => self.build_net(ops, no_grad),
        }
    }

    /// Case A: one forward leaf. The registry recipe runs first, then the
    /// no-grad rewrites; zero-fill operators precede the gradient operators
    /// in the emitted sequence.
    fn build_leaf(
        &mut self,
        desc: &OpDesc,
        step_net: Option<&OpNode>,
        no_grad: &mut BTreeSet<String>,
    ) -> Result<OpNode, BackwardError> {
        let mut grad_descs = self.registry.make_gradient(desc)?;
        let fills = no_grad::rewrite_suppressed(&mut grad_descs, no_grad);

        // A recurrent gradient owns a step-net: the backward of the forward
        // step-net, synthesized with the same no-grad set and uid counter.
        // Only this recursion counts toward the cyclic guard.
        let mut grad_step_net = None;
        if desc.kind == RECURRENT_KIND {
            let step = step_net.ok_or_else(|| BackwardError::MalformedDescriptor {
                kind: desc.kind.clone(),
                slot: "step_net".to_string(),
            })?;
            if self.step_path.len() >= self.max_depth {
                return Err(BackwardError::CyclicStepNet {
                    max_depth: self.max_depth,
                    path: self.step_path.clone(),
                });
            }
            self.step_path.push(desc.kind.clone());
            let step_backward = self.build_node(step, no_grad);
            self.step_path.pop();
            grad_step_net = Some(Box::new(step_backward?));
        }

        let mut ops: Vec<OpNode> = fills.into_iter().map(OpNode::leaf).collect();
        for grad_desc in grad_descs {
            if grad_desc.kind == RECURRENT_GRAD_KIND && grad_step_net.is_some() {
                ops.push(OpNode::Leaf {
                    desc: grad_desc,
                    step_net: grad_step_net.take(),
                });
            } else {
                ops.push(OpNode::leaf(grad_desc));
            }
        }

        if ops.is_empty() {
            return Ok(OpNode::nop());
        }
        if ops.len() == 1 {
            return Ok(ops.remove(0));
        }
        let mut net = OpNode::net(GENERATED_BACKWARD_KIND);
        for op in ops {
            net.append_op(op);
        }
        Ok(net)
    }

    /// Case B: a composite. Children are traversed in reverse; duplicated
    /// gradient outputs are renamed per writer and summed by an inserted
    /// `accumulate` operator directly after the last writer.
    fn build_net(
        &mut self,
        children: &[OpNode],
        no_grad: &mut BTreeSet<String>,
    ) -> Result<OpNode, BackwardError> {
        let uid = self.next_uid;
        self.next_uid += 1;

        let mut backward_ops: Vec<OpNode> = Vec::with_capacity(children.len());
        let mut dup_output_ops: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for forward_child in children.iter().rev() {
            let bwd = self.build_node(forward_child, no_grad)?;
            let local_op_id = backward_ops.len();
            {
                let mut seen = BTreeSet::new();
                for name in bwd.output_names() {
                    if seen.insert(name) {
                        dup_output_ops
                            .entry(name.to_string())
                            .or_default()
                            .push(local_op_id);
                    }
                }
            }
            backward_ops.push(bwd);
        }

        let insertions = duplicate_writer_insertions(
            &dup_output_ops,
            |name, offset| rename_alias(name, uid, offset),
            |index, from, to| backward_ops[index].rename(from, to),
        );

        let mut net = OpNode::net(GENERATED_BACKWARD_KIND);
        for bwd in backward_ops {
            net.append_op(bwd);
        }
        for (position, accumulate) in insertions {
            net.insert_op(position + 1, OpNode::leaf(accumulate));
        }
        Ok(net)
    }
}

/// Shared duplicate-writer resolution for the nested and flat variants.
///
/// Every writer of a duplicated name is renamed to a fresh alias, and one
/// `accumulate` descriptor per name is scheduled at last-writer + 1. The
/// returned insertions are sorted by position descending so that applying
/// them in order never shifts a pending position.
fn duplicate_writer_insertions(
    dup_output_ops: &BTreeMap<String, Vec<usize>>,
    mut alias_for: impl FnMut(&str, usize) -> String,
    mut rename_at: impl FnMut(usize, &str, &str),
) -> Vec<(usize, OpDesc)> {
    let mut insertions: Vec<(usize, OpDesc)> = Vec::new();
    for (name, writers) in dup_output_ops {
        // Multiple suppressed outputs are not a conflict.
        if name == EMPTY_VAR_NAME || writers.len() < 2 {
            continue;
        }
        let mut aliases = Vec::with_capacity(writers.len());
        for (offset, &index) in writers.iter().enumerate() {
            let alias = alias_for(name, offset);
            rename_at(index, name, &alias);
            aliases.push(alias);
        }
        let accumulate = OpDesc {
            kind: ACCUMULATE_KIND.to_string(),
            inputs: VarNameMap::from([("X".to_string(), aliases)]),
            outputs: VarNameMap::from([("Out".to_string(), vec![name.clone()])]),
            attrs: AttrMap::new(),
        };
        insertions.push((writers[writers.len() - 1], accumulate));
    }
    insertions.sort_by(|a, b| b.0.cmp(&a.0));
    insertions
}
