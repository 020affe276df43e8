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

//! The no-grad propagator: decides per forward node whether gradient
//! synthesis is needed at all, and rewrites suppressed gradient names on the
//! synthesized descriptors. The no-grad set only ever grows within one
//! backward run, and its growth is order-independent.

use std::collections::BTreeSet;

use crate::op::names::{grad_name, strip_grad, zero_name, EMPTY_VAR_NAME, FILL_ZEROS_LIKE_KIND};
use crate::op::{AttrMap, OpDesc, VarNameMap};

pub(super) enum Decision {
    /// The node contributes nothing to the backward graph.
    Skip,
    /// Gradient descriptors must be synthesized for the node.
    Synthesize,
}

/// The three-way no-grad rule over one forward node's flattened name lists.
///
/// When every output gradient is suppressed, no gradient can reach the
/// node's inputs either, so their gradient names are inserted into the set
/// before skipping.
pub(super) fn decide(
    inputs: &[&str],
    outputs: &[&str],
    no_grad: &mut BTreeSet<String>,
) -> Decision {
    if inputs.iter().all(|name| no_grad.contains(&grad_name(name))) {
        return Decision::Skip;
    }
    if outputs.iter().all(|name| no_grad.contains(&grad_name(name))) {
        for name in inputs {
            no_grad.insert(grad_name(name));
        }
        return Decision::Skip;
    }
    Decision::Synthesize
}

/// Rewrite suppressed gradient names on freshly synthesized descriptors.
///
/// Suppressed gradient inputs are renamed to the zero alias of their forward
/// name, backed by a returned `fill_zeros_like` descriptor that the caller
/// prepends to the sequence. Suppressed gradient outputs are renamed to the
/// empty sentinel and thereby discarded downstream. The two rewrites are
/// per-side: an input occurrence and an output occurrence of the same name
/// are rewritten independently.
pub(super) fn rewrite_suppressed(
    grad_descs: &mut [OpDesc],
    no_grad: &BTreeSet<String>,
) -> Vec<OpDesc> {
    let mut fills = Vec::new();
    for desc in grad_descs.iter_mut() {
        for name in suppressed(desc.input_names(), no_grad) {
            // The set only ever holds @GRAD-suffixed names.
            let Some(forward_name) = strip_grad(&name).map(str::to_string) else {
                continue;
            };
            let zero = zero_name(&forward_name);
            desc.rename_input(&name, &zero);
            fills.push(OpDesc {
                kind: FILL_ZEROS_LIKE_KIND.to_string(),
                inputs: VarNameMap::from([("X".to_string(), vec![forward_name])]),
                outputs: VarNameMap::from([("Y".to_string(), vec![zero])]),
                attrs: AttrMap::new(),
            });
        }
        for name in suppressed(desc.output_names(), no_grad) {
            desc.rename_output(&name, EMPTY_VAR_NAME);
        }
    }
    fills
}

/// The distinct names from `names` present in the no-grad set, sorted.
fn suppressed<'a>(
    names: impl Iterator<Item = &'a str>,
    no_grad: &BTreeSet<String>,
) -> Vec<String> {
    names
        .filter(|name| no_grad.contains(*name))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn all_input_grads_suppressed_skips() {
        let mut no_grad = set(&["a@GRAD", "b@GRAD"]);
        assert!(matches!(
            decide(&["a", "b"], &["c"], &mut no_grad),
            Decision::Skip
        ));
        assert_eq!(no_grad.len(), 2);
    }

    #[test]
    fn all_output_grads_suppressed_skips_and_grows_set() {
        let mut no_grad = set(&["c@GRAD"]);
        assert!(matches!(
            decide(&["a", "b"], &["c"], &mut no_grad),
            Decision::Skip
        ));
        assert!(no_grad.contains("a@GRAD"));
        assert!(no_grad.contains("b@GRAD"));
    }

    #[test]
    fn partial_suppression_synthesizes() {
        let mut no_grad = set(&["a@GRAD"]);
        assert!(matches!(
            decide(&["a", "b"], &["c"], &mut no_grad),
            Decision::Synthesize
        ));
    }

    #[test]
    fn suppressed_input_gets_zero_alias_and_fill() {
        let mut descs = vec![OpDesc {
            kind: "mul_grad".to_string(),
            inputs: VarNameMap::from([("Out@GRAD".to_string(), vec!["c@GRAD".to_string()])]),
            outputs: VarNameMap::from([("X@GRAD".to_string(), vec!["a@GRAD".to_string()])]),
            attrs: AttrMap::new(),
        }];
        let fills = rewrite_suppressed(&mut descs, &set(&["c@GRAD"]));

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].kind, FILL_ZEROS_LIKE_KIND);
        assert_eq!(fills[0].input("X"), Some(&["c".to_string()][..]));
        assert_eq!(fills[0].output("Y"), Some(&["c@ZERO".to_string()][..]));
        assert_eq!(
            descs[0].input("Out@GRAD"),
            Some(&["c@ZERO".to_string()][..])
        );
    }

    #[test]
    fn suppressed_output_becomes_empty() {
        let mut descs = vec![OpDesc {
            kind: "mul_grad".to_string(),
            inputs: VarNameMap::new(),
            outputs: VarNameMap::from([("X@GRAD".to_string(), vec!["a@GRAD".to_string()])]),
            attrs: AttrMap::new(),
        }];
        let fills = rewrite_suppressed(&mut descs, &set(&["a@GRAD"]));

        assert!(fills.is_empty());
        assert_eq!(
            descs[0].output("X@GRAD"),
            Some(&[EMPTY_VAR_NAME.to_string()][..])
        );
    }
}
