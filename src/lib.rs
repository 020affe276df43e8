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

//! SKIFF graph core: backward-graph construction over operator descriptors.
//!
//! A forward program arrives as a tree of operator nodes: leaves carrying a
//! descriptor (kind, slot maps, attributes), composites carrying an ordered
//! child list. [`backward()`](backward::backward) walks that tree leaf-first
//! in reverse and emits the backward program of the same compositional shape.
//!
//! * **Operator model** ([`op`]): descriptors, nodes, flat blocks, and the
//!   naming convention tying forward names to their gradient forms.
//! * **Gradient registry** ([`registry`]): the write-once table mapping each
//!   forward kind to its gradient recipe, with a process-wide default.
//! * **Backward builder** ([`backward`]): the reverse traversal, no-grad
//!   propagation, zero-filling, and duplicate-writer accumulation, in both
//!   the nested and the flat single-block form.
//!
//! The transformation is a pure function: it executes no operators and
//! allocates no tensors. Synthesized graphs are verified structurally before
//! they are returned (configurable via [`BackwardOptions`]).
//!
//! # Stability
//!
//! The string constants in [`op::names`] are shared with every registered
//! gradient recipe; changing any of them is a breaking change. The textual
//! form produced by [`op::print`] is stable within a minor release.

pub mod backward;
pub mod op;
pub mod registry;

pub use backward::{
    append_backward, append_backward_with_options, backward, backward_with_options, BackwardError,
    BackwardOptions, BackwardProducts,
};
pub use op::names;
pub use op::{AttrMap, AttrValue, BlockDesc, OpDesc, OpNode, VarNameMap};
pub use registry::GradRegistry;
