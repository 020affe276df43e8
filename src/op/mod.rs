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

//! The operator data model manipulated by backward synthesis.
//!
//! A forward program is a tree of [`OpNode`]s: leaves carry an [`OpDesc`]
//! (kind, slot maps, attributes), composites carry an ordered child list.
//! The flat program form used by one layer of the system is a [`BlockDesc`],
//! a plain ordered list of descriptors. Both forms serialize to JSON so
//! graphs can be stored, diffed, and fed to the `skiffc` CLI.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backward::BackwardError;

pub mod names;
pub mod print;

/// Ordered mapping from slot name to the variable names bound to it.
pub type VarNameMap = BTreeMap<String, Vec<String>>;

/// Attribute values carried by an operator and passed through unchanged by
/// the backward transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bools(Vec<bool>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strs(Vec<String>),
}

/// Ordered attribute bag.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// One operator descriptor: the atom the backward transformation manipulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    /// Operator kind, e.g. `"add"`, `"matmul"`, `"recurrent"`.
    pub kind: String,
    /// Input slot maps.
    #[serde(default)]
    pub inputs: VarNameMap,
    /// Output slot maps.
    #[serde(default)]
    pub outputs: VarNameMap,
    /// Opaque attributes, forwarded unchanged onto gradient descriptors.
    #[serde(default)]
    pub attrs: AttrMap,
}

impl OpDesc {
    /// A descriptor with the given kind and empty slot maps.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            inputs: VarNameMap::new(),
            outputs: VarNameMap::new(),
            attrs: AttrMap::new(),
        }
    }

    /// The variable names bound to an input slot.
    pub fn input(&self, slot: &str) -> Option<&[String]> {
        self.inputs.get(slot).map(Vec::as_slice)
    }

    /// The variable names bound to an output slot.
    pub fn output(&self, slot: &str) -> Option<&[String]> {
        self.outputs.get(slot).map(Vec::as_slice)
    }

    /// The variable names bound to an input slot, or `MalformedDescriptor`
    /// when the descriptor does not carry it. Gradient recipes use this to
    /// validate the slots their derivative needs.
    pub fn required_input(&self, slot: &str) -> Result<&[String], BackwardError> {
        self.input(slot).ok_or_else(|| self.missing_slot(slot))
    }

    /// The variable names bound to an output slot, or `MalformedDescriptor`
    /// when the descriptor does not carry it.
    pub fn required_output(&self, slot: &str) -> Result<&[String], BackwardError> {
        self.output(slot).ok_or_else(|| self.missing_slot(slot))
    }

    fn missing_slot(&self, slot: &str) -> BackwardError {
        BackwardError::MalformedDescriptor {
            kind: self.kind.clone(),
            slot: slot.to_string(),
        }
    }

    /// All input variable names, flattened across slots in slot order.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().flatten().map(String::as_str)
    }

    /// All output variable names, flattened across slots in slot order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().flatten().map(String::as_str)
    }

    /// Rename every occurrence of `from` on the input side.
    pub fn rename_input(&mut self, from: &str, to: &str) {
        rename_in_map(&mut self.inputs, from, to);
    }

    /// Rename every occurrence of `from` on the output side.
    pub fn rename_output(&mut self, from: &str, to: &str) {
        rename_in_map(&mut self.outputs, from, to);
    }

    /// Rename every occurrence of `from` across both slot maps.
    pub fn rename(&mut self, from: &str, to: &str) {
        self.rename_input(from, to);
        self.rename_output(from, to);
    }
}

fn rename_in_map(map: &mut VarNameMap, from: &str, to: &str) {
    for vars in map.values_mut() {
        for var in vars.iter_mut() {
            if var == from {
                *var = to.to_string();
            }
        }
    }
}

/// A node of the operator tree: a single descriptor, or an ordered composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpNode {
    /// A single operator. `step_net` is present only on recurrent(-gradient)
    /// leaves, which own the sub-program executed per step.
    Leaf {
        desc: OpDesc,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_net: Option<Box<OpNode>>,
    },
    /// An ordered sequence of child nodes with a kind marker.
    Net { kind: String, ops: Vec<OpNode> },
}

impl OpNode {
    /// A leaf without a step-net.
    pub fn leaf(desc: OpDesc) -> Self {
        OpNode::Leaf {
            desc,
            step_net: None,
        }
    }

    /// A recurrent-style leaf owning `step_net`.
    pub fn recurrent_leaf(desc: OpDesc, step_net: OpNode) -> Self {
        OpNode::Leaf {
            desc,
            step_net: Some(Box::new(step_net)),
        }
    }

    /// An empty composite with the given kind marker.
    pub fn net(kind: impl Into<String>) -> Self {
        OpNode::Net {
            kind: kind.into(),
            ops: Vec::new(),
        }
    }

    /// The canonical do-nothing composite.
    pub fn nop() -> Self {
        OpNode::net(names::NOP_KIND)
    }

    /// The operator kind of a leaf, or the kind marker of a composite.
    pub fn kind(&self) -> &str {
        match self {
            OpNode::Leaf { desc, .. } => &desc.kind,
            OpNode::Net { kind, .. } => kind,
        }
    }

    pub fn is_net(&self) -> bool {
        matches!(self, OpNode::Net { .. })
    }

    pub fn is_nop(&self) -> bool {
        matches!(self, OpNode::Net { kind, .. } if kind == names::NOP_KIND)
    }

    /// Append a child operator to this composite.
    ///
    /// Panics when called on a leaf; only composites own children.
    pub fn append_op(&mut self, op: OpNode) {
        match self {
            OpNode::Net { ops, .. } => ops.push(op),
            OpNode::Leaf { .. } => panic!("append_op called on a leaf operator"),
        }
    }

    /// Insert a child operator at `index`, shifting later children right.
    ///
    /// Panics when called on a leaf or when `index` is out of bounds.
    pub fn insert_op(&mut self, index: usize, op: OpNode) {
        match self {
            OpNode::Net { ops, .. } => ops.insert(index, op),
            OpNode::Leaf { .. } => panic!("insert_op called on a leaf operator"),
        }
    }

    /// The step-net of a recurrent(-gradient) leaf.
    pub fn step_net(&self) -> Option<&OpNode> {
        match self {
            OpNode::Leaf { step_net, .. } => step_net.as_deref(),
            OpNode::Net { .. } => None,
        }
    }

    /// Every input variable name this node reads, in traversal order.
    ///
    /// Step-net variables live in their own scope and are not included.
    pub fn input_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out, false);
        out
    }

    /// Every output variable name this node writes, in traversal order.
    ///
    /// Step-net variables live in their own scope and are not included.
    pub fn output_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out, true);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>, outputs: bool) {
        match self {
            OpNode::Leaf { desc, .. } => {
                if outputs {
                    out.extend(desc.output_names());
                } else {
                    out.extend(desc.input_names());
                }
            }
            OpNode::Net { ops, .. } => {
                for op in ops {
                    op.collect_names(out, outputs);
                }
            }
        }
    }

    /// Rename every occurrence of `from` across this node's slot maps,
    /// recursively through composites. Step-nets are left untouched: their
    /// variables are scoped to the step program.
    pub fn rename(&mut self, from: &str, to: &str) {
        match self {
            OpNode::Leaf { desc, .. } => desc.rename(from, to),
            OpNode::Net { ops, .. } => {
                for op in ops {
                    op.rename(from, to);
                }
            }
        }
    }
}

/// The flat program form: an ordered list of descriptors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockDesc {
    pub ops: Vec<OpDesc>,
}

impl BlockDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_op(&mut self, desc: OpDesc) {
        self.ops.push(desc);
    }
}

impl fmt::Display for OpDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::format_desc(self))
    }
}

impl fmt::Display for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::format_node(self))
    }
}

impl fmt::Display for BlockDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::format_block(self))
    }
}
