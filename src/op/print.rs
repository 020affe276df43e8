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

use std::fmt::Write;

use crate::op::{AttrValue, BlockDesc, OpDesc, OpNode};

/// Format a descriptor into a stable, human-readable single line.
pub fn format_desc(desc: &OpDesc) -> String {
    let mut out = String::new();
    write_desc(desc, &mut out);
    out
}

/// Format an operator tree into a stable, human-readable string.
pub fn format_node(node: &OpNode) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out);
    out
}

/// Format a flat block, one descriptor per line.
pub fn format_block(block: &BlockDesc) -> String {
    let mut out = String::new();
    writeln!(&mut out, "block {{").expect("write to string cannot fail");
    for desc in &block.ops {
        out.push_str("  ");
        write_desc(desc, &mut out);
        out.push('\n');
    }
    writeln!(&mut out, "}}").expect("write to string cannot fail");
    out
}

fn write_desc(desc: &OpDesc, out: &mut String) {
    out.push_str(&desc.kind);
    out.push('(');
    write_slots(&desc.inputs, out);
    out.push_str(") -> (");
    write_slots(&desc.outputs, out);
    out.push(')');
    if !desc.attrs.is_empty() {
        out.push_str(" {");
        for (i, (key, value)) in desc.attrs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(out, "{key}=").expect("write to string cannot fail");
            write_attr(value, out);
        }
        out.push('}');
    }
}

fn write_slots(slots: &crate::op::VarNameMap, out: &mut String) {
    for (i, (slot, vars)) in slots.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{slot}: [{}]", vars.join(", ")).expect("write to string cannot fail");
    }
}

fn write_attr(value: &AttrValue, out: &mut String) {
    match value {
        AttrValue::Bool(v) => write!(out, "{v}"),
        AttrValue::Int(v) => write!(out, "{v}"),
        AttrValue::Float(v) => write!(out, "{v}"),
        AttrValue::Str(v) => write!(out, "{v:?}"),
        AttrValue::Bools(v) => write!(out, "{v:?}"),
        AttrValue::Ints(v) => write!(out, "{v:?}"),
        AttrValue::Floats(v) => write!(out, "{v:?}"),
        AttrValue::Strs(v) => write!(out, "{v:?}"),
    }
    .expect("write to string cannot fail")
}

fn write_node(node: &OpNode, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match node {
        OpNode::Leaf { desc, step_net } => {
            out.push_str(&pad);
            write_desc(desc, out);
            if let Some(step) = step_net {
                out.push_str(" step {\n");
                write_node(step, indent + 1, out);
                out.push_str(&pad);
                out.push_str("}\n");
            } else {
                out.push('\n');
            }
        }
        OpNode::Net { kind, ops } if ops.is_empty() => {
            writeln!(out, "{pad}net {kind} {{}}").expect("write to string cannot fail");
        }
        OpNode::Net { kind, ops } => {
            writeln!(out, "{pad}net {kind} {{").expect("write to string cannot fail");
            for op in ops {
                write_node(op, indent + 1, out);
            }
            writeln!(out, "{pad}}}").expect("write to string cannot fail");
        }
    }
}
