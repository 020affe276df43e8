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

//! Naming rules shared by the whole gradient machinery.
//!
//! Backward synthesis never invents structure out of thin air: every variable
//! name it emits is derived from a forward name through the pure functions in
//! this module, or is one of the fixed sentinels below. Changing any constant
//! here is a breaking change for every gradient recipe registered elsewhere.

/// Suffix appended to a forward variable name to form its gradient name.
pub const GRAD_VAR_SUFFIX: &str = "@GRAD";

/// Suffix appended to a forward variable name to form its zero-filled alias.
pub const ZERO_VAR_SUFFIX: &str = "@ZERO";

/// Sentinel denoting "no variable here"; gradient machinery treats it as a
/// no-op placeholder.
pub const EMPTY_VAR_NAME: &str = "@EMPTY@";

/// Infix used when disambiguating multiple writers of the same gradient
/// variable. Never appears in user-provided names.
pub const RENAME_INFIX: &str = "@RENAME@";

/// Kind of the operator filling a variable with zeros shaped like another.
pub const FILL_ZEROS_LIKE_KIND: &str = "fill_zeros_like";

/// Kind of the operator summing rename aliases back into one gradient.
pub const ACCUMULATE_KIND: &str = "accumulate";

/// Kind marking the canonical composite that does nothing.
pub const NOP_KIND: &str = "@NOP@";

/// Kind marking a synthesized backward composite.
pub const GENERATED_BACKWARD_KIND: &str = "@generated-backward@";

/// Kind of the recurrent forward operator, which owns a step-net.
pub const RECURRENT_KIND: &str = "recurrent";

/// Kind of the recurrent gradient operator; its step-net is installed by the
/// backward builder.
pub const RECURRENT_GRAD_KIND: &str = "recurrent_grad";

/// The gradient name of a forward variable.
pub fn grad_name(name: &str) -> String {
    format!("{name}{GRAD_VAR_SUFFIX}")
}

/// The zero-filled alias of a forward variable.
pub fn zero_name(name: &str) -> String {
    format!("{name}{ZERO_VAR_SUFFIX}")
}

/// Whether `name` is the gradient form of some forward name.
pub fn is_grad_name(name: &str) -> bool {
    name.ends_with(GRAD_VAR_SUFFIX)
}

/// The forward name a gradient name was derived from, or `None` when `name`
/// does not carry the gradient suffix.
pub fn strip_grad(name: &str) -> Option<&str> {
    name.strip_suffix(GRAD_VAR_SUFFIX)
}

/// Alias assigned to writer `offset` of a duplicated gradient variable inside
/// the composite scope identified by `uid`.
pub fn rename_alias(name: &str, uid: u64, offset: usize) -> String {
    format!("{name}{RENAME_INFIX}{uid}@{offset}")
}

/// Alias assigned to writer `offset` of a duplicated gradient variable in the
/// flat single-block variant, where only one scope exists.
pub fn flat_rename_alias(name: &str, offset: usize) -> String {
    format!("{name}{RENAME_INFIX}{offset}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grad_round_trip() {
        assert_eq!(grad_name("w"), "w@GRAD");
        assert_eq!(strip_grad("w@GRAD"), Some("w"));
        assert_eq!(strip_grad("w"), None);
        assert!(is_grad_name("w@GRAD"));
        assert!(!is_grad_name("w@ZERO"));
    }

    #[test]
    fn aliases_carry_scope_and_offset() {
        assert_eq!(rename_alias("y@GRAD", 3, 1), "y@GRAD@RENAME@3@1");
        assert_eq!(flat_rename_alias("y@GRAD", 2), "y@GRAD@RENAME@2");
    }
}
