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

//! Write-once registry mapping forward operator kinds to gradient recipes.
//!
//! Registration happens while the registry is exclusively borrowed; every
//! lookup afterwards goes through a shared borrow, so the write-once contract
//! is enforced by the borrow checker rather than by locking. The process-wide
//! default registry lives behind a [`std::sync::OnceLock`] and is initialized
//! at most once, before the first backward call that consults it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::backward::BackwardError;
use crate::op::OpDesc;

pub mod standard;

/// A recipe producing the gradient descriptor list for one forward leaf.
///
/// The returned descriptors may reference forward inputs, forward outputs,
/// and gradients of forward outputs; their outputs are gradients of forward
/// inputs. An empty list means the operator has no gradient at all.
pub type GradOpMaker = Box<dyn Fn(&OpDesc) -> Result<Vec<OpDesc>, BackwardError> + Send + Sync>;

/// Registry of gradient recipes keyed by forward operator kind.
#[derive(Default)]
pub struct GradRegistry {
    makers: BTreeMap<String, GradOpMaker>,
}

static GLOBAL: OnceLock<GradRegistry> = OnceLock::new();

impl GradRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the standard recipe table.
    pub fn with_standard_ops() -> Self {
        let mut registry = Self::new();
        standard::register_all(&mut registry);
        registry
    }

    /// Register the gradient recipe for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, maker: F)
    where
        F: Fn(&OpDesc) -> Result<Vec<OpDesc>, BackwardError> + Send + Sync + 'static,
    {
        self.makers.insert(kind.into(), Box::new(maker));
    }

    /// Whether a recipe is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.makers.contains_key(kind)
    }

    /// Registered kinds in lexicographic order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.makers.keys().map(String::as_str)
    }

    /// Produce the gradient descriptor list for one forward leaf descriptor.
    pub fn make_gradient(&self, desc: &OpDesc) -> Result<Vec<OpDesc>, BackwardError> {
        let maker = self
            .makers
            .get(&desc.kind)
            .ok_or_else(|| BackwardError::UnregisteredGradient {
                kind: desc.kind.clone(),
            })?;
        maker(desc)
    }

    /// The process-wide registry, lazily initialized with the standard table.
    pub fn global() -> &'static GradRegistry {
        GLOBAL.get_or_init(Self::with_standard_ops)
    }

    /// Install `registry` as the process-wide registry.
    ///
    /// Must happen before the first [`GradRegistry::global`] call; afterwards
    /// the already-installed registry is returned as the error value.
    pub fn install_global(registry: GradRegistry) -> Result<(), GradRegistry> {
        GLOBAL.set(registry)
    }
}

impl fmt::Debug for GradRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradRegistry")
            .field("kinds", &self.makers.keys().collect::<Vec<_>>())
            .finish()
    }
}
