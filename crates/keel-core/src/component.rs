// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Traits for the objects an [`Architecture`] brings online.
//!
//! Every registered object plays exactly one role: a [`Model`] holds state,
//! a [`System`] holds behavior and may tick every frame, a [`Utility`] wraps
//! an external collaborator (storage, audio, platform services). All three
//! share the [`Component`] lifecycle contract.

use crate::Architecture;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// How a component wants to be brought online and torn down.
///
/// Components declare this explicitly so the orchestrator never has to guess
/// which pair of methods to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleMode {
    /// No initialization or teardown work; treated as already initialized.
    #[default]
    Passive,
    /// [`Component::init`] and [`Component::destroy`] are called.
    Sync,
    /// [`Component::init_async`] and [`Component::destroy_async`] are awaited.
    Async,
}

/// The role a component was registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRole {
    /// A state holder.
    Model,
    /// A behavior holder.
    System,
    /// A wrapper around an external collaborator.
    Utility,
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentRole::Model => "model",
            ComponentRole::System => "system",
            ComponentRole::Utility => "utility",
        };
        f.write_str(name)
    }
}

/// Gives access to a role trait object as a plain `&dyn Component`.
///
/// Implemented for every [`Component`]; never implement it by hand.
pub trait AsComponent {
    /// Returns `self` as a component trait object.
    fn as_component(&self) -> &dyn Component;
}

impl<T: Component> AsComponent for T {
    fn as_component(&self) -> &dyn Component {
        self
    }
}

/// The lifecycle contract shared by models, systems and utilities.
///
/// Components are shared behind `Arc` once registered, so every method takes
/// `&self`; state that changes after construction lives behind interior
/// mutability (`Mutex`, `RwLock`, atomics).
#[async_trait]
pub trait Component: AsComponent + Send + Sync + 'static {
    /// A human readable name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Declares which initializer pair the orchestrator must use.
    fn lifecycle_mode(&self) -> LifecycleMode {
        LifecycleMode::Passive
    }

    /// Synchronous initializer, called when the mode is [`LifecycleMode::Sync`].
    fn init(&self, _architecture: &Architecture) -> anyhow::Result<()> {
        Ok(())
    }

    /// Synchronous teardown, called when the mode is [`LifecycleMode::Sync`].
    fn destroy(&self, _architecture: &Architecture) -> anyhow::Result<()> {
        Ok(())
    }

    /// Asynchronous initializer, awaited when the mode is [`LifecycleMode::Async`].
    async fn init_async(&self, _architecture: &Architecture) -> anyhow::Result<()> {
        Ok(())
    }

    /// Asynchronous teardown, awaited when the mode is [`LifecycleMode::Async`].
    async fn destroy_async(&self, _architecture: &Architecture) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A state holder. Models are initialized first.
pub trait Model: Component {}

/// A behavior holder. Systems are initialized after models and may resolve
/// models (and earlier systems) from their initializer.
pub trait System: Component {
    /// Ordering key; lower values initialize and update first.
    fn priority(&self) -> i32 {
        0
    }

    /// Per-frame update, driven by [`Architecture::tick`].
    fn update(&self, _architecture: &Architecture, _delta: Duration) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A wrapper around an external collaborator. Utilities are initialized last.
pub trait Utility: Component {}
