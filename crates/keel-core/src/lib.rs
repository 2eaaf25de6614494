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

//! # Keel Core
//!
//! Application runtime for games: a capability-keyed service registry,
//! a component lifecycle driven by an orchestrator, and command, query and
//! event dispatch bound to one [`Architecture`] instance.

#![warn(missing_docs)]

pub mod architecture;
pub mod component;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod module;
pub mod registry;

pub use architecture::{Architecture, ArchitectureId};
pub use component::{AsComponent, Component, ComponentRole, LifecycleMode, Model, System, Utility};
pub use config::{ArchitectureConfig, EventFailurePolicy, SystemOrder};
pub use dispatch::{
    AsyncCommand, AsyncQuery, Command, Event, EventBus, EventHandler, Query, Subscription,
    SubscriptionGuard,
};
pub use error::{ArchitectureError, Result};
pub use lifecycle::{LifecycleHook, LifecyclePhase};
pub use module::ArchitectureModule;
pub use registry::{Capabilities, CapabilityKey, FrozenRegistry, Resolver, ServiceRegistry};
