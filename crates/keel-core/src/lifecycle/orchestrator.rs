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

use crate::component::{Component, ComponentRole, LifecycleMode, Model, System, Utility};
use crate::config::SystemOrder;
use crate::error::{ArchitectureError, Result};
use crate::registry::{FrozenRegistry, InstanceId, Resolver};
use crate::Architecture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// A registered component together with the role it was found under.
#[derive(Clone)]
pub(crate) enum ComponentRef {
    Model(Arc<dyn Model>),
    System(Arc<dyn System>),
    Utility(Arc<dyn Utility>),
}

impl ComponentRef {
    pub(crate) fn role(&self) -> ComponentRole {
        match self {
            ComponentRef::Model(_) => ComponentRole::Model,
            ComponentRef::System(_) => ComponentRole::System,
            ComponentRef::Utility(_) => ComponentRole::Utility,
        }
    }

    pub(crate) fn component(&self) -> &dyn Component {
        match self {
            ComponentRef::Model(model) => model.as_component(),
            ComponentRef::System(system) => system.as_component(),
            ComponentRef::Utility(utility) => utility.as_component(),
        }
    }

    fn instance_id(&self) -> InstanceId {
        match self {
            ComponentRef::Model(model) => InstanceId::of(model),
            ComponentRef::System(system) => InstanceId::of(system),
            ComponentRef::Utility(utility) => InstanceId::of(utility),
        }
    }
}

/// Lists every system in the order the configuration asks for.
pub(crate) fn ordered_systems(registry: &FrozenRegistry, order: SystemOrder) -> Vec<Arc<dyn System>> {
    match order {
        SystemOrder::Registration => registry.get_all::<dyn System>(),
        SystemOrder::Priority => {
            registry.get_all_sorted::<dyn System, _>(|a, b| a.priority().cmp(&b.priority()))
        }
    }
}

/// Brings components online and takes them down again.
///
/// The orchestrator remembers the exact order in which components finished
/// initializing; teardown walks that record backwards.
#[derive(Default)]
pub(crate) struct Orchestrator {
    initialized: Mutex<Vec<ComponentRef>>,
}

impl Orchestrator {
    /// Initializes models, then systems, then utilities, one at a time.
    ///
    /// Stops at the first failure. Components initialized before the failure
    /// stay recorded so a later teardown still reaches them.
    pub(crate) async fn bring_up(
        &self,
        architecture: &Architecture,
        registry: &FrozenRegistry,
        order: SystemOrder,
    ) -> Result<usize> {
        let models = registry
            .get_all::<dyn Model>()
            .into_iter()
            .map(ComponentRef::Model);
        let systems = ordered_systems(registry, order)
            .into_iter()
            .map(ComponentRef::System);
        let utilities = registry
            .get_all::<dyn Utility>()
            .into_iter()
            .map(ComponentRef::Utility);
        let plan: Vec<ComponentRef> = models.chain(systems).chain(utilities).collect();

        let mut seen = HashSet::with_capacity(plan.len());
        let mut count = 0;
        for component in plan {
            if !seen.insert(component.instance_id()) {
                log::warn!(
                    "[{}] {} is registered under several roles; initializing it once as a {}",
                    architecture.name(),
                    component.component().name(),
                    self.first_role_of(&component).unwrap_or(component.role())
                );
                continue;
            }
            self.initialize_one(architecture, component).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn initialize_one(&self, architecture: &Architecture, component: ComponentRef) -> Result<()> {
        let role = component.role();
        let target = component.component();
        let name = target.name();
        let mode = target.lifecycle_mode();
        let started = Instant::now();

        let outcome = match mode {
            LifecycleMode::Passive => Ok(()),
            LifecycleMode::Sync => target.init(architecture),
            LifecycleMode::Async => target.init_async(architecture).await,
        };

        if let Err(source) = outcome {
            log::error!(
                "[{}] {role} {name} failed to initialize: {source:#}",
                architecture.name()
            );
            return Err(ArchitectureError::ComponentInitFailed {
                component: name,
                role,
                source,
            });
        }

        log::debug!(
            "[{}] {role} {name} initialized ({mode:?}) in {:?}",
            architecture.name(),
            started.elapsed()
        );
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(component);
        Ok(())
    }

    /// Destroys every initialized component in reverse initialization order.
    ///
    /// Failures are logged and do not stop the walk. Returns the number of
    /// components whose teardown failed.
    pub(crate) async fn tear_down(&self, architecture: &Architecture) -> usize {
        let components = std::mem::take(
            &mut *self
                .initialized
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut failures = 0;
        for component in components.iter().rev() {
            let role = component.role();
            let target = component.component();
            let outcome = match target.lifecycle_mode() {
                LifecycleMode::Passive => Ok(()),
                LifecycleMode::Sync => target.destroy(architecture),
                LifecycleMode::Async => target.destroy_async(architecture).await,
            };
            match outcome {
                Ok(()) => log::debug!("[{}] {role} {} destroyed", architecture.name(), target.name()),
                Err(e) => {
                    failures += 1;
                    log::error!(
                        "[{}] {role} {} failed to destroy: {e:#}",
                        architecture.name(),
                        target.name()
                    );
                }
            }
        }
        failures
    }

    /// Number of components currently recorded as initialized.
    pub(crate) fn initialized_count(&self) -> usize {
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn first_role_of(&self, component: &ComponentRef) -> Option<ComponentRole> {
        let id = component.instance_id();
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|existing| existing.instance_id() == id)
            .map(ComponentRef::role)
    }
}
