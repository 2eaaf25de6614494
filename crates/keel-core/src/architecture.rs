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

//! The [`Architecture`]: registry, lifecycle and dispatch behind one handle.

use crate::component::{Model, System, Utility};
use crate::config::ArchitectureConfig;
use crate::dispatch::{
    AsyncCommand, AsyncQuery, Command, Event, EventBus, EventHandler, Query, Subscription,
};
use crate::error::{ArchitectureError, Result};
use crate::lifecycle::{ordered_systems, HookRegistry, LifecycleHook, LifecyclePhase, Orchestrator};
use crate::module::ArchitectureModule;
use crate::registry::{
    Capabilities, CapabilityKey, FrozenRegistry, RegistrationEntry, Resolver, ServiceRegistry,
};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identity of one [`Architecture`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchitectureId(Uuid);

impl ArchitectureId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ArchitectureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle phase plus whether an `initialize` call is still walking
/// components. Both live under one lock so teardown can never start while
/// bring-up is in flight.
#[derive(Debug, Default)]
struct PhaseState {
    phase: LifecyclePhase,
    bringing_up: bool,
}

/// Clears the bring-up flag when `initialize` returns or its future is
/// dropped mid-walk.
struct BringUpGuard<'a> {
    state: &'a RwLock<PhaseState>,
}

impl Drop for BringUpGuard<'_> {
    fn drop(&mut self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .bringing_up = false;
    }
}

/// A read view over whichever registry representation is current.
enum RegistryView<'a> {
    Open(RwLockReadGuard<'a, ServiceRegistry>),
    Frozen(FrozenRegistry),
}

impl Resolver for RegistryView<'_> {
    fn entries(&self, key: &CapabilityKey) -> &[RegistrationEntry] {
        match self {
            RegistryView::Open(registry) => registry.entries(key),
            RegistryView::Frozen(registry) => registry.entries(key),
        }
    }

    fn all_entries(&self) -> Box<dyn Iterator<Item = &RegistrationEntry> + '_> {
        match self {
            RegistryView::Open(registry) => registry.all_entries(),
            RegistryView::Frozen(registry) => registry.all_entries(),
        }
    }
}

/// The application runtime of a game.
///
/// Bootstrap code registers models, systems and utilities, then calls
/// [`initialize`](Self::initialize). From then on the registry is frozen and
/// controllers talk to the runtime through commands, queries and events.
/// [`destroy`](Self::destroy) tears everything down in reverse order.
///
/// There is no global instance: every component, command and query receives
/// the architecture it belongs to as an explicit argument.
///
/// ```rust
/// use keel_core::{Architecture, Command, Component, Model};
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// #[derive(Default)]
/// struct CounterModel { value: AtomicU32 }
/// impl Component for CounterModel {}
/// impl Model for CounterModel {}
///
/// struct Increment;
/// impl Command for Increment {
///     type Output = u32;
///     fn execute(self, architecture: &Architecture) -> anyhow::Result<u32> {
///         let model = architecture.get_model::<CounterModel>()?;
///         Ok(model.value.fetch_add(1, Ordering::SeqCst) + 1)
///     }
/// }
///
/// let architecture = Architecture::default();
/// architecture.register_model(CounterModel::default()).unwrap();
/// architecture.initialize_blocking().unwrap();
///
/// assert_eq!(architecture.send_command(Increment).unwrap(), 1);
/// architecture.destroy_blocking().unwrap();
/// ```
pub struct Architecture {
    id: ArchitectureId,
    config: ArchitectureConfig,
    registry: RwLock<ServiceRegistry>,
    frozen: RwLock<Option<FrozenRegistry>>,
    state: RwLock<PhaseState>,
    hooks: HookRegistry,
    orchestrator: Orchestrator,
    events: EventBus,
    modules: Mutex<Vec<&'static str>>,
}

impl Architecture {
    /// Creates an architecture in the [`LifecyclePhase::Created`] phase.
    pub fn new(config: ArchitectureConfig) -> Self {
        let id = ArchitectureId::new();
        log::info!("[{}] Architecture created ({id})", config.name);
        Self {
            id,
            events: EventBus::new(config.event_failure_policy),
            config,
            registry: RwLock::new(ServiceRegistry::new()),
            frozen: RwLock::new(None),
            state: RwLock::new(PhaseState::default()),
            hooks: HookRegistry::default(),
            orchestrator: Orchestrator::default(),
            modules: Mutex::new(Vec::new()),
        }
    }

    /// The unique identity of this instance.
    pub fn id(&self) -> ArchitectureId {
        self.id
    }

    /// The configured name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> &ArchitectureConfig {
        &self.config
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.read_state().phase
    }

    /// The event bus used by [`send_event`](Self::send_event) and friends.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Registration -----------------------------------------------------

    /// Registers a system under its concrete type and `dyn System`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::DuplicateRegistration`] if a `T` is already
    /// registered, [`ArchitectureError::RegistryFrozen`] after initialization.
    pub fn register_system<T: System>(&self, system: T) -> Result<Arc<T>> {
        self.register_system_with(system, |capabilities| capabilities)
    }

    /// Registers a system and the extra capability keys added by `extend`.
    pub fn register_system_with<T: System>(
        &self,
        system: T,
        extend: impl FnOnce(Capabilities<T>) -> Capabilities<T>,
    ) -> Result<Arc<T>> {
        let capabilities = Capabilities::unique(Arc::new(system))
            .with::<dyn System>(|system| system as Arc<dyn System>);
        self.register_capabilities(extend(capabilities))
    }

    /// Registers a model under its concrete type and `dyn Model`.
    ///
    /// # Errors
    ///
    /// Same as [`register_system`](Self::register_system).
    pub fn register_model<T: Model>(&self, model: T) -> Result<Arc<T>> {
        self.register_model_with(model, |capabilities| capabilities)
    }

    /// Registers a model and the extra capability keys added by `extend`.
    pub fn register_model_with<T: Model>(
        &self,
        model: T,
        extend: impl FnOnce(Capabilities<T>) -> Capabilities<T>,
    ) -> Result<Arc<T>> {
        let capabilities = Capabilities::unique(Arc::new(model))
            .with::<dyn Model>(|model| model as Arc<dyn Model>);
        self.register_capabilities(extend(capabilities))
    }

    /// Registers a utility under its concrete type and `dyn Utility`.
    ///
    /// # Errors
    ///
    /// Same as [`register_system`](Self::register_system).
    pub fn register_utility<T: Utility>(&self, utility: T) -> Result<Arc<T>> {
        self.register_utility_with(utility, |capabilities| capabilities)
    }

    /// Registers a utility and the extra capability keys added by `extend`.
    ///
    /// This is how a utility is exposed behind an interface, so consumers
    /// resolve `dyn Storage` rather than a concrete backend.
    pub fn register_utility_with<T: Utility>(
        &self,
        utility: T,
        extend: impl FnOnce(Capabilities<T>) -> Capabilities<T>,
    ) -> Result<Arc<T>> {
        let capabilities = Capabilities::unique(Arc::new(utility))
            .with::<dyn Utility>(|utility| utility as Arc<dyn Utility>);
        self.register_capabilities(extend(capabilities))
    }

    /// Registers an instance under every key in `capabilities`.
    pub fn register_capabilities<T>(&self, capabilities: Capabilities<T>) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.write_registry().register_plural(capabilities)
    }

    /// Registers `instance` as the only entry under `K`.
    pub fn register_instance<K>(&self, instance: Arc<K>) -> Result<()>
    where
        K: ?Sized + Send + Sync + 'static,
    {
        self.write_registry().register_exclusive(instance)
    }

    /// Registers a producer invoked on every resolution of `K`.
    pub fn register_factory<K, F>(&self, producer: F) -> Result<()>
    where
        K: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<K> + Send + Sync + 'static,
    {
        self.write_registry().register_factory(producer)
    }

    /// Installs a module.
    ///
    /// The module counts as installed only once `install` succeeds, so a
    /// failed install may be retried. Registrations the module made before
    /// failing are kept; the registry has no rollback.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::RegistryFrozen`] after initialization,
    /// [`ArchitectureError::DuplicateRegistration`] if a module with the same
    /// name is already installed, or any error raised by the module.
    pub fn install_module<M: ArchitectureModule>(&self, module: M) -> Result<()> {
        let name = module.name();
        if self.read_registry().is_frozen() {
            return Err(ArchitectureError::RegistryFrozen { key: name });
        }
        if self.installed(name) {
            return Err(ArchitectureError::DuplicateRegistration { key: name });
        }

        log::debug!("[{}] Installing module {name}", self.name());
        if let Err(e) = module.install(self) {
            log::warn!("[{}] Module {name} failed to install: {e}", self.name());
            return Err(e);
        }

        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if modules.contains(&name) {
            return Err(ArchitectureError::DuplicateRegistration { key: name });
        }
        modules.push(name);
        Ok(())
    }

    fn installed(&self, name: &'static str) -> bool {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&name)
    }

    /// Queues `hook` to run when the runtime enters `phase`.
    ///
    /// Safe to call from any thread: the phase check and the insertion happen
    /// under the same lock that phase transitions take, so an accepted hook
    /// always runs.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::PhaseAlreadyReached`] if `phase` is the current
    /// phase or an earlier one.
    pub fn register_lifecycle_hook<F>(&self, phase: LifecyclePhase, hook: F) -> Result<()>
    where
        F: Fn(&Architecture) + Send + Sync + 'static,
    {
        let state = self.read_state();
        self.hooks.register(phase, state.phase, Arc::new(hook))
    }

    // --- Resolution ---------------------------------------------------------

    /// Resolves a registered system by its concrete type.
    pub fn get_system<T: System>(&self) -> Result<Arc<T>> {
        self.resolve_required::<T>()
    }

    /// Resolves a registered model by its concrete type.
    pub fn get_model<T: Model>(&self) -> Result<Arc<T>> {
        self.resolve_required::<T>()
    }

    /// Resolves a registered utility by its concrete type.
    pub fn get_utility<T: Utility>(&self) -> Result<Arc<T>> {
        self.resolve_required::<T>()
    }

    /// Returns the first entry registered under `K`.
    pub fn resolve<K: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<K>> {
        self.view().get::<K>()
    }

    /// Returns the single entry registered under `K`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::NotRegistered`] or
    /// [`ArchitectureError::AmbiguousRegistration`].
    pub fn resolve_required<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<K>> {
        self.view().get_required::<K>()
    }

    /// Returns every entry registered under `K` in registration order.
    pub fn resolve_all<K: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<K>> {
        self.view().get_all::<K>()
    }

    /// Returns `true` if anything is registered under `K`.
    pub fn contains<K: ?Sized + 'static>(&self) -> bool {
        self.view().contains::<K>()
    }

    /// Returns `true` if `instance` is registered under any key.
    pub fn contains_instance<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
        self.view().contains_instance(instance)
    }

    /// The frozen registry, once [`initialize`](Self::initialize) has run.
    pub fn snapshot(&self) -> Option<FrozenRegistry> {
        self.frozen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // --- Lifecycle ----------------------------------------------------------

    /// Freezes the registry and initializes every component.
    ///
    /// Models come first, then systems (in the configured order), then
    /// utilities. Each component is fully initialized, awaiting async
    /// initializers, before the next one starts. `Ready` hooks run only
    /// after all of them completed.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::InvalidTransition`] unless the runtime is in
    /// [`LifecyclePhase::Created`]; [`ArchitectureError::ComponentInitFailed`]
    /// for the first failing component, in which case the runtime stays in
    /// [`LifecyclePhase::Initializing`] and can only be destroyed.
    ///
    /// [`destroy`](Self::destroy) is refused while this future is still
    /// running. Dropping the future mid-walk ends the bring-up; components
    /// that finished initializing are then torn down by `destroy`.
    pub async fn initialize(&self) -> Result<()> {
        let initializing_hooks = {
            let mut state = self.write_state();
            self.advance(&mut state, LifecyclePhase::Initializing)?;
            state.bringing_up = true;
            self.hooks.take(LifecyclePhase::Initializing)
        };
        let _bring_up = BringUpGuard { state: &self.state };
        let started = Instant::now();

        let snapshot = self.write_registry().freeze();
        *self.frozen.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        log::info!(
            "[{}] Initializing {} registry entries...",
            self.name(),
            snapshot.len()
        );
        HookRegistry::run(LifecyclePhase::Initializing, initializing_hooks, self);

        let outcome = self
            .orchestrator
            .bring_up(self, &snapshot, self.config.system_order)
            .await;

        let (count, ready_hooks) = {
            let mut state = self.write_state();
            state.bringing_up = false;
            let count = outcome?;
            self.advance(&mut state, LifecyclePhase::Ready)?;
            (count, self.hooks.take(LifecyclePhase::Ready))
        };
        log::info!(
            "[{}] Ready: {count} component(s) initialized in {:?}",
            self.name(),
            started.elapsed()
        );
        HookRegistry::run(LifecyclePhase::Ready, ready_hooks, self);
        Ok(())
    }

    /// Blocking form of [`initialize`](Self::initialize).
    ///
    /// Drives the future on the current thread, so async initializers must
    /// not depend on a specific executor's reactor.
    pub fn initialize_blocking(&self) -> Result<()> {
        pollster::block_on(self.initialize())
    }

    /// Destroys every initialized component in reverse order and releases
    /// the registry.
    ///
    /// Teardown is best-effort: component failures are logged and the walk
    /// continues. Event subscriptions and queued events are dropped.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::InvalidTransition`] if the runtime is already
    /// destroying or destroyed, or if an [`initialize`](Self::initialize)
    /// call is still bringing components up.
    pub async fn destroy(&self) -> Result<()> {
        let destroying_hooks = self.transition(LifecyclePhase::Destroying)?;
        log::info!("[{}] Destroying...", self.name());
        HookRegistry::run(LifecyclePhase::Destroying, destroying_hooks, self);

        let failures = self.orchestrator.tear_down(self).await;
        if failures > 0 {
            log::warn!(
                "[{}] {failures} component(s) failed to destroy cleanly",
                self.name()
            );
        }

        self.events.clear();
        self.frozen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.write_registry().release();

        let destroyed_hooks = self.transition(LifecyclePhase::Destroyed)?;
        HookRegistry::run(LifecyclePhase::Destroyed, destroyed_hooks, self);
        self.hooks.clear();
        log::info!("[{}] Destroyed", self.name());
        Ok(())
    }

    /// Blocking form of [`destroy`](Self::destroy).
    pub fn destroy_blocking(&self) -> Result<()> {
        pollster::block_on(self.destroy())
    }

    /// Number of components that completed initialization and have not been
    /// destroyed yet.
    pub fn initialized_components(&self) -> usize {
        self.orchestrator.initialized_count()
    }

    /// Advances one frame: flushes deferred events, then updates every
    /// system in the configured order.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::PhaseMismatch`] unless the runtime is
    /// [`LifecyclePhase::Ready`]; the first event or system failure otherwise.
    pub fn tick(&self, delta: Duration) -> Result<()> {
        let phase = self.phase();
        if phase != LifecyclePhase::Ready {
            return Err(ArchitectureError::PhaseMismatch {
                expected: LifecyclePhase::Ready,
                actual: phase,
            });
        }

        self.events.flush()?;

        let Some(snapshot) = self.snapshot() else {
            return Ok(());
        };
        for system in ordered_systems(&snapshot, self.config.system_order) {
            system
                .update(self, delta)
                .map_err(|source| ArchitectureError::HandlerExecutionFailed {
                    handler: system.name(),
                    source,
                })?;
        }
        Ok(())
    }

    // --- Dispatch -----------------------------------------------------------

    /// Executes a command with this architecture as its context.
    ///
    /// Errors from the command are returned unchanged.
    pub fn send_command<C: Command>(&self, command: C) -> anyhow::Result<C::Output> {
        log::trace!("[{}] command {}", self.name(), std::any::type_name::<C>());
        command.execute(self)
    }

    /// Executes an asynchronous command with this architecture as its context.
    pub async fn send_command_async<C: AsyncCommand>(&self, command: C) -> anyhow::Result<C::Output> {
        log::trace!("[{}] async command {}", self.name(), std::any::type_name::<C>());
        command.execute(self).await
    }

    /// Evaluates a query with this architecture as its context.
    pub fn send_query<Q: Query>(&self, query: Q) -> anyhow::Result<Q::Output> {
        log::trace!("[{}] query {}", self.name(), std::any::type_name::<Q>());
        query.evaluate(self)
    }

    /// Evaluates an asynchronous query with this architecture as its context.
    pub async fn send_query_async<Q: AsyncQuery>(&self, query: Q) -> anyhow::Result<Q::Output> {
        log::trace!("[{}] async query {}", self.name(), std::any::type_name::<Q>());
        query.evaluate(self).await
    }

    /// Subscribes a closure to events of type `E`.
    pub fn register_event<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.register(handler)
    }

    /// Subscribes a shared handler to events of type `E`; see
    /// [`EventBus::register_handler`].
    pub fn register_event_handler<E: Event>(&self, handler: EventHandler<E>) -> Subscription {
        self.events.register_handler(handler)
    }

    /// Removes a shared handler. Returns `false` if it was not subscribed.
    pub fn unregister_event<E: Event>(&self, handler: &EventHandler<E>) -> bool {
        self.events.unregister_handler(handler)
    }

    /// Delivers `event` synchronously to every handler of `E`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::HandlerExecutionFailed`] according to the
    /// configured [`EventFailurePolicy`](crate::config::EventFailurePolicy).
    pub fn send_event<E: Event>(&self, event: E) -> Result<usize> {
        self.events.send(&event)
    }

    /// Queues `event` for delivery at the start of the next [`tick`](Self::tick).
    pub fn post_event<E: Event>(&self, event: E) {
        self.events.post(event);
    }

    // --- Internals ----------------------------------------------------------

    /// Moves to `next` and takes the hooks queued for it, atomically with
    /// respect to [`register_lifecycle_hook`](Self::register_lifecycle_hook).
    fn transition(&self, next: LifecyclePhase) -> Result<Vec<LifecycleHook>> {
        let mut state = self.write_state();
        self.advance(&mut state, next)?;
        Ok(self.hooks.take(next))
    }

    fn advance(&self, state: &mut PhaseState, next: LifecyclePhase) -> Result<()> {
        let from = state.phase;
        if state.bringing_up || !from.can_transition_to(next) {
            log::warn!(
                "[{}] Invalid transition {from} -> {next}{}",
                self.config.name,
                if state.bringing_up { " (bring-up in progress)" } else { "" }
            );
            return Err(ArchitectureError::InvalidTransition { from, to: next });
        }
        log::debug!("[{}] Phase {from} -> {next}", self.config.name);
        state.phase = next;
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PhaseState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PhaseState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> RegistryView<'_> {
        match self.snapshot() {
            Some(snapshot) => RegistryView::Frozen(snapshot),
            None => RegistryView::Open(self.read_registry()),
        }
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, ServiceRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ServiceRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::new(ArchitectureConfig::default())
    }
}

impl fmt::Debug for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Architecture")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
