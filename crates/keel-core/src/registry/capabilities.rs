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

//! Call-site enumeration of the capability keys an instance satisfies.

use super::entry::{RegistrationEntry, RegistrationStrategy};
use super::key::{CapabilityKey, InstanceId};
use std::sync::Arc;

/// The set of keys one instance is registered under.
///
/// Rust cannot discover at runtime which traits a value implements, so the
/// registration site lists them instead:
///
/// ```rust
/// use keel_core::registry::{Capabilities, Resolver, ServiceRegistry};
/// use std::sync::Arc;
///
/// trait Storage: Send + Sync {
///     fn load(&self, key: &str) -> Option<String>;
/// }
///
/// struct MemoryStorage;
///
/// impl Storage for MemoryStorage {
///     fn load(&self, _key: &str) -> Option<String> {
///         None
///     }
/// }
///
/// let mut registry = ServiceRegistry::new();
/// registry
///     .register_plural(
///         Capabilities::new(MemoryStorage).with::<dyn Storage>(|s| s as Arc<dyn Storage>),
///     )
///     .unwrap();
///
/// assert!(registry.get::<MemoryStorage>().is_some());
/// assert!(registry.get::<dyn Storage>().is_some());
/// ```
///
/// The concrete type is always the first key.
pub struct Capabilities<T: Send + Sync + 'static> {
    instance: Arc<T>,
    bindings: Vec<RegistrationEntry>,
}

impl<T: Send + Sync + 'static> Capabilities<T> {
    /// Starts a plural binding set for an already shared instance.
    pub fn of(instance: Arc<T>) -> Self {
        Self::with_strategy(instance, RegistrationStrategy::Plural)
    }

    /// Starts a binding set whose concrete type key is claimed exclusively.
    ///
    /// Role registrations use this so registering the same component type
    /// twice is rejected even though its role key stays plural.
    pub fn unique(instance: Arc<T>) -> Self {
        Self::with_strategy(instance, RegistrationStrategy::Exclusive)
    }

    /// Wraps `value` in an `Arc` and starts a plural binding set.
    pub fn new(value: T) -> Self {
        Self::of(Arc::new(value))
    }

    fn with_strategy(instance: Arc<T>, strategy: RegistrationStrategy) -> Self {
        let concrete = RegistrationEntry::shared(Arc::clone(&instance), strategy);
        Self {
            instance,
            bindings: vec![concrete],
        }
    }

    /// Adds the key `K`, using `cast` to view the instance as `Arc<K>`.
    ///
    /// `cast` is normally an unsizing coercion such as
    /// `|s| s as Arc<dyn Storage>`. A key listed twice is kept once. A cast
    /// that returns another instance is rejected at registration with
    /// [`ArchitectureError::CapabilityMismatch`](crate::error::ArchitectureError::CapabilityMismatch).
    #[must_use]
    pub fn with<K>(mut self, cast: impl FnOnce(Arc<T>) -> Arc<K>) -> Self
    where
        K: ?Sized + Send + Sync + 'static,
    {
        let key = CapabilityKey::of::<K>();
        if self.bindings.iter().any(|binding| binding.key() == key) {
            return self;
        }

        let view = cast(Arc::clone(&self.instance));
        self.bindings
            .push(RegistrationEntry::shared(view, RegistrationStrategy::Plural));
        self
    }

    /// The instance being registered.
    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    /// Identity of the instance being registered.
    pub fn instance_id(&self) -> InstanceId {
        InstanceId::of(&self.instance)
    }

    /// Every key in the set, concrete type first.
    pub fn keys(&self) -> impl Iterator<Item = CapabilityKey> + '_ {
        self.bindings.iter().map(RegistrationEntry::key)
    }

    pub(crate) fn into_parts(self) -> (Arc<T>, Vec<RegistrationEntry>) {
        (self.instance, self.bindings)
    }
}
