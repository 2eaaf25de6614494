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

//! A type-indexed, multi-valued service registry with a freeze gate.
//!
//! Bring-up code writes into a mutable [`ServiceRegistry`]. Freezing it
//! produces a [`FrozenRegistry`]: an immutable, `Arc`-shared snapshot that
//! can be read from any thread without locking. Both representations expose
//! the same read API through the [`Resolver`] trait.

mod capabilities;
mod entry;
mod frozen;
mod key;

pub use self::capabilities::Capabilities;
pub use self::entry::{RegistrationEntry, RegistrationStrategy};
pub use self::frozen::FrozenRegistry;
pub use self::key::{CapabilityKey, InstanceId};

use self::entry::Producer;
use crate::error::{ArchitectureError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Read access shared by the mutable and the frozen registry.
///
/// Implementors only provide raw entry access; every lookup is derived from
/// it so both representations resolve identically.
pub trait Resolver {
    /// All entries registered under `key`, in registration order.
    fn entries(&self, key: &CapabilityKey) -> &[RegistrationEntry];

    /// Every entry of every key.
    fn all_entries(&self) -> Box<dyn Iterator<Item = &RegistrationEntry> + '_>;

    /// Returns the first entry registered under `K`, if any.
    fn get<K: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<K>> {
        self.entries(&CapabilityKey::of::<K>())
            .first()
            .and_then(RegistrationEntry::resolve::<K>)
    }

    /// Returns the single entry registered under `K`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::NotRegistered`] when `K` has no entry and
    /// [`ArchitectureError::AmbiguousRegistration`] when it has several.
    fn get_required<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<K>> {
        let key = CapabilityKey::of::<K>();
        match self.entries(&key) {
            [] => Err(ArchitectureError::NotRegistered { key: key.name() }),
            [entry] => entry
                .resolve::<K>()
                .ok_or(ArchitectureError::NotRegistered { key: key.name() }),
            many => Err(ArchitectureError::AmbiguousRegistration {
                key: key.name(),
                count: many.len(),
            }),
        }
    }

    /// Returns every entry registered under `K` in registration order.
    fn get_all<K: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<K>> {
        self.entries(&CapabilityKey::of::<K>())
            .iter()
            .filter_map(RegistrationEntry::resolve::<K>)
            .collect()
    }

    /// Returns every entry registered under `K`, sorted by `compare`.
    ///
    /// The sort is stable: entries that compare equal keep registration order.
    fn get_all_sorted<K, F>(&self, mut compare: F) -> Vec<Arc<K>>
    where
        K: ?Sized + Send + Sync + 'static,
        F: FnMut(&Arc<K>, &Arc<K>) -> Ordering,
    {
        let mut all = self.get_all::<K>();
        all.sort_by(|a, b| compare(a, b));
        all
    }

    /// Returns `true` if at least one entry is registered under `K`.
    fn contains<K: ?Sized + 'static>(&self) -> bool {
        !self.entries(&CapabilityKey::of::<K>()).is_empty()
    }

    /// Returns `true` if `instance` is registered under any key.
    fn contains_instance<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
        let id = InstanceId::of(instance);
        self.all_entries()
            .any(|entry| entry.instance_id() == Some(id))
    }
}

/// Storage shared by both registry representations.
#[derive(Clone, Default)]
pub(crate) struct RegistryMap {
    entries: HashMap<CapabilityKey, Vec<RegistrationEntry>>,
}

impl RegistryMap {
    pub(crate) fn entries(&self, key: &CapabilityKey) -> &[RegistrationEntry] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RegistrationEntry> {
        self.entries.values().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Checks that `candidate` may join the entries already under its key.
    fn admit(&self, candidate: &RegistrationEntry) -> Result<()> {
        let key = candidate.key();
        let existing = self.entries(&key);
        let conflict = match candidate.strategy() {
            RegistrationStrategy::Exclusive => !existing.is_empty(),
            RegistrationStrategy::Plural | RegistrationStrategy::Factory => {
                existing.iter().any(|entry| {
                    entry.strategy() == RegistrationStrategy::Exclusive
                        || (candidate.instance_id().is_some()
                            && entry.instance_id() == candidate.instance_id())
                })
            }
        };
        if conflict {
            return Err(ArchitectureError::DuplicateRegistration { key: key.name() });
        }
        Ok(())
    }

    fn insert(&mut self, entry: RegistrationEntry) {
        self.entries.entry(entry.key()).or_default().push(entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The mutable registry used during bring-up.
///
/// # Example
///
/// ```rust
/// use keel_core::registry::{Resolver, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct AudioSettings { volume: f32 }
///
/// let mut registry = ServiceRegistry::new();
/// registry.register_exclusive(Arc::new(AudioSettings { volume: 0.8 })).unwrap();
///
/// let frozen = registry.freeze();
/// assert!(registry.register_exclusive(Arc::new(AudioSettings { volume: 0.1 })).is_err());
/// assert_eq!(frozen.get_required::<AudioSettings>().unwrap().volume, 0.8);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    map: RegistryMap,
    frozen: bool,
}

impl ServiceRegistry {
    /// Creates an empty, unfrozen registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RegistryMap::default(),
            frozen: false,
        }
    }

    /// Registers `instance` as the only entry under `K`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::RegistryFrozen`] after [`freeze`](Self::freeze),
    /// [`ArchitectureError::DuplicateRegistration`] if `K` already has an entry.
    pub fn register_exclusive<K>(&mut self, instance: Arc<K>) -> Result<()>
    where
        K: ?Sized + Send + Sync + 'static,
    {
        let entry = RegistrationEntry::shared(instance, RegistrationStrategy::Exclusive);
        self.ensure_open(entry.key())?;
        self.map.admit(&entry)?;
        log::debug!("Registry: {} registered (exclusive)", entry.key());
        self.map.insert(entry);
        Ok(())
    }

    /// Registers one instance under every key listed in `capabilities`.
    ///
    /// The registration is all-or-nothing: every key is validated before any
    /// entry is inserted, so a rejected call leaves the registry unchanged.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::RegistryFrozen`] after [`freeze`](Self::freeze),
    /// [`ArchitectureError::DuplicateRegistration`] if the instance is already
    /// registered under one of the keys, or a key is claimed exclusively;
    /// [`ArchitectureError::CapabilityMismatch`] if a capability cast returned
    /// another instance.
    pub fn register_plural<T>(&mut self, capabilities: Capabilities<T>) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_open(CapabilityKey::of::<T>())?;
        let (instance, bindings) = capabilities.into_parts();
        let identity = InstanceId::of(&instance);
        for binding in &bindings {
            if binding.instance_id() != Some(identity) {
                return Err(ArchitectureError::CapabilityMismatch {
                    key: binding.key().name(),
                });
            }
            self.map.admit(binding)?;
        }

        log::debug!(
            "Registry: {} registered under {} key(s)",
            CapabilityKey::of::<T>(),
            bindings.len()
        );
        for binding in bindings {
            self.map.insert(binding);
        }
        Ok(instance)
    }

    /// Registers a producer invoked on every resolution of `K`.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::RegistryFrozen`] after [`freeze`](Self::freeze),
    /// [`ArchitectureError::DuplicateRegistration`] if `K` is claimed exclusively.
    pub fn register_factory<K, F>(&mut self, producer: F) -> Result<()>
    where
        K: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<K> + Send + Sync + 'static,
    {
        let producer: Producer<K> = Arc::new(producer);
        let entry = RegistrationEntry::factory(producer);
        self.ensure_open(entry.key())?;
        self.map.admit(&entry)?;
        log::debug!("Registry: {} registered (factory)", entry.key());
        self.map.insert(entry);
        Ok(())
    }

    /// Freezes the registry and returns an immutable snapshot of it.
    ///
    /// Freezing is irreversible. Calling it again returns a fresh snapshot of
    /// the same, unchanged contents.
    pub fn freeze(&mut self) -> FrozenRegistry {
        if !self.frozen {
            log::debug!(
                "Registry: frozen with {} entries across {} keys",
                self.map.len(),
                self.map.key_count()
            );
        }
        self.frozen = true;
        FrozenRegistry::new(self.map.clone())
    }

    /// Returns `true` once [`freeze`](Self::freeze) has been called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// [`ArchitectureError::RegistryFrozen`] once frozen. Teardown releases a
    /// frozen registry through the owning architecture instead.
    pub fn clear(&mut self) -> Result<()> {
        if self.frozen {
            return Err(ArchitectureError::RegistryFrozen { key: "<clear>" });
        }
        self.map.clear();
        Ok(())
    }

    /// Drops every entry while keeping the registry frozen.
    pub(crate) fn release(&mut self) {
        self.frozen = true;
        self.map.clear();
    }

    /// Total number of entries, counting one per key an instance is bound to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    fn ensure_open(&self, key: CapabilityKey) -> Result<()> {
        if self.frozen {
            log::warn!("Registry: rejected registration of {key} after freeze");
            return Err(ArchitectureError::RegistryFrozen { key: key.name() });
        }
        Ok(())
    }
}

impl Resolver for ServiceRegistry {
    fn entries(&self, key: &CapabilityKey) -> &[RegistrationEntry] {
        self.map.entries(key)
    }

    fn all_entries(&self) -> Box<dyn Iterator<Item = &RegistrationEntry> + '_> {
        Box::new(self.map.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    trait Damage: Send + Sync {
        fn amount(&self) -> u32;
    }

    trait Prioritized: Send + Sync {
        fn priority(&self) -> i32;
    }

    #[derive(Debug)]
    struct Sword;

    impl Damage for Sword {
        fn amount(&self) -> u32 {
            12
        }
    }

    #[derive(Debug)]
    struct Bow;

    impl Damage for Bow {
        fn amount(&self) -> u32 {
            8
        }
    }

    struct Stage(i32);

    impl Prioritized for Stage {
        fn priority(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_exclusive_twice_is_duplicate() {
        let mut registry = ServiceRegistry::new();
        registry.register_exclusive(Arc::new(Sword)).unwrap();

        let err = registry.register_exclusive(Arc::new(Sword)).unwrap_err();
        assert!(matches!(err, ArchitectureError::DuplicateRegistration { key } if key.contains("Sword")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_exclusive_on_occupied_trait_key_is_duplicate() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_plural(Capabilities::new(Sword).with::<dyn Damage>(|s| s as Arc<dyn Damage>))
            .unwrap();

        let bow: Arc<dyn Damage> = Arc::new(Bow);
        assert!(matches!(
            registry.register_exclusive(bow),
            Err(ArchitectureError::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn test_plural_after_exclusive_claim_is_duplicate() {
        let mut registry = ServiceRegistry::new();
        let sword: Arc<dyn Damage> = Arc::new(Sword);
        registry.register_exclusive(sword).unwrap();

        let err = registry
            .register_plural(Capabilities::new(Bow).with::<dyn Damage>(|b| b as Arc<dyn Damage>))
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::DuplicateRegistration { .. }));
        // All-or-nothing: the concrete `Bow` key was not inserted either.
        assert!(!registry.contains::<Bow>());
    }

    #[test]
    fn test_every_registration_rejected_after_freeze() {
        let mut registry = ServiceRegistry::new();
        registry.register_exclusive(Arc::new(Sword)).unwrap();
        let _frozen = registry.freeze();
        assert!(registry.is_frozen());

        assert!(matches!(
            registry.register_exclusive(Arc::new(Bow)),
            Err(ArchitectureError::RegistryFrozen { .. })
        ));
        assert!(matches!(
            registry.register_plural(Capabilities::new(Bow)),
            Err(ArchitectureError::RegistryFrozen { .. })
        ));
        assert!(matches!(
            registry.register_factory::<Bow, _>(|| Arc::new(Bow)),
            Err(ArchitectureError::RegistryFrozen { .. })
        ));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains::<Sword>());
        assert!(!registry.contains::<Bow>());
    }

    #[test]
    fn test_plural_resolves_same_instance_under_every_key() {
        let mut registry = ServiceRegistry::new();
        let sword = registry
            .register_plural(Capabilities::new(Sword).with::<dyn Damage>(|s| s as Arc<dyn Damage>))
            .unwrap();

        let by_concrete = registry.get::<Sword>().unwrap();
        let by_trait = registry.get::<dyn Damage>().unwrap();
        assert!(Arc::ptr_eq(&sword, &by_concrete));
        assert_eq!(InstanceId::of(&by_trait), InstanceId::of(&sword));
        assert_eq!(by_trait.amount(), 12);
    }

    #[test]
    fn test_plural_same_instance_twice_is_duplicate() {
        let mut registry = ServiceRegistry::new();
        let sword = registry.register_plural(Capabilities::new(Sword)).unwrap();

        let err = registry
            .register_plural(Capabilities::of(sword).with::<dyn Damage>(|s| s as Arc<dyn Damage>))
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::DuplicateRegistration { .. }));
        assert!(!registry.contains::<dyn Damage>());
    }

    #[test]
    fn test_cast_to_another_instance_is_rejected() {
        let mut registry = ServiceRegistry::new();

        let err = registry
            .register_plural(
                Capabilities::new(Sword).with::<dyn Damage>(|_| Arc::new(Bow) as Arc<dyn Damage>),
            )
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::CapabilityMismatch { .. }));
        assert!(registry.is_empty(), "a rejected set must leave no entries behind");
    }

    #[test]
    fn test_plural_distinct_instances_share_a_key() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_plural(Capabilities::new(Sword).with::<dyn Damage>(|s| s as Arc<dyn Damage>))
            .unwrap();
        registry
            .register_plural(Capabilities::new(Bow).with::<dyn Damage>(|b| b as Arc<dyn Damage>))
            .unwrap();

        let amounts: Vec<u32> = registry.get_all::<dyn Damage>().iter().map(|d| d.amount()).collect();
        assert_eq!(amounts, vec![12, 8]);
        assert_eq!(registry.get::<dyn Damage>().unwrap().amount(), 12);
    }

    #[test]
    fn test_get_required_cardinality() {
        let mut registry = ServiceRegistry::new();
        assert!(matches!(
            registry.get_required::<dyn Damage>(),
            Err(ArchitectureError::NotRegistered { .. })
        ));

        registry
            .register_plural(Capabilities::new(Sword).with::<dyn Damage>(|s| s as Arc<dyn Damage>))
            .unwrap();
        assert_eq!(registry.get_required::<dyn Damage>().unwrap().amount(), 12);

        registry
            .register_plural(Capabilities::new(Bow).with::<dyn Damage>(|b| b as Arc<dyn Damage>))
            .unwrap();
        assert!(matches!(
            registry.get_required::<dyn Damage>(),
            Err(ArchitectureError::AmbiguousRegistration { count: 2, .. })
        ));
    }

    #[test]
    fn test_get_all_empty_is_not_an_error() {
        let registry = ServiceRegistry::new();
        assert!(registry.get_all::<dyn Damage>().is_empty());
        assert!(registry.get::<Sword>().is_none());
    }

    #[test]
    fn test_get_all_sorted_ignores_registration_order() {
        let mut registry = ServiceRegistry::new();
        for priority in [3, 1, 2] {
            registry
                .register_plural(
                    Capabilities::new(Stage(priority)).with::<dyn Prioritized>(|s| s as Arc<dyn Prioritized>),
                )
                .unwrap();
        }

        let sorted: Vec<i32> = registry
            .get_all_sorted::<dyn Prioritized, _>(|a, b| a.priority().cmp(&b.priority()))
            .iter()
            .map(|s| s.priority())
            .collect();
        assert_eq!(sorted, vec![1, 2, 3]);

        let unsorted: Vec<i32> = registry.get_all::<dyn Prioritized>().iter().map(|s| s.priority()).collect();
        assert_eq!(unsorted, vec![3, 1, 2]);
    }

    #[test]
    fn test_factory_constructs_per_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);

        let mut registry = ServiceRegistry::new();
        registry
            .register_factory::<dyn Damage, _>(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Arc::new(Bow) as Arc<dyn Damage>
            })
            .unwrap();
        assert_eq!(built.load(AtomicOrdering::SeqCst), 0);

        let first = registry.get::<dyn Damage>().unwrap();
        let second = registry.get_required::<dyn Damage>().unwrap();
        assert_eq!(built.load(AtomicOrdering::SeqCst), 2);
        assert_ne!(InstanceId::of(&first), InstanceId::of(&second));
        assert!(!registry.contains_instance(&first));
    }

    #[test]
    fn test_contains_instance_scans_by_identity() {
        let mut registry = ServiceRegistry::new();
        let sword = Arc::new(Sword);
        registry.register_exclusive(Arc::clone(&sword)).unwrap();

        assert!(registry.contains_instance(&sword));
        assert!(!registry.contains_instance(&Arc::new(Sword)));
    }

    #[test]
    fn test_clear_only_while_unfrozen() {
        let mut registry = ServiceRegistry::new();
        registry.register_exclusive(Arc::new(Sword)).unwrap();
        registry.clear().unwrap();
        assert!(registry.is_empty());

        registry.register_exclusive(Arc::new(Sword)).unwrap();
        let frozen = registry.freeze();
        assert!(matches!(registry.clear(), Err(ArchitectureError::RegistryFrozen { .. })));
        assert_eq!(registry.len(), 1);
        assert_eq!(frozen.len(), 1);
    }

    #[test]
    fn test_release_keeps_freeze_gate() {
        let mut registry = ServiceRegistry::new();
        registry.register_exclusive(Arc::new(Sword)).unwrap();
        registry.release();

        assert!(registry.is_empty());
        assert!(matches!(
            registry.register_exclusive(Arc::new(Sword)),
            Err(ArchitectureError::RegistryFrozen { .. })
        ));
    }
}
