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

use super::key::{CapabilityKey, InstanceId};
use std::any::Any;
use std::sync::Arc;

/// Deferred constructor stored by factory registrations.
pub(crate) type Producer<K> = Arc<dyn Fn() -> Arc<K> + Send + Sync>;

/// How an entry claims its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStrategy {
    /// The entry is the only one allowed under its key.
    Exclusive,
    /// The key may hold several entries, one per distinct instance.
    Plural,
    /// The entry constructs a fresh instance on every resolution.
    Factory,
}

/// One binding of a value under a capability key.
///
/// The payload is an `Arc<K>` for shared instances and a producer returning
/// `Arc<K>` for factories, both erased behind `Any` so entries of every key
/// live in one map.
#[derive(Clone)]
pub struct RegistrationEntry {
    key: CapabilityKey,
    strategy: RegistrationStrategy,
    instance: Option<InstanceId>,
    value: Arc<dyn Any + Send + Sync>,
}

impl RegistrationEntry {
    pub(crate) fn shared<K: ?Sized + Send + Sync + 'static>(
        instance: Arc<K>,
        strategy: RegistrationStrategy,
    ) -> Self {
        Self {
            key: CapabilityKey::of::<K>(),
            strategy,
            instance: Some(InstanceId::of(&instance)),
            value: Arc::new(instance),
        }
    }

    pub(crate) fn factory<K: ?Sized + Send + Sync + 'static>(producer: Producer<K>) -> Self {
        Self {
            key: CapabilityKey::of::<K>(),
            strategy: RegistrationStrategy::Factory,
            instance: None,
            value: Arc::new(producer),
        }
    }

    /// The key this entry is registered under.
    #[must_use]
    pub fn key(&self) -> CapabilityKey {
        self.key
    }

    /// The strategy the entry was registered with.
    #[must_use]
    pub fn strategy(&self) -> RegistrationStrategy {
        self.strategy
    }

    /// Identity of the shared instance; `None` for factories.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Produces the value as `Arc<K>`, invoking the producer for factories.
    pub(crate) fn resolve<K: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<K>> {
        match self.strategy {
            RegistrationStrategy::Factory => self
                .value
                .downcast_ref::<Producer<K>>()
                .map(|produce| produce()),
            RegistrationStrategy::Exclusive | RegistrationStrategy::Plural => {
                self.value.downcast_ref::<Arc<K>>().cloned()
            }
        }
    }
}
