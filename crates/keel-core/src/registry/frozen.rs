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

use super::entry::RegistrationEntry;
use super::key::CapabilityKey;
use super::{RegistryMap, Resolver};
use std::sync::Arc;

/// The immutable registry snapshot produced by
/// [`ServiceRegistry::freeze`](super::ServiceRegistry::freeze).
///
/// It has no write API at all, and clones share the same storage, so handing
/// a copy to a worker thread costs one reference-count increment.
#[derive(Clone, Default)]
pub struct FrozenRegistry {
    map: Arc<RegistryMap>,
}

impl FrozenRegistry {
    pub(crate) fn new(map: RegistryMap) -> Self {
        Self { map: Arc::new(map) }
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }
}

impl Resolver for FrozenRegistry {
    fn entries(&self, key: &CapabilityKey) -> &[RegistrationEntry] {
        self.map.entries(key)
    }

    fn all_entries(&self) -> Box<dyn Iterator<Item = &RegistrationEntry> + '_> {
        Box::new(self.map.iter())
    }
}
