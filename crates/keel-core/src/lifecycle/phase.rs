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

use std::fmt;

/// The ordered stages an [`Architecture`](crate::Architecture) moves through.
///
/// Transitions only move forward. `Destroying` may be entered from any
/// earlier phase so a runtime whose bring-up failed can still be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LifecyclePhase {
    /// Registration is open.
    #[default]
    Created,
    /// The registry is frozen and components are being initialized.
    Initializing,
    /// Every component is initialized; the runtime serves requests.
    Ready,
    /// Components are being destroyed in reverse order.
    Destroying,
    /// Terminal phase; the registry has been released.
    Destroyed,
}

impl LifecyclePhase {
    /// Returns `true` if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Ready)
                | (Created | Initializing | Ready, Destroying)
                | (Destroying, Destroyed)
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Created => "created",
            LifecyclePhase::Initializing => "initializing",
            LifecyclePhase::Ready => "ready",
            LifecyclePhase::Destroying => "destroying",
            LifecyclePhase::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
