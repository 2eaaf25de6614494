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

use super::LifecyclePhase;
use crate::error::{ArchitectureError, Result};
use crate::Architecture;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A callback fired once when the runtime enters a phase.
pub type LifecycleHook = Arc<dyn Fn(&Architecture) + Send + Sync>;

/// Hooks keyed by the phase they observe.
///
/// A phase fires at most once, so its hooks are drained when it does.
#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: Mutex<BTreeMap<LifecyclePhase, Vec<LifecycleHook>>>,
}

impl HookRegistry {
    /// Queues `hook` for `phase`.
    ///
    /// Hooks for a phase the runtime has already reached are rejected rather
    /// than silently never running.
    pub(crate) fn register(
        &self,
        phase: LifecyclePhase,
        current: LifecyclePhase,
        hook: LifecycleHook,
    ) -> Result<()> {
        if phase <= current {
            return Err(ArchitectureError::PhaseAlreadyReached { phase, current });
        }
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(phase)
            .or_default()
            .push(hook);
        Ok(())
    }

    /// Removes and returns every hook queued for `phase`, in registration
    /// order.
    ///
    /// Callers take the hooks while holding the phase lock that sealed the
    /// transition, so no registration can slip in between, and run them with
    /// [`run`](Self::run) once that lock is released.
    pub(crate) fn take(&self, phase: LifecyclePhase) -> Vec<LifecycleHook> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&phase)
            .unwrap_or_default()
    }

    /// Runs hooks previously taken for `phase`.
    ///
    /// No lock is held, so hooks may register hooks for later phases.
    pub(crate) fn run(phase: LifecyclePhase, hooks: Vec<LifecycleHook>, architecture: &Architecture) {
        if !hooks.is_empty() {
            log::debug!("Lifecycle: firing {} hook(s) for {phase}", hooks.len());
        }
        for hook in hooks {
            hook(architecture);
        }
    }

    pub(crate) fn clear(&self) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
