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

//! Defines the error taxonomy shared by the registry, the lifecycle
//! orchestrator and the dispatcher.

use crate::component::ComponentRole;
use crate::lifecycle::LifecyclePhase;
use thiserror::Error;

/// A convenient alias for results produced by the architecture runtime.
pub type Result<T, E = ArchitectureError> = std::result::Result<T, E>;

/// Every failure the architecture runtime itself can report.
///
/// Registration and resolution variants are contract violations raised by
/// bootstrap code. They name the offending capability key so the broken call
/// site can be found directly from the message.
#[derive(Debug, Error)]
pub enum ArchitectureError {
    /// The key is already claimed, either exclusively or by the same instance.
    #[error("capability `{key}` is already registered")]
    DuplicateRegistration {
        /// The capability key that was registered twice.
        key: &'static str,
    },

    /// A registration was attempted after the registry was frozen.
    #[error("the registry is frozen; cannot register `{key}`")]
    RegistryFrozen {
        /// The capability key of the rejected registration.
        key: &'static str,
    },

    /// A capability cast handed back a different instance than the one being
    /// registered.
    #[error("the cast for capability `{key}` returned a different instance")]
    CapabilityMismatch {
        /// The capability key whose cast was rejected.
        key: &'static str,
    },

    /// A required resolution found no entry.
    #[error("no registration found for `{key}`")]
    NotRegistered {
        /// The capability key that was looked up.
        key: &'static str,
    },

    /// A required resolution found more than one entry.
    #[error("`{key}` has {count} registrations but exactly one was required")]
    AmbiguousRegistration {
        /// The capability key that was looked up.
        key: &'static str,
        /// How many entries are registered under the key.
        count: usize,
    },

    /// A component initializer failed; bring-up was halted.
    #[error("{role} `{component}` failed to initialize: {source}")]
    ComponentInitFailed {
        /// The type name of the failing component.
        component: &'static str,
        /// The role the component was registered under.
        role: ComponentRole,
        /// The error reported by the component.
        #[source]
        source: anyhow::Error,
    },

    /// An event handler or a system update failed.
    #[error("handler for `{handler}` failed: {source}")]
    HandlerExecutionFailed {
        /// The event type or system that was being handled.
        handler: &'static str,
        /// The error reported by the handler.
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle operation was requested from a phase that does not allow it.
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// The phase the runtime was in.
        from: LifecyclePhase,
        /// The phase that was requested.
        to: LifecyclePhase,
    },

    /// A lifecycle hook was registered for a phase that has already fired.
    #[error("cannot hook {phase}: the runtime has already reached {current}")]
    PhaseAlreadyReached {
        /// The phase the hook targeted.
        phase: LifecyclePhase,
        /// The phase the runtime was in at registration time.
        current: LifecyclePhase,
    },

    /// An operation that needs a specific phase was called from another one.
    #[error("operation requires the {expected} phase, but the runtime is {actual}")]
    PhaseMismatch {
        /// The phase the operation requires.
        expected: LifecyclePhase,
        /// The phase the runtime was in.
        actual: LifecyclePhase,
    },
}
