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

//! The lifecycle state machine and the orchestrator that walks registered
//! components through it.

mod hooks;
mod orchestrator;
mod phase;

pub use self::hooks::LifecycleHook;
pub use self::phase::LifecyclePhase;

pub(crate) use self::hooks::HookRegistry;
pub(crate) use self::orchestrator::{ordered_systems, Orchestrator};
