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

//! Reusable bundles of registrations.

use crate::error::Result;
use crate::Architecture;

/// A bundle of registrations installed in one call, e.g. an audio module
/// that registers its model, its system and its platform utility together.
pub trait ArchitectureModule {
    /// Name used to detect double installation; defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Registers the module's components.
    ///
    /// # Errors
    ///
    /// Any registration error raised while installing.
    fn install(&self, architecture: &Architecture) -> Result<()>;
}
