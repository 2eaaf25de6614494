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

//! Runtime configuration for an [`Architecture`](crate::Architecture).

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The order in which systems are initialized and updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemOrder {
    /// Registration order.
    Registration,
    /// Ascending [`System::priority`](crate::component::System::priority);
    /// ties keep registration order.
    #[default]
    Priority,
}

/// What the event bus does when a handler returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFailurePolicy {
    /// Stop delivering the event and return the failure to the sender.
    #[default]
    Abort,
    /// Log the failure and keep delivering to the remaining handlers.
    Isolate,
}

/// Configuration of a single architecture instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureConfig {
    /// Label used in every log line emitted by this instance.
    pub name: String,
    /// Ordering applied to systems during bring-up and ticking.
    pub system_order: SystemOrder,
    /// Behavior of the event bus when a handler fails.
    pub event_failure_policy: EventFailurePolicy,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            name: "architecture".to_string(),
            system_order: SystemOrder::default(),
            event_failure_policy: EventFailurePolicy::default(),
        }
    }
}

impl ArchitectureConfig {
    /// Creates a default configuration with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        Ok(Self::from_json(&content)?)
    }
}
