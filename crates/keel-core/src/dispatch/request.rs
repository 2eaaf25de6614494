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

use crate::Architecture;
use async_trait::async_trait;

/// A self-executing request that may change state.
///
/// Use `Output = ()` for fire-and-forget commands.
pub trait Command: Send + Sized {
    /// The value produced by the command.
    type Output;

    /// Runs the command against the architecture it was sent to.
    fn execute(self, architecture: &Architecture) -> anyhow::Result<Self::Output>;
}

/// A self-executing, read-only request.
///
/// Queries must not change state. This is a convention the runtime does not
/// check.
pub trait Query: Send + Sized {
    /// The value produced by the query.
    type Output;

    /// Evaluates the query against the architecture it was sent to.
    fn evaluate(self, architecture: &Architecture) -> anyhow::Result<Self::Output>;
}

/// Asynchronous counterpart of [`Command`].
///
/// The runtime adds no timeout. A command that must be cancellable carries
/// its own cancellation signal and observes it while running.
#[async_trait]
pub trait AsyncCommand: Send + Sized {
    /// The value produced by the command.
    type Output: Send;

    /// Runs the command against the architecture it was sent to.
    async fn execute(self, architecture: &Architecture) -> anyhow::Result<Self::Output>;
}

/// Asynchronous counterpart of [`Query`].
#[async_trait]
pub trait AsyncQuery: Send + Sized {
    /// The value produced by the query.
    type Output: Send;

    /// Evaluates the query against the architecture it was sent to.
    async fn evaluate(self, architecture: &Architecture) -> anyhow::Result<Self::Output>;
}
