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

//! Routing for commands, queries and events.
//!
//! Commands and queries are self-executing: the request value carries its
//! own logic and receives the [`Architecture`](crate::Architecture) as its
//! context when dispatched, so no separate handler table exists. Events go
//! through the [`EventBus`], which maps an event type to its subscribers.

mod event;
mod request;

pub use self::event::{Event, EventBus, EventHandler, Subscription, SubscriptionGuard};
pub use self::request::{AsyncCommand, AsyncQuery, Command, Query};
