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

//! Reference bootstrap: a small score-keeping game wired through keel.
//!
//! Usage: `keel-runtime [manifest.json]`, where the manifest looks like
//! `{ "architecture": { "name": "demo" }, "frames": 3 }`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use keel_core::{
    Architecture, ArchitectureConfig, ArchitectureModule, AsyncCommand, Command, Component, Event,
    LifecycleMode, LifecyclePhase, Model, Query, SubscriptionGuard, System, Utility,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RuntimeManifest {
    architecture: ArchitectureConfig,
    frames: u32,
}

impl Default for RuntimeManifest {
    fn default() -> Self {
        Self {
            architecture: ArchitectureConfig::named("keel-demo"),
            frames: 3,
        }
    }
}

impl RuntimeManifest {
    fn load(path: Option<String>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading manifest {path}"))?;
        serde_json::from_str(&json).with_context(|| format!("parsing manifest {path}"))
    }
}

// --- Models -------------------------------------------------------------------

#[derive(Default)]
struct ScoreModel {
    score: AtomicU32,
}

impl Component for ScoreModel {}
impl Model for ScoreModel {}

// --- Utilities ----------------------------------------------------------------

/// Persistence backend, resolved by interface.
trait Storage: Send + Sync {
    fn save(&self, key: &str, value: u32);
    fn load(&self, key: &str) -> Option<u32>;
}

#[derive(Default)]
struct MemoryStorage {
    values: Mutex<HashMap<String, u32>>,
}

impl Storage for MemoryStorage {
    fn save(&self, key: &str, value: u32) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn load(&self, key: &str) -> Option<u32> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

impl Component for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory-storage"
    }
}
impl Utility for MemoryStorage {}

// --- Events, commands, queries ------------------------------------------------

#[derive(Debug, Clone)]
struct ScoreChanged {
    score: u32,
}

impl Event for ScoreChanged {}

struct AddScore(u32);

impl Command for AddScore {
    type Output = u32;

    fn execute(self, architecture: &Architecture) -> Result<u32> {
        let model = architecture.get_model::<ScoreModel>()?;
        let score = model.score.fetch_add(self.0, Ordering::SeqCst) + self.0;
        architecture.post_event(ScoreChanged { score });
        Ok(score)
    }
}

struct HighScore;

impl Query for HighScore {
    type Output = u32;

    fn evaluate(self, architecture: &Architecture) -> Result<u32> {
        let stored = architecture
            .resolve_required::<dyn Storage>()?
            .load("high_score")
            .unwrap_or(0);
        let current = architecture
            .get_model::<ScoreModel>()?
            .score
            .load(Ordering::SeqCst);
        Ok(stored.max(current))
    }
}

struct SaveHighScore;

#[async_trait]
impl AsyncCommand for SaveHighScore {
    type Output = u32;

    async fn execute(self, architecture: &Architecture) -> Result<u32> {
        let best = architecture.send_query(HighScore)?;
        architecture
            .resolve_required::<dyn Storage>()?
            .save("high_score", best);
        Ok(best)
    }
}

// --- Systems ------------------------------------------------------------------

const MILESTONES: [(u32, &str); 3] = [(10, "warming up"), (25, "on a roll"), (50, "unstoppable")];

#[derive(Default)]
struct AchievementSystem {
    unlocked: Arc<Mutex<Vec<&'static str>>>,
    subscription: Mutex<Option<SubscriptionGuard>>,
}

#[async_trait]
impl Component for AchievementSystem {
    fn name(&self) -> &'static str {
        "achievements"
    }

    fn lifecycle_mode(&self) -> LifecycleMode {
        LifecycleMode::Async
    }

    async fn init_async(&self, architecture: &Architecture) -> Result<()> {
        let unlocked = Arc::clone(&self.unlocked);
        let guard = architecture
            .register_event(move |event: &ScoreChanged| {
                let mut unlocked = unlocked.lock().unwrap_or_else(PoisonError::into_inner);
                for (threshold, title) in MILESTONES {
                    if event.score >= threshold && !unlocked.contains(&title) {
                        log::info!("Achievement unlocked: {title} ({} points)", event.score);
                        unlocked.push(title);
                    }
                }
                Ok(())
            })
            .unregister_on_drop();
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(guard);
        Ok(())
    }

    async fn destroy_async(&self, _architecture: &Architecture) -> Result<()> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let unlocked = self.unlocked.lock().unwrap_or_else(PoisonError::into_inner);
        log::info!("{} achievement(s) unlocked this session", unlocked.len());
        Ok(())
    }
}

impl System for AchievementSystem {
    fn priority(&self) -> i32 {
        10
    }
}

/// Awards points every frame.
struct ScoringSystem {
    per_frame: u32,
}

impl Component for ScoringSystem {
    fn name(&self) -> &'static str {
        "scoring"
    }
}

impl System for ScoringSystem {
    fn update(&self, architecture: &Architecture, _delta: Duration) -> Result<()> {
        architecture.send_command(AddScore(self.per_frame))?;
        Ok(())
    }
}

struct GameModule;

impl ArchitectureModule for GameModule {
    fn name(&self) -> &'static str {
        "game"
    }

    fn install(&self, architecture: &Architecture) -> keel_core::Result<()> {
        architecture.register_model(ScoreModel::default())?;
        architecture.register_system(ScoringSystem { per_frame: 12 })?;
        architecture.register_system(AchievementSystem::default())?;
        architecture.register_utility_with(MemoryStorage::default(), |caps| {
            caps.with::<dyn Storage>(|storage| storage as Arc<dyn Storage>)
        })?;
        Ok(())
    }
}

/// Runs `frames` ticks, delivers the events the last frame posted and saves
/// the high score.
async fn play(architecture: &Architecture, frames: u32) -> Result<u32> {
    for _ in 0..frames {
        architecture.tick(FRAME)?;
    }
    // The last tick's events would otherwise be discarded by destroy.
    architecture.events().flush()?;
    architecture.send_command_async(SaveHighScore).await
}

#[tokio::main]
async fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let manifest = RuntimeManifest::load(std::env::args().nth(1))?;
    let architecture = Architecture::new(manifest.architecture);
    architecture.install_module(GameModule)?;
    architecture.register_lifecycle_hook(LifecyclePhase::Ready, |architecture| {
        log::info!("[{}] Game ready ({})", architecture.name(), architecture.id());
    })?;

    architecture.initialize().await?;

    let best = play(&architecture, manifest.frames).await?;
    log::info!("High score saved: {best}");

    architecture.destroy().await?;
    Ok(())
}
