// Copyright 2023 drey7925
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
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const FILENAME: &str = "settings.ron";

/// Server settings, read from `settings.ron` in the data directory. Missing fields take their
/// defaults.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// How many chunks in each direction a player can see (Chebyshev radius).
    pub view_radius: i32,
    /// Commands each shard can have queued before senders wait.
    pub shard_queue_depth: usize,
    /// Events each player can have queued before shards wait.
    pub player_queue_depth: usize,
    /// How long a shard waits on a full player queue before dropping the event.
    pub player_event_timeout_ms: u64,
    pub tick_interval_ms: u64,
    /// Chunks nobody is using are written back and dropped after this long.
    pub chunk_idle_eviction_secs: u64,
    /// Where new players appear. Should be just above the ground.
    pub spawn_location: (f64, f64, f64),
    /// If non-empty, only these players may log in.
    pub allowed_players: Vec<String>,
    pub banned_players: Vec<String>,
    pub max_players: usize,
    /// Surface height of the flat map generator.
    pub ground_height: u8,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            view_radius: 4,
            shard_queue_depth: 256,
            player_queue_depth: 256,
            player_event_timeout_ms: 2000,
            tick_interval_ms: 50,
            chunk_idle_eviction_secs: 60,
            spawn_location: (0.5, 64.0, 0.5),
            allowed_players: Vec::new(),
            banned_players: Vec::new(),
            max_players: 64,
            ground_height: 64,
        }
    }
}

pub fn load(data_dir: &Path) -> Result<ServerSettings> {
    let config_file = data_dir.join(FILENAME);
    log::info!("Loading settings from {}", config_file.display());
    if !config_file.exists() {
        log::info!("No settings found; using defaults");
        return Ok(Default::default());
    }
    let config = ron::from_str::<ServerSettings>(&std::fs::read_to_string(&config_file)?)
        .with_context(|| format!("Parsing {}", config_file.display()))?;
    log::info!("Loaded settings from {}", config_file.display());
    Ok(config)
}
