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

use std::time::Duration;

use anyhow::{ensure, Result};
use cgmath::{vec3, Vector3};

use crate::settings::ServerSettings;

use super::blocks::BlockTypeManager;

/// Largest supported view radius. Keeps a player's subscription window within a 31x31 square.
pub const MAX_VIEW_RADIUS: i32 = 15;

/// Fixed rules and tunables for one world. Built once at startup and shared (by Arc) with the
/// shard manager and every shard; nothing in here changes while the server runs.
#[non_exhaustive]
pub struct GameBehaviors {
    pub view_radius: i32,
    pub shard_queue_depth: usize,
    pub player_queue_depth: usize,
    pub player_event_timeout: Duration,
    pub tick_interval: Duration,
    pub chunk_idle_eviction: Duration,
    pub spawn_location: Vector3<f64>,
    pub max_players: usize,
    pub allowed_players: Vec<String>,
    pub banned_players: Vec<String>,
    pub block_types: BlockTypeManager,
}
impl GameBehaviors {
    pub fn from_settings(settings: &ServerSettings, block_types: BlockTypeManager) -> Result<Self> {
        ensure!(
            (0..=MAX_VIEW_RADIUS).contains(&settings.view_radius),
            "view_radius must be between 0 and {MAX_VIEW_RADIUS}, got {}",
            settings.view_radius
        );
        ensure!(settings.shard_queue_depth > 0, "shard_queue_depth must be positive");
        ensure!(settings.player_queue_depth > 0, "player_queue_depth must be positive");
        ensure!(settings.tick_interval_ms > 0, "tick_interval_ms must be positive");
        let (x, y, z) = settings.spawn_location;
        ensure!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "spawn_location must be finite"
        );
        Ok(GameBehaviors {
            view_radius: settings.view_radius,
            shard_queue_depth: settings.shard_queue_depth,
            player_queue_depth: settings.player_queue_depth,
            player_event_timeout: Duration::from_millis(settings.player_event_timeout_ms),
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            chunk_idle_eviction: Duration::from_secs(settings.chunk_idle_eviction_secs),
            spawn_location: vec3(x, y, z),
            max_players: settings.max_players,
            allowed_players: settings.allowed_players.clone(),
            banned_players: settings.banned_players.clone(),
            block_types,
        })
    }

    /// Default settings with the standard block set.
    pub fn with_defaults() -> Result<Self> {
        Self::from_settings(&ServerSettings::default(), BlockTypeManager::with_defaults()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_settings() {
        let bad_radius = ServerSettings {
            view_radius: -1,
            ..Default::default()
        };
        assert!(GameBehaviors::from_settings(&bad_radius, BlockTypeManager::new()).is_err());
        let zero_queue = ServerSettings {
            shard_queue_depth: 0,
            ..Default::default()
        };
        assert!(GameBehaviors::from_settings(&zero_queue, BlockTypeManager::new()).is_err());
        let behaviors = GameBehaviors::with_defaults().unwrap();
        assert_eq!(behaviors.view_radius, 4);
        assert_eq!(behaviors.player_event_timeout, Duration::from_secs(2));
    }
}
