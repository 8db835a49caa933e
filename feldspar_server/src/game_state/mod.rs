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

pub mod blocks;
pub mod chunk;
pub mod chunk_store;
pub mod entities;
pub mod game_behaviors;
pub mod handlers;
pub mod inventory;
pub mod items;
pub mod mapgen;
pub mod player;
pub mod shard;
pub mod shard_connection;
pub mod shard_manager;
pub mod subscriptions;

#[cfg(test)]
pub mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::database::GameDatabase;
use crate::network_server::auth::{AuthService, LoginGate};

use self::chunk_store::ChunkStore;
use self::entities::EntityManager;
use self::game_behaviors::GameBehaviors;
use self::mapgen::MapgenInterface;
use self::player::PlayerManager;
use self::shard::ShardServices;
use self::shard_manager::ShardManager;

/// One running world: its shards, its players and the storage behind them.
pub struct GameState {
    data_dir: PathBuf,
    behaviors: Arc<GameBehaviors>,
    database: Arc<dyn GameDatabase>,
    entities: Arc<EntityManager>,
    shards: Arc<ShardManager>,
    player_manager: Arc<PlayerManager>,
    auth: AuthService,
    early_shutdown: CancellationToken,
}

impl GameState {
    pub(crate) fn new(
        data_dir: PathBuf,
        db: Arc<dyn GameDatabase>,
        mapgen: Arc<dyn MapgenInterface>,
        behaviors: GameBehaviors,
        login_gate: Box<dyn LoginGate>,
    ) -> Arc<Self> {
        let behaviors = Arc::new(behaviors);
        let entities = Arc::new(EntityManager::new());
        let services = Arc::new(ShardServices {
            behaviors: behaviors.clone(),
            entities: entities.clone(),
            chunk_store: Arc::new(ChunkStore::new(db.clone(), mapgen)),
        });
        let player_manager = PlayerManager::new(
            db.clone(),
            behaviors.max_players,
            behaviors.spawn_location,
        );
        Arc::new(GameState {
            data_dir,
            behaviors,
            database: db,
            entities,
            shards: Arc::new(ShardManager::new(services)),
            auth: AuthService::new(login_gate, player_manager.clone()),
            player_manager,
            early_shutdown: CancellationToken::new(),
        })
    }

    pub fn game_behaviors(&self) -> &GameBehaviors {
        &self.behaviors
    }

    pub fn entities(&self) -> &Arc<EntityManager> {
        &self.entities
    }

    pub fn shards(&self) -> &Arc<ShardManager> {
        &self.shards
    }

    pub fn player_manager(&self) -> &Arc<PlayerManager> {
        &self.player_manager
    }

    pub(crate) fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub(crate) fn db(&self) -> &dyn GameDatabase {
        self.database.as_ref()
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Start shutting down the game.
    /// This will kick all players off.
    pub fn start_shutdown(&self) {
        self.early_shutdown.cancel();
    }

    // Await a call to self.start_shutdown
    pub async fn await_start_shutdown(&self) {
        self.early_shutdown.cancelled().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.early_shutdown.is_cancelled()
    }

    // Stops every shard, waits for them to write back their chunks, then flushes players and
    // the database.
    pub(crate) async fn shut_down(&self) -> Result<()> {
        self.start_shutdown();
        self.shards.request_shutdown();
        self.shards.await_shutdown().await?;
        self.player_manager.flush();
        if let Err(e) = self.db().flush() {
            error!("Final database flush failed: {e:?}");
            return Err(e);
        }
        info!("Game state shut down");
        Ok(())
    }
}
