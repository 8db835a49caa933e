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

use std::sync::Arc;

use anyhow::{ensure, Result};
use feldspar_core::coordinates::ShardCoordinate;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{
    player::PlayerHandle,
    shard::{ShardHandle, ShardServices, ShardWorker},
    shard_connection::ShardConnection,
};

/// Starts shards on first use and hands out handles to them. The registry lock is only held to
/// look up or insert a handle, never while a shard does any work.
pub struct ShardManager {
    services: Arc<ShardServices>,
    shards: Mutex<FxHashMap<ShardCoordinate, ShardHandle>>,
    workers: Mutex<Vec<(ShardCoordinate, JoinHandle<Result<()>>)>>,
    shutdown: CancellationToken,
}
impl ShardManager {
    pub fn new(services: Arc<ShardServices>) -> ShardManager {
        ShardManager {
            services,
            shards: Mutex::new(FxHashMap::default()),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn services(&self) -> &Arc<ShardServices> {
        &self.services
    }

    /// Returns the shard at `coord`, starting it if this is the first request for it.
    pub fn get(&self, coord: ShardCoordinate) -> Result<ShardHandle> {
        let mut shards = self.shards.lock();
        if let Some(handle) = shards.get(&coord) {
            return Ok(handle.clone());
        }
        ensure!(
            !self.shutdown.is_cancelled(),
            "Not starting {:?}; shutting down",
            coord
        );
        let (sender, receiver) = mpsc::channel(self.services.behaviors.shard_queue_depth);
        let worker = ShardWorker::new(
            coord,
            self.services.clone(),
            receiver,
            self.shutdown.clone(),
        );
        let join_handle = crate::spawn_async(
            &format!("shard_{}_{}", coord.x, coord.z),
            worker.run_loop(),
        )?;
        self.workers.lock().push((coord, join_handle));
        let handle = ShardHandle::new(coord, sender);
        shards.insert(coord, handle.clone());
        info!("Started {:?}", coord);
        Ok(handle)
    }

    /// Binds a shard to one player. All of that player's requests into the shard go through the
    /// returned connection.
    pub fn connect(&self, player: PlayerHandle, coord: ShardCoordinate) -> Result<ShardConnection> {
        Ok(ShardConnection::new(self.get(coord)?, player))
    }

    pub fn shard_count(&self) -> usize {
        self.shards.lock().len()
    }

    /// Tells every shard to stop once its current command is done.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits for every shard to write back its chunks and exit.
    pub async fn await_shutdown(&self) -> Result<()> {
        let workers = std::mem::take(&mut *self.workers.lock());
        for (coord, worker) in workers {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{:?} failed: {e:?}", coord),
                Err(e) => error!("{:?} crashed: {e:?}", coord),
            }
        }
        self.shards.lock().clear();
        info!("All shards shut down");
        Ok(())
    }
}
