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

use std::collections::hash_map::Entry;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use feldspar_core::{
    chunk_square::{ordered_chunk_square, square_difference},
    coordinates::{ChunkCoordinate, ShardCoordinate},
};
use rustc_hash::FxHashMap;
use tracing::warn;

use super::{player::PlayerHandle, shard_connection::ShardConnection, shard_manager::ShardManager};

/// The subscription requests a player sends into one shard.
#[async_trait]
pub trait ShardLink: Send + Sync {
    async fn subscribe_chunk(&mut self, chunk: ChunkCoordinate);
    async fn unsubscribe_chunk(&mut self, chunk: ChunkCoordinate);
    /// Called once the last subscription through this link is gone.
    async fn disconnect(&mut self);
}

/// Opens links into shards on behalf of one player.
pub trait ShardConnector: Send + Sync {
    type Link: ShardLink;
    fn connect(&self, shard: ShardCoordinate) -> Result<Self::Link>;
}

/// Connects a player to shards of a [ShardManager].
pub struct PlayerShardConnector {
    shards: Arc<ShardManager>,
    player: PlayerHandle,
}
impl PlayerShardConnector {
    pub fn new(shards: Arc<ShardManager>, player: PlayerHandle) -> PlayerShardConnector {
        PlayerShardConnector { shards, player }
    }
}
impl ShardConnector for PlayerShardConnector {
    type Link = ShardConnection;

    fn connect(&self, shard: ShardCoordinate) -> Result<ShardConnection> {
        self.shards.connect(self.player.clone(), shard)
    }
}

struct ShardReference<L> {
    link: L,
    // Live chunk subscriptions through this link
    count: usize,
}

/// Keeps a player subscribed to exactly the chunks within `radius` of its current chunk,
/// connecting to shards as the window reaches them and disconnecting once it leaves them.
pub struct ChunkSubscriptions<C: ShardConnector> {
    connector: C,
    radius: i32,
    current_chunk: Option<ChunkCoordinate>,
    current_shard: Option<ShardCoordinate>,
    shards: FxHashMap<ShardCoordinate, ShardReference<C::Link>>,
}
impl<C: ShardConnector> ChunkSubscriptions<C> {
    pub fn new(connector: C, radius: i32) -> Self {
        ChunkSubscriptions {
            connector,
            radius,
            current_chunk: None,
            current_shard: None,
            shards: FxHashMap::default(),
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn current_chunk(&self) -> Option<ChunkCoordinate> {
        self.current_chunk
    }

    pub fn current_shard(&self) -> Option<ShardCoordinate> {
        self.current_shard
    }

    /// Subscribes to the whole window around `center`, nearest chunks first.
    pub async fn init(&mut self, center: ChunkCoordinate) -> Result<()> {
        if self.current_chunk.is_some() {
            warn!("Subscriptions initialized twice; starting over");
            self.close().await;
        }
        self.subscribe_all(&ordered_chunk_square(center, self.radius))
            .await?;
        self.current_chunk = Some(center);
        self.current_shard = Some(center.shard());
        Ok(())
    }

    /// Shifts the window to `chunk`. Returns false if the player is still in the same chunk, in
    /// which case nothing is sent.
    pub async fn move_to(&mut self, chunk: ChunkCoordinate) -> Result<bool> {
        let Some(old) = self.current_chunk else {
            self.init(chunk).await?;
            return Ok(true);
        };
        if old == chunk {
            return Ok(false);
        }
        // Subscribe first, so a shard shared by both windows keeps its connection
        self.subscribe_all(&square_difference(chunk, old, self.radius))
            .await?;
        self.current_chunk = Some(chunk);
        for leaving in square_difference(old, chunk, self.radius) {
            self.unsubscribe(leaving).await;
        }
        self.current_shard = Some(chunk.shard());
        Ok(true)
    }

    /// Drops every subscription and disconnects from every shard.
    pub async fn close(&mut self) {
        if let Some(center) = self.current_chunk.take() {
            for chunk in ordered_chunk_square(center, self.radius) {
                self.unsubscribe(chunk).await;
            }
        }
        self.current_shard = None;
        let leftovers: Vec<_> = self.shards.drain().collect();
        for (shard, mut reference) in leftovers {
            warn!("{:?} still had {} subscriptions at close", shard, reference.count);
            reference.link.disconnect().await;
        }
    }

    pub fn is_subscribed(&self, chunk: ChunkCoordinate) -> bool {
        self.current_chunk
            .is_some_and(|center| center.is_within(chunk, self.radius))
    }

    /// The link into the shard the player is standing in.
    pub fn current_link(&mut self) -> Option<&mut C::Link> {
        let shard = self.current_shard?;
        self.shards.get_mut(&shard).map(|r| &mut r.link)
    }

    /// The link into the shard owning `chunk`, if the player can currently see that chunk.
    pub fn link_for_chunk(&mut self, chunk: ChunkCoordinate) -> Option<&mut C::Link> {
        if !self.is_subscribed(chunk) {
            return None;
        }
        self.shards.get_mut(&chunk.shard()).map(|r| &mut r.link)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn subscription_count(&self, shard: ShardCoordinate) -> usize {
        self.shards.get(&shard).map_or(0, |r| r.count)
    }

    /// Subscribes to all of `chunks` or, if any shard can't be reached, to none of them.
    async fn subscribe_all(&mut self, chunks: &[ChunkCoordinate]) -> Result<()> {
        for (i, &chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.subscribe(chunk).await {
                for &done in chunks[..i].iter().rev() {
                    self.unsubscribe(done).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn subscribe(&mut self, chunk: ChunkCoordinate) -> Result<()> {
        let shard = chunk.shard();
        let reference = match self.shards.entry(shard) {
            Entry::Occupied(entry) => {
                let reference = entry.into_mut();
                reference.count += 1;
                reference
            }
            Entry::Vacant(entry) => entry.insert(ShardReference {
                link: self.connector.connect(shard)?,
                count: 1,
            }),
        };
        reference.link.subscribe_chunk(chunk).await;
        Ok(())
    }

    async fn unsubscribe(&mut self, chunk: ChunkCoordinate) {
        let shard = chunk.shard();
        let Some(reference) = self.shards.get_mut(&shard) else {
            warn!("Unsubscribing from {:?} but {:?} isn't connected", chunk, shard);
            return;
        };
        reference.link.unsubscribe_chunk(chunk).await;
        reference.count -= 1;
        if reference.count == 0 {
            if let Some(mut reference) = self.shards.remove(&shard) {
                reference.link.disconnect().await;
            }
        }
    }
}
