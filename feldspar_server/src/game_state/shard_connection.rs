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

use async_trait::async_trait;
use cgmath::Vector3;
use feldspar_core::{
    coordinates::{BlockCoordinate, BlockFace, ChunkCoordinate, PlayerPosition, ShardCoordinate},
    items::ItemStack,
};
use prost::bytes::Bytes;
use rustc_hash::FxHashSet;

use super::{
    chunk::PlayerPresence,
    entities::EntityId,
    inventory::InventoryClick,
    player::PlayerHandle,
    shard::{ShardCommand, ShardHandle},
    subscriptions::ShardLink,
};

/// One player's handle on one shard. Every request is posted to the shard's queue and returns as
/// soon as it's queued; results come back through the player's event queue.
pub struct ShardConnection {
    shard: ShardHandle,
    player: PlayerHandle,
    // Every chunk ever subscribed through this connection, for disconnect
    subscribed: FxHashSet<ChunkCoordinate>,
}
impl ShardConnection {
    pub(crate) fn new(shard: ShardHandle, player: PlayerHandle) -> ShardConnection {
        ShardConnection {
            shard,
            player,
            subscribed: FxHashSet::default(),
        }
    }

    pub fn shard(&self) -> ShardCoordinate {
        self.shard.coord()
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    /// Forwards an encoded message to everyone subscribed to `chunk` except `exclude`.
    pub async fn multicast_to_chunk(
        &self,
        chunk: ChunkCoordinate,
        exclude: Option<EntityId>,
        payload: Bytes,
    ) {
        self.shard
            .send(ShardCommand::MulticastToChunk {
                chunk,
                exclude,
                payload,
            })
            .await
    }

    pub async fn set_player_position_look(&self, chunk: ChunkCoordinate, position: PlayerPosition) {
        self.shard
            .send(ShardCommand::SetPlayerPositionLook {
                chunk,
                entity_id: self.player.entity_id(),
                position,
            })
            .await
    }

    pub async fn add_player_presence(&self, chunk: ChunkCoordinate, position: PlayerPosition) {
        self.shard
            .send(ShardCommand::AddPlayerPresence {
                chunk,
                presence: PlayerPresence {
                    entity_id: self.player.entity_id(),
                    name: self.player.name().to_string(),
                    position,
                },
            })
            .await
    }

    pub async fn remove_player_presence(&self, chunk: ChunkCoordinate) {
        self.shard
            .send(ShardCommand::RemovePlayerPresence {
                chunk,
                entity_id: self.player.entity_id(),
            })
            .await
    }

    /// `finished` is false while the player is still digging; only a finished dig breaks blocks.
    pub async fn hit_block(&self, target: BlockCoordinate, finished: bool) {
        self.shard
            .send(ShardCommand::HitBlock {
                player: self.player.clone(),
                target,
                finished,
            })
            .await
    }

    pub async fn interact_block(
        &self,
        target: BlockCoordinate,
        face: BlockFace,
        held: Option<ItemStack>,
    ) {
        self.shard
            .send(ShardCommand::InteractBlock {
                player: self.player.clone(),
                target,
                face,
                held,
            })
            .await
    }

    /// Places one block item at `target`. If it can't be placed it's given back.
    pub async fn place_item(&self, target: BlockCoordinate, item: ItemStack) {
        self.shard
            .send(ShardCommand::PlaceItem {
                player: self.player.clone(),
                target,
                item,
            })
            .await
    }

    pub async fn take_item(&self, chunk: ChunkCoordinate, item: EntityId) {
        self.shard
            .send(ShardCommand::TakeItem {
                player: self.player.clone(),
                chunk,
                item,
            })
            .await
    }

    /// Drops `stack` into the world at `position`, which must lie in this shard.
    pub async fn drop_item(&self, position: Vector3<f64>, stack: ItemStack) {
        self.shard
            .send(ShardCommand::DropItem {
                player: self.player.clone(),
                position,
                stack,
            })
            .await
    }

    pub async fn inventory_click(&self, block: BlockCoordinate, click: InventoryClick) {
        self.shard
            .send(ShardCommand::InventoryClick {
                player: self.player.clone(),
                block,
                click,
            })
            .await
    }

    pub async fn inventory_unsubscribe(&self, block: BlockCoordinate) {
        self.shard
            .send(ShardCommand::InventoryUnsubscribe {
                block,
                entity_id: self.player.entity_id(),
            })
            .await
    }
}

#[async_trait]
impl ShardLink for ShardConnection {
    async fn subscribe_chunk(&mut self, chunk: ChunkCoordinate) {
        self.subscribed.insert(chunk);
        self.shard
            .send(ShardCommand::SubscribeChunk {
                chunk,
                player: self.player.clone(),
            })
            .await
    }

    async fn unsubscribe_chunk(&mut self, chunk: ChunkCoordinate) {
        self.shard
            .send(ShardCommand::UnsubscribeChunk {
                chunk,
                entity_id: self.player.entity_id(),
            })
            .await
    }

    /// Clears the player's presence from every chunk it ever subscribed to through this
    /// connection. Sends nothing to the client.
    async fn disconnect(&mut self) {
        let chunks = self.subscribed.drain().collect();
        self.shard
            .send(ShardCommand::Disconnect {
                entity_id: self.player.entity_id(),
                chunks,
            })
            .await
    }
}
