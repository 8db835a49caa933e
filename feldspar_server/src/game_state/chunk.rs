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

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, ensure, Context, Result};
use cgmath::{vec3, Vector3};
use feldspar_core::{
    block_id::BlockId,
    coordinates::{BlockCoordinate, ChunkCoordinate, ChunkOffset, PlayerPosition, BLOCKS_PER_CHUNK},
    items::{slot_from_wire, slot_to_wire, ItemStack},
    protocol::{
        game_rpc::{self as rpc, server_message, ServerMessage},
        map::{StoredChunk, StoredInventory, StoredItem},
    },
};
use prost::bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::network_server::codec::encode_message;

use super::{
    blocks::BlockTypeManager,
    entities::{EntityError, EntityId, EntityManager},
    inventory::{reject_click, BlockInventory, InventoryClick, InventoryKind},
    items::{ItemEntity, ItemMotion},
    player::{Outbox, PlayerEvent, PlayerHandle},
};

/// A player standing in a chunk, as seen by everyone else subscribed to it.
#[derive(Clone, Debug)]
pub struct PlayerPresence {
    pub entity_id: EntityId,
    pub name: String,
    pub position: PlayerPosition,
}
impl PlayerPresence {
    pub fn spawn_message(&self) -> ServerMessage {
        ServerMessage::new(server_message::Payload::SpawnPlayer(rpc::SpawnPlayer {
            entity_id: self.entity_id.0,
            name: self.name.clone(),
            x: self.position.position.x,
            y: self.position.position.y,
            z: self.position.position.z,
            yaw: self.position.yaw,
            pitch: self.position.pitch,
        }))
    }

    pub fn teleport_message(&self) -> ServerMessage {
        ServerMessage::new(server_message::Payload::EntityTeleport(
            rpc::EntityTeleport {
                entity_id: self.entity_id.0,
                x: self.position.position.x,
                y: self.position.position.y,
                z: self.position.position.z,
                yaw: self.position.yaw,
                pitch: self.position.pitch,
            },
        ))
    }
}

fn destroy_message(id: EntityId) -> ServerMessage {
    ServerMessage::new(server_message::Payload::DestroyEntity(rpc::DestroyEntity {
        entity_id: id.0,
    }))
}

/// One 16x128x16 column of the world, along with everything living in it. Only ever touched by
/// the shard that owns it.
pub struct MapChunk {
    coord: ChunkCoordinate,
    block_ids: Box<[u8; BLOCKS_PER_CHUNK]>,
    metadata: Box<[u8; BLOCKS_PER_CHUNK]>,
    inventories: FxHashMap<ChunkOffset, BlockInventory>,
    // Ordered so that clients see items spawn in a stable order
    items: BTreeMap<EntityId, ItemEntity>,
    players: FxHashMap<EntityId, PlayerPresence>,
    subscribers: FxHashMap<EntityId, PlayerHandle>,
    dirty: bool,
    last_active: Instant,
}
impl MapChunk {
    /// An all-air chunk.
    pub fn new(coord: ChunkCoordinate) -> MapChunk {
        MapChunk {
            coord,
            block_ids: Box::new([0; BLOCKS_PER_CHUNK]),
            metadata: Box::new([0; BLOCKS_PER_CHUNK]),
            inventories: FxHashMap::default(),
            items: BTreeMap::new(),
            players: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            dirty: false,
            last_active: Instant::now(),
        }
    }

    pub fn coord(&self) -> ChunkCoordinate {
        self.coord
    }

    #[inline]
    pub fn block(&self, offset: ChunkOffset) -> BlockId {
        BlockId(self.block_ids[offset.as_index()])
    }

    #[inline]
    pub fn metadata(&self, offset: ChunkOffset) -> u8 {
        self.metadata[offset.as_index()]
    }

    /// Changes a block without telling anyone. Used while generating or loading.
    pub fn set_block(&mut self, offset: ChunkOffset, id: BlockId, metadata: u8) {
        let index = offset.as_index();
        self.block_ids[index] = id.0;
        self.metadata[index] = metadata;
        self.dirty = true;
    }

    pub(crate) fn set_block_and_notify(
        &mut self,
        offset: ChunkOffset,
        id: BlockId,
        metadata: u8,
        outbox: &mut Outbox,
    ) {
        self.set_block(offset, id, metadata);
        let message = ServerMessage::new(server_message::Payload::BlockChange(rpc::BlockChange {
            coord: Some(self.coord.with_offset(offset).into()),
            block_id: id.0 as u32,
            metadata: metadata as u32,
        }));
        self.multicast(outbox, None, &message);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, entity_id: EntityId) -> bool {
        self.subscribers.contains_key(&entity_id)
    }

    pub fn player(&self, entity_id: EntityId) -> Option<&PlayerPresence> {
        self.players.get(&entity_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn item(&self, entity_id: EntityId) -> Option<&ItemEntity> {
        self.items.get(&entity_id)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemEntity> {
        self.items.values()
    }

    pub fn inventory(&self, offset: ChunkOffset) -> Option<&BlockInventory> {
        self.inventories.get(&offset)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// Nobody is looking at or standing in this chunk, and nothing has touched it for `idle`.
    pub(crate) fn is_evictable(&self, now: Instant, idle: Duration) -> bool {
        self.subscribers.is_empty()
            && self.players.is_empty()
            && now.saturating_duration_since(self.last_active) >= idle
    }

    pub fn chunk_data_message(&self) -> ServerMessage {
        ServerMessage::new(server_message::Payload::ChunkData(rpc::ChunkData {
            coord: Some(self.coord.into()),
            block_ids: self.block_ids.to_vec(),
            metadata: self.metadata.to_vec(),
        }))
    }

    /// Sends `message` to every subscriber except `exclude`, encoding it only once.
    pub fn multicast(&self, outbox: &mut Outbox, exclude: Option<EntityId>, message: &ServerMessage) {
        if self.subscribers.is_empty() {
            return;
        }
        self.multicast_payload(outbox, exclude, encode_message(message));
    }

    pub fn multicast_payload(&self, outbox: &mut Outbox, exclude: Option<EntityId>, payload: Bytes) {
        for (id, subscriber) in &self.subscribers {
            if Some(*id) != exclude {
                outbox.send(subscriber, PlayerEvent::Transmit(payload.clone()));
            }
        }
    }

    /// Registers a subscriber and sends it the chunk plus everything currently in it.
    pub(crate) fn subscribe(&mut self, player: PlayerHandle, outbox: &mut Outbox) {
        let id = player.entity_id();
        outbox.transmit(&player, &self.chunk_data_message());
        for presence in self.players.values().filter(|p| p.entity_id != id) {
            outbox.transmit(&player, &presence.spawn_message());
        }
        for item in self.items.values() {
            outbox.transmit(&player, &item.spawn_message());
        }
        if self.subscribers.insert(id, player).is_some() {
            debug!("{:?} subscribed twice to {:?}", id, self.coord);
        }
    }

    /// Removes a subscriber, tearing down everything it was shown and closing any windows it had
    /// open on blocks in this chunk.
    pub(crate) fn unsubscribe(&mut self, entity_id: EntityId, outbox: &mut Outbox) {
        let Some(player) = self.subscribers.remove(&entity_id) else {
            return;
        };
        self.evict_viewer(entity_id, outbox);
        for presence in self.players.values().filter(|p| p.entity_id != entity_id) {
            outbox.transmit(&player, &destroy_message(presence.entity_id));
        }
        for item in self.items.values() {
            outbox.transmit(&player, &destroy_message(item.id));
        }
        outbox.transmit(
            &player,
            &ServerMessage::new(server_message::Payload::UnloadChunk(rpc::UnloadChunk {
                coord: Some(self.coord.into()),
            })),
        );
    }

    fn evict_viewer(&mut self, entity_id: EntityId, outbox: &mut Outbox) {
        let coord = self.coord;
        for (offset, inventory) in self.inventories.iter_mut() {
            inventory.evict_viewer(coord.with_offset(*offset), entity_id, outbox);
        }
    }

    pub(crate) fn add_player(&mut self, presence: PlayerPresence, outbox: &mut Outbox) {
        self.multicast(outbox, Some(presence.entity_id), &presence.spawn_message());
        self.players.insert(presence.entity_id, presence);
    }

    pub(crate) fn remove_player(&mut self, entity_id: EntityId, outbox: &mut Outbox) -> bool {
        if self.players.remove(&entity_id).is_none() {
            return false;
        }
        self.multicast(outbox, Some(entity_id), &destroy_message(entity_id));
        true
    }

    pub(crate) fn move_player(
        &mut self,
        entity_id: EntityId,
        position: PlayerPosition,
        outbox: &mut Outbox,
    ) {
        let Some(presence) = self.players.get_mut(&entity_id) else {
            debug!("{:?} isn't present in {:?}", entity_id, self.coord);
            return;
        };
        presence.position = position;
        let message = presence.teleport_message();
        self.multicast(outbox, Some(entity_id), &message);
    }

    /// Drops every trace of a player that has gone away, without messaging it.
    pub(crate) fn disconnect_player(&mut self, entity_id: EntityId, outbox: &mut Outbox) {
        self.remove_player(entity_id, outbox);
        if self.subscribers.remove(&entity_id).is_some() {
            for inventory in self.inventories.values_mut() {
                inventory.close(entity_id);
            }
        }
    }

    pub fn spawn_item(
        &mut self,
        entities: &EntityManager,
        stack: ItemStack,
        position: Vector3<f64>,
        outbox: &mut Outbox,
    ) -> Result<EntityId, EntityError> {
        let id = entities.new_id()?;
        let item = ItemEntity::new(id, stack, position);
        self.multicast(outbox, None, &item.spawn_message());
        self.items.insert(id, item);
        self.dirty = true;
        Ok(id)
    }

    /// Hands an item to `player`. Returns false if somebody else got it first.
    pub(crate) fn take_item(
        &mut self,
        item_id: EntityId,
        player: &PlayerHandle,
        entities: &EntityManager,
        outbox: &mut Outbox,
    ) -> bool {
        let Some(item) = self.items.remove(&item_id) else {
            return false;
        };
        let collect = ServerMessage::new(server_message::Payload::CollectItem(rpc::CollectItem {
            item_entity_id: item_id.0,
            collector_entity_id: player.entity_id().0,
        }));
        self.multicast(outbox, None, &collect);
        self.multicast(outbox, None, &destroy_message(item_id));
        entities.release(item_id);
        outbox.give(player, item.stack, item.position);
        self.dirty = true;
        true
    }

    pub(crate) fn create_inventory(&mut self, offset: ChunkOffset, kind: InventoryKind) {
        self.inventories.insert(offset, BlockInventory::new(kind));
        self.dirty = true;
    }

    /// Removes a block inventory, closing its windows. Returns what was inside.
    pub(crate) fn remove_inventory(&mut self, offset: ChunkOffset, outbox: &mut Outbox) -> Vec<ItemStack> {
        let Some(inventory) = self.inventories.remove(&offset) else {
            return vec![];
        };
        self.dirty = true;
        inventory.break_open(self.coord.with_offset(offset), outbox)
    }

    pub(crate) fn open_inventory(
        &mut self,
        offset: ChunkOffset,
        kind: InventoryKind,
        player: &PlayerHandle,
        outbox: &mut Outbox,
    ) {
        let location = self.coord.with_offset(offset);
        let inventory = self
            .inventories
            .entry(offset)
            .or_insert_with(|| BlockInventory::new(kind));
        if inventory.kind() != kind {
            warn!(
                "{:?} holds a {:?} inventory but the block wants {:?}",
                location,
                inventory.kind(),
                kind
            );
            return;
        }
        inventory.open(location, player, outbox);
    }

    pub(crate) fn click_inventory(
        &mut self,
        offset: ChunkOffset,
        player: &PlayerHandle,
        click: InventoryClick,
        outbox: &mut Outbox,
    ) {
        let location = self.coord.with_offset(offset);
        match self.inventories.get_mut(&offset) {
            Some(inventory) => {
                inventory.click(location, player, click, outbox);
                self.dirty = true;
            }
            None => reject_click(player, location, click, outbox),
        }
    }

    pub(crate) fn close_inventory(&mut self, offset: ChunkOffset, entity_id: EntityId) {
        if let Some(inventory) = self.inventories.get_mut(&offset) {
            inventory.close(entity_id);
        }
    }

    /// Runs item physics for one tick, then offers resting items to nearby players.
    pub(crate) fn tick(
        &mut self,
        tick: u64,
        block_types: &BlockTypeManager,
        entities: &EntityManager,
        outbox: &mut Outbox,
    ) {
        if self.items.is_empty() {
            return;
        }
        let mut moved = vec![];
        let mut lost = vec![];
        {
            let MapChunk {
                coord,
                block_ids,
                items,
                ..
            } = self;
            let is_solid = |c: BlockCoordinate| {
                if c.chunk() != *coord {
                    return false;
                }
                c.try_offset()
                    .is_some_and(|o| block_types.is_solid(BlockId(block_ids[o.as_index()])))
            };
            for item in items.values_mut() {
                match item.step(&is_solid) {
                    ItemMotion::Moved => moved.push(item.id),
                    ItemMotion::FellOutOfWorld => lost.push(item.id),
                    ItemMotion::Resting => {}
                }
            }
        }
        if !moved.is_empty() || !lost.is_empty() {
            self.dirty = true;
        }
        for id in lost {
            if self.items.remove(&id).is_some() {
                self.multicast(outbox, None, &destroy_message(id));
                entities.release(id);
            }
        }
        for id in moved {
            if let Some(item) = self.items.get(&id) {
                let message = item.teleport_message();
                self.multicast(outbox, None, &message);
            }
        }
        self.offer_items(tick, outbox);
    }

    fn offer_items(&mut self, tick: u64, outbox: &mut Outbox) {
        let MapChunk {
            coord,
            items,
            players,
            subscribers,
            ..
        } = self;
        for item in items.values_mut() {
            let mut offered = false;
            for presence in players.values() {
                if !item.should_offer(presence.position.position, tick) {
                    continue;
                }
                if let Some(player) = subscribers.get(&presence.entity_id) {
                    outbox.send(
                        player,
                        PlayerEvent::OfferItem {
                            chunk: *coord,
                            item: item.id,
                            stack: item.stack,
                        },
                    );
                    offered = true;
                }
            }
            if offered {
                item.mark_offered(tick);
            }
        }
    }

    /// Gives back the ids of every item in the chunk, for when it's dropped from memory.
    pub(crate) fn release_entities(&mut self, entities: &EntityManager) {
        for id in std::mem::take(&mut self.items).into_keys() {
            entities.release(id);
        }
    }

    pub(crate) fn to_stored(&self) -> StoredChunk {
        StoredChunk {
            block_ids: self.block_ids.to_vec(),
            metadata: self.metadata.to_vec(),
            inventories: self
                .inventories
                .iter()
                .map(|(offset, inventory)| StoredInventory {
                    offset_in_chunk: offset.as_index() as u32,
                    kind: inventory.kind().to_wire(),
                    slots: inventory
                        .inventory()
                        .slots()
                        .iter()
                        .map(|s| slot_to_wire(*s))
                        .collect(),
                })
                .collect(),
            items: self
                .items
                .values()
                .map(|item| StoredItem {
                    item: Some(item.stack.into()),
                    x: item.position.x,
                    y: item.position.y,
                    z: item.position.z,
                })
                .collect(),
        }
    }

    /// Rebuilds a chunk from storage. Items get fresh entity ids.
    pub(crate) fn from_stored(
        coord: ChunkCoordinate,
        stored: StoredChunk,
        entities: &EntityManager,
    ) -> Result<MapChunk> {
        ensure!(
            stored.block_ids.len() == BLOCKS_PER_CHUNK && stored.metadata.len() == BLOCKS_PER_CHUNK,
            "Stored chunk {:?} has {} block ids and {} metadata bytes",
            coord,
            stored.block_ids.len(),
            stored.metadata.len()
        );
        let block_ids: Box<[u8; BLOCKS_PER_CHUNK]> = stored
            .block_ids
            .into_boxed_slice()
            .try_into()
            .map_err(|_| anyhow!("block id array size"))?;
        let metadata: Box<[u8; BLOCKS_PER_CHUNK]> = stored
            .metadata
            .into_boxed_slice()
            .try_into()
            .map_err(|_| anyhow!("metadata array size"))?;

        let mut inventories = FxHashMap::default();
        for inventory in stored.inventories {
            let index = inventory.offset_in_chunk as usize;
            ensure!(index < BLOCKS_PER_CHUNK, "Inventory offset {index} out of range");
            let kind = InventoryKind::from_wire(inventory.kind)
                .with_context(|| format!("Unknown inventory kind {}", inventory.kind))?;
            let slots = inventory
                .slots
                .iter()
                .map(slot_from_wire)
                .collect::<Result<Vec<_>>>()?;
            inventories.insert(
                ChunkOffset::from_index(index),
                BlockInventory::from_slots(kind, slots),
            );
        }

        let mut loose_items = Vec::with_capacity(stored.items.len());
        for item in &stored.items {
            let Some(stack) = &item.item else {
                continue;
            };
            loose_items.push((ItemStack::try_from(stack)?, vec3(item.x, item.y, item.z)));
        }
        // Ids are only allocated once nothing else can fail
        let mut items = BTreeMap::new();
        for (stack, position) in loose_items {
            match entities.new_id() {
                Ok(id) => {
                    items.insert(id, ItemEntity::restored(id, stack, position));
                }
                Err(e) => warn!("Discarding stored {:?} in {:?}: {e}", stack, coord),
            }
        }

        Ok(MapChunk {
            coord,
            block_ids,
            metadata,
            inventories,
            items,
            players: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            dirty: false,
            last_active: Instant::now(),
        })
    }
}
