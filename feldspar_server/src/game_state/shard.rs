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

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use cgmath::Vector3;
use itertools::Itertools;
use feldspar_core::{
    coordinates::{BlockCoordinate, BlockFace, ChunkCoordinate, ChunkOffset, PlayerPosition, ShardCoordinate},
    items::ItemStack,
};
use prost::bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::run_handler;

use super::{
    blocks::{self, BlockContext},
    chunk::{MapChunk, PlayerPresence},
    chunk_store::ChunkStore,
    entities::{EntityId, EntityManager},
    game_behaviors::GameBehaviors,
    inventory::{reject_click, InventoryClick},
    player::{Outbox, PlayerHandle, ReturnedStack},
};

/// Everything a shard needs besides its own chunks. Shared by all shards of a world.
pub struct ShardServices {
    pub behaviors: Arc<GameBehaviors>,
    pub entities: Arc<EntityManager>,
    pub chunk_store: Arc<ChunkStore>,
}

pub type ShardClosure = Box<dyn FnOnce(&mut ShardContext<'_>) + Send>;
pub type ChunkClosure = Box<dyn FnOnce(ChunkContext<'_>) + Send>;

/// A request posted to a shard. Each one is handled to completion before the next is taken.
pub(crate) enum ShardCommand {
    Run(ShardClosure),
    RunOnChunk {
        chunk: ChunkCoordinate,
        closure: ChunkClosure,
    },
    SubscribeChunk {
        chunk: ChunkCoordinate,
        player: PlayerHandle,
    },
    UnsubscribeChunk {
        chunk: ChunkCoordinate,
        entity_id: EntityId,
    },
    MulticastToChunk {
        chunk: ChunkCoordinate,
        exclude: Option<EntityId>,
        payload: Bytes,
    },
    SetPlayerPositionLook {
        chunk: ChunkCoordinate,
        entity_id: EntityId,
        position: PlayerPosition,
    },
    AddPlayerPresence {
        chunk: ChunkCoordinate,
        presence: PlayerPresence,
    },
    RemovePlayerPresence {
        chunk: ChunkCoordinate,
        entity_id: EntityId,
    },
    HitBlock {
        player: PlayerHandle,
        target: BlockCoordinate,
        finished: bool,
    },
    InteractBlock {
        player: PlayerHandle,
        target: BlockCoordinate,
        face: BlockFace,
        held: Option<ItemStack>,
    },
    PlaceItem {
        player: PlayerHandle,
        target: BlockCoordinate,
        item: ItemStack,
    },
    TakeItem {
        player: PlayerHandle,
        chunk: ChunkCoordinate,
        item: EntityId,
    },
    DropItem {
        player: PlayerHandle,
        position: Vector3<f64>,
        stack: ItemStack,
    },
    InventoryClick {
        player: PlayerHandle,
        block: BlockCoordinate,
        click: InventoryClick,
    },
    InventoryUnsubscribe {
        block: BlockCoordinate,
        entity_id: EntityId,
    },
    Disconnect {
        entity_id: EntityId,
        chunks: Vec<ChunkCoordinate>,
    },
}
impl ShardCommand {
    fn name(&self) -> &'static str {
        match self {
            ShardCommand::Run(_) => "run",
            ShardCommand::RunOnChunk { .. } => "run_on_chunk",
            ShardCommand::SubscribeChunk { .. } => "subscribe_chunk",
            ShardCommand::UnsubscribeChunk { .. } => "unsubscribe_chunk",
            ShardCommand::MulticastToChunk { .. } => "multicast_to_chunk",
            ShardCommand::SetPlayerPositionLook { .. } => "set_player_position_look",
            ShardCommand::AddPlayerPresence { .. } => "add_player_presence",
            ShardCommand::RemovePlayerPresence { .. } => "remove_player_presence",
            ShardCommand::HitBlock { .. } => "hit_block",
            ShardCommand::InteractBlock { .. } => "interact_block",
            ShardCommand::PlaceItem { .. } => "place_item",
            ShardCommand::TakeItem { .. } => "take_item",
            ShardCommand::DropItem { .. } => "drop_item",
            ShardCommand::InventoryClick { .. } => "inventory_click",
            ShardCommand::InventoryUnsubscribe { .. } => "inventory_unsubscribe",
            ShardCommand::Disconnect { .. } => "disconnect",
        }
    }
}

struct CommandOrigin {
    shard: ShardCoordinate,
    command: &'static str,
}
impl Display for CommandOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self.shard, self.command)
    }
}

/// The sending side of a shard's queue.
#[derive(Clone)]
pub struct ShardHandle {
    coord: ShardCoordinate,
    sender: mpsc::Sender<ShardCommand>,
}
impl ShardHandle {
    pub(crate) fn new(coord: ShardCoordinate, sender: mpsc::Sender<ShardCommand>) -> ShardHandle {
        ShardHandle { coord, sender }
    }

    pub fn coord(&self) -> ShardCoordinate {
        self.coord
    }

    /// Posts a command, waiting if the queue is full. A shard that has shut down drops it.
    pub(crate) async fn send(&self, command: ShardCommand) {
        if self.sender.send(command).await.is_err() {
            warn!("{:?} is no longer running; request dropped", self.coord);
        }
    }

    /// Runs `closure` on the shard with access to all of its chunks.
    pub async fn enqueue(&self, closure: impl FnOnce(&mut ShardContext<'_>) + Send + 'static) {
        self.send(ShardCommand::Run(Box::new(closure))).await
    }

    /// Runs `closure` against one chunk of the shard, loading it if needed. Nothing runs if the
    /// chunk isn't part of this shard or can't be loaded.
    pub async fn enqueue_on_chunk(
        &self,
        chunk: ChunkCoordinate,
        closure: impl FnOnce(ChunkContext<'_>) + Send + 'static,
    ) {
        self.send(ShardCommand::RunOnChunk {
            chunk,
            closure: Box::new(closure),
        })
        .await
    }
}

/// Shard-wide access handed to closures posted with [ShardHandle::enqueue].
pub struct ShardContext<'a> {
    state: &'a mut ShardState,
    outbox: &'a mut Outbox,
}
impl ShardContext<'_> {
    pub fn coord(&self) -> ShardCoordinate {
        self.state.coord
    }

    pub fn current_tick(&self) -> u64 {
        self.state.tick
    }

    pub fn is_loaded(&self, chunk: ChunkCoordinate) -> bool {
        self.state.chunks.contains_key(&chunk)
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkCoordinate> {
        self.state.chunks.keys().copied().sorted().collect()
    }

    /// Runs `f` against a chunk of this shard, loading it if needed.
    pub fn with_chunk<T>(
        &mut self,
        chunk: ChunkCoordinate,
        f: impl FnOnce(ChunkContext<'_>) -> T,
    ) -> Option<T> {
        let services = self.state.services.clone();
        let tick = self.state.tick;
        let chunk = self.state.chunk_mut(chunk, true)?;
        Some(f(ChunkContext {
            chunk,
            outbox: &mut *self.outbox,
            services: &services,
            tick,
        }))
    }

    pub fn outbox(&mut self) -> &mut Outbox {
        &mut *self.outbox
    }
}

/// Exclusive access to one chunk, handed to closures posted with [ShardHandle::enqueue_on_chunk].
pub struct ChunkContext<'a> {
    pub chunk: &'a mut MapChunk,
    pub outbox: &'a mut Outbox,
    pub services: &'a ShardServices,
    pub tick: u64,
}

/// The chunks owned by one shard. Only the shard's worker task ever holds this.
pub(crate) struct ShardState {
    coord: ShardCoordinate,
    services: Arc<ShardServices>,
    chunks: FxHashMap<ChunkCoordinate, MapChunk>,
    tick: u64,
    // Returned items that couldn't be dropped yet, retried every tick
    stranded: Vec<ReturnedStack>,
}
impl ShardState {
    /// Returns a chunk of this shard, loading it first if `load` is set.
    fn chunk_mut(&mut self, coord: ChunkCoordinate, load: bool) -> Option<&mut MapChunk> {
        if !self.coord.contains(coord) {
            warn!("{:?} was routed to {:?}", coord, self.coord);
            return None;
        }
        let now = Instant::now();
        let chunk = match self.chunks.entry(coord) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                if !load {
                    debug!("{:?} isn't loaded; ignoring request", coord);
                    return None;
                }
                match self.services.chunk_store.load(coord, &self.services.entities) {
                    Ok(chunk) => entry.insert(chunk),
                    Err(e) => {
                        error!("Failed to load {:?}: {e:?}", coord);
                        return None;
                    }
                }
            }
        };
        chunk.touch(now);
        Some(chunk)
    }

    fn block_mut(&mut self, block: BlockCoordinate) -> Option<(&mut MapChunk, ChunkOffset)> {
        let offset = block.try_offset()?;
        let chunk = self.chunk_mut(block.chunk(), false)?;
        Some((chunk, offset))
    }

    fn handle(&mut self, command: ShardCommand, outbox: &mut Outbox) {
        let origin = CommandOrigin {
            shard: self.coord,
            command: command.name(),
        };
        if let Err(e) = run_handler!(|| self.dispatch(command, outbox), "shard command", &origin) {
            error!("{e:?}");
        }
    }

    fn dispatch(&mut self, command: ShardCommand, outbox: &mut Outbox) -> Result<()> {
        let services = self.services.clone();
        let tick = self.tick;
        match command {
            ShardCommand::Run(closure) => closure(&mut ShardContext {
                state: self,
                outbox,
            }),
            ShardCommand::RunOnChunk { chunk, closure } => {
                if let Some(chunk) = self.chunk_mut(chunk, true) {
                    closure(ChunkContext {
                        chunk,
                        outbox,
                        services: &services,
                        tick,
                    });
                }
            }
            ShardCommand::SubscribeChunk { chunk, player } => {
                if let Some(chunk) = self.chunk_mut(chunk, true) {
                    chunk.subscribe(player, outbox);
                }
            }
            ShardCommand::UnsubscribeChunk { chunk, entity_id } => {
                if let Some(chunk) = self.chunk_mut(chunk, false) {
                    chunk.unsubscribe(entity_id, outbox);
                }
            }
            ShardCommand::MulticastToChunk {
                chunk,
                exclude,
                payload,
            } => {
                if let Some(chunk) = self.chunk_mut(chunk, false) {
                    chunk.multicast_payload(outbox, exclude, payload);
                }
            }
            ShardCommand::SetPlayerPositionLook {
                chunk,
                entity_id,
                position,
            } => {
                if let Some(chunk) = self.chunk_mut(chunk, false) {
                    chunk.move_player(entity_id, position, outbox);
                }
            }
            ShardCommand::AddPlayerPresence { chunk, presence } => {
                if let Some(chunk) = self.chunk_mut(chunk, true) {
                    chunk.add_player(presence, outbox);
                }
            }
            ShardCommand::RemovePlayerPresence { chunk, entity_id } => {
                if let Some(chunk) = self.chunk_mut(chunk, false) {
                    chunk.remove_player(entity_id, outbox);
                }
            }
            ShardCommand::HitBlock {
                player,
                target,
                finished,
            } => {
                if !finished {
                    return Ok(());
                }
                if let Some((chunk, offset)) = self.block_mut(target) {
                    blocks::dig_block(BlockContext {
                        chunk,
                        offset,
                        location: target,
                        player: &player,
                        services: &services,
                        outbox,
                    });
                }
            }
            ShardCommand::InteractBlock {
                player,
                target,
                face,
                held,
            } => {
                if let Some((chunk, offset)) = self.block_mut(target) {
                    blocks::interact_block(
                        BlockContext {
                            chunk,
                            offset,
                            location: target,
                            player: &player,
                            services: &services,
                            outbox,
                        },
                        held,
                        face,
                    );
                }
            }
            ShardCommand::PlaceItem {
                player,
                target,
                item,
            } => match self.block_mut(target) {
                Some((chunk, offset)) => blocks::place_item(
                    BlockContext {
                        chunk,
                        offset,
                        location: target,
                        player: &player,
                        services: &services,
                        outbox,
                    },
                    item,
                ),
                None => outbox.give(&player, item, target.center()),
            },
            ShardCommand::TakeItem {
                player,
                chunk,
                item,
            } => {
                if let Some(chunk) = self.chunk_mut(chunk, false) {
                    chunk.take_item(item, &player, &services.entities, outbox);
                }
            }
            ShardCommand::DropItem {
                player,
                position,
                stack,
            } => {
                let chunk = BlockCoordinate::new(
                    position.x.floor() as i32,
                    position.y.floor() as i32,
                    position.z.floor() as i32,
                )
                .chunk();
                let refused = match self.chunk_mut(chunk, true) {
                    Some(chunk) => {
                        match chunk.spawn_item(&services.entities, stack, position, outbox) {
                            Ok(_) => false,
                            Err(e) => {
                                warn!("{:?} can't drop {:?}: {e}", player, stack);
                                true
                            }
                        }
                    }
                    None => true,
                };
                if refused {
                    outbox.give(&player, stack, position);
                }
            }
            ShardCommand::InventoryClick {
                player,
                block,
                click,
            } => match self.block_mut(block) {
                Some((chunk, offset)) => chunk.click_inventory(offset, &player, click, outbox),
                None => reject_click(&player, block, click, outbox),
            },
            ShardCommand::InventoryUnsubscribe { block, entity_id } => {
                if let Some((chunk, offset)) = self.block_mut(block) {
                    chunk.close_inventory(offset, entity_id);
                }
            }
            ShardCommand::Disconnect { entity_id, chunks } => {
                for chunk in chunks {
                    if let Some(chunk) = self.chunk_mut(chunk, false) {
                        chunk.disconnect_player(entity_id, outbox);
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops items that a player couldn't take back into the world where they came from.
    fn return_to_world(&mut self, returned: Vec<ReturnedStack>, outbox: &mut Outbox) {
        let services = self.services.clone();
        for ReturnedStack { stack, position } in returned {
            let chunk = BlockCoordinate::new(
                position.x.floor() as i32,
                position.y.floor() as i32,
                position.z.floor() as i32,
            )
            .chunk();
            if !self.coord.contains(chunk) {
                error!(
                    "{:?} can't return {:?} to {:?} outside of it; the items are lost",
                    self.coord, stack, position
                );
                continue;
            }
            let spawned = match self.chunk_mut(chunk, true) {
                Some(chunk) => match chunk.spawn_item(&services.entities, stack, position, outbox) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Can't return {:?} to {:?} yet: {e}", stack, chunk.coord());
                        false
                    }
                },
                None => false,
            };
            if !spawned {
                self.stranded.push(ReturnedStack { stack, position });
            }
        }
    }

    fn handle_tick(&mut self, outbox: &mut Outbox) {
        self.tick += 1;
        if !self.stranded.is_empty() {
            let stranded = std::mem::take(&mut self.stranded);
            self.return_to_world(stranded, outbox);
        }
        let origin = CommandOrigin {
            shard: self.coord,
            command: "tick",
        };
        let result = run_handler!(
            || {
                let services = self.services.clone();
                for chunk in self.chunks.values_mut() {
                    chunk.tick(
                        self.tick,
                        &services.behaviors.block_types,
                        &services.entities,
                        outbox,
                    );
                }
                Ok(())
            },
            "shard tick",
            &origin
        );
        if let Err(e) = result {
            error!("{e:?}");
        }
        self.evict_idle(Instant::now());
    }

    fn evict_idle(&mut self, now: Instant) {
        let idle = self.services.behaviors.chunk_idle_eviction;
        let idle_chunks: Vec<_> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.is_evictable(now, idle))
            .map(|(coord, _)| *coord)
            .collect();
        for coord in idle_chunks {
            let Some(mut chunk) = self.chunks.remove(&coord) else {
                continue;
            };
            match self.services.chunk_store.store(&mut chunk) {
                Ok(()) => {
                    chunk.release_entities(&self.services.entities);
                    debug!("Evicted idle {:?}", coord);
                }
                Err(e) => {
                    error!("Keeping {:?} loaded since writeback failed: {e:?}", coord);
                    chunk.touch(now);
                    self.chunks.insert(coord, chunk);
                }
            }
        }
    }

    fn write_back_all(&mut self) {
        if !self.stranded.is_empty() {
            let stranded = std::mem::take(&mut self.stranded);
            self.return_to_world(stranded, &mut Outbox::default());
            for lost in self.stranded.drain(..) {
                error!("{:?} shut down holding {:?}; the items are lost", self.coord, lost.stack);
            }
        }
        let mut failures = 0;
        for chunk in self.chunks.values_mut() {
            if let Err(e) = self.services.chunk_store.store(chunk) {
                error!("Writeback of {:?} failed: {e:?}", chunk.coord());
                failures += 1;
            }
        }
        if let Err(e) = self.services.chunk_store.flush() {
            error!("Flushing after {:?} shut down failed: {e:?}", self.coord);
        }
        tracing::info!(
            "{:?} wrote back {} chunks ({} failed)",
            self.coord,
            self.chunks.len() - failures,
            failures
        );
    }
}

/// The task that owns a shard's chunks and drains its queue.
pub(crate) struct ShardWorker {
    state: ShardState,
    receiver: mpsc::Receiver<ShardCommand>,
    cancellation: CancellationToken,
}
impl ShardWorker {
    pub(crate) fn new(
        coord: ShardCoordinate,
        services: Arc<ShardServices>,
        receiver: mpsc::Receiver<ShardCommand>,
        cancellation: CancellationToken,
    ) -> ShardWorker {
        ShardWorker {
            state: ShardState {
                coord,
                services,
                chunks: FxHashMap::default(),
                tick: 0,
                stranded: vec![],
            },
            receiver,
            cancellation,
        }
    }

    pub(crate) async fn run_loop(mut self) -> Result<()> {
        let behaviors = self.state.services.behaviors.clone();
        let mut ticker = tokio::time::interval(behaviors.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut outbox = Outbox::default();
        debug!("{:?} starting", self.state.coord);
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    tracing::info!("{:?} detected cancellation", self.state.coord);
                    break;
                }
                _ = ticker.tick() => self.state.handle_tick(&mut outbox),
                command = self.receiver.recv() => match command {
                    Some(command) => self.state.handle(command, &mut outbox),
                    None => break,
                },
            }
            loop {
                let returned = outbox.deliver(behaviors.player_event_timeout).await;
                if returned.is_empty() {
                    break;
                }
                self.state.return_to_world(returned, &mut outbox);
            }
        }
        self.state.write_back_all();
        Ok(())
    }
}
