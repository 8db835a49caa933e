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

use std::collections::HashMap;

use anyhow::{ensure, Result};
use feldspar_core::{
    block_id::{well_known, BlockId},
    coordinates::{BlockCoordinate, BlockFace, ChunkOffset},
    items::ItemStack,
};
use log::info;
use thiserror::Error;

use super::{
    chunk::MapChunk,
    inventory::InventoryKind,
    player::{Outbox, PlayerEvent, PlayerHandle},
    shard::ShardServices,
};

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Block ID {0} not found")]
    IdNotFound(u8),
    #[error("Block ID {0} is already registered as {1}")]
    DuplicateId(u8, String),
    #[error("Block name {0} is already registered")]
    DuplicateName(String),
}

/// How a block behaves when players dig it, use it, or build against it.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockAspect {
    /// Not solid, and can be built into (air).
    Void,
    /// Breaks when dug, leaving `drop` behind.
    Solid { drop: Option<ItemStack> },
    /// Can't be dug at all.
    Unbreakable,
    /// Opens an inventory when used. Drops itself and its contents when dug.
    Container(InventoryKind),
}

#[derive(Clone, Debug)]
pub struct BlockType {
    pub id: BlockId,
    pub short_name: String,
    pub aspect: BlockAspect,
}
impl BlockType {
    pub fn new(id: BlockId, short_name: impl Into<String>, aspect: BlockAspect) -> BlockType {
        BlockType {
            id,
            short_name: short_name.into(),
            aspect,
        }
    }

    /// A solid block that drops one of itself.
    pub fn simple(id: BlockId, short_name: impl Into<String>) -> BlockType {
        Self::new(
            id,
            short_name,
            BlockAspect::Solid {
                drop: Some(ItemStack::of_block(id, 1)),
            },
        )
    }

    pub fn is_solid(&self) -> bool {
        !matches!(self.aspect, BlockAspect::Void)
    }
}

/// The table of block behaviors. Built once at startup and never mutated afterwards.
pub struct BlockTypeManager {
    block_types: Vec<Option<BlockType>>,
    name_to_id: HashMap<String, BlockId>,
}
impl BlockTypeManager {
    /// A manager that only knows about air.
    pub fn new() -> BlockTypeManager {
        let air = BlockType::new(well_known::AIR, "air", BlockAspect::Void);
        let mut block_types = vec![None; 256];
        let mut name_to_id = HashMap::new();
        let air_id = air.id;
        name_to_id.insert(air.short_name.clone(), air_id);
        block_types[air_id.0 as usize] = Some(air);
        BlockTypeManager {
            block_types,
            name_to_id,
        }
    }

    /// The standard block set.
    pub fn with_defaults() -> Result<BlockTypeManager> {
        use well_known::*;
        let mut manager = Self::new();
        let blocks = [
            BlockType::new(
                STONE,
                "stone",
                BlockAspect::Solid {
                    drop: Some(ItemStack::of_block(COBBLESTONE, 1)),
                },
            ),
            BlockType::new(
                GRASS,
                "grass",
                BlockAspect::Solid {
                    drop: Some(ItemStack::of_block(DIRT, 1)),
                },
            ),
            BlockType::simple(DIRT, "dirt"),
            BlockType::simple(COBBLESTONE, "cobblestone"),
            BlockType::simple(PLANKS, "planks"),
            BlockType::new(BEDROCK, "bedrock", BlockAspect::Unbreakable),
            BlockType::simple(SAND, "sand"),
            BlockType::simple(LOG, "log"),
            BlockType::new(CHEST, "chest", BlockAspect::Container(InventoryKind::Chest)),
            BlockType::new(
                WORKBENCH,
                "workbench",
                BlockAspect::Container(InventoryKind::Workbench),
            ),
            BlockType::new(
                FURNACE,
                "furnace",
                BlockAspect::Container(InventoryKind::Furnace),
            ),
        ];
        for block in blocks {
            manager.register_block(block)?;
        }
        Ok(manager)
    }

    pub fn register_block(&mut self, block: BlockType) -> Result<BlockId> {
        let id = block.id;
        if let Some(existing) = &self.block_types[id.0 as usize] {
            return Err(BlockError::DuplicateId(id.0, existing.short_name.clone()).into());
        }
        ensure!(
            !self.name_to_id.contains_key(&block.short_name),
            BlockError::DuplicateName(block.short_name.clone())
        );
        info!("Registering block {} as {:?}", block.short_name, id);
        self.name_to_id.insert(block.short_name.clone(), id);
        self.block_types[id.0 as usize] = Some(block);
        Ok(id)
    }

    pub fn get(&self, id: BlockId) -> Result<&BlockType, BlockError> {
        self.block_types[id.0 as usize]
            .as_ref()
            .ok_or(BlockError::IdNotFound(id.0))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&BlockType> {
        self.name_to_id.get(name).and_then(|id| self.get(*id).ok())
    }

    /// Unknown blocks count as solid so items don't fall through them.
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).map_or(true, BlockType::is_solid)
    }
}
/// Everything a block rule can touch. Rules run synchronously on the shard that owns the chunk.
pub(crate) struct BlockContext<'a> {
    pub(crate) chunk: &'a mut MapChunk,
    pub(crate) offset: ChunkOffset,
    pub(crate) location: BlockCoordinate,
    pub(crate) player: &'a PlayerHandle,
    pub(crate) services: &'a ShardServices,
    pub(crate) outbox: &'a mut Outbox,
}
impl<'a> BlockContext<'a> {
    fn block_type(&self) -> Option<&'a BlockType> {
        let services: &'a ShardServices = self.services;
        let id = self.chunk.block(self.offset);
        match services.behaviors.block_types.get(id) {
            Ok(block_type) => Some(block_type),
            Err(e) => {
                tracing::warn!("{:?} at {:?}: {e}", id, self.location);
                None
            }
        }
    }

    fn spawn_drop(&mut self, stack: ItemStack) {
        if let Err(e) = self.chunk.spawn_item(
            &self.services.entities,
            stack,
            self.location.center(),
            self.outbox,
        ) {
            tracing::warn!("Couldn't spawn {:?} dug at {:?}: {e}", stack, self.location);
        }
    }
}

/// A player finished digging the block.
pub(crate) fn dig_block(mut ctx: BlockContext<'_>) {
    let Some(block_type) = ctx.block_type() else {
        return;
    };
    let dug = block_type.id;
    let drop = match &block_type.aspect {
        BlockAspect::Void | BlockAspect::Unbreakable => return,
        BlockAspect::Solid { drop } => *drop,
        BlockAspect::Container(_) => Some(ItemStack::of_block(dug, 1)),
    };
    let spilled = ctx.chunk.remove_inventory(ctx.offset, ctx.outbox);
    ctx.chunk
        .set_block_and_notify(ctx.offset, well_known::AIR, 0, ctx.outbox);
    tracing::debug!("{:?} dug {:?} at {:?}", ctx.player, dug, ctx.location);
    for stack in drop.into_iter().chain(spilled) {
        ctx.spawn_drop(stack);
    }
}

/// A player used the block, holding `held`.
pub(crate) fn interact_block(ctx: BlockContext<'_>, held: Option<ItemStack>, face: BlockFace) {
    let Some(block_type) = ctx.block_type() else {
        return;
    };
    match block_type.aspect {
        BlockAspect::Container(kind) => {
            ctx.chunk
                .open_inventory(ctx.offset, kind, ctx.player, ctx.outbox);
        }
        BlockAspect::Void => {}
        BlockAspect::Solid { .. } | BlockAspect::Unbreakable => {
            let (Some(held), Some(target)) = (held, ctx.location.adjacent(face)) else {
                return;
            };
            ctx.outbox
                .send(ctx.player, PlayerEvent::PlaceHeldItem { target, held });
        }
    }
}

/// Places one block item. Anything that can't be placed goes back to the player.
pub(crate) fn place_item(ctx: BlockContext<'_>, item: ItemStack) {
    let services = ctx.services;
    let block_types = &services.behaviors.block_types;
    let placed = item
        .item_type
        .as_block()
        .and_then(|id| block_types.get(id).ok())
        .filter(|block_type| block_type.is_solid());
    let Some(placed) = placed else {
        ctx.outbox.give(ctx.player, item, ctx.location.center());
        return;
    };
    let replaceable = block_types
        .get(ctx.chunk.block(ctx.offset))
        .is_ok_and(|existing| !existing.is_solid());
    if !replaceable {
        ctx.outbox.give(ctx.player, item, ctx.location.center());
        return;
    }
    if let BlockAspect::Container(kind) = placed.aspect {
        ctx.chunk.create_inventory(ctx.offset, kind);
    }
    ctx.chunk
        .set_block_and_notify(ctx.offset, placed.id, 0, ctx.outbox);
    if item.count > 1 {
        tracing::warn!("{:?} placed a stack of {}; returning the rest", ctx.player, item.count);
        ctx.outbox.give(
            ctx.player,
            ItemStack {
                count: item.count - 1,
                ..item
            },
            ctx.location.center(),
        );
    }
}
