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

use feldspar_core::coordinates::BlockCoordinate;
use feldspar_core::items::ItemStack;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::entities::EntityId;
use super::player::{Outbox, PlayerEvent, PlayerHandle};

/// Slots 0..27 are the main inventory, 27..36 the hotbar.
pub const PLAYER_INVENTORY_SIZE: usize = 36;
pub const HOTBAR_START: usize = 27;
pub const HOTBAR_SIZE: usize = 9;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClickError {
    #[error("slot {slot} out of range for an inventory of {len} slots")]
    BadSlot { slot: usize, len: usize },
}

/// The kinds of inventory a block can carry. Workbenches and furnaces behave as plain storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    Chest,
    Workbench,
    Furnace,
}
impl InventoryKind {
    pub fn num_slots(&self) -> usize {
        match self {
            InventoryKind::Chest => 27,
            InventoryKind::Workbench => 10,
            InventoryKind::Furnace => 3,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            InventoryKind::Chest => "Chest",
            InventoryKind::Workbench => "Crafting",
            InventoryKind::Furnace => "Furnace",
        }
    }

    pub fn to_wire(&self) -> u32 {
        match self {
            InventoryKind::Chest => 0,
            InventoryKind::Workbench => 1,
            InventoryKind::Furnace => 2,
        }
    }

    pub fn from_wire(value: u32) -> Option<InventoryKind> {
        match value {
            0 => Some(InventoryKind::Chest),
            1 => Some(InventoryKind::Workbench),
            2 => Some(InventoryKind::Furnace),
            _ => None,
        }
    }
}

/// A fixed number of slots, each empty or holding one stack.
#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
}
impl Inventory {
    pub fn new(len: usize) -> Inventory {
        Inventory {
            slots: vec![None; len],
        }
    }

    /// Builds an inventory from stored slots, padding or truncating to `len`.
    pub fn from_slots(mut slots: Vec<Option<ItemStack>>, len: usize) -> Inventory {
        slots.resize(len, None);
        Inventory { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    pub fn get(&self, slot: usize) -> Option<ItemStack> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn take(&mut self, slot: usize) -> Option<ItemStack> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn set(&mut self, slot: usize, stack: Option<ItemStack>) -> Result<(), ClickError> {
        let len = self.slots.len();
        let target = self
            .slots
            .get_mut(slot)
            .ok_or(ClickError::BadSlot { slot, len })?;
        *target = stack;
        Ok(())
    }

    /// Applies a window click to `slot`, exchanging items with the cursor stack in place.
    ///
    /// Left click picks up, puts down, merges into or swaps with the slot. Right click picks up
    /// half (rounded up) or puts down a single item. A bad slot leaves both sides untouched.
    pub fn click(
        &mut self,
        slot: usize,
        cursor: &mut Option<ItemStack>,
        right_click: bool,
    ) -> Result<(), ClickError> {
        let len = self.slots.len();
        let contents = self
            .slots
            .get_mut(slot)
            .ok_or(ClickError::BadSlot { slot, len })?;
        let (new_slot, new_cursor) = match (contents.take(), cursor.take()) {
            (None, None) => (None, None),
            (Some(held), None) if right_click => {
                let (taken, left) = held.split_half();
                (left, Some(taken))
            }
            (Some(held), None) => (None, Some(held)),
            (None, Some(carried)) if right_click => {
                let (one, rest) = carried.take_one();
                (Some(one), rest)
            }
            (None, Some(carried)) => (Some(carried), None),
            (Some(mut held), Some(carried)) if held.stacks_with(&carried) => {
                if !right_click {
                    let leftover = held.merge_from(carried);
                    (Some(held), leftover)
                } else if held.room() > 0 {
                    let (one, rest) = carried.take_one();
                    held.count += one.count;
                    (Some(held), rest)
                } else {
                    (Some(held), Some(carried))
                }
            }
            (Some(held), Some(carried)) => (Some(carried), Some(held)),
        };
        *contents = new_slot;
        *cursor = new_cursor;
        Ok(())
    }

    /// Adds a stack, topping up matching stacks first and then filling empty slots. Returns what
    /// didn't fit.
    pub fn put(&mut self, stack: ItemStack) -> Option<ItemStack> {
        let mut remaining = Some(stack);
        for existing in self.slots.iter_mut().flatten() {
            match remaining {
                Some(r) => remaining = existing.merge_from(r),
                None => return None,
            }
        }
        for slot in self.slots.iter_mut().filter(|s| s.is_none()) {
            match remaining.take() {
                Some(r) => *slot = Some(r),
                None => return None,
            }
        }
        remaining
    }

    /// True if `put(stack)` would leave nothing over.
    pub fn can_accept(&self, stack: &ItemStack) -> bool {
        let mut room = 0usize;
        for slot in &self.slots {
            match slot {
                None => room += stack.count as usize,
                Some(existing) if existing.stacks_with(stack) => room += existing.room() as usize,
                Some(_) => {}
            }
            if room >= stack.count as usize {
                return true;
            }
        }
        false
    }

    pub fn drain(&mut self) -> Vec<ItemStack> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

/// A click against a block inventory, sent to the shard that owns the block. The cursor stack
/// travels with the request and always comes back in a [PlayerEvent::CursorUpdate].
#[derive(Clone, Debug)]
pub struct InventoryClick {
    pub window_id: i32,
    pub transaction_id: i32,
    pub slot: usize,
    pub right_click: bool,
    pub cursor: Option<ItemStack>,
}

/// The inventory of a container block along with the players that currently have it open.
pub struct BlockInventory {
    kind: InventoryKind,
    inventory: Inventory,
    viewers: FxHashMap<EntityId, PlayerHandle>,
}
impl BlockInventory {
    pub fn new(kind: InventoryKind) -> BlockInventory {
        BlockInventory {
            kind,
            inventory: Inventory::new(kind.num_slots()),
            viewers: FxHashMap::default(),
        }
    }

    pub(crate) fn from_slots(kind: InventoryKind, slots: Vec<Option<ItemStack>>) -> Self {
        BlockInventory {
            kind,
            inventory: Inventory::from_slots(slots, kind.num_slots()),
            viewers: FxHashMap::default(),
        }
    }

    pub fn kind(&self) -> InventoryKind {
        self.kind
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn is_viewed_by(&self, entity_id: EntityId) -> bool {
        self.viewers.contains_key(&entity_id)
    }

    pub(crate) fn open(&mut self, block: BlockCoordinate, player: &PlayerHandle, outbox: &mut Outbox) {
        self.viewers.insert(player.entity_id(), player.clone());
        outbox.send(
            player,
            PlayerEvent::InventorySubscribed {
                block,
                kind: self.kind,
                slots: self.inventory.slots().to_vec(),
            },
        );
    }

    /// Removes a viewer at its own request; nothing is sent back.
    pub(crate) fn close(&mut self, entity_id: EntityId) -> bool {
        self.viewers.remove(&entity_id).is_some()
    }

    /// Closes the window of a viewer that can no longer see this block.
    pub(crate) fn evict_viewer(
        &mut self,
        block: BlockCoordinate,
        entity_id: EntityId,
        outbox: &mut Outbox,
    ) {
        if let Some(player) = self.viewers.remove(&entity_id) {
            outbox.send(&player, PlayerEvent::InventoryUnsubscribed { block });
        }
    }

    pub(crate) fn evict_all(&mut self, block: BlockCoordinate, outbox: &mut Outbox) {
        for (_, player) in self.viewers.drain() {
            outbox.send(&player, PlayerEvent::InventoryUnsubscribed { block });
        }
    }

    pub(crate) fn click(
        &mut self,
        block: BlockCoordinate,
        player: &PlayerHandle,
        click: InventoryClick,
        outbox: &mut Outbox,
    ) {
        let mut cursor = click.cursor;
        let accepted = if !self.is_viewed_by(player.entity_id()) {
            tracing::debug!(
                "{} clicked {:?} without having it open",
                player.name(),
                block
            );
            false
        } else {
            match self.inventory.click(click.slot, &mut cursor, click.right_click) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("Rejecting click from {}: {e}", player.name());
                    false
                }
            }
        };
        if accepted {
            let stack = self.inventory.get(click.slot);
            for viewer in self.viewers.values() {
                outbox.send(
                    viewer,
                    PlayerEvent::InventorySlotUpdate {
                        block,
                        slot: click.slot,
                        stack,
                    },
                );
            }
        }
        outbox.send_items(player, PlayerEvent::CursorUpdate { cursor }, block.center());
        outbox.send(
            player,
            PlayerEvent::TransactionComplete {
                window_id: click.window_id,
                transaction_id: click.transaction_id,
                accepted,
            },
        );
    }

    /// Closes every window and hands back the contents, for when the block is destroyed.
    pub(crate) fn break_open(mut self, block: BlockCoordinate, outbox: &mut Outbox) -> Vec<ItemStack> {
        self.evict_all(block, outbox);
        self.inventory.drain()
    }
}

/// Turns down a click on an inventory that isn't there any more. The cursor goes back untouched.
pub(crate) fn reject_click(
    player: &PlayerHandle,
    block: BlockCoordinate,
    click: InventoryClick,
    outbox: &mut Outbox,
) {
    outbox.send_items(
        player,
        PlayerEvent::CursorUpdate {
            cursor: click.cursor,
        },
        block.center(),
    );
    outbox.send(
        player,
        PlayerEvent::TransactionComplete {
            window_id: click.window_id,
            transaction_id: click.transaction_id,
            accepted: false,
        },
    );
}
