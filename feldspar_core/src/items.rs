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

use anyhow::{ensure, Result};

use crate::block_id::BlockId;
use crate::protocol::items::{WireItemSlot, WireItemStack};

pub const MAX_STACK_SIZE: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemTypeId(pub i16);
impl ItemTypeId {
    /// The block placed by this item, if it is a block item.
    pub fn as_block(&self) -> Option<BlockId> {
        u8::try_from(self.0).ok().map(BlockId)
    }
}

/// A non-empty pile of identical items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemStack {
    pub item_type: ItemTypeId,
    pub count: u8,
    pub data: i16,
}
impl ItemStack {
    pub fn new(item_type: ItemTypeId, count: u8, data: i16) -> ItemStack {
        ItemStack {
            item_type,
            count,
            data,
        }
    }
    pub fn of_block(block: BlockId, count: u8) -> ItemStack {
        ItemStack::new(block.as_item(), count, 0)
    }

    /// True if the two stacks hold the same kind of item and could be combined.
    pub fn stacks_with(&self, other: &ItemStack) -> bool {
        self.item_type == other.item_type && self.data == other.data
    }

    pub fn room(&self) -> u8 {
        MAX_STACK_SIZE.saturating_sub(self.count)
    }

    /// Moves as many items as fit from `other` into this stack. Returns whatever is left of
    /// `other`, or None if it was fully absorbed.
    pub fn merge_from(&mut self, other: ItemStack) -> Option<ItemStack> {
        if !self.stacks_with(&other) {
            return Some(other);
        }
        let moved = self.room().min(other.count);
        self.count += moved;
        let remaining = other.count - moved;
        if remaining == 0 {
            None
        } else {
            Some(ItemStack {
                count: remaining,
                ..other
            })
        }
    }

    /// Removes a single item from this stack, returning it. Returns None for the
    /// remaining stack if that was the last item.
    pub fn take_one(self) -> (ItemStack, Option<ItemStack>) {
        let one = ItemStack { count: 1, ..self };
        let rest = if self.count > 1 {
            Some(ItemStack {
                count: self.count - 1,
                ..self
            })
        } else {
            None
        };
        (one, rest)
    }

    /// Splits off the larger half (rounding up) of this stack.
    pub fn split_half(self) -> (ItemStack, Option<ItemStack>) {
        let taken = self.count - self.count / 2;
        let left = self.count / 2;
        let taken_stack = ItemStack {
            count: taken,
            ..self
        };
        let left_stack = if left > 0 {
            Some(ItemStack {
                count: left,
                ..self
            })
        } else {
            None
        };
        (taken_stack, left_stack)
    }
}

impl From<ItemStack> for WireItemStack {
    fn from(value: ItemStack) -> Self {
        WireItemStack {
            item_type: value.item_type.0 as i32,
            count: value.count as u32,
            data: value.data as i32,
        }
    }
}
impl TryFrom<&WireItemStack> for ItemStack {
    type Error = anyhow::Error;

    fn try_from(value: &WireItemStack) -> Result<Self> {
        ensure!(
            value.count > 0 && value.count <= MAX_STACK_SIZE as u32,
            "Bad stack size {}",
            value.count
        );
        Ok(ItemStack {
            item_type: ItemTypeId(i16::try_from(value.item_type)?),
            count: value.count as u8,
            data: i16::try_from(value.data)?,
        })
    }
}

pub fn slot_to_wire(slot: Option<ItemStack>) -> WireItemSlot {
    WireItemSlot {
        stack: slot.map(Into::into),
    }
}
pub fn slot_from_wire(slot: &WireItemSlot) -> Result<Option<ItemStack>> {
    slot.stack.as_ref().map(ItemStack::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_id::well_known::{DIRT, STONE};

    #[test]
    fn merge_respects_stack_limit() {
        let mut a = ItemStack::of_block(DIRT, 60);
        let leftover = a.merge_from(ItemStack::of_block(DIRT, 10));
        assert_eq!(a.count, 64);
        assert_eq!(leftover, Some(ItemStack::of_block(DIRT, 6)));

        let mut b = ItemStack::of_block(DIRT, 1);
        assert_eq!(b.merge_from(ItemStack::of_block(DIRT, 2)), None);
        assert_eq!(b.count, 3);
    }

    #[test]
    fn merge_rejects_other_types() {
        let mut a = ItemStack::of_block(DIRT, 1);
        let other = ItemStack::of_block(STONE, 1);
        assert_eq!(a.merge_from(other), Some(other));
        assert_eq!(a.count, 1);
    }

    #[test]
    fn split_and_take() {
        let (taken, left) = ItemStack::of_block(DIRT, 5).split_half();
        assert_eq!(taken.count, 3);
        assert_eq!(left.unwrap().count, 2);
        let (taken, left) = ItemStack::of_block(DIRT, 1).split_half();
        assert_eq!(taken.count, 1);
        assert!(left.is_none());
        let (one, rest) = ItemStack::of_block(DIRT, 1).take_one();
        assert_eq!(one.count, 1);
        assert!(rest.is_none());
    }

    #[test]
    fn wire_rejects_empty_stacks() {
        let wire = WireItemStack {
            item_type: 3,
            count: 0,
            data: 0,
        };
        assert!(ItemStack::try_from(&wire).is_err());
        let stack = ItemStack::of_block(DIRT, 7);
        assert_eq!(ItemStack::try_from(&WireItemStack::from(stack)).unwrap(), stack);
    }
}
