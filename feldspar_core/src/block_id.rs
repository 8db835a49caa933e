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

use crate::items::ItemTypeId;

/// The type of a block. Paired with a 4-bit metadata value in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u8);
impl BlockId {
    /// Blocks are placed from items that share their numeric ID.
    pub fn as_item(&self) -> ItemTypeId {
        ItemTypeId(self.0 as i16)
    }
}
impl From<u8> for BlockId {
    fn from(value: u8) -> Self {
        BlockId(value)
    }
}
impl From<BlockId> for u8 {
    fn from(value: BlockId) -> Self {
        value.0
    }
}

pub mod well_known {
    use super::BlockId;

    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const GRASS: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const COBBLESTONE: BlockId = BlockId(4);
    pub const PLANKS: BlockId = BlockId(5);
    pub const BEDROCK: BlockId = BlockId(7);
    pub const SAND: BlockId = BlockId(12);
    pub const LOG: BlockId = BlockId(17);
    pub const CHEST: BlockId = BlockId(54);
    pub const WORKBENCH: BlockId = BlockId(58);
    pub const FURNACE: BlockId = BlockId(61);
}
