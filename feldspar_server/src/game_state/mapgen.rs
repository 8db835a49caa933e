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

use feldspar_core::{
    block_id::{well_known, BlockId},
    constants::{CHUNK_HEIGHT, CHUNK_SIZE},
    coordinates::{ChunkCoordinate, ChunkOffset},
};

use super::chunk::MapChunk;

pub trait MapgenInterface: Send + Sync {
    /// Fills a chunk that has never been stored before. `chunk` starts out as all air.
    ///
    /// Called on the shard that owns the chunk, so implementations should be quick and must not
    /// block.
    fn fill_chunk(&self, coord: ChunkCoordinate, chunk: &mut MapChunk);
}

/// Endless flat terrain: bedrock at the bottom, then stone, three layers of dirt and a grass top.
pub struct FlatMapgen {
    ground_height: u8,
}
impl FlatMapgen {
    /// `ground_height` is the first air layer; it's clamped so that every layer fits.
    pub fn new(ground_height: u8) -> FlatMapgen {
        FlatMapgen {
            ground_height: ground_height.clamp(5, (CHUNK_HEIGHT - 1) as u8),
        }
    }

    pub fn ground_height(&self) -> u8 {
        self.ground_height
    }

    fn block_at(&self, y: u8) -> BlockId {
        let top = self.ground_height - 1;
        match y {
            0 => well_known::BEDROCK,
            y if y == top => well_known::GRASS,
            y if y + 3 >= top && y < top => well_known::DIRT,
            y if y < top => well_known::STONE,
            _ => well_known::AIR,
        }
    }
}
impl Default for FlatMapgen {
    fn default() -> Self {
        Self::new(64)
    }
}
impl MapgenInterface for FlatMapgen {
    fn fill_chunk(&self, _coord: ChunkCoordinate, chunk: &mut MapChunk) {
        for y in 0..self.ground_height {
            let block = self.block_at(y);
            for x in 0..CHUNK_SIZE as u8 {
                for z in 0..CHUNK_SIZE as u8 {
                    chunk.set_block(ChunkOffset::new(x, y, z), block, 0);
                }
            }
        }
    }
}
