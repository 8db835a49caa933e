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

use std::fmt::Debug;
use std::hash::{Hash, Hasher};

use crate::constants::{CHUNK_HEIGHT, CHUNK_SIZE, SHARD_SIZE};
use crate::protocol::coordinates::{WireBlockCoordinate, WireChunkCoordinate};
use anyhow::{bail, ensure, Result};
use rustc_hash::FxHasher;

/// A 3D coordinate in the world.
///
/// Note that the impls of PartialOrd and Ord are meant for tiebreaking (e.g. for sorted data structures) and don't
/// have a lot of semantic meaning on their own.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct BlockCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Debug for BlockCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("[{}, {}, {}]", self.x, self.y, self.z))
    }
}
impl BlockCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
    /// The chunk containing this block. Rounds toward negative infinity, so block -1 lives in
    /// chunk -1 rather than chunk 0.
    #[inline]
    pub const fn chunk(&self) -> ChunkCoordinate {
        ChunkCoordinate {
            x: self.x.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }
    /// The offset of this block within its chunk, or None if it is above or below the world.
    #[inline]
    pub fn try_offset(&self) -> Option<ChunkOffset> {
        if !(0..CHUNK_HEIGHT).contains(&self.y) {
            return None;
        }
        Some(ChunkOffset {
            x: self.x.rem_euclid(CHUNK_SIZE) as u8,
            y: self.y as u8,
            z: self.z.rem_euclid(CHUNK_SIZE) as u8,
        })
    }

    pub fn try_delta(&self, x: i32, y: i32, z: i32) -> Option<BlockCoordinate> {
        let x = self.x.checked_add(x)?;
        let y = self.y.checked_add(y)?;
        let z = self.z.checked_add(z)?;

        Some(BlockCoordinate { x, y, z })
    }

    /// The neighboring block across the given face.
    pub fn adjacent(&self, face: BlockFace) -> Option<BlockCoordinate> {
        let (dx, dy, dz) = face.delta();
        self.try_delta(dx, dy, dz)
    }

    /// The position of the middle of this block, in world space.
    pub fn center(&self) -> cgmath::Vector3<f64> {
        cgmath::vec3(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }
}

impl From<BlockCoordinate> for WireBlockCoordinate {
    fn from(value: BlockCoordinate) -> Self {
        WireBlockCoordinate {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }
}
impl From<&WireBlockCoordinate> for BlockCoordinate {
    fn from(value: &WireBlockCoordinate) -> Self {
        BlockCoordinate {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }
}
impl From<WireBlockCoordinate> for BlockCoordinate {
    fn from(value: WireBlockCoordinate) -> Self {
        (&value).into()
    }
}

/// One of the six faces of a block, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockFace {
    Bottom,
    Top,
    North,
    South,
    West,
    East,
}
impl BlockFace {
    pub fn delta(&self) -> (i32, i32, i32) {
        match self {
            BlockFace::Bottom => (0, -1, 0),
            BlockFace::Top => (0, 1, 0),
            BlockFace::North => (0, 0, -1),
            BlockFace::South => (0, 0, 1),
            BlockFace::West => (-1, 0, 0),
            BlockFace::East => (1, 0, 0),
        }
    }
}
impl TryFrom<i32> for BlockFace {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self> {
        Ok(match value {
            0 => BlockFace::Bottom,
            1 => BlockFace::Top,
            2 => BlockFace::North,
            3 => BlockFace::South,
            4 => BlockFace::West,
            5 => BlockFace::East,
            _ => bail!("Invalid block face {value}"),
        })
    }
}

/// Represents an offset of a block within a chunk.
///
/// Indexing keeps a vertical column contiguous, matching the layout of the block arrays
/// sent to clients.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct ChunkOffset {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}
impl ChunkOffset {
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    #[cfg(debug_assertions)]
    #[inline(always)]
    fn debug_check(&self) {
        debug_assert!((self.x as i32) < CHUNK_SIZE);
        debug_assert!((self.y as i32) < CHUNK_HEIGHT);
        debug_assert!((self.z as i32) < CHUNK_SIZE);
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn debug_check(&self) {}

    #[inline]
    pub fn as_index(&self) -> usize {
        self.debug_check();
        let height = CHUNK_HEIGHT as usize;
        let size = CHUNK_SIZE as usize;
        (self.y as usize) + height * ((self.z as usize) + size * (self.x as usize))
    }
    #[inline]
    pub fn from_index(index: usize) -> ChunkOffset {
        assert!(index < BLOCKS_PER_CHUNK);
        let height = CHUNK_HEIGHT as usize;
        let size = CHUNK_SIZE as usize;
        ChunkOffset {
            y: (index % height) as u8,
            z: ((index / height) % size) as u8,
            x: ((index / (height * size)) % size) as u8,
        }
    }
    /// The offset directly below this one, if it is still inside the chunk.
    pub fn below(&self) -> Option<ChunkOffset> {
        self.y.checked_sub(1).map(|y| ChunkOffset { y, ..*self })
    }
}
impl Debug for ChunkOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Δ({}, {}, {})", self.x, self.y, self.z))
    }
}

pub const BLOCKS_PER_CHUNK: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT) as usize;

/// Represents a location of a map chunk (a full-height column of blocks).
///
/// Each coordinate spans 16 blocks, covering the range [chunk_coord.x * 16, chunk_coord.x * 16 + 15].
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub z: i32,
}
impl ChunkCoordinate {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The shard that owns this chunk. Like [BlockCoordinate::chunk], this rounds toward
    /// negative infinity: chunk -1 belongs to shard -1, not shard 0.
    #[inline]
    pub const fn shard(&self) -> ShardCoordinate {
        ShardCoordinate {
            x: self.x.div_euclid(SHARD_SIZE),
            z: self.z.div_euclid(SHARD_SIZE),
        }
    }

    /// Returns a new block coordinate with the given offset within this chunk.
    #[inline]
    pub fn with_offset(&self, offset: ChunkOffset) -> BlockCoordinate {
        offset.debug_check();
        BlockCoordinate {
            x: self.x * CHUNK_SIZE + (offset.x as i32),
            y: offset.y as i32,
            z: self.z * CHUNK_SIZE + (offset.z as i32),
        }
    }

    /// Returns the L-infinity (max distance along both axes) distance between the two coordinates
    pub fn chebyshev_distance(&self, other: ChunkCoordinate) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    /// True if `other` lies in the square of the given radius around this chunk.
    /// A negative radius describes an empty square.
    pub fn is_within(&self, other: ChunkCoordinate, radius: i32) -> bool {
        radius >= 0 && self.chebyshev_distance(other) <= radius as u32
    }

    /// Convenience helper to hash a ChunkCoordinate to a u64.
    /// The result is not guaranteed to be the same between versions or runs,
    /// and hence should not be persisted.
    pub fn hash_u64(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
impl Debug for ChunkCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("chunk[{}, {}]", self.x, self.z))
    }
}

impl From<ChunkCoordinate> for WireChunkCoordinate {
    fn from(value: ChunkCoordinate) -> Self {
        WireChunkCoordinate {
            x: value.x,
            z: value.z,
        }
    }
}
impl From<&WireChunkCoordinate> for ChunkCoordinate {
    fn from(value: &WireChunkCoordinate) -> Self {
        ChunkCoordinate {
            x: value.x,
            z: value.z,
        }
    }
}
impl From<WireChunkCoordinate> for ChunkCoordinate {
    fn from(value: WireChunkCoordinate) -> Self {
        (&value).into()
    }
}

/// Location of a shard: a SHARD_SIZE x SHARD_SIZE square of chunks.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct ShardCoordinate {
    pub x: i32,
    pub z: i32,
}
impl ShardCoordinate {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
    pub fn contains(&self, chunk: ChunkCoordinate) -> bool {
        chunk.shard() == *self
    }
    /// The chunk in the north-west corner of this shard.
    pub fn origin_chunk(&self) -> ChunkCoordinate {
        ChunkCoordinate {
            x: self.x * SHARD_SIZE,
            z: self.z * SHARD_SIZE,
        }
    }
}
impl Debug for ShardCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("shard[{}, {}]", self.x, self.z))
    }
}

/// Where a player is and which way they are looking.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlayerPosition {
    // The position of the player's feet, blocks
    pub position: cgmath::Vector3<f64>,
    // Degrees
    pub yaw: f32,
    pub pitch: f32,
}
impl PlayerPosition {
    pub fn new(position: cgmath::Vector3<f64>) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
    /// Builds a position from untrusted wire values.
    pub fn try_new(x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Result<Self> {
        ensure!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "position contained NaN or inf"
        );
        ensure!(yaw.is_finite() && pitch.is_finite(), "look contained NaN or inf");
        const LIMIT: f64 = (i32::MAX / 2) as f64;
        ensure!(
            x.abs() < LIMIT && y.abs() < LIMIT && z.abs() < LIMIT,
            "position out of bounds"
        );
        Ok(Self {
            position: cgmath::vec3(x, y, z),
            yaw,
            pitch,
        })
    }
    pub fn block(&self) -> BlockCoordinate {
        BlockCoordinate {
            x: self.position.x.floor() as i32,
            y: self.position.y.floor() as i32,
            z: self.position.z.floor() as i32,
        }
    }
    pub fn chunk(&self) -> ChunkCoordinate {
        self.block().chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_of_negative_chunks_rounds_down() {
        assert_eq!(ChunkCoordinate::new(-17, 0).shard(), ShardCoordinate::new(-2, 0));
        assert_eq!(ChunkCoordinate::new(-16, 0).shard(), ShardCoordinate::new(-1, 0));
        assert_eq!(ChunkCoordinate::new(-1, 15).shard(), ShardCoordinate::new(-1, 0));
        assert_eq!(ChunkCoordinate::new(15, 16).shard(), ShardCoordinate::new(0, 1));
    }

    #[test]
    fn block_to_chunk_and_offset() {
        let block = BlockCoordinate::new(-1, 64, 17);
        assert_eq!(block.chunk(), ChunkCoordinate::new(-1, 1));
        let offset = block.try_offset().unwrap();
        assert_eq!(offset, ChunkOffset::new(15, 64, 1));
        assert_eq!(block.chunk().with_offset(offset), block);

        assert!(BlockCoordinate::new(0, -1, 0).try_offset().is_none());
        assert!(BlockCoordinate::new(0, 128, 0).try_offset().is_none());
    }

    #[test]
    fn offset_index_is_dense() {
        for index in [0, 1, 127, 128, 2047, 2048, BLOCKS_PER_CHUNK - 1] {
            assert_eq!(ChunkOffset::from_index(index).as_index(), index);
        }
        assert_eq!(ChunkOffset::new(0, 5, 0).as_index(), 5);
        assert_eq!(ChunkOffset::new(0, 0, 1).as_index(), 128);
        assert_eq!(ChunkOffset::new(1, 0, 0).as_index(), 2048);
    }

    #[test]
    fn player_chunk_floors_negative_positions() {
        let pos = PlayerPosition::new(cgmath::vec3(-0.5, 70.0, 15.99));
        assert_eq!(pos.chunk(), ChunkCoordinate::new(-1, 0));
        assert!(PlayerPosition::try_new(f64::NAN, 0.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn faces_from_wire() {
        assert_eq!(BlockFace::try_from(1).unwrap(), BlockFace::Top);
        assert!(BlockFace::try_from(6).is_err());
        assert_eq!(
            BlockCoordinate::new(3, 4, 5).adjacent(BlockFace::West),
            Some(BlockCoordinate::new(2, 4, 5))
        );
    }
}
