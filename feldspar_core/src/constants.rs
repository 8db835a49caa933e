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

/// Width and depth of a chunk, in blocks.
pub const CHUNK_SIZE: i32 = 16;
/// Height of the world, in blocks. Chunks span the full height.
pub const CHUNK_HEIGHT: i32 = 128;
/// Width and depth of a shard, in chunks.
pub const SHARD_SIZE: i32 = 16;

pub mod animations {
    pub const SWING_ARM: u32 = 1;
}

/// Window IDs with special meaning on the wire.
pub mod windows {
    /// The player's own inventory. Always open.
    pub const PLAYER_INVENTORY: i32 = 0;
    /// Used with slot -1 to address the cursor stack.
    pub const CURSOR: i32 = -1;
}
