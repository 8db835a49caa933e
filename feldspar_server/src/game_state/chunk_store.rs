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

use std::sync::Arc;

use anyhow::{Context, Result};
use feldspar_core::{coordinates::ChunkCoordinate, protocol::map::StoredChunk};
use integer_encoding::VarInt;
use prost::Message;

use crate::database::{GameDatabase, KeySpace};

use super::{chunk::MapChunk, entities::EntityManager, mapgen::MapgenInterface};

fn chunk_key(coord: ChunkCoordinate) -> Vec<u8> {
    let mut key = coord.x.encode_var_vec();
    key.extend_from_slice(&coord.z.encode_var_vec());
    KeySpace::MapchunkData.make_key(&key)
}

/// Loads chunks from the database, generating any that were never stored, and writes them back.
/// Shared by every shard; each chunk is only ever loaded by the shard that owns it.
pub struct ChunkStore {
    db: Arc<dyn GameDatabase>,
    mapgen: Arc<dyn MapgenInterface>,
}
impl ChunkStore {
    pub fn new(db: Arc<dyn GameDatabase>, mapgen: Arc<dyn MapgenInterface>) -> ChunkStore {
        ChunkStore { db, mapgen }
    }

    pub(crate) fn load(&self, coord: ChunkCoordinate, entities: &EntityManager) -> Result<MapChunk> {
        let _span = tracy_client::span!("load chunk");
        match self.db.get(&chunk_key(coord))? {
            Some(bytes) => {
                let stored = StoredChunk::decode(bytes.as_slice())
                    .with_context(|| format!("Decoding stored {:?}", coord))?;
                MapChunk::from_stored(coord, stored, entities)
            }
            None => {
                let mut chunk = MapChunk::new(coord);
                self.mapgen.fill_chunk(coord, &mut chunk);
                // Generated terrain can be regenerated; it only needs storing once modified
                chunk.mark_clean();
                Ok(chunk)
            }
        }
    }

    /// Writes the chunk back if it changed since it was loaded or last stored.
    pub(crate) fn store(&self, chunk: &mut MapChunk) -> Result<()> {
        if !chunk.is_dirty() {
            return Ok(());
        }
        let _span = tracy_client::span!("store chunk");
        self.db
            .put(&chunk_key(chunk.coord()), &chunk.to_stored().encode_to_vec())
            .with_context(|| format!("Storing {:?}", chunk.coord()))?;
        chunk.mark_clean();
        log::debug!("Stored {:?}", chunk.coord());
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.db.flush()
    }
}
