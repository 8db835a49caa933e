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

use anyhow::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub(crate) enum KeySpace {
    /// Map chunks, keyed by the chunk coordinate
    MapchunkData,
    /// Player data (position, inventory)
    Player,
}
impl KeySpace {
    pub(crate) fn make_key(&self, key: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(key.len() + 1);
        result.push(self.identifier());
        result.extend_from_slice(key);
        result
    }

    fn identifier(&self) -> u8 {
        match self {
            KeySpace::MapchunkData => b'm',
            KeySpace::Player => b'P',
        }
    }
}

/// Key-value storage backing the world. Implementations must be safe to call from any shard.
pub trait GameDatabase: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

/// Game database that lives only as long as the process.
pub struct InMemGameDatabase {
    data: Mutex<FxHashMap<Vec<u8>, Vec<u8>>>,
}
impl InMemGameDatabase {
    pub fn new() -> InMemGameDatabase {
        InMemGameDatabase {
            data: FxHashMap::default().into(),
        }
    }
}
impl Default for InMemGameDatabase {
    fn default() -> Self {
        Self::new()
    }
}
impl GameDatabase for InMemGameDatabase {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
