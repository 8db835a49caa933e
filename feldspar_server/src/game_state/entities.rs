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

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Identifies any dynamic object in the world (player or dropped item). Unique while allocated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);
impl Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}
impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("all {0} entity ids are in use")]
    IdSpaceExhausted(u64),
}

struct EntityAllocation {
    next: u32,
    allocated: FxHashSet<u32>,
}

/// Hands out entity ids. This is the only lock shared by every shard and every session, so it is
/// only ever held for the duration of a single allocation or release.
pub struct EntityManager {
    first: u32,
    last: u32,
    state: Mutex<EntityAllocation>,
}
impl EntityManager {
    /// Ids start at 1; 0 is never handed out.
    pub fn new() -> EntityManager {
        Self::with_id_range(1, u32::MAX)
    }

    /// Restricts allocation to `first..=last`.
    pub fn with_id_range(first: u32, last: u32) -> EntityManager {
        assert!(first <= last, "empty entity id range");
        EntityManager {
            first,
            last,
            state: Mutex::new(EntityAllocation {
                next: first,
                allocated: FxHashSet::default(),
            }),
        }
    }

    /// Returns an id that is not currently in use. The counter advances monotonically and wraps;
    /// after wrapping, ids still in use are skipped by probing forward.
    pub fn new_id(&self) -> Result<EntityId, EntityError> {
        let mut state = self.state.lock();
        let capacity = (self.last - self.first) as u64 + 1;
        if state.allocated.len() as u64 >= capacity {
            return Err(EntityError::IdSpaceExhausted(capacity));
        }
        let start = state.next;
        let mut candidate = start;
        loop {
            let following = if candidate == self.last {
                self.first
            } else {
                candidate + 1
            };
            if state.allocated.insert(candidate) {
                state.next = following;
                return Ok(EntityId(candidate));
            }
            candidate = following;
            if candidate == start {
                // Unreachable given the capacity check, but never loop forever
                return Err(EntityError::IdSpaceExhausted(capacity));
            }
        }
    }

    /// Frees an id for reuse. Releasing an id that isn't allocated is logged and ignored.
    pub fn release(&self, id: EntityId) {
        if !self.state.lock().allocated.remove(&id.0) {
            tracing::warn!("Released entity id {:?} that was not allocated", id);
        }
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().allocated.len()
    }
}
impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn sequential_ids_are_distinct() {
        let entities = EntityManager::new();
        let ids: FxHashSet<_> = (0..1000).map(|_| entities.new_id().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(!ids.contains(&EntityId(0)));
    }

    #[test]
    fn released_ids_are_reused_after_wraparound() {
        let entities = EntityManager::with_id_range(1, 4);
        let ids: Vec<_> = (0..4).map(|_| entities.new_id().unwrap()).collect();
        assert_eq!(
            ids,
            vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4)]
        );
        assert_eq!(entities.new_id(), Err(EntityError::IdSpaceExhausted(4)));

        entities.release(EntityId(2));
        assert_eq!(entities.new_id(), Ok(EntityId(2)));
        assert!(entities.new_id().is_err());

        entities.release(EntityId(4));
        entities.release(EntityId(1));
        // The counter continues after 2, so 4 comes before 1
        assert_eq!(entities.new_id(), Ok(EntityId(4)));
        assert_eq!(entities.new_id(), Ok(EntityId(1)));
    }

    #[test]
    fn live_ids_never_collide_across_threads() {
        let entities = Arc::new(EntityManager::with_id_range(1, 10_000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let entities = entities.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    for i in 0..500 {
                        mine.push(entities.new_id().unwrap());
                        if i % 3 == 0 {
                            entities.release(mine.swap_remove(0));
                        }
                    }
                    mine
                })
            })
            .collect();
        let mut live = FxHashSet::default();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(live.insert(id), "{id:?} handed out twice");
            }
        }
        assert_eq!(live.len(), entities.live_count());
    }
}
