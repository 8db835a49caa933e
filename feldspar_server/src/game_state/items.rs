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

use cgmath::Vector3;
use feldspar_core::{
    coordinates::BlockCoordinate,
    items::ItemStack,
    protocol::game_rpc::{self as rpc, server_message, ServerMessage},
};

use super::entities::EntityId;

/// Players within this distance of an item get offered it.
pub const PICKUP_RANGE: f64 = 1.5;
/// Freshly dropped items can't be picked up for this many ticks.
pub const PICKUP_DELAY_TICKS: u32 = 10;
/// An item is offered to the same players at most this often.
pub const OFFER_INTERVAL_TICKS: u64 = 20;

const GRAVITY: f64 = 0.04;
const TERMINAL_VELOCITY: f64 = -1.0;
// Keeps an item resting exactly on a block face from seeing the block it rests on as the one
// it's inside of
const EPSILON: f64 = 1e-6;

/// A stack lying in (or falling through) the world.
#[derive(Clone, Debug)]
pub struct ItemEntity {
    pub id: EntityId,
    pub stack: ItemStack,
    pub position: Vector3<f64>,
    vertical_velocity: f64,
    pickup_delay: u32,
    last_offer: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemMotion {
    Resting,
    Moved,
    FellOutOfWorld,
}

impl ItemEntity {
    pub fn new(id: EntityId, stack: ItemStack, position: Vector3<f64>) -> ItemEntity {
        ItemEntity {
            id,
            stack,
            position,
            vertical_velocity: 0.0,
            pickup_delay: PICKUP_DELAY_TICKS,
            last_offer: None,
        }
    }

    /// Items loaded from storage can be picked up immediately.
    pub(crate) fn restored(id: EntityId, stack: ItemStack, position: Vector3<f64>) -> ItemEntity {
        ItemEntity {
            pickup_delay: 0,
            ..Self::new(id, stack, position)
        }
    }

    pub fn spawn_message(&self) -> ServerMessage {
        ServerMessage::new(server_message::Payload::SpawnItem(rpc::SpawnItem {
            entity_id: self.id.0,
            item: Some(self.stack.into()),
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
        }))
    }

    pub fn teleport_message(&self) -> ServerMessage {
        ServerMessage::new(server_message::Payload::EntityTeleport(
            rpc::EntityTeleport {
                entity_id: self.id.0,
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
                yaw: 0.0,
                pitch: 0.0,
            },
        ))
    }

    /// Advances one tick of gravity. `is_solid` is asked about blocks directly below the item.
    pub(crate) fn step(&mut self, is_solid: impl Fn(BlockCoordinate) -> bool) -> ItemMotion {
        self.pickup_delay = self.pickup_delay.saturating_sub(1);
        let x = self.position.x.floor() as i32;
        let z = self.position.z.floor() as i32;
        let top = (self.position.y - EPSILON).floor() as i32;
        if self.vertical_velocity == 0.0 && is_solid(BlockCoordinate::new(x, top, z)) {
            return ItemMotion::Resting;
        }
        self.vertical_velocity = (self.vertical_velocity - GRAVITY).max(TERMINAL_VELOCITY);
        let new_y = self.position.y + self.vertical_velocity;
        let bottom = new_y.floor() as i32;
        for y in (bottom..=top).rev() {
            if is_solid(BlockCoordinate::new(x, y, z)) {
                self.position.y = (y + 1) as f64;
                self.vertical_velocity = 0.0;
                return ItemMotion::Moved;
            }
        }
        self.position.y = new_y;
        if new_y < 0.0 {
            ItemMotion::FellOutOfWorld
        } else {
            ItemMotion::Moved
        }
    }

    /// Whether the item should be offered to a player standing at `player` on tick `tick`.
    pub(crate) fn should_offer(&self, player: Vector3<f64>, tick: u64) -> bool {
        use cgmath::InnerSpace;
        if self.pickup_delay > 0 {
            return false;
        }
        if self
            .last_offer
            .is_some_and(|last| tick.saturating_sub(last) < OFFER_INTERVAL_TICKS)
        {
            return false;
        }
        (self.position - player).magnitude() <= PICKUP_RANGE
    }

    pub(crate) fn mark_offered(&mut self, tick: u64) {
        self.last_offer = Some(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::vec3;
    use feldspar_core::block_id::well_known::DIRT;

    fn item_at(y: f64) -> ItemEntity {
        ItemEntity::new(EntityId(1), ItemStack::of_block(DIRT, 1), vec3(0.5, y, 0.5))
    }

    #[test]
    fn falls_and_lands_on_floor() {
        let mut item = item_at(10.5);
        let floor = |c: BlockCoordinate| c.y <= 4;
        let mut steps = 0;
        while item.step(floor) == ItemMotion::Moved {
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(item.position.y, 5.0);
        assert_eq!(item.step(floor), ItemMotion::Resting);
    }

    #[test]
    fn fast_items_do_not_tunnel() {
        let mut item = item_at(100.0);
        item.vertical_velocity = TERMINAL_VELOCITY;
        // A single-block platform at y=99
        assert_eq!(item.step(|c| c.y == 99), ItemMotion::Moved);
        assert_eq!(item.position.y, 100.0);
    }

    #[test]
    fn falls_out_of_world() {
        let mut item = item_at(0.5);
        let mut motion = ItemMotion::Moved;
        for _ in 0..10 {
            motion = item.step(|_| false);
            if motion != ItemMotion::Moved {
                break;
            }
        }
        assert_eq!(motion, ItemMotion::FellOutOfWorld);
    }

    #[test]
    fn offers_respect_delay_and_range() {
        let mut item = item_at(5.0);
        let player = vec3(1.0, 5.0, 1.0);
        assert!(!item.should_offer(player, 0));
        for _ in 0..PICKUP_DELAY_TICKS {
            item.step(|c| c.y <= 4);
        }
        assert!(item.should_offer(player, 20));
        item.mark_offered(20);
        assert!(!item.should_offer(player, 21));
        assert!(item.should_offer(player, 40));
        assert!(!item.should_offer(vec3(5.0, 5.0, 5.0), 40));
    }
}
