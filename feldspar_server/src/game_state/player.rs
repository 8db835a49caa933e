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

use std::{
    collections::{hash_map::Entry, HashMap},
    ops::Deref,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use cgmath::Vector3;
use feldspar_core::{
    coordinates::{BlockCoordinate, ChunkCoordinate, PlayerPosition},
    items::{slot_from_wire, slot_to_wire, ItemStack},
    protocol::{game_rpc::ServerMessage, players::StoredPlayer},
};
use parking_lot::Mutex;
use prost::{bytes::Bytes, Message};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::{
    database::{GameDatabase, KeySpace},
    network_server::codec::encode_message,
};

use super::{
    entities::EntityId,
    inventory::{Inventory, InventoryKind, PLAYER_INVENTORY_SIZE},
};

/// Notifications a shard sends back to a player while (or after) handling one of its requests.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    /// An already-encoded server message to forward to the client as-is.
    Transmit(Bytes),
    InventorySubscribed {
        block: BlockCoordinate,
        kind: InventoryKind,
        slots: Vec<Option<ItemStack>>,
    },
    InventorySlotUpdate {
        block: BlockCoordinate,
        slot: usize,
        stack: Option<ItemStack>,
    },
    /// The block inventory window was closed by the shard (block broken, or out of range).
    InventoryUnsubscribed { block: BlockCoordinate },
    /// Returns the cursor stack that travelled with an inventory click.
    CursorUpdate { cursor: Option<ItemStack> },
    TransactionComplete {
        window_id: i32,
        transaction_id: i32,
        accepted: bool,
    },
    /// A dropped item is within reach; the player may ask to take it.
    OfferItem {
        chunk: ChunkCoordinate,
        item: EntityId,
        stack: ItemStack,
    },
    /// Items handed to the player, either picked up or refunded.
    GiveItem { stack: ItemStack },
    /// The player right-clicked a plain block while holding `held`; it should place one item at
    /// `target`.
    PlaceHeldItem {
        target: BlockCoordinate,
        held: ItemStack,
    },
}

/// The reverse channel into one player's session. Cloned freely into chunk subscriber lists.
#[derive(Clone)]
pub struct PlayerHandle {
    entity_id: EntityId,
    name: Arc<str>,
    sender: mpsc::Sender<PlayerEvent>,
}
impl PlayerHandle {
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.name, self.entity_id)
    }
}

/// Creates the bounded event queue for a player session.
pub fn make_player_channel(
    entity_id: EntityId,
    name: &str,
    depth: usize,
) -> (PlayerHandle, mpsc::Receiver<PlayerEvent>) {
    let (sender, receiver) = mpsc::channel(depth);
    (
        PlayerHandle {
            entity_id,
            name: name.into(),
            sender,
        },
        receiver,
    )
}

/// Events produced while a shard command runs. Command handlers are synchronous, so events are
/// collected here and delivered once the command has finished.
#[derive(Default)]
pub struct Outbox {
    pending: Vec<PendingEvent>,
}

struct PendingEvent {
    player: PlayerHandle,
    event: PlayerEvent,
    // Where carried items go back into the world if the player can't take them
    return_to: Option<Vector3<f64>>,
}

/// Items that were on their way to a player who couldn't take them in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ReturnedStack {
    pub stack: ItemStack,
    pub position: Vector3<f64>,
}

impl Outbox {
    pub fn send(&mut self, player: &PlayerHandle, event: PlayerEvent) {
        self.pending.push(PendingEvent {
            player: player.clone(),
            event,
            return_to: None,
        });
    }

    /// Queues an event that carries items. If it can't be delivered, the items are handed back
    /// from [Outbox::deliver] to be dropped at `return_to`.
    pub fn send_items(
        &mut self,
        player: &PlayerHandle,
        event: PlayerEvent,
        return_to: Vector3<f64>,
    ) {
        self.pending.push(PendingEvent {
            player: player.clone(),
            event,
            return_to: Some(return_to),
        });
    }

    pub fn give(&mut self, player: &PlayerHandle, stack: ItemStack, return_to: Vector3<f64>) {
        self.send_items(player, PlayerEvent::GiveItem { stack }, return_to);
    }

    pub fn transmit(&mut self, player: &PlayerHandle, message: &ServerMessage) {
        self.send(player, PlayerEvent::Transmit(encode_message(message)));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Delivers everything, waiting at most `timeout` for room in each player's queue. Events
    /// that don't fit in time are dropped, except that any items they carry are returned.
    pub(crate) async fn deliver(&mut self, timeout: Duration) -> Vec<ReturnedStack> {
        let pending = std::mem::take(&mut self.pending);
        let mut returned = vec![];
        for PendingEvent {
            player,
            event,
            return_to,
        } in pending
        {
            let event = match player.sender.send_timeout(event, timeout).await {
                Ok(()) => continue,
                Err(SendTimeoutError::Timeout(event)) => {
                    tracing::warn!(
                        "Event queue for {:?} stayed full, dropping {}",
                        player,
                        event_name(&event)
                    );
                    event
                }
                Err(SendTimeoutError::Closed(event)) => {
                    tracing::debug!("{:?} has already disconnected", player);
                    event
                }
            };
            let Some(stack) = event.carried_stack() else {
                continue;
            };
            match return_to {
                Some(position) => returned.push(ReturnedStack { stack, position }),
                None => tracing::error!("{:?} never got {:?}; it is lost", player, stack),
            }
        }
        returned
    }
}

impl PlayerEvent {
    /// The items this event hands over to the player, if any.
    pub fn carried_stack(&self) -> Option<ItemStack> {
        match self {
            PlayerEvent::GiveItem { stack } => Some(*stack),
            PlayerEvent::CursorUpdate { cursor } => *cursor,
            _ => None,
        }
    }
}

fn event_name(event: &PlayerEvent) -> &'static str {
    match event {
        PlayerEvent::Transmit(_) => "transmit",
        PlayerEvent::InventorySubscribed { .. } => "inventory subscribed",
        PlayerEvent::InventorySlotUpdate { .. } => "inventory slot update",
        PlayerEvent::InventoryUnsubscribed { .. } => "inventory unsubscribed",
        PlayerEvent::CursorUpdate { .. } => "cursor update",
        PlayerEvent::TransactionComplete { .. } => "transaction",
        PlayerEvent::OfferItem { .. } => "item offer",
        PlayerEvent::GiveItem { .. } => "give item",
        PlayerEvent::PlaceHeldItem { .. } => "place held item",
    }
}

/// Why a login attempt was turned away. The message is shown to the client.
#[derive(Error, Debug)]
pub enum LoginRejected {
    #[error("Invalid username")]
    InvalidName,
    #[error("Unsupported protocol version {0}")]
    ProtocolVersion(u32),
    #[error("{0}")]
    Denied(String),
    #[error("{0} is already connected")]
    AlreadyConnected(String),
    #[error("The server is full")]
    ServerFull,
    #[error("Login failed: {0:#}")]
    Internal(anyhow::Error),
}

pub struct Player {
    name: String,
    pub(crate) state: Mutex<PlayerState>,
}
impl Player {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn last_position(&self) -> PlayerPosition {
        self.state.lock().last_position
    }

    fn to_server_proto(&self) -> StoredPlayer {
        let state = self.state.lock();
        StoredPlayer {
            name: self.name.clone(),
            x: state.last_position.position.x,
            y: state.last_position.position.y,
            z: state.last_position.position.z,
            yaw: state.last_position.yaw,
            pitch: state.last_position.pitch,
            inventory: state
                .inventory
                .slots()
                .iter()
                .map(|s| slot_to_wire(*s))
                .collect(),
        }
    }

    fn from_server_proto(proto: &StoredPlayer) -> Result<Player> {
        let position = PlayerPosition::try_new(proto.x, proto.y, proto.z, proto.yaw, proto.pitch)?;
        let slots = proto
            .inventory
            .iter()
            .map(slot_from_wire)
            .collect::<Result<Vec<_>>>()?;
        Ok(Player {
            name: proto.name.clone(),
            state: Mutex::new(PlayerState {
                last_position: position,
                inventory: Inventory::from_slots(slots, PLAYER_INVENTORY_SIZE),
            }),
        })
    }

    fn new_player(name: &str, spawn: Vector3<f64>) -> Player {
        Player {
            name: name.to_string(),
            state: Mutex::new(PlayerState {
                last_position: PlayerPosition::new(spawn),
                inventory: Inventory::new(PLAYER_INVENTORY_SIZE),
            }),
        }
    }
}

pub(crate) struct PlayerState {
    pub(crate) last_position: PlayerPosition,
    // Main inventory followed by the hotbar
    pub(crate) inventory: Inventory,
}

// Held by the session for as long as the player is logged in. Dropping it writes the player back
// and frees the name for the next login.
pub(crate) struct PlayerContext {
    player: Arc<Player>,
    manager: Arc<PlayerManager>,
}
impl PlayerContext {
    pub(crate) fn update_position(&self, pos: PlayerPosition) {
        self.player.state.lock().last_position = pos;
    }
}
impl Deref for PlayerContext {
    type Target = Player;

    fn deref(&self) -> &Self::Target {
        &self.player
    }
}
impl Drop for PlayerContext {
    fn drop(&mut self) {
        self.manager.drop_disconnect(&self.player.name)
    }
}

/// Tracks which players are logged in and persists their position and inventory.
pub struct PlayerManager {
    db: Arc<dyn GameDatabase>,
    max_players: usize,
    spawn_location: Vector3<f64>,
    active_players: Mutex<HashMap<String, Arc<Player>>>,
}
impl PlayerManager {
    pub(crate) fn new(
        db: Arc<dyn GameDatabase>,
        max_players: usize,
        spawn_location: Vector3<f64>,
    ) -> Arc<PlayerManager> {
        Arc::new(PlayerManager {
            db,
            max_players,
            spawn_location,
            active_players: Mutex::new(HashMap::new()),
        })
    }

    fn db_key(player: &str) -> Vec<u8> {
        KeySpace::Player.make_key(player.as_bytes())
    }

    pub(crate) fn connect(self: &Arc<Self>, name: &str) -> Result<PlayerContext, LoginRejected> {
        let mut lock = self.active_players.lock();
        if lock.contains_key(name) {
            return Err(LoginRejected::AlreadyConnected(name.to_string()));
        }
        if lock.len() >= self.max_players {
            return Err(LoginRejected::ServerFull);
        }
        let stored = self
            .db
            .get(&Self::db_key(name))
            .map_err(LoginRejected::Internal)?;
        let player = match stored {
            Some(bytes) => StoredPlayer::decode(bytes.as_slice())
                .map_err(|e| LoginRejected::Internal(e.into()))
                .and_then(|proto| {
                    Player::from_server_proto(&proto).map_err(LoginRejected::Internal)
                })?,
            None => {
                log::info!("New player {name} joining");
                Player::new_player(name, self.spawn_location)
            }
        };
        let player = Arc::new(player);
        lock.insert(name.to_string(), player.clone());
        Ok(PlayerContext {
            player,
            manager: self.clone(),
        })
    }

    fn drop_disconnect(&self, name: &str) {
        match self.active_players.lock().entry(name.to_string()) {
            Entry::Occupied(entry) => {
                match self.write_back(entry.get()) {
                    Ok(_) => {
                        log::info!("{name} disconnected; data written back")
                    }
                    Err(e) => {
                        log::error!("Writeback for {name} failed: {:?}", e);
                    }
                }
                entry.remove();
            }
            Entry::Vacant(_) => {
                log::error!("Trying to disconnect player {name} but they're not present");
            }
        }
    }

    fn write_back(&self, player: &Player) -> Result<()> {
        self.db.put(
            &Self::db_key(&player.name),
            &player.to_server_proto().encode_to_vec(),
        )
    }

    pub fn connected_count(&self) -> usize {
        self.active_players.lock().len()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.active_players.lock().contains_key(name)
    }

    /// Writes every connected player back to the database.
    pub(crate) fn flush(&self) {
        for (name, player) in self.active_players.lock().iter() {
            if let Err(e) = self.write_back(player) {
                log::error!("Writeback for {name} failed: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemGameDatabase;
    use feldspar_core::block_id::well_known::DIRT;

    fn manager(max_players: usize) -> Arc<PlayerManager> {
        PlayerManager::new(
            Arc::new(InMemGameDatabase::new()),
            max_players,
            cgmath::vec3(0.5, 64.0, 0.5),
        )
    }

    #[test]
    fn duplicate_and_overflow_logins_are_rejected() {
        let players = manager(2);
        let alice = players.connect("alice").unwrap();
        assert!(matches!(
            players.connect("alice"),
            Err(LoginRejected::AlreadyConnected(_))
        ));
        let _bob = players.connect("bob").unwrap();
        assert!(matches!(players.connect("carol"), Err(LoginRejected::ServerFull)));
        drop(alice);
        assert!(!players.is_connected("alice"));
        assert!(players.connect("carol").is_ok());
    }

    #[test]
    fn position_and_inventory_survive_reconnect() {
        let players = manager(4);
        let alice = players.connect("alice").unwrap();
        assert_eq!(alice.last_position().position, cgmath::vec3(0.5, 64.0, 0.5));
        let moved = PlayerPosition::try_new(40.0, 70.0, -3.0, 90.0, 0.0).unwrap();
        alice.update_position(moved);
        alice
            .state
            .lock()
            .inventory
            .put(ItemStack::of_block(DIRT, 12));
        drop(alice);

        let alice = players.connect("alice").unwrap();
        assert_eq!(alice.last_position(), moved);
        assert_eq!(
            alice.state.lock().inventory.get(0),
            Some(ItemStack::of_block(DIRT, 12))
        );
    }

    #[tokio::test]
    async fn outbox_drops_events_for_full_queues() {
        let (handle, mut receiver) = make_player_channel(EntityId(1), "alice", 1);
        let mut outbox = Outbox::default();
        outbox.send(
            &handle,
            PlayerEvent::InventoryUnsubscribed {
                block: BlockCoordinate::new(0, 0, 0),
            },
        );
        outbox.send(
            &handle,
            PlayerEvent::InventoryUnsubscribed {
                block: BlockCoordinate::new(1, 0, 0),
            },
        );
        let returned = outbox.deliver(Duration::from_millis(10)).await;
        assert!(outbox.is_empty());
        assert!(returned.is_empty());
        match receiver.try_recv().unwrap() {
            PlayerEvent::InventoryUnsubscribed { block } => {
                assert_eq!(block, BlockCoordinate::new(0, 0, 0))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn undeliverable_items_are_returned() {
        let (handle, mut receiver) = make_player_channel(EntityId(1), "alice", 1);
        let there = cgmath::vec3(3.5, 60.0, -2.5);
        let mut outbox = Outbox::default();
        outbox.send(
            &handle,
            PlayerEvent::InventoryUnsubscribed {
                block: BlockCoordinate::new(0, 0, 0),
            },
        );
        outbox.give(&handle, ItemStack::of_block(DIRT, 5), there);
        outbox.send_items(
            &handle,
            PlayerEvent::CursorUpdate {
                cursor: Some(ItemStack::of_block(DIRT, 2)),
            },
            there,
        );
        // An empty cursor carries nothing back
        outbox.send_items(&handle, PlayerEvent::CursorUpdate { cursor: None }, there);
        let returned = outbox.deliver(Duration::from_millis(10)).await;
        assert_eq!(
            returned,
            vec![
                ReturnedStack {
                    stack: ItemStack::of_block(DIRT, 5),
                    position: there
                },
                ReturnedStack {
                    stack: ItemStack::of_block(DIRT, 2),
                    position: there
                },
            ]
        );
        assert!(matches!(
            receiver.try_recv(),
            Ok(PlayerEvent::InventoryUnsubscribed { .. })
        ));

        // Same once the player has gone
        drop(receiver);
        outbox.give(&handle, ItemStack::of_block(DIRT, 7), there);
        let returned = outbox.deliver(Duration::from_millis(10)).await;
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].stack.count, 7);
    }
}
