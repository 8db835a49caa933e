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

use std::time::Duration;

use cgmath::{vec3, Vector3};
use feldspar_core::{
    block_id::well_known::{AIR, CHEST, DIRT, GRASS},
    coordinates::{BlockCoordinate, BlockFace, ChunkCoordinate, ChunkOffset, PlayerPosition, ShardCoordinate},
    items::ItemStack,
    protocol::game_rpc::server_message::Payload,
};
use tokio::sync::{mpsc, oneshot};

use crate::game_state::{
    entities::EntityId,
    inventory::{InventoryClick, InventoryKind},
    player::{make_player_channel, PlayerEvent, PlayerHandle},
    subscriptions::ShardLink,
    GameState,
};
use crate::network_server::codec::decode_server_message;
use crate::settings::ServerSettings;

use super::{testonly_make_gamestate, testonly_make_gamestate_from};

const SURFACE_Y: i32 = 63;

fn player(game_state: &GameState, name: &str) -> (PlayerHandle, mpsc::Receiver<PlayerEvent>) {
    let id = game_state.entities().new_id().unwrap();
    make_player_channel(id, name, 256)
}

/// Waits for an event that `f` accepts, skipping the rest.
async fn expect_event<T>(
    events: &mut mpsc::Receiver<PlayerEvent>,
    mut f: impl FnMut(PlayerEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event queue closed");
            if let Some(t) = f(event) {
                return t;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

/// Waits for a transmitted message that `f` accepts.
async fn expect_message<T>(
    events: &mut mpsc::Receiver<PlayerEvent>,
    mut f: impl FnMut(Payload) -> Option<T>,
) -> T {
    expect_event(events, |event| match event {
        PlayerEvent::Transmit(bytes) => decode_server_message(&bytes)
            .ok()
            .and_then(|m| m.payload)
            .and_then(&mut f),
        _ => None,
    })
    .await
}

/// Runs `f` on a shard and returns its result once the shard gets to it.
async fn on_chunk<T: Send + 'static>(
    game_state: &GameState,
    chunk: ChunkCoordinate,
    f: impl FnOnce(crate::game_state::shard::ChunkContext<'_>) -> T + Send + 'static,
) -> T {
    let (tx, rx) = oneshot::channel();
    game_state
        .shards()
        .get(chunk.shard())
        .unwrap()
        .enqueue_on_chunk(chunk, move |ctx| {
            let _ = tx.send(f(ctx));
        })
        .await;
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn subscribing_streams_the_chunk() {
    let game_state = testonly_make_gamestate(2);
    let (handle, mut events) = player(&game_state, "alex");
    let chunk = ChunkCoordinate::new(-3, 20);
    let mut connection = game_state
        .shards()
        .connect(handle, chunk.shard())
        .unwrap();
    assert_eq!(connection.shard(), ShardCoordinate::new(-1, 1));
    connection.subscribe_chunk(chunk).await;
    let data = expect_message(&mut events, |p| match p {
        Payload::ChunkData(data) => Some(data),
        _ => None,
    })
    .await;
    assert_eq!(data.coord.map(ChunkCoordinate::from), Some(chunk));
    assert_eq!(
        data.block_ids[ChunkOffset::new(0, SURFACE_Y as u8, 0).as_index()],
        GRASS.0
    );
    assert_eq!(game_state.shards().shard_count(), 1);
}

#[tokio::test]
async fn shards_start_once() {
    let game_state = testonly_make_gamestate(2);
    let a = game_state.shards().get(ShardCoordinate::new(0, 0)).unwrap();
    let b = game_state.shards().get(ShardCoordinate::new(0, 0)).unwrap();
    let c = game_state.shards().get(ShardCoordinate::new(0, -1)).unwrap();
    assert_eq!(a.coord(), b.coord());
    assert_ne!(a.coord(), c.coord());
    assert_eq!(game_state.shards().shard_count(), 2);
}

#[tokio::test]
async fn a_panicking_request_doesnt_stop_the_shard() {
    let game_state = testonly_make_gamestate(2);
    let shard = game_state.shards().get(ShardCoordinate::new(0, 0)).unwrap();
    shard.enqueue(|_| panic!("request blew up")).await;
    let (tx, rx) = oneshot::channel();
    shard
        .enqueue(move |ctx| {
            let _ = tx.send(ctx.coord());
        })
        .await;
    let coord = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coord, ShardCoordinate::new(0, 0));
}

#[tokio::test]
async fn chunks_outside_the_shard_are_ignored() {
    let game_state = testonly_make_gamestate(2);
    let shard = game_state.shards().get(ShardCoordinate::new(0, 0)).unwrap();
    // Misrouted: chunk 16 belongs to shard 1
    shard
        .enqueue_on_chunk(ChunkCoordinate::new(16, 0), |_| panic!("should not run"))
        .await;
    let (tx, rx) = oneshot::channel();
    shard
        .enqueue(move |ctx| {
            let _ = tx.send(ctx.loaded_chunks());
        })
        .await;
    let loaded = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn presence_is_visible_to_other_subscribers() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(0, 0);
    let (alex, _alex_events) = player(&game_state, "alex");
    let (steve, mut steve_events) = player(&game_state, "steve");
    let alex_id = alex.entity_id();
    let mut alex_link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    let mut steve_link = game_state.shards().connect(steve, chunk.shard()).unwrap();
    steve_link.subscribe_chunk(chunk).await;
    alex_link.subscribe_chunk(chunk).await;
    alex_link
        .add_player_presence(chunk, PlayerPosition::new(vec3(3.5, 64.0, 3.5)))
        .await;

    let spawned = expect_message(&mut steve_events, |p| match p {
        Payload::SpawnPlayer(spawn) => Some(spawn),
        _ => None,
    })
    .await;
    assert_eq!(spawned.entity_id, alex_id.0);
    assert_eq!(spawned.name, "alex");

    alex_link
        .set_player_position_look(chunk, PlayerPosition::new(vec3(4.5, 64.0, 3.5)))
        .await;
    let moved = expect_message(&mut steve_events, |p| match p {
        Payload::EntityTeleport(teleport) => Some(teleport),
        _ => None,
    })
    .await;
    assert_eq!(moved.x, 4.5);

    // Leaving the game takes the player out of every chunk it was subscribed to
    alex_link.disconnect().await;
    let destroyed = expect_message(&mut steve_events, |p| match p {
        Payload::DestroyEntity(destroy) => Some(destroy),
        _ => None,
    })
    .await;
    assert_eq!(destroyed.entity_id, alex_id.0);
    let (present, subscribers) = on_chunk(&game_state, chunk, move |ctx| {
        (ctx.chunk.player(alex_id).is_some(), ctx.chunk.subscriber_count())
    })
    .await;
    assert!(!present);
    assert_eq!(subscribers, 1);
}

#[tokio::test]
async fn multicast_skips_the_sender() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(5, 5);
    let (alex, mut alex_events) = player(&game_state, "alex");
    let (steve, mut steve_events) = player(&game_state, "steve");
    let alex_id = alex.entity_id();
    let mut alex_link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    let mut steve_link = game_state.shards().connect(steve, chunk.shard()).unwrap();
    alex_link.subscribe_chunk(chunk).await;
    steve_link.subscribe_chunk(chunk).await;
    let payload = prost::bytes::Bytes::from_static(b"hello");
    alex_link
        .multicast_to_chunk(chunk, Some(alex_id), payload.clone())
        .await;
    let got = expect_event(&mut steve_events, |e| match e {
        PlayerEvent::Transmit(bytes) if bytes == payload => Some(bytes),
        _ => None,
    })
    .await;
    assert_eq!(got, payload);
    // A marker sent afterwards arrives at alex without the multicast before it
    alex_link
        .multicast_to_chunk(chunk, None, prost::bytes::Bytes::from_static(b"marker"))
        .await;
    let first = expect_event(&mut alex_events, |e| match e {
        PlayerEvent::Transmit(bytes) if bytes.as_ref() == b"hello" || bytes.as_ref() == b"marker" => {
            Some(bytes)
        }
        _ => None,
    })
    .await;
    assert_eq!(first.as_ref(), b"marker");
}

#[tokio::test]
async fn digging_drops_an_item_that_can_be_picked_up() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(0, 0);
    let (alex, mut events) = player(&game_state, "alex");
    let mut link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    link.subscribe_chunk(chunk).await;
    link.add_player_presence(chunk, PlayerPosition::new(vec3(1.5, 64.0, 1.5)))
        .await;

    let target = BlockCoordinate::new(1, SURFACE_Y, 1);
    // Unfinished digs only animate
    link.hit_block(target, false).await;
    link.hit_block(target, true).await;
    let change = expect_message(&mut events, |p| match p {
        Payload::BlockChange(change) => Some(change),
        _ => None,
    })
    .await;
    assert_eq!(change.block_id, AIR.0 as u32);
    let spawned = expect_message(&mut events, |p| match p {
        Payload::SpawnItem(spawn) => Some(spawn),
        _ => None,
    })
    .await;
    assert_eq!(spawned.item.unwrap().item_type, DIRT.0 as i32);

    let (chunk_of_offer, item, stack) = expect_event(&mut events, |e| match e {
        PlayerEvent::OfferItem { chunk, item, stack } => Some((chunk, item, stack)),
        _ => None,
    })
    .await;
    assert_eq!(chunk_of_offer, chunk);
    assert_eq!(item, EntityId(spawned.entity_id));
    assert_eq!(stack, ItemStack::of_block(DIRT, 1));

    link.take_item(chunk, item).await;
    let given = expect_event(&mut events, |e| match e {
        PlayerEvent::GiveItem { stack } => Some(stack),
        _ => None,
    })
    .await;
    assert_eq!(given, ItemStack::of_block(DIRT, 1));
    let remaining = on_chunk(&game_state, chunk, |ctx| ctx.chunk.items().count()).await;
    assert_eq!(remaining, 0);
    // Only the player's own id is still allocated
    assert_eq!(game_state.entities().live_count(), 1);
}

#[tokio::test]
async fn chest_clicks_are_shared_with_viewers() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(0, 0);
    let offset = ChunkOffset::new(2, 64, 2);
    let block = chunk.with_offset(offset);
    on_chunk(&game_state, chunk, move |ctx| {
        ctx.chunk.set_block(offset, CHEST, 0);
        ctx.chunk.create_inventory(offset, InventoryKind::Chest);
    })
    .await;

    let (alex, mut alex_events) = player(&game_state, "alex");
    let (steve, mut steve_events) = player(&game_state, "steve");
    let mut alex_link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    let mut steve_link = game_state.shards().connect(steve, chunk.shard()).unwrap();
    alex_link.subscribe_chunk(chunk).await;
    steve_link.subscribe_chunk(chunk).await;
    alex_link.interact_block(block, BlockFace::Top, None).await;
    steve_link.interact_block(block, BlockFace::Top, None).await;
    for events in [&mut alex_events, &mut steve_events] {
        let (kind, slots) = expect_event(events, |e| match e {
            PlayerEvent::InventorySubscribed { kind, slots, .. } => Some((kind, slots)),
            _ => None,
        })
        .await;
        assert_eq!(kind, InventoryKind::Chest);
        assert_eq!(slots.len(), 27);
    }

    let cobble = ItemStack::of_block(feldspar_core::block_id::well_known::COBBLESTONE, 5);
    alex_link
        .inventory_click(
            block,
            InventoryClick {
                window_id: 3,
                transaction_id: 9,
                slot: 4,
                right_click: false,
                cursor: Some(cobble),
            },
        )
        .await;
    let (slot, stack) = expect_event(&mut steve_events, |e| match e {
        PlayerEvent::InventorySlotUpdate { slot, stack, .. } => Some((slot, stack)),
        _ => None,
    })
    .await;
    assert_eq!((slot, stack), (4, Some(cobble)));
    let cursor = expect_event(&mut alex_events, |e| match e {
        PlayerEvent::CursorUpdate { cursor } => Some(cursor),
        _ => None,
    })
    .await;
    assert_eq!(cursor, None);
    let accepted = expect_event(&mut alex_events, |e| match e {
        PlayerEvent::TransactionComplete {
            window_id,
            transaction_id,
            accepted,
        } => {
            assert_eq!((window_id, transaction_id), (3, 9));
            Some(accepted)
        }
        _ => None,
    })
    .await;
    assert!(accepted);

    // Breaking the chest closes both windows and spills the contents
    alex_link.hit_block(block, true).await;
    for events in [&mut alex_events, &mut steve_events] {
        let closed = expect_event(events, |e| match e {
            PlayerEvent::InventoryUnsubscribed { block } => Some(block),
            _ => None,
        })
        .await;
        assert_eq!(closed, block);
    }
    let stacks: Vec<ItemStack> =
        on_chunk(&game_state, chunk, |ctx| ctx.chunk.items().map(|i| i.stack).collect()).await;
    assert!(stacks.contains(&cobble));
    assert!(stacks.contains(&ItemStack::of_block(CHEST, 1)));
}

#[tokio::test]
async fn clicks_on_missing_inventories_return_the_cursor() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(0, 0);
    let (alex, mut events) = player(&game_state, "alex");
    let mut link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    link.subscribe_chunk(chunk).await;
    let dirt = ItemStack::of_block(DIRT, 2);
    link.inventory_click(
        BlockCoordinate::new(0, 10, 0),
        InventoryClick {
            window_id: 1,
            transaction_id: 1,
            slot: 0,
            right_click: false,
            cursor: Some(dirt),
        },
    )
    .await;
    let cursor = expect_event(&mut events, |e| match e {
        PlayerEvent::CursorUpdate { cursor } => Some(cursor),
        _ => None,
    })
    .await;
    assert_eq!(cursor, Some(dirt));
    let accepted = expect_event(&mut events, |e| match e {
        PlayerEvent::TransactionComplete { accepted, .. } => Some(accepted),
        _ => None,
    })
    .await;
    assert!(!accepted);
}

#[tokio::test]
async fn placing_against_a_block() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(0, 0);
    let (alex, mut events) = player(&game_state, "alex");
    let mut link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    link.subscribe_chunk(chunk).await;
    let dirt = ItemStack::of_block(DIRT, 10);
    let ground = BlockCoordinate::new(6, SURFACE_Y, 6);
    link.interact_block(ground, BlockFace::Top, Some(dirt)).await;
    let (target, held) = expect_event(&mut events, |e| match e {
        PlayerEvent::PlaceHeldItem { target, held } => Some((target, held)),
        _ => None,
    })
    .await;
    assert_eq!(target, BlockCoordinate::new(6, SURFACE_Y + 1, 6));
    assert_eq!(held, dirt);

    link.place_item(target, ItemStack::of_block(DIRT, 1)).await;
    let change = expect_message(&mut events, |p| match p {
        Payload::BlockChange(change) => Some(change),
        _ => None,
    })
    .await;
    assert_eq!(change.block_id, DIRT.0 as u32);

    // The spot is taken now, so the item comes back
    link.place_item(target, ItemStack::of_block(DIRT, 1)).await;
    let refund = expect_event(&mut events, |e| match e {
        PlayerEvent::GiveItem { stack } => Some(stack),
        _ => None,
    })
    .await;
    assert_eq!(refund, ItemStack::of_block(DIRT, 1));
}

#[tokio::test]
async fn drops_outside_the_shard_are_refunded() {
    let game_state = testonly_make_gamestate(2);
    let (alex, mut events) = player(&game_state, "alex");
    let link = game_state
        .shards()
        .connect(alex, ShardCoordinate::new(0, 0))
        .unwrap();
    let dirt = ItemStack::of_block(DIRT, 3);
    link.drop_item(vec3(-10.0, 70.0, 5.0), dirt).await;
    let refund = expect_event(&mut events, |e| match e {
        PlayerEvent::GiveItem { stack } => Some(stack),
        _ => None,
    })
    .await;
    assert_eq!(refund, dirt);
}

#[tokio::test]
async fn shutdown_writes_chunks_back() {
    let game_state = testonly_make_gamestate(2);
    let chunk = ChunkCoordinate::new(-20, 7);
    let offset = ChunkOffset::new(8, 100, 8);
    on_chunk(&game_state, chunk, move |ctx| {
        ctx.chunk.set_block(offset, DIRT, 0)
    })
    .await;
    game_state.shut_down().await.unwrap();
    assert!(game_state.shards().get(chunk.shard()).is_err());

    let services = game_state.shards().services().clone();
    let reloaded = services
        .chunk_store
        .load(chunk, &services.entities)
        .unwrap();
    assert_eq!(reloaded.block(offset), DIRT);
    assert_eq!(reloaded.block(ChunkOffset::new(0, 101, 0)), AIR);
}

#[tokio::test]
async fn idle_chunks_are_evicted() {
    let game_state = testonly_make_gamestate_from(ServerSettings {
        chunk_idle_eviction_secs: 0,
        ..Default::default()
    });
    let chunk = ChunkCoordinate::new(3, 3);
    let shard = game_state.shards().get(chunk.shard()).unwrap();
    on_chunk(&game_state, chunk, |_| ()).await;
    // With no subscribers and no idle allowance, the next tick evicts the chunk
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (tx, rx) = oneshot::channel();
    shard
        .enqueue(move |ctx| {
            let _ = tx.send(ctx.is_loaded(chunk));
        })
        .await;
    assert!(!rx.await.unwrap());
}

async fn items_in_chunk(
    game_state: &GameState,
    chunk: ChunkCoordinate,
) -> Vec<(EntityId, ItemStack, Vector3<f64>)> {
    on_chunk(game_state, chunk, |ctx| {
        ctx.chunk
            .items()
            .map(|i| (i.id, i.stack, i.position))
            .collect()
    })
    .await
}

#[tokio::test]
async fn items_that_cant_be_delivered_go_back_to_the_world() {
    let game_state = testonly_make_gamestate_from(ServerSettings {
        player_event_timeout_ms: 20,
        ..Default::default()
    });
    let chunk = ChunkCoordinate::new(0, 0);
    let spot = vec3(4.5, 64.0, 4.5);
    let dirt = ItemStack::of_block(DIRT, 5);
    let item = on_chunk(&game_state, chunk, move |ctx| {
        ctx.chunk
            .spawn_item(&ctx.services.entities, dirt, spot, ctx.outbox)
            .unwrap()
    })
    .await;

    // Nobody reads this queue, so the chunk data fills it
    let id = game_state.entities().new_id().unwrap();
    let (alex, _stalled) = make_player_channel(id, "alex", 1);
    let mut link = game_state.shards().connect(alex, chunk.shard()).unwrap();
    link.subscribe_chunk(chunk).await;
    link.take_item(chunk, item).await;
    let items = items_in_chunk(&game_state, chunk).await;
    assert_eq!(items.len(), 1);
    let (returned, stack, position) = items[0];
    assert_ne!(returned, item);
    assert_eq!(stack, dirt);
    assert_eq!(position, spot);

    // Same for a player that has already gone
    let id = game_state.entities().new_id().unwrap();
    let (steve, steve_events) = make_player_channel(id, "steve", 16);
    let mut link = game_state.shards().connect(steve, chunk.shard()).unwrap();
    drop(steve_events);
    link.take_item(chunk, returned).await;
    let items = items_in_chunk(&game_state, chunk).await;
    assert_eq!(items.len(), 1);
    assert_ne!(items[0].0, returned);
    assert_eq!(items[0].1, dirt);
    // alex, steve, and the item
    assert_eq!(game_state.entities().live_count(), 3);
}
