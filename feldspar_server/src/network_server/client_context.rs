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
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use cgmath::vec3;
use feldspar_core::{
    coordinates::{BlockCoordinate, BlockFace, PlayerPosition},
    items::{slot_to_wire, ItemStack},
    protocol::game_rpc::{
        client_message, server_message, Animation, ClientMessage, Disconnect, EntityAnimation,
        KeepAlive, LoginAccepted, PositionLook, ServerMessage, SetSlot, Transaction,
        WindowClick, WindowClose, WindowItems, WindowOpen,
    },
};
use futures::{SinkExt, StreamExt};
use prost::bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, error, info, warn};

use crate::{
    game_state::{
        entities::EntityId,
        inventory::{InventoryClick, InventoryKind, HOTBAR_SIZE, HOTBAR_START},
        player::{make_player_channel, LoginRejected, PlayerContext, PlayerEvent, PlayerHandle},
        subscriptions::{ChunkSubscriptions, PlayerShardConnector},
        GameState,
    },
    spawn_async,
};

use super::codec::{decode_client_message, encode_message, new_codec};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const INBOUND_TIMEOUT: Duration = Duration::from_secs(30);
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// A cursor stack that the shard couldn't hand back in this long was dropped at the block.
const REMOTE_CLICK_TIMEOUT: Duration = Duration::from_secs(15);
/// Window 0 is always the player's own inventory.
const PLAYER_WINDOW: i32 = 0;
const MAX_WINDOW_ID: i32 = 100;
/// Clicking outside any window throws the cursor stack.
const OUTSIDE_WINDOW_SLOT: i32 = -999;
/// Thrown items start at about eye level.
const THROW_HEIGHT: f64 = 1.3;

/// Runs one client connection from login to disconnect.
pub(crate) async fn run_session<S>(game_state: Arc<GameState>, stream: S, peer: String) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut inbound = FramedRead::new(read_half, new_codec());
    let mut outbound = FramedWrite::new(write_half, new_codec());

    let login = match tokio::time::timeout(LOGIN_TIMEOUT, inbound.next()).await {
        Err(_) => {
            info!("{peer} didn't log in within {:?}", LOGIN_TIMEOUT);
            return Ok(());
        }
        Ok(None) => {
            debug!("{peer} hung up before logging in");
            return Ok(());
        }
        Ok(Some(frame)) => decode_client_message(&frame?)?,
    };
    let Some(client_message::Payload::Login(login)) = login.payload else {
        send_disconnect(&mut outbound, "Expected a login").await?;
        return Ok(());
    };
    let player_context = match game_state.auth().authenticate(&login) {
        Ok(context) => context,
        Err(e) => {
            info!("Rejected {peer} logging in as {:?}: {e}", login.username);
            send_disconnect(&mut outbound, &e.to_string()).await?;
            return Ok(());
        }
    };
    let entity_id = match game_state.entities().new_id() {
        Ok(id) => id,
        Err(e) => {
            warn!("No entity id for {}: {e}", login.username);
            drop(player_context);
            send_disconnect(&mut outbound, &LoginRejected::ServerFull.to_string()).await?;
            return Ok(());
        }
    };
    info!("{} logged in from {peer} as {:?}", login.username, entity_id);

    let behaviors = game_state.game_behaviors();
    let (frame_sender, frame_receiver) = mpsc::channel(behaviors.player_queue_depth);
    let mut writer = spawn_async(
        &format!("{}_writer", login.username),
        writer_loop(outbound, frame_receiver),
    )?;
    let (handle, mut events) =
        make_player_channel(entity_id, &login.username, behaviors.player_queue_depth);
    let subscriptions = ChunkSubscriptions::new(
        PlayerShardConnector::new(game_state.shards().clone(), handle.clone()),
        behaviors.view_radius,
    );
    let mut session = PlayerSession {
        game_state: game_state.clone(),
        context: player_context,
        handle,
        subscriptions,
        outbound: frame_sender,
        held_slot: 0,
        cursor: None,
        open_window: None,
        last_window_id: 0,
        pending_remote_click: None,
    };
    let result = match session.start().await {
        Ok(()) => session.run(&mut inbound, &mut events).await,
        Err(e) => Err(e),
    };
    session.teardown(events).await;

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!("Writer for {peer} failed: {e:?}"),
        Ok(Err(e)) => error!("Writer for {peer} crashed: {e:?}"),
        Err(_) => {
            warn!("Writer for {peer} didn't drain in time");
            writer.abort();
        }
    }
    result
}

async fn send_disconnect<W>(
    outbound: &mut FramedWrite<W, LengthDelimitedCodec>,
    reason: &str,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    outbound.send(disconnect_message(reason)).await?;
    SinkExt::<Bytes>::close(outbound).await?;
    Ok(())
}

fn disconnect_message(reason: &str) -> Bytes {
    encode_message(&ServerMessage::new(server_message::Payload::Disconnect(
        Disconnect {
            reason: reason.to_string(),
        },
    )))
}

async fn writer_loop<W>(
    mut outbound: FramedWrite<W, LengthDelimitedCodec>,
    mut frames: mpsc::Receiver<Bytes>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        outbound.send(frame).await?;
    }
    SinkExt::<Bytes>::close(&mut outbound).await?;
    Ok(())
}

/// A block inventory the client currently has open.
struct OpenWindow {
    window_id: i32,
    block: BlockCoordinate,
    kind: InventoryKind,
    // Last known contents, so the window can be redrawn when the player's own slots change
    slots: Vec<Option<ItemStack>>,
}

/// State owned by one logged-in player's session task.
struct PlayerSession {
    game_state: Arc<GameState>,
    context: PlayerContext,
    handle: PlayerHandle,
    subscriptions: ChunkSubscriptions<PlayerShardConnector>,
    outbound: mpsc::Sender<Bytes>,
    // Index into the hotbar
    held_slot: usize,
    cursor: Option<ItemStack>,
    open_window: Option<OpenWindow>,
    last_window_id: i32,
    // Set while the cursor stack is in a shard, until the matching CursorUpdate comes back
    pending_remote_click: Option<Instant>,
}
impl PlayerSession {
    fn entity_id(&self) -> EntityId {
        self.handle.entity_id()
    }

    async fn send(&self, message: &ServerMessage) -> Result<()> {
        self.send_bytes(encode_message(message)).await
    }

    async fn send_bytes(&self, frame: Bytes) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| anyhow!("Connection writer for {} has exited", self.context.name()))
    }

    async fn start(&mut self) -> Result<()> {
        let position = self.context.last_position();
        let behaviors = self.game_state.game_behaviors();
        self.send(&ServerMessage::new(server_message::Payload::LoginAccepted(
            LoginAccepted {
                entity_id: self.entity_id().0,
                x: position.position.x,
                y: position.position.y,
                z: position.position.z,
                view_radius: behaviors.view_radius as u32,
            },
        )))
        .await?;
        let chunk = position.chunk();
        self.subscriptions.init(chunk).await?;
        if let Some(link) = self.subscriptions.link_for_chunk(chunk) {
            link.add_player_presence(chunk, position).await;
        }
        self.sync_player_inventory().await
    }

    async fn run<R>(
        &mut self,
        inbound: &mut FramedRead<R, LengthDelimitedCodec>,
        events: &mut mpsc::Receiver<PlayerEvent>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let game_state = self.game_state.clone();
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();
        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    None => {
                        info!("{} disconnected", self.context.name());
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        warn!("Reading from {} failed: {e:?}", self.context.name());
                        return Ok(());
                    }
                    Some(Ok(frame)) => {
                        last_inbound = Instant::now();
                        let result = match decode_client_message(&frame) {
                            Ok(message) => self.handle_message(message).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = result {
                            warn!("{} sent a message that failed: {e:?}", self.context.name());
                        }
                    }
                },
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            warn!("Handling event for {} failed: {e:?}", self.context.name());
                        }
                    }
                    None => bail!("Event queue for {} closed", self.context.name()),
                },
                _ = keepalive.tick() => {
                    self.send(&ServerMessage::new(server_message::Payload::KeepAlive(
                        KeepAlive { id: rand::random() },
                    )))
                    .await?;
                }
                _ = tokio::time::sleep_until(last_inbound + INBOUND_TIMEOUT) => {
                    warn!("{} timed out", self.context.name());
                    self.send_bytes(disconnect_message("Timed out")).await?;
                    return Ok(());
                }
                _ = game_state.await_start_shutdown() => {
                    info!("Game shutting down, disconnecting {}", self.context.name());
                    self.send_bytes(disconnect_message("Server is shutting down")).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_message(&mut self, message: ClientMessage) -> Result<()> {
        let payload = message.payload.context("Empty client message")?;
        match payload {
            client_message::Payload::Login(_) => {
                warn!("{} tried to log in twice", self.context.name());
            }
            client_message::Payload::KeepAlive(_) => {}
            client_message::Payload::PositionLook(position) => {
                self.handle_position(position).await?
            }
            client_message::Payload::Dig(dig) => {
                let target: BlockCoordinate = dig.coord.context("Dig without a target")?.into();
                match self.subscriptions.link_for_chunk(target.chunk()) {
                    Some(link) => link.hit_block(target, dig.finished).await,
                    None => debug!("{} dug out of range at {:?}", self.context.name(), target),
                }
            }
            client_message::Payload::Place(place) => {
                let target: BlockCoordinate =
                    place.coord.context("Place without a target")?.into();
                let face = BlockFace::try_from(place.face)?;
                let held = self.held_stack();
                match self.subscriptions.link_for_chunk(target.chunk()) {
                    Some(link) => link.interact_block(target, face, held).await,
                    None => debug!("{} used out of range at {:?}", self.context.name(), target),
                }
            }
            client_message::Payload::HeldItemChange(change) => {
                let slot = change.slot as usize;
                ensure!(slot < HOTBAR_SIZE, "Hotbar slot {} out of range", slot);
                self.held_slot = slot;
            }
            client_message::Payload::WindowClick(click) => self.handle_window_click(click).await?,
            client_message::Payload::WindowClose(close) => self.handle_window_close(close).await,
            client_message::Payload::DropHeldItem(_) => {
                let thrown = {
                    let mut state = self.context.state.lock();
                    let slot = HOTBAR_START + self.held_slot;
                    match state.inventory.take(slot) {
                        Some(stack) => {
                            let (one, rest) = stack.take_one();
                            state.inventory.set(slot, rest)?;
                            Some(one)
                        }
                        None => None,
                    }
                };
                if let Some(one) = thrown {
                    self.throw(one).await?;
                    self.sync_player_inventory().await?;
                }
            }
            client_message::Payload::Animation(Animation { kind }) => {
                let payload = encode_message(&ServerMessage::new(
                    server_message::Payload::EntityAnimation(EntityAnimation {
                        entity_id: self.entity_id().0,
                        kind,
                    }),
                ));
                let chunk = self.context.last_position().chunk();
                let entity_id = self.entity_id();
                if let Some(link) = self.subscriptions.link_for_chunk(chunk) {
                    link.multicast_to_chunk(chunk, Some(entity_id), payload).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_position(&mut self, update: PositionLook) -> Result<()> {
        let position =
            PlayerPosition::try_new(update.x, update.y, update.z, update.yaw, update.pitch)?;
        let old_chunk = self.context.last_position().chunk();
        let new_chunk = position.chunk();
        self.context.update_position(position);
        if old_chunk == new_chunk {
            if let Some(link) = self.subscriptions.link_for_chunk(new_chunk) {
                link.set_player_position_look(new_chunk, position).await;
            }
            return Ok(());
        }
        if let Some(link) = self.subscriptions.link_for_chunk(old_chunk) {
            link.remove_player_presence(old_chunk).await;
        }
        self.subscriptions.move_to(new_chunk).await?;
        if let Some(link) = self.subscriptions.link_for_chunk(new_chunk) {
            link.add_player_presence(new_chunk, position).await;
        }
        Ok(())
    }

    fn held_stack(&self) -> Option<ItemStack> {
        self.context
            .state
            .lock()
            .inventory
            .get(HOTBAR_START + self.held_slot)
    }

    async fn handle_window_click(&mut self, click: WindowClick) -> Result<()> {
        if self.awaiting_cursor() {
            // The cursor is still out with a shard
            return self.reject_click(&click).await;
        }
        if click.slot == OUTSIDE_WINDOW_SLOT {
            return self.throw_cursor(&click).await;
        }
        let Ok(slot) = usize::try_from(click.slot) else {
            return self.reject_click(&click).await;
        };
        if click.window_id == PLAYER_WINDOW {
            return self.local_click(&click, slot).await;
        }
        let Some(window) = self
            .open_window
            .as_ref()
            .filter(|w| w.window_id == click.window_id)
        else {
            return self.reject_click(&click).await;
        };
        let (block, num_slots) = (window.block, window.kind.num_slots());
        if slot >= num_slots {
            return self.local_click(&click, slot - num_slots).await;
        }
        let request = InventoryClick {
            window_id: click.window_id,
            transaction_id: click.transaction_id,
            slot,
            right_click: click.right_click,
            cursor: self.cursor.take(),
        };
        match self.subscriptions.link_for_chunk(block.chunk()) {
            Some(link) => {
                link.inventory_click(block, request).await;
                self.pending_remote_click = Some(Instant::now());
                Ok(())
            }
            None => {
                self.cursor = request.cursor;
                self.reject_click(&click).await
            }
        }
    }

    fn awaiting_cursor(&mut self) -> bool {
        match self.pending_remote_click {
            Some(sent) if sent.elapsed() > REMOTE_CLICK_TIMEOUT => {
                warn!("{}'s cursor never came back from a click", self.context.name());
                self.pending_remote_click = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    async fn local_click(&mut self, click: &WindowClick, slot: usize) -> Result<()> {
        let result = self
            .context
            .state
            .lock()
            .inventory
            .click(slot, &mut self.cursor, click.right_click);
        match result {
            Ok(()) => {
                self.send_transaction(click, true).await?;
                self.sync_player_inventory().await
            }
            Err(e) => {
                debug!("{} clicked badly: {e}", self.context.name());
                self.reject_click(click).await
            }
        }
    }

    async fn throw_cursor(&mut self, click: &WindowClick) -> Result<()> {
        let Some(cursor) = self.cursor.take() else {
            return self.send_transaction(click, true).await;
        };
        let thrown = if click.right_click {
            let (one, rest) = cursor.take_one();
            self.cursor = rest;
            one
        } else {
            cursor
        };
        self.throw(thrown).await?;
        self.send_transaction(click, true).await?;
        self.send_cursor().await
    }

    // Resyncs the client after a click it already applied locally.
    async fn reject_click(&mut self, click: &WindowClick) -> Result<()> {
        self.send_transaction(click, false).await?;
        self.sync_player_inventory().await?;
        if self.pending_remote_click.is_none() {
            self.send_cursor().await?;
        }
        Ok(())
    }

    async fn send_transaction(&self, click: &WindowClick, accepted: bool) -> Result<()> {
        self.send(&ServerMessage::new(server_message::Payload::Transaction(
            Transaction {
                window_id: click.window_id,
                transaction_id: click.transaction_id,
                accepted,
            },
        )))
        .await
    }

    async fn send_cursor(&self) -> Result<()> {
        self.send(&ServerMessage::new(server_message::Payload::SetSlot(SetSlot {
            window_id: -1,
            slot: -1,
            stack: self.cursor.map(Into::into),
        })))
        .await
    }

    async fn handle_window_close(&mut self, close: WindowClose) {
        if close.window_id == PLAYER_WINDOW {
            return;
        }
        match self.open_window.take() {
            Some(window) if window.window_id == close.window_id => {
                if let Some(link) = self.subscriptions.link_for_chunk(window.block.chunk()) {
                    link.inventory_unsubscribe(window.block).await;
                }
            }
            other => self.open_window = other,
        }
    }

    /// Drops `stack` in front of the player.
    async fn throw(&mut self, stack: ItemStack) -> Result<()> {
        let position = self.context.last_position().position + vec3(0.0, THROW_HEIGHT, 0.0);
        let chunk = BlockCoordinate::new(
            position.x.floor() as i32,
            position.y.floor() as i32,
            position.z.floor() as i32,
        )
        .chunk();
        match self.subscriptions.link_for_chunk(chunk) {
            Some(link) => link.drop_item(position, stack).await,
            None => {
                // Not subscribed to our own chunk; keep the item
                if let Some(lost) = self.give(stack) {
                    warn!("{} has nowhere to put {:?}", self.context.name(), lost);
                }
            }
        }
        Ok(())
    }

    async fn keep_or_throw(&mut self, stack: ItemStack) {
        if let Some(leftover) = self.give(stack) {
            if let Err(e) = self.throw(leftover).await {
                warn!("{} couldn't throw {:?}: {e:?}", self.context.name(), leftover);
            }
        }
    }

    /// Puts `stack` into the inventory. Returns what didn't fit.
    fn give(&mut self, stack: ItemStack) -> Option<ItemStack> {
        self.context.state.lock().inventory.put(stack)
    }

    /// Redraws the player's inventory, and the player half of any open block window.
    async fn sync_player_inventory(&self) -> Result<()> {
        let player_slots: Vec<_> = self
            .context
            .state
            .lock()
            .inventory
            .slots()
            .iter()
            .map(|s| slot_to_wire(*s))
            .collect();
        if let Some(window) = &self.open_window {
            let mut slots: Vec<_> = window.slots.iter().map(|s| slot_to_wire(*s)).collect();
            slots.extend(player_slots.iter().cloned());
            self.send(&ServerMessage::new(server_message::Payload::WindowItems(
                WindowItems {
                    window_id: window.window_id,
                    slots,
                },
            )))
            .await?;
        }
        self.send(&ServerMessage::new(server_message::Payload::WindowItems(
            WindowItems {
                window_id: PLAYER_WINDOW,
                slots: player_slots,
            },
        )))
        .await
    }

    async fn handle_event(&mut self, event: PlayerEvent) -> Result<()> {
        match event {
            PlayerEvent::Transmit(frame) => self.send_bytes(frame).await?,
            PlayerEvent::InventorySubscribed { block, kind, slots } => {
                if let Some(previous) = self.open_window.take() {
                    if previous.block != block {
                        if let Some(link) = self.subscriptions.link_for_chunk(previous.block.chunk()) {
                            link.inventory_unsubscribe(previous.block).await;
                        }
                    }
                    self.send(&ServerMessage::new(server_message::Payload::WindowClose(
                        WindowClose {
                            window_id: previous.window_id,
                        },
                    )))
                    .await?;
                }
                self.last_window_id = self.last_window_id % MAX_WINDOW_ID + 1;
                let window_id = self.last_window_id;
                self.send(&ServerMessage::new(server_message::Payload::WindowOpen(
                    WindowOpen {
                        window_id,
                        kind: kind.to_wire(),
                        title: kind.title().to_string(),
                        num_slots: kind.num_slots() as u32,
                    },
                )))
                .await?;
                self.open_window = Some(OpenWindow {
                    window_id,
                    block,
                    kind,
                    slots,
                });
                self.sync_player_inventory().await?;
            }
            PlayerEvent::InventorySlotUpdate { block, slot, stack } => {
                let Some(window) = self.open_window.as_mut().filter(|w| w.block == block) else {
                    return Ok(());
                };
                if let Some(cached) = window.slots.get_mut(slot) {
                    *cached = stack;
                }
                let window_id = window.window_id;
                self.send(&ServerMessage::new(server_message::Payload::SetSlot(SetSlot {
                    window_id,
                    slot: slot as i32,
                    stack: stack.map(Into::into),
                })))
                .await?;
            }
            PlayerEvent::InventoryUnsubscribed { block } => {
                match self.open_window.take() {
                    Some(window) if window.block == block => {
                        self.send(&ServerMessage::new(server_message::Payload::WindowClose(
                            WindowClose {
                                window_id: window.window_id,
                            },
                        )))
                        .await?;
                    }
                    other => self.open_window = other,
                }
            }
            PlayerEvent::CursorUpdate { cursor } => {
                self.pending_remote_click = None;
                if let Some(stray) = std::mem::replace(&mut self.cursor, cursor) {
                    // Nothing should have reached the cursor while it was away
                    warn!("{} had {:?} on the cursor during a click", self.context.name(), stray);
                    if let Some(leftover) = self.give(stray) {
                        self.throw(leftover).await?;
                    }
                    self.sync_player_inventory().await?;
                }
                self.send_cursor().await?;
            }
            PlayerEvent::TransactionComplete {
                window_id,
                transaction_id,
                accepted,
            } => {
                self.send(&ServerMessage::new(server_message::Payload::Transaction(
                    Transaction {
                        window_id,
                        transaction_id,
                        accepted,
                    },
                )))
                .await?;
            }
            PlayerEvent::OfferItem { chunk, item, stack } => {
                let fits = self.context.state.lock().inventory.can_accept(&stack);
                if fits {
                    if let Some(link) = self.subscriptions.link_for_chunk(chunk) {
                        link.take_item(chunk, item).await;
                    }
                }
            }
            PlayerEvent::GiveItem { stack } => {
                if let Some(leftover) = self.give(stack) {
                    self.throw(leftover).await?;
                }
                self.sync_player_inventory().await?;
            }
            PlayerEvent::PlaceHeldItem { target, held } => {
                let slot = HOTBAR_START + self.held_slot;
                let one = {
                    let mut state = self.context.state.lock();
                    match state.inventory.take(slot) {
                        Some(stack) if stack.stacks_with(&held) => {
                            let (one, rest) = stack.take_one();
                            state.inventory.set(slot, rest)?;
                            Some(one)
                        }
                        // Switched items since the click
                        other => {
                            state.inventory.set(slot, other)?;
                            None
                        }
                    }
                };
                if let Some(one) = one {
                    match self.subscriptions.link_for_chunk(target.chunk()) {
                        Some(link) => link.place_item(target, one).await,
                        None => {
                            self.give(one);
                        }
                    }
                    self.sync_player_inventory().await?;
                }
            }
        }
        Ok(())
    }

    // Once the event queue is closed, shards drop anything they still send us back into the
    // world themselves.
    async fn teardown(mut self, mut events: mpsc::Receiver<PlayerEvent>) {
        events.close();
        while let Ok(event) = events.try_recv() {
            match event {
                PlayerEvent::GiveItem { stack } => self.keep_or_throw(stack).await,
                PlayerEvent::CursorUpdate { cursor } => {
                    self.pending_remote_click = None;
                    if let Some(cursor) = cursor {
                        self.keep_or_throw(cursor).await;
                    }
                }
                _ => {}
            }
        }
        if self.pending_remote_click.is_some() {
            info!(
                "{} disconnected mid-click; the cursor stack stays with the block",
                self.context.name()
            );
        }
        if let Some(cursor) = self.cursor.take() {
            self.keep_or_throw(cursor).await;
        }
        // Unsubscribing also closes any open block window
        self.subscriptions.close().await;
        self.game_state.entities().release(self.entity_id());
        info!("{} left", self.context.name());
        // Dropping the context writes the player back and frees the name
    }
}
