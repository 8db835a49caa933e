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

//! Messages exchanged with game clients. Each message travels as one
//! length-delimited frame.

use super::coordinates::{WireBlockCoordinate, WireChunkCoordinate};
use super::items::{WireItemSlot, WireItemStack};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Login {
    #[prost(string, tag = "1")]
    pub username: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub protocol_version: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct KeepAlive {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PositionLook {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(float, tag = "4")]
    pub yaw: f32,
    #[prost(float, tag = "5")]
    pub pitch: f32,
    #[prost(bool, tag = "6")]
    pub on_ground: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Dig {
    #[prost(message, optional, tag = "1")]
    pub coord: ::core::option::Option<WireBlockCoordinate>,
    #[prost(sint32, tag = "2")]
    pub face: i32,
    /// False while the player is still digging, true once the block should break.
    #[prost(bool, tag = "3")]
    pub finished: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Place {
    #[prost(message, optional, tag = "1")]
    pub coord: ::core::option::Option<WireBlockCoordinate>,
    #[prost(sint32, tag = "2")]
    pub face: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HeldItemChange {
    #[prost(uint32, tag = "1")]
    pub slot: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct WindowClick {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
    #[prost(sint32, tag = "2")]
    pub slot: i32,
    #[prost(bool, tag = "3")]
    pub right_click: bool,
    #[prost(sint32, tag = "4")]
    pub transaction_id: i32,
}

/// Sent by either side when an inventory window closes.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct WindowClose {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DropHeldItem {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Animation {
    #[prost(uint32, tag = "1")]
    pub kind: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientMessage {
    #[prost(
        oneof = "client_message::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10"
    )]
    pub payload: ::core::option::Option<client_message::Payload>,
}
pub mod client_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Login(super::Login),
        #[prost(message, tag = "2")]
        KeepAlive(super::KeepAlive),
        #[prost(message, tag = "3")]
        PositionLook(super::PositionLook),
        #[prost(message, tag = "4")]
        Dig(super::Dig),
        #[prost(message, tag = "5")]
        Place(super::Place),
        #[prost(message, tag = "6")]
        HeldItemChange(super::HeldItemChange),
        #[prost(message, tag = "7")]
        WindowClick(super::WindowClick),
        #[prost(message, tag = "8")]
        WindowClose(super::WindowClose),
        #[prost(message, tag = "9")]
        DropHeldItem(super::DropHeldItem),
        #[prost(message, tag = "10")]
        Animation(super::Animation),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct LoginAccepted {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
    #[prost(double, tag = "2")]
    pub x: f64,
    #[prost(double, tag = "3")]
    pub y: f64,
    #[prost(double, tag = "4")]
    pub z: f64,
    #[prost(uint32, tag = "5")]
    pub view_radius: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Disconnect {
    #[prost(string, tag = "1")]
    pub reason: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkData {
    #[prost(message, optional, tag = "1")]
    pub coord: ::core::option::Option<WireChunkCoordinate>,
    #[prost(bytes = "vec", tag = "2")]
    pub block_ids: ::prost::alloc::vec::Vec<u8>,
    /// Two 4-bit values per byte, low nibble first.
    #[prost(bytes = "vec", tag = "3")]
    pub metadata: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UnloadChunk {
    #[prost(message, optional, tag = "1")]
    pub coord: ::core::option::Option<WireChunkCoordinate>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct BlockChange {
    #[prost(message, optional, tag = "1")]
    pub coord: ::core::option::Option<WireBlockCoordinate>,
    #[prost(uint32, tag = "2")]
    pub block_id: u32,
    #[prost(uint32, tag = "3")]
    pub metadata: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpawnPlayer {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(double, tag = "3")]
    pub x: f64,
    #[prost(double, tag = "4")]
    pub y: f64,
    #[prost(double, tag = "5")]
    pub z: f64,
    #[prost(float, tag = "6")]
    pub yaw: f32,
    #[prost(float, tag = "7")]
    pub pitch: f32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SpawnItem {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
    #[prost(message, optional, tag = "2")]
    pub item: ::core::option::Option<WireItemStack>,
    #[prost(double, tag = "3")]
    pub x: f64,
    #[prost(double, tag = "4")]
    pub y: f64,
    #[prost(double, tag = "5")]
    pub z: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct EntityTeleport {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
    #[prost(double, tag = "2")]
    pub x: f64,
    #[prost(double, tag = "3")]
    pub y: f64,
    #[prost(double, tag = "4")]
    pub z: f64,
    #[prost(float, tag = "5")]
    pub yaw: f32,
    #[prost(float, tag = "6")]
    pub pitch: f32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DestroyEntity {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct CollectItem {
    #[prost(uint32, tag = "1")]
    pub item_entity_id: u32,
    #[prost(uint32, tag = "2")]
    pub collector_entity_id: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct EntityAnimation {
    #[prost(uint32, tag = "1")]
    pub entity_id: u32,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WindowOpen {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(string, tag = "3")]
    pub title: ::prost::alloc::string::String,
    #[prost(uint32, tag = "4")]
    pub num_slots: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WindowItems {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
    #[prost(message, repeated, tag = "2")]
    pub slots: ::prost::alloc::vec::Vec<WireItemSlot>,
}

/// Window ID -1 with slot -1 addresses the stack held on the cursor.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetSlot {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
    #[prost(sint32, tag = "2")]
    pub slot: i32,
    #[prost(message, optional, tag = "3")]
    pub stack: ::core::option::Option<WireItemStack>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Transaction {
    #[prost(sint32, tag = "1")]
    pub window_id: i32,
    #[prost(sint32, tag = "2")]
    pub transaction_id: i32,
    #[prost(bool, tag = "3")]
    pub accepted: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerMessage {
    #[prost(
        oneof = "server_message::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17"
    )]
    pub payload: ::core::option::Option<server_message::Payload>,
}
pub mod server_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        LoginAccepted(super::LoginAccepted),
        #[prost(message, tag = "2")]
        Disconnect(super::Disconnect),
        #[prost(message, tag = "3")]
        KeepAlive(super::KeepAlive),
        #[prost(message, tag = "4")]
        ChunkData(super::ChunkData),
        #[prost(message, tag = "5")]
        UnloadChunk(super::UnloadChunk),
        #[prost(message, tag = "6")]
        BlockChange(super::BlockChange),
        #[prost(message, tag = "7")]
        SpawnPlayer(super::SpawnPlayer),
        #[prost(message, tag = "8")]
        SpawnItem(super::SpawnItem),
        #[prost(message, tag = "9")]
        EntityTeleport(super::EntityTeleport),
        #[prost(message, tag = "10")]
        DestroyEntity(super::DestroyEntity),
        #[prost(message, tag = "11")]
        CollectItem(super::CollectItem),
        #[prost(message, tag = "12")]
        EntityAnimation(super::EntityAnimation),
        #[prost(message, tag = "13")]
        WindowOpen(super::WindowOpen),
        #[prost(message, tag = "14")]
        WindowItems(super::WindowItems),
        #[prost(message, tag = "15")]
        SetSlot(super::SetSlot),
        #[prost(message, tag = "16")]
        WindowClose(super::WindowClose),
        #[prost(message, tag = "17")]
        Transaction(super::Transaction),
    }
}

impl ServerMessage {
    pub fn new(payload: server_message::Payload) -> ServerMessage {
        ServerMessage {
            payload: Some(payload),
        }
    }
}

impl ClientMessage {
    pub fn new(payload: client_message::Payload) -> ClientMessage {
        ClientMessage {
            payload: Some(payload),
        }
    }
}
