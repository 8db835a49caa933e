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

use super::items::{WireItemSlot, WireItemStack};

/// A single block's inventory, keyed by its index within the chunk.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoredInventory {
    #[prost(uint32, tag = "1")]
    pub offset_in_chunk: u32,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(message, repeated, tag = "3")]
    pub slots: ::prost::alloc::vec::Vec<WireItemSlot>,
}

/// A dropped item. Entity IDs are not persisted; a new one is assigned on load.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoredItem {
    #[prost(message, optional, tag = "1")]
    pub item: ::core::option::Option<WireItemStack>,
    #[prost(double, tag = "2")]
    pub x: f64,
    #[prost(double, tag = "3")]
    pub y: f64,
    #[prost(double, tag = "4")]
    pub z: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoredChunk {
    #[prost(bytes = "vec", tag = "1")]
    pub block_ids: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub metadata: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub inventories: ::prost::alloc::vec::Vec<StoredInventory>,
    #[prost(message, repeated, tag = "4")]
    pub items: ::prost::alloc::vec::Vec<StoredItem>,
}
