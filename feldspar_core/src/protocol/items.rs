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

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct WireItemStack {
    #[prost(sint32, tag = "1")]
    pub item_type: i32,
    #[prost(uint32, tag = "2")]
    pub count: u32,
    #[prost(sint32, tag = "3")]
    pub data: i32,
}

/// An inventory slot; `stack` is absent for an empty slot.
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct WireItemSlot {
    #[prost(message, optional, tag = "1")]
    pub stack: ::core::option::Option<WireItemStack>,
}
