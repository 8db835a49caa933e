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

//! Message definitions shared by the server and anything that talks to it.
//!
//! These are written against prost's derive macros directly, so there is no
//! protoc step in the build.

pub mod coordinates;
pub mod game_rpc;
pub mod items;
pub mod map;
pub mod players;

/// Bump when a message changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
