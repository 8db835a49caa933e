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

//! Framing for the game connection: every message is a prost-encoded [ClientMessage] or
//! [ServerMessage] behind a four-byte big-endian length.

use anyhow::{ensure, Context, Result};
use feldspar_core::protocol::game_rpc::{ClientMessage, ServerMessage};
use prost::{bytes::Bytes, Message};
use tokio_util::codec::LengthDelimitedCodec;

/// Frames longer than this close the connection. A full chunk is well under it.
pub const MAX_FRAME_LENGTH: usize = 1 << 20;

pub fn new_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub fn encode_message<M: Message>(message: &M) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

pub fn decode_client_message(frame: &[u8]) -> Result<ClientMessage> {
    let message = ClientMessage::decode(frame).context("Malformed client message")?;
    ensure!(message.payload.is_some(), "Client message has no payload");
    Ok(message)
}

pub fn decode_server_message(frame: &[u8]) -> Result<ServerMessage> {
    let message = ServerMessage::decode(frame).context("Malformed server message")?;
    ensure!(message.payload.is_some(), "Server message has no payload");
    Ok(message)
}
