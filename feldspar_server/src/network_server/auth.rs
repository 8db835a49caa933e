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

use feldspar_core::protocol::{game_rpc::Login, PROTOCOL_VERSION};
use rustc_hash::FxHashSet;

use crate::game_state::{
    game_behaviors::GameBehaviors,
    player::{LoginRejected, PlayerContext, PlayerManager},
};

pub const MAX_USERNAME_LENGTH: usize = 16;

/// Outcome of a [LoginGate] check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginDecision {
    Allow,
    /// Refuses the login; the reason is shown to the client.
    Deny(String),
}

/// Decides whether a username may join. Consulted once per connection, before the player is
/// loaded or any shard hears about it.
pub trait LoginGate: Send + Sync {
    fn check(&self, username: &str) -> LoginDecision;
}

/// Allow and ban lists from the server settings. Names are compared case-insensitively, and an
/// empty allow list lets everyone in.
pub struct SettingsLoginGate {
    allowed: FxHashSet<String>,
    banned: FxHashSet<String>,
}
impl SettingsLoginGate {
    pub fn new(allowed: &[String], banned: &[String]) -> SettingsLoginGate {
        SettingsLoginGate {
            allowed: allowed.iter().map(|x| x.to_lowercase()).collect(),
            banned: banned.iter().map(|x| x.to_lowercase()).collect(),
        }
    }

    pub fn from_behaviors(behaviors: &GameBehaviors) -> SettingsLoginGate {
        Self::new(&behaviors.allowed_players, &behaviors.banned_players)
    }
}
impl LoginGate for SettingsLoginGate {
    fn check(&self, username: &str) -> LoginDecision {
        let username = username.to_lowercase();
        if self.banned.contains(&username) {
            LoginDecision::Deny("You are banned from this server".to_string())
        } else if !self.allowed.is_empty() && !self.allowed.contains(&username) {
            LoginDecision::Deny("You are not on the allow list".to_string())
        } else {
            LoginDecision::Allow
        }
    }
}

pub fn is_valid_username(username: &str) -> bool {
    (1..=MAX_USERNAME_LENGTH).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct AuthService {
    gate: Box<dyn LoginGate>,
    players: Arc<PlayerManager>,
}
impl AuthService {
    pub(crate) fn new(gate: Box<dyn LoginGate>, players: Arc<PlayerManager>) -> AuthService {
        AuthService { gate, players }
    }

    /// Checks a login request and, if it passes, loads the player. The returned context keeps
    /// the name reserved until it's dropped.
    pub(crate) fn authenticate(&self, login: &Login) -> Result<PlayerContext, LoginRejected> {
        if login.protocol_version != PROTOCOL_VERSION {
            return Err(LoginRejected::ProtocolVersion(login.protocol_version));
        }
        if !is_valid_username(&login.username) {
            return Err(LoginRejected::InvalidName);
        }
        if let LoginDecision::Deny(reason) = self.gate.check(&login.username) {
            return Err(LoginRejected::Denied(reason));
        }
        self.players.connect(&login.username)
    }
}
