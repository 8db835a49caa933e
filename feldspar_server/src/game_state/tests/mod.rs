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

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    database::InMemGameDatabase,
    network_server::auth::SettingsLoginGate,
    settings::ServerSettings,
};

use super::{
    blocks::BlockTypeManager, game_behaviors::GameBehaviors, mapgen::FlatMapgen, GameState,
};

mod shard_tests;
mod subscription_tests;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// An in-memory world on flat terrain, with default settings apart from the view radius.
pub(crate) fn testonly_make_gamestate(view_radius: i32) -> Arc<GameState> {
    testonly_make_gamestate_from(ServerSettings {
        view_radius,
        ..Default::default()
    })
}

pub(crate) fn testonly_make_gamestate_from(settings: ServerSettings) -> Arc<GameState> {
    let behaviors = GameBehaviors::from_settings(
        &settings,
        BlockTypeManager::with_defaults().unwrap(),
    )
    .unwrap();
    let gate = SettingsLoginGate::from_behaviors(&behaviors);
    GameState::new(
        PathBuf::from("/nonexistent"),
        Arc::new(InMemGameDatabase::new()),
        Arc::new(FlatMapgen::default()),
        behaviors,
        Box::new(gate),
    )
}
