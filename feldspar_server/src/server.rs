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
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, task::JoinSet};

use crate::{
    database::{GameDatabase, InMemGameDatabase},
    game_state::{
        blocks::BlockTypeManager,
        game_behaviors::GameBehaviors,
        mapgen::{FlatMapgen, MapgenInterface},
        GameState,
    },
    network_server::{
        auth::{LoginGate, SettingsLoginGate},
        client_context::run_session,
    },
    settings::{self, ServerSettings},
};

/// How long sessions get to say goodbye to their clients once shutdown starts.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// The directory holding the world's settings
    #[arg(short, long, value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// The interface address to bind to. By default, bind all interfaces.
    #[arg(long)]
    pub bind_addr: Option<IpAddr>,

    #[arg(short, long, default_value_t = 28273)]
    pub port: u16,
}

pub struct Server {
    runtime: tokio::runtime::Runtime,
    game_state: Arc<GameState>,
    bind_address: SocketAddr,
}
impl Server {
    fn new(
        runtime: tokio::runtime::Runtime,
        game_state: Arc<GameState>,
        bind_address: SocketAddr,
    ) -> Result<Server> {
        Ok(Server {
            runtime,
            game_state,
            bind_address,
        })
    }

    pub fn game_state(&self) -> &GameState {
        self.game_state.as_ref()
    }

    /// Starts the network server, and blocks until the game
    /// is shut down with Ctrl+C or start_shutdown is called on the game state.
    pub fn serve(&self) -> Result<()> {
        let _tracy_client = tracy_client::Client::start();
        self.runtime.block_on(self.serve_async())
    }

    async fn serve_async(&self) -> Result<()> {
        #[cfg(feature = "deadlock_detection")]
        {
            use parking_lot::deadlock;
            use std::thread;

            thread::spawn(move || loop {
                thread::sleep(Duration::from_secs(10));
                let deadlocks = deadlock::check_deadlock();
                if deadlocks.is_empty() {
                    continue;
                }

                eprintln!("{} deadlocks detected", deadlocks.len());
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("Deadlock #{}", i);
                    for t in threads {
                        eprintln!("Thread Id {:#?}", t.thread_id());
                        eprintln!("{:#?}", t.backtrace());
                    }
                }
            });
        }

        let listener = TcpListener::bind(self.bind_address)
            .await
            .with_context(|| format!("Binding {}", self.bind_address))?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    tracing::info!("Ctrl+C received, shutting down network service");
                    break;
                },
                _ = self.game_state.await_start_shutdown() => {
                    tracing::info!("Game shutdown requested programmatically; shutting down network service");
                    break;
                },
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e:?}");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::warn!("Couldn't set TCP_NODELAY for {peer}: {e:?}");
                    }
                    tracing::debug!("Connection from {peer}");
                    let game_state = self.game_state.clone();
                    sessions.spawn(async move {
                        if let Err(e) = run_session(game_state, stream, peer.to_string()).await {
                            tracing::warn!("Session with {peer} ended with an error: {e:?}");
                        }
                    });
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Session task crashed: {e:?}");
                    }
                },
            }
        }
        self.game_state.start_shutdown();
        drop(listener);

        let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "{} sessions didn't finish within {:?}; aborting them",
                sessions.len(),
                SESSION_DRAIN_TIMEOUT
            );
            sessions.shutdown().await;
        }
        Ok(())
    }

    pub fn run_task_in_server<T>(&self, task: impl FnOnce(&GameState) -> Result<T>) -> Result<T> {
        let _enter_guard = self.runtime.enter();
        task(self.game_state())
    }
}
impl Drop for Server {
    fn drop(&mut self) {
        tracing::info!("Server dropped, starting shutdown");
        match self.runtime.block_on(self.game_state.shut_down()) {
            Ok(_) => {
                tracing::info!("Server shutdown complete.");
            }
            Err(e) => {
                tracing::error!("Server shutdown was unclean: {e:?}");
            }
        };
    }
}

pub struct ServerBuilder {
    runtime: tokio::runtime::Runtime,
    db: Arc<dyn GameDatabase>,
    blocks: BlockTypeManager,
    mapgen: Option<Arc<dyn MapgenInterface>>,
    login_gate: Option<Box<dyn LoginGate>>,
    args: ServerArgs,
    settings: ServerSettings,
    data_dir: PathBuf,
}
impl ServerBuilder {
    pub fn from_cmdline() -> Result<ServerBuilder> {
        Self::from_args(&ServerArgs::parse())
    }
    pub fn from_args(args: &ServerArgs) -> Result<ServerBuilder> {
        if !Path::exists(&args.data_dir) {
            std::fs::create_dir(&args.data_dir)?;
            tracing::info!("Created new data directory at {:?}", args.data_dir);
        } else {
            if !Path::is_dir(&args.data_dir) {
                bail!("Specified data directory is not a directory.");
            }
            tracing::info!("Loaded existing data directory at {:?}", args.data_dir);
        }
        let settings = settings::load(&args.data_dir)?;
        Self::with_settings(args, settings)
    }

    fn with_settings(args: &ServerArgs, settings: ServerSettings) -> Result<ServerBuilder> {
        Ok(ServerBuilder {
            runtime: tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?,
            db: Arc::new(InMemGameDatabase::new()),
            blocks: BlockTypeManager::with_defaults()?,
            mapgen: None,
            login_gate: None,
            args: args.clone(),
            settings,
            data_dir: args.data_dir.clone(),
        })
    }

    pub fn blocks_mut(&mut self) -> &mut BlockTypeManager {
        &mut self.blocks
    }
    pub fn blocks(&self) -> &BlockTypeManager {
        &self.blocks
    }
    pub fn settings_mut(&mut self) -> &mut ServerSettings {
        &mut self.settings
    }
    /// Sets the mapgen for this game. Defaults to flat terrain at the configured ground height.
    pub fn set_mapgen(&mut self, mapgen: Arc<dyn MapgenInterface>) {
        self.mapgen = Some(mapgen)
    }
    /// Replaces the allow/ban lists from the settings with a custom login check.
    pub fn set_login_gate(&mut self, gate: impl LoginGate + 'static) {
        self.login_gate = Some(Box::new(gate))
    }
    pub fn set_database(&mut self, db: Arc<dyn GameDatabase>) {
        self.db = db
    }

    pub fn build(self) -> Result<Server> {
        let addr = SocketAddr::new(
            // Bind to all interfaces (v4 and v6) by default
            self.args.bind_addr.unwrap_or(IpAddr::from_str("::")?),
            self.args.port,
        );
        let behaviors = GameBehaviors::from_settings(&self.settings, self.blocks)
            .context("Invalid settings")?;
        let mapgen = self
            .mapgen
            .unwrap_or_else(|| Arc::new(FlatMapgen::new(self.settings.ground_height)));
        let login_gate = self
            .login_gate
            .unwrap_or_else(|| Box::new(SettingsLoginGate::from_behaviors(&behaviors)));

        let game_state = GameState::new(self.data_dir, self.db, mapgen, behaviors, login_gate);
        Server::new(self.runtime, game_state, addr)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}

/// A server with default settings and in-memory storage, listening on `port` on localhost.
pub fn testonly_in_memory(port: u16) -> Result<Server> {
    let args = ServerArgs {
        data_dir: PathBuf::from("/nonexistent"),
        bind_addr: Some(IpAddr::from_str("127.0.0.1")?),
        port,
    };
    ServerBuilder::with_settings(&args, ServerSettings::default())?.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse() {
        let args = ServerArgs::parse_from(["feldspar", "--data-dir", "/tmp/world", "-p", "4000"]);
        assert_eq!(args.data_dir, PathBuf::from("/tmp/world"));
        assert_eq!(args.port, 4000);
        assert_eq!(args.bind_addr, None);
        let args = ServerArgs::parse_from(["feldspar", "-d", "w", "--bind-addr", "127.0.0.1"]);
        assert_eq!(args.port, 28273);
        assert!(ServerArgs::try_parse_from(["feldspar"]).is_err());
    }

    #[test]
    fn bad_settings_fail_the_build() {
        let args = ServerArgs {
            data_dir: PathBuf::from("/nonexistent"),
            bind_addr: None,
            port: 0,
        };
        let mut builder = ServerBuilder::with_settings(&args, ServerSettings::default()).unwrap();
        builder.settings_mut().view_radius = 99;
        assert!(builder.build().is_err());
    }

    #[test]
    fn shutdown_request_stops_serving() {
        let server = testonly_in_memory(0).unwrap();
        server.game_state().start_shutdown();
        server.serve().unwrap();
        assert!(server.game_state().is_shutting_down());
    }
}
