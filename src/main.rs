// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


use clap::Parser;
use stateish::config::{Config, StorageBackend};
use stateish::handler::BaseHandler;
use stateish::observability::tracing_setup;
use stateish::server::{ConnectionManager, StateHttpConnectionManager};
use stateish::state_http::StateHttpHandler;
use stateish::storage::file_store::FileStore;
use stateish::storage::in_memory::InMemoryStore;
use stateish::storage::StateStore;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "stateish")]
#[command(about = "Shares game state over HTTP with long-polling and etag compare-and-swap", long_about = None)]
struct Args {
    /// Address to listen on (e.g., 127.0.0.1:8027)
    #[arg(short, long)]
    listen: Option<String>,

    /// Path to configuration file (defaults apply if it does not exist)
    #[arg(short, long, default_value = "stateish.toml")]
    config: String,

    /// Directory holding one file per state
    #[arg(short, long)]
    states_dir: Option<String>,

    /// Directory of static files to serve outside /states
    #[arg(short, long)]
    www_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut cfg = Config::from_path_or_default(&args.config)?;
    tracing_setup::init_tracing_from_env(cfg.logging.format, &cfg.logging.level);

    // Command line args override config file
    if let Some(listen) = args.listen {
        cfg.listen_addr = listen;
    }
    if let Some(dir) = args.states_dir {
        cfg.storage.path = dir;
    }
    if args.www_dir.is_some() {
        cfg.www_dir = args.www_dir;
    }
    let addr: SocketAddr = cfg.listen_addr.parse()?;

    let store: Arc<dyn StateStore> = match cfg.storage.backend {
        StorageBackend::InMemory => {
            tracing::warn!("in-memory backend: states are lost on exit");
            Arc::new(InMemoryStore::new())
        }
        StorageBackend::File => {
            let store = FileStore::new(&cfg.storage.path)
                .await?
                .with_sync_writes(cfg.storage.sync_writes);
            tracing::info!(
                "storing states in {:?} (sync_writes: {})",
                store.root(),
                cfg.storage.sync_writes
            );
            Arc::new(store)
        }
    };

    let handler = BaseHandler::new(store).with_poll_timeout(cfg.poll_timeout());
    let mut http = StateHttpHandler::new(handler);
    if let Some(dir) = &cfg.www_dir {
        tracing::info!("serving static files from {}", dir);
        http = http.with_www_dir(dir);
    }

    let server = StateHttpConnectionManager::new(http);
    tokio::select! {
        r = server.serve(addr) => {
            if let Err(e) = r {
                tracing::error!("server exited with error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("ctrl-c received, shutting down");
        }
    }

    Ok(())
}
