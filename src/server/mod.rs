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

use crate::state_http::StateHttpHandler;
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    async fn serve(&self, addr: SocketAddr)
        -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// HTTP connection manager using Axum. Every connection gets its own task,
/// and long-polls park only that task.
#[derive(Clone)]
pub struct StateHttpConnectionManager {
    handler: StateHttpHandler,
}

impl StateHttpConnectionManager {
    pub fn new(handler: StateHttpHandler) -> Self {
        Self { handler }
    }

    /// Serve on an already bound listener (tests bind port 0).
    pub async fn serve_listener(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.handler.clone().router();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Bind a listening socket with address reuse, so a restarted server can
/// take the port back while old connections sit in TIME_WAIT.
pub fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Responses are tiny; don't let Nagle hold them back.
    socket.set_nodelay(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

#[async_trait]
impl ConnectionManager for StateHttpConnectionManager {
    async fn serve(
        &self,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = bind_listener(addr)?;
        tracing::info!("stateish HTTP server listening on {}", listener.local_addr()?);
        self.serve_listener(listener).await
    }
}
