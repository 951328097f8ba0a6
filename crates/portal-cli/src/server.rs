// Copyright 2025 Portal Authors
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

//! TCP executor server.
//!
//! Executors own a single-threaded script engine, so connections are served
//! as local tasks: [`serve`] must run inside a [`tokio::task::LocalSet`].

use anyhow::Result;
use portal_common::transport::StreamTransport;
use portal_executor::{Executor, ExecutorConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Accepts connections forever, one executor per connection.
///
/// Only accept failures end the loop; a connection that fails to set up is
/// logged and dropped.
pub async fn serve(listener: TcpListener, config: ExecutorConfig) -> Result<()> {
    tracing::info!("Executor listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Accepted connection from {}", peer);

        let config = config.clone();
        tokio::task::spawn_local(async move {
            match serve_connection(stream, config).await {
                Ok(()) => tracing::info!("Connection from {} closed", peer),
                Err(e) => tracing::warn!("Connection from {} failed: {}", peer, e),
            }
        });
    }
}

/// Serves one byte stream with a fresh executor until the peer disconnects.
pub async fn serve_connection<S>(stream: S, config: ExecutorConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (transport, inbox) = StreamTransport::spawn(stream);
    let executor = Executor::with_config(transport, config)?;
    executor.start();
    executor.serve(inbox).await;
    executor.stop();
    Ok(())
}
