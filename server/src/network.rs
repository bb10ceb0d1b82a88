//! Server network layer handling TCP connections and their lifecycle

use crate::coordinator::SessionCoordinator;
use crate::error::ServerError;
use crate::registry::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{LineCodec, Message};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};

/// How long a closing connection may take to flush its queued lines
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts players and runs one handler task per connection
pub struct Server {
    listener: TcpListener,
    coordinator: SessionCoordinator,
    shutdown_tx: watch::Sender<bool>,
    connections: JoinSet<()>,
}

impl Server {
    pub async fn bind(addr: &str, coordinator: SessionCoordinator) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Server {
            listener,
            coordinator,
            shutdown_tx,
            connections: JoinSet::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Serves until the process is killed
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `signal` completes, then closes every connection
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let coordinator = self.coordinator.clone();
                        let shutdown = self.shutdown_tx.subscribe();
                        self.connections
                            .spawn(handle_connection(stream, addr, coordinator, shutdown));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(finished) = self.connections.join_next(), if !self.connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        self.coordinator.shutdown().await;
        let _ = self.shutdown_tx.send(true);
        while let Some(finished) = self.connections.join_next().await {
            if let Err(e) = finished {
                error!("Connection task failed: {}", e);
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Reads lines from one client and feeds them to the coordinator
///
/// Outbound lines go through a separate writer task so a slow socket never
/// holds up the coordinator. The handler ends when the peer hangs up, the
/// coordinator drops the connection (its queue closes and the writer
/// finishes), or the server shuts down.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: SessionCoordinator,
    mut shutdown: watch::Receiver<bool>,
) {
    let (id, outbound) = match coordinator.connect(addr).await {
        Ok(connection) => connection,
        Err(e) => {
            debug!("Refusing connection from {}: {}", addr, e);
            return;
        }
    };
    let (reader, writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, LineCodec::new());
    let mut writer_task = tokio::spawn(write_outbound(
        id,
        FramedWrite::new(writer, LineCodec::new()),
        outbound,
    ));
    let mut writer_finished = false;

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Ok(message))) => {
                    if let Err(e) = coordinator.handle(id, message).await {
                        if e.is_fatal() {
                            break;
                        }
                    }
                }
                Some(Ok(Err(e))) => {
                    warn!("Dropping malformed line from {}: {}", addr, e);
                }
                Some(Err(e)) => {
                    warn!("Read error on connection {}: {}", id, e);
                    break;
                }
                None => {
                    debug!("Connection {} closed by peer", id);
                    break;
                }
            },
            _ = &mut writer_task => {
                debug!("Writer for connection {} finished", id);
                writer_finished = true;
                break;
            }
            _ = shutdown.changed() => break,
        }
    }

    coordinator.disconnect(id).await;

    // The queue is closed now; let the writer deliver what is left
    if !writer_finished && timeout(FLUSH_TIMEOUT, &mut writer_task).await.is_err() {
        warn!("Connection {} did not drain in time", id);
        writer_task.abort();
    }
}

async fn write_outbound(
    id: ConnectionId,
    mut sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut outbound: mpsc::Receiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sink.send(message).await {
            warn!("Failed to write to connection {}: {}", id, e);
            return;
        }
    }
}
