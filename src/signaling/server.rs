use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RelayHandle;
use super::types::{ConnectionId, OutboundMessage};
use crate::config::RelayConfig;

pub use crate::config::DEFAULT_SIGNALING_PORT;

#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

pub struct SignalingServer {
    handle: RelayHandle,
    keepalive: Keepalive,
}

impl Default for SignalingServer {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

impl SignalingServer {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            handle: RelayHandle::spawn(config.grace_delay()),
            keepalive: Keepalive {
                ping_interval: config.ping_interval(),
                pong_timeout: config.pong_timeout(),
            },
        }
    }

    /// Handle to the relay actor, mostly useful for diagnostics
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Signaling server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RelayHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let id = ConnectionId::next();
    info!("WebSocket connection from {} as {}", addr, id);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
    // the first tick completes immediately
    ping_interval.tick().await;
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_tx.send(msg.into_inner()).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    handle.connect(id, tx).await;

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.pong_timeout);
                debug!("Ping sent to {}", id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(_) | Message::Binary(_) => {
                        if let Some(frame) = OutboundMessage::from_frame(msg) {
                            handle.frame(id, frame).await;
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", id);
                        handle.closing(id).await;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(id).await;

    send_task.abort();
    info!("WebSocket disconnected: {}", id);

    Ok(())
}
