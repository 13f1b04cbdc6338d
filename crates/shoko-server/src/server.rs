//! TCP server loop.
//!
//! Each connection is split into a reader and a writer:
//!
//! ```text
//!             ┌────────── reader task ──────────┐
//! socket ───► │ decode ClientFrame              │
//!             │  ├─ session call → reply inline │
//!             │  └─ file call → spawn_blocking ─┼──► replies: mpsc<ServerFrame> (send().await) ─┐
//!             └─────────────────────────────────┘                                               ▼
//! socket ◄─── writer task (pushes first) ◄── PushQueue ◄── invalidations (try_send) ◄── any connection
//! ```
//!
//! Every file call runs on its own blocking worker, so a call waiting on a
//! record lock never stalls other calls on the same connection. Replies and
//! pushes travel on separate queues, so a backlog of unread replies never
//! costs a registered client an invalidation.

use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use shoko_types::{ClientFrame, CodecError, ErrorKind, Reply, ServerFrame, WireError};
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::rpc::{FileService, PushQueue, Routed, Session, push_channel};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The file server.
pub struct FileServer {
    service: FileService,
}

impl FileServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_context(ServerContext::new(config))
    }

    pub fn with_context(ctx: ServerContext) -> Self {
        Self {
            service: FileService::new(ctx),
        }
    }

    pub fn context(&self) -> &ServerContext {
        self.service.context()
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.context().config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            service = %self.context().config.service_name,
            "file service listening"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };
            let service = self.service.clone();
            tokio::spawn(async move {
                handle_connection(service, stream, peer).await;
            });
        }
    }
}

fn codec(config: &ServerConfig) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(config.max_frame_length)
        .new_codec()
}

async fn handle_connection(service: FileService, stream: TcpStream, peer: SocketAddr) {
    tracing::info!(%peer, "connection opened");
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "set_nodelay failed: {}", e);
    }

    let config = service.context().config.clone();
    let (read_half, write_half) = stream.into_split();
    let mut frames_in = FramedRead::new(read_half, codec(&config));
    let frames_out = FramedWrite::new(write_half, codec(&config));

    let (tx, rx) = mpsc::channel::<ServerFrame>(config.reply_queue_depth);
    let (push, pushes) = push_channel(config.push_queue_depth);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let writer = tokio::spawn(write_frames(frames_out, rx, pushes, shutdown_rx, peer));

    let mut session = Session::new(peer.to_string(), push);
    let mut calls = JoinSet::new();

    while let Some(next) = frames_in.next().await {
        while calls.try_join_next().is_some() {}

        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(%peer, "read failed: {}", e);
                break;
            }
        };
        let ClientFrame::Call { id, request } = match shoko_types::decode::<ClientFrame>(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%peer, "dropping connection on undecodable frame: {}", e);
                break;
            }
        };

        let op = request.op();
        tracing::trace!(%peer, id, op, "call");

        match service.route(&mut session, request) {
            Routed::Done(reply) => {
                if tx.send(ServerFrame::Reply { id, reply }).await.is_err() {
                    break;
                }
            }
            Routed::Store(request) => {
                let service = service.clone();
                let tx = tx.clone();
                calls.spawn(async move {
                    let reply = match tokio::task::spawn_blocking(move || service.dispatch(request)).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::error!(id, op, "store worker failed: {}", e);
                            Reply::Error(WireError::new(ErrorKind::Internal, "store worker failed"))
                        }
                    };
                    // The writer may already be gone; the reply has nowhere to go then.
                    let _ = tx.send(ServerFrame::Reply { id, reply }).await;
                });
            }
        }
    }

    service.close(&session);

    // Let in-flight calls queue their replies, then have the writer flush and stop.
    while calls.join_next().await.is_some() {}
    let _ = shutdown_tx.send(());
    if let Err(e) = writer.await {
        tracing::debug!(%peer, "writer task ended abnormally: {}", e);
    }
    tracing::info!(%peer, "connection closed");
}

/// Drain pushes and replies onto the socket.
///
/// Pending pushes go out before pending replies, so a client always applies
/// an invalidation before the reply to any call that followed the change.
/// The registered client handle keeps the push queue open after the
/// connection ends; `shutdown` ends the loop once whatever is already queued
/// has been written.
async fn write_frames(
    mut frames_out: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    mut replies: mpsc::Receiver<ServerFrame>,
    mut pushes: PushQueue,
    mut shutdown: oneshot::Receiver<()>,
    peer: SocketAddr,
) {
    let mut pushes_open = true;
    loop {
        let frame = tokio::select! {
            biased;
            push = pushes.recv(), if pushes_open => match push {
                Some(frame) => frame,
                None => {
                    pushes_open = false;
                    continue;
                }
            },
            reply = replies.recv() => match reply {
                Some(frame) => frame,
                None => break,
            },
            _ = &mut shutdown => {
                let queued = std::iter::from_fn(|| pushes.try_recv())
                    .chain(std::iter::from_fn(|| replies.try_recv().ok()))
                    .collect::<Vec<_>>();
                for frame in &queued {
                    if write_frame(&mut frames_out, frame, peer).await.is_err() {
                        break;
                    }
                }
                break;
            }
        };
        if write_frame(&mut frames_out, &frame, peer).await.is_err() {
            break;
        }
    }
    pushes.close();
    replies.close();
}

async fn write_frame(
    frames_out: &mut FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    frame: &ServerFrame,
    peer: SocketAddr,
) -> Result<(), ()> {
    let Some(bytes) = frame_bytes(frame, shoko_types::encode::<ServerFrame>) else {
        return Ok(());
    };
    frames_out.send(Bytes::from(bytes)).await.map_err(|e| {
        tracing::debug!(%peer, "write failed: {}", e);
    })
}

/// Encode `frame`. A reply that fails to encode is replaced by an internal
/// error for the same call, so the caller is not left waiting.
fn frame_bytes(
    frame: &ServerFrame,
    encode: impl Fn(&ServerFrame) -> Result<Vec<u8>, CodecError>,
) -> Option<Vec<u8>> {
    let err = match encode(frame) {
        Ok(bytes) => return Some(bytes),
        Err(e) => e,
    };
    match frame {
        ServerFrame::Reply { id, .. } => {
            tracing::error!(id, "failed to encode reply: {}", err);
            let fallback = ServerFrame::Reply {
                id: *id,
                reply: Reply::Error(WireError::new(ErrorKind::Internal, "failed to encode reply")),
            };
            shoko_types::encode(&fallback)
                .inspect_err(|e| tracing::error!(id, "failed to encode error reply: {}", e))
                .ok()
        }
        _ => {
            tracing::error!("failed to encode push: {}", err);
            None
        }
    }
}
