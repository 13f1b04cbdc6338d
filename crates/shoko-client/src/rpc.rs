//! RPC client for the shoko file service.
//!
//! One TCP connection carries both calls and server pushes. A reader task
//! routes replies to waiting callers by id and hands pushes to the
//! [`InvalidationHandler`] (if any) before republishing them as
//! [`ServerEvent`]s.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use shoko_types::{ClientFrame, CodecError, ErrorKind, Reply, Request, ServerFrame, WireError};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::ConnectError;
use crate::constants::{
    CALL_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_LENGTH, EVENT_CHANNEL_CAPACITY,
    OUTBOUND_QUEUE_DEPTH,
};
use crate::subscriptions::{InvalidationHandler, ServerEvent};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("server error: {0}")]
    Server(#[from] WireError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("connection closed")]
    Disconnected,
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected reply to {op}: {reply:?}")]
    UnexpectedReply { op: &'static str, reply: Reply },
}

impl RpcError {
    /// The server-reported error kind, if this is a server error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RpcError::Server(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Connection settings.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Service name to look up after connecting.
    pub service: String,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub max_frame_length: usize,
    /// Receives pushes in frame order.
    pub handler: Option<Arc<dyn InvalidationHandler>>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            service: shoko_types::SERVICE_NAME.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            handler: None,
        }
    }
}

impl ConnectOptions {
    pub fn with_handler(mut self, handler: Arc<dyn InvalidationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

type Pending = Arc<DashMap<u64, oneshot::Sender<Reply>>>;

/// Typed client for the file service.
pub struct RpcClient {
    outbound: mpsc::Sender<Bytes>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    events: broadcast::Sender<ServerEvent>,
    call_timeout: Duration,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Connect with default options and look up the default service.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ConnectError> {
        Self::connect_with(addr, ConnectOptions::default()).await
    }

    /// Connect, start the I/O tasks, and look up `options.service`.
    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        options: ConnectOptions,
    ) -> Result<Self, ConnectError> {
        let connect_timeout = options.connect_timeout;
        tokio::time::timeout(connect_timeout, Self::establish(addr, options))
            .await
            .map_err(|_| ConnectError::Timeout(connect_timeout))?
    }

    async fn establish(addr: impl ToSocketAddrs, options: ConnectOptions) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        let codec = || {
            LengthDelimitedCodec::builder()
                .max_frame_length(options.max_frame_length)
                .new_codec()
        };
        let (read_half, write_half) = stream.into_split();
        let frames_in = FramedRead::new(read_half, codec());
        let mut frames_out = FramedWrite::new(write_half, codec());

        let (outbound, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                if let Err(e) = frames_out.send(bytes).await {
                    log::debug!("write to {} failed: {}", peer, e);
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let reader = tokio::spawn(read_frames(
            frames_in,
            pending.clone(),
            closed.clone(),
            events.clone(),
            options.handler.clone(),
        ));

        let client = Self {
            outbound,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            events,
            call_timeout: options.call_timeout,
            reader,
        };

        client.expect_ack(
            "lookup",
            Request::Lookup {
                service: options.service.clone(),
            },
        )
        .await?;
        log::info!("connected to {} service {:?}", peer, options.service);
        Ok(client)
    }

    /// Subscribe to pushes and connection loss.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Send a raw request and wait for its reply.
    pub async fn call(&self, request: Request) -> Result<Reply, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let op = request.op();
        let bytes = shoko_types::encode(&ClientFrame::Call { id, request })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // The reader may have shut down between the check above and the insert.
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&id);
            return Err(RpcError::Disconnected);
        }

        if self.outbound.send(Bytes::from(bytes)).await.is_err() {
            self.pending.remove(&id);
            return Err(RpcError::Disconnected);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::Disconnected),
            Err(_) => {
                self.pending.remove(&id);
                log::warn!("{} call {} timed out", op, id);
                Err(RpcError::Timeout(self.call_timeout))
            }
        }
    }

    pub async fn create(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), RpcError> {
        self.expect_ack(
            "create",
            Request::Create {
                name: Some(name.to_owned()),
                data: Some(data.into()),
            },
        )
        .await
    }

    pub async fn delete(&self, name: &str) -> Result<(), RpcError> {
        self.expect_ack(
            "delete",
            Request::Delete {
                name: Some(name.to_owned()),
            },
        )
        .await
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, RpcError> {
        let request = Request::Read {
            name: Some(name.to_owned()),
        };
        match self.call(request).await? {
            Reply::Data(data) => Ok(data),
            Reply::Error(e) => Err(RpcError::Server(e)),
            reply => Err(RpcError::UnexpectedReply { op: "read", reply }),
        }
    }

    pub async fn modify(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), RpcError> {
        self.expect_ack(
            "modify",
            Request::Modify {
                name: Some(name.to_owned()),
                data: Some(data.into()),
            },
        )
        .await
    }

    pub async fn rename(&self, name: &str, new_name: &str) -> Result<(), RpcError> {
        self.expect_ack(
            "rename",
            Request::Rename {
                name: Some(name.to_owned()),
                new_name: Some(new_name.to_owned()),
            },
        )
        .await
    }

    pub async fn list(&self) -> Result<Vec<String>, RpcError> {
        match self.call(Request::List).await? {
            Reply::Names(names) => Ok(names),
            Reply::Error(e) => Err(RpcError::Server(e)),
            reply => Err(RpcError::UnexpectedReply { op: "list", reply }),
        }
    }

    /// Ask the server to push cache invalidations to this connection.
    pub async fn register(&self, identity: &str) -> Result<(), RpcError> {
        self.expect_ack(
            "register",
            Request::Register {
                identity: Some(identity.to_owned()),
            },
        )
        .await
    }

    async fn expect_ack(&self, op: &'static str, request: Request) -> Result<(), RpcError> {
        match self.call(request).await? {
            Reply::Ack => Ok(()),
            Reply::Error(e) => Err(RpcError::Server(e)),
            reply => Err(RpcError::UnexpectedReply { op, reply }),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_frames(
    mut frames_in: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    events: broadcast::Sender<ServerEvent>,
    handler: Option<Arc<dyn InvalidationHandler>>,
) {
    while let Some(next) = frames_in.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("read failed: {}", e);
                break;
            }
        };
        match shoko_types::decode::<ServerFrame>(&bytes) {
            Ok(ServerFrame::Reply { id, reply }) => match pending.remove(&id) {
                Some((_, tx)) => {
                    let _ = tx.send(reply);
                }
                None => log::debug!("reply for unknown call {}", id),
            },
            Ok(ServerFrame::InvalidateCache { name }) => {
                tracing::debug!(name = %name, "cache invalidation received");
                if let Some(handler) = &handler {
                    handler.invalidate_cache(&name);
                }
                let _ = events.send(ServerEvent::CacheInvalidated { name });
            }
            Ok(ServerFrame::InvalidateAll) => {
                log::debug!("server requested full cache invalidation");
                if let Some(handler) = &handler {
                    handler.invalidate_all();
                }
                let _ = events.send(ServerEvent::AllInvalidated);
            }
            Err(e) => {
                log::warn!("dropping connection on undecodable frame: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders wakes every waiting caller with Disconnected.
    pending.clear();
    if let Some(handler) = &handler {
        handler.connection_lost();
    }
    let _ = events.send(ServerEvent::Disconnected);
    log::info!("connection closed");
}
