//! Request dispatch for the file service.
//!
//! Session-level calls (`Lookup`, `Register`) touch per-connection state and
//! are answered inline by [`FileService::route`]. File calls are handed back as
//! [`Routed::Store`] and executed by [`FileService::dispatch`], which may block
//! on store locks and is run on a blocking worker by the server loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use shoko_kernel::{ClientHandle, InvalidationSink, NotifyError};
use shoko_types::{ErrorKind, Reply, Request, ServerFrame, WireError};
use tokio::sync::{Notify, mpsc};

use crate::context::ServerContext;

/// Overflow marker shared by a connection's push channel and its queue.
#[derive(Debug, Default)]
struct Overflow {
    pending: AtomicBool,
    wake: Notify,
}

/// Create the push side of a connection.
///
/// Pushes get their own queue so a backlog of replies can never crowd out an
/// invalidation. If the push queue itself fills, the push is folded into a
/// single [`ServerFrame::InvalidateAll`] that the writer sends next.
pub fn push_channel(depth: usize) -> (PushChannel, PushQueue) {
    let (tx, rx) = mpsc::channel(depth);
    let overflow = Arc::new(Overflow::default());
    (
        PushChannel {
            tx,
            overflow: overflow.clone(),
        },
        PushQueue { rx, overflow },
    )
}

/// Invalidation channel feeding a connection's [`PushQueue`].
///
/// Never blocks the writer that triggered the push.
#[derive(Debug, Clone)]
pub struct PushChannel {
    tx: mpsc::Sender<String>,
    overflow: Arc<Overflow>,
}

impl InvalidationSink for PushChannel {
    fn push(&self, name: &str) -> Result<(), NotifyError> {
        match self.tx.try_send(name.to_owned()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(name, "push queue full, escalating to full invalidation");
                self.overflow.pending.store(true, Ordering::Release);
                self.overflow.wake.notify_one();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::Disconnected),
        }
    }
}

/// Receiving end of a connection's pushes, drained by its writer.
#[derive(Debug)]
pub struct PushQueue {
    rx: mpsc::Receiver<String>,
    overflow: Arc<Overflow>,
}

impl PushQueue {
    /// Next push frame. `None` once every [`PushChannel`] is gone.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        loop {
            if self.overflow.pending.swap(false, Ordering::AcqRel) {
                return Some(ServerFrame::InvalidateAll);
            }
            tokio::select! {
                biased;
                name = self.rx.recv() => {
                    return name.map(|name| ServerFrame::InvalidateCache { name });
                }
                _ = self.overflow.wake.notified() => {}
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ServerFrame> {
        if self.overflow.pending.swap(false, Ordering::AcqRel) {
            return Some(ServerFrame::InvalidateAll);
        }
        self.rx
            .try_recv()
            .ok()
            .map(|name| ServerFrame::InvalidateCache { name })
    }

    /// Refuse further pushes; later sends report the client disconnected.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Per-connection state.
#[derive(Debug)]
pub struct Session {
    peer: String,
    bound: bool,
    push: PushChannel,
    registered: Option<Arc<ClientHandle>>,
}

impl Session {
    pub fn new(peer: impl Into<String>, push: PushChannel) -> Self {
        Self {
            peer: peer.into(),
            bound: false,
            push,
            registered: None,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Identity this connection registered under, if any.
    pub fn identity(&self) -> Option<&str> {
        self.registered.as_ref().map(|h| h.identity())
    }
}

/// Where a request goes next.
#[derive(Debug)]
pub enum Routed {
    /// Answered without touching the store.
    Done(Reply),
    /// A file operation to run on a blocking worker.
    Store(Request),
}

/// The file service exported under the configured service name.
#[derive(Debug, Clone)]
pub struct FileService {
    ctx: ServerContext,
}

impl FileService {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Handle session-level calls and gate file calls behind lookup.
    pub fn route(&self, session: &mut Session, request: Request) -> Routed {
        match request {
            Request::Lookup { service } => Routed::Done(self.lookup(session, &service).into()),
            _ if !session.bound => Routed::Done(Reply::Error(WireError::new(
                ErrorKind::NotBound,
                "look up the service before calling it",
            ))),
            Request::Register { identity } => Routed::Done(self.register(session, identity).into()),
            other => Routed::Store(other),
        }
    }

    /// Run one file operation against the store. May block on locks.
    pub fn dispatch(&self, request: Request) -> Reply {
        let store = &self.ctx.store;
        let result = match request {
            Request::Create { name, data } => required(name, "name")
                .and_then(|name| Ok((name, required(data, "data")?)))
                .and_then(|(name, data)| Ok(store.create(&name, data)?))
                .map(|()| Reply::Ack),
            Request::Delete { name } => required(name, "name")
                .and_then(|name| Ok(store.delete(&name)?))
                .map(|()| Reply::Ack),
            Request::Read { name } => required(name, "name")
                .and_then(|name| Ok(store.read(&name)?))
                .map(Reply::Data),
            Request::Modify { name, data } => required(name, "name")
                .and_then(|name| Ok((name, required(data, "data")?)))
                .and_then(|(name, data)| Ok(store.modify(&name, data)?))
                .map(|()| Reply::Ack),
            Request::Rename { name, new_name } => required(name, "name")
                .and_then(|name| Ok((name, required(new_name, "new_name")?)))
                .and_then(|(name, new_name)| Ok(store.rename(&name, &new_name)?))
                .map(|()| Reply::Ack),
            Request::List => Ok(Reply::Names(store.list())),
            Request::Lookup { .. } | Request::Register { .. } => Err(WireError::new(
                ErrorKind::Internal,
                "session call routed to the store",
            )),
        };
        result.unwrap_or_else(Reply::Error)
    }

    /// Tear down session state when the connection ends.
    pub fn close(&self, session: &Session) {
        if let Some(handle) = &session.registered {
            if self.ctx.coordinator.deactivate_handle(handle) {
                tracing::info!(identity = %handle.identity(), peer = %session.peer(), "client session closed");
            }
        }
    }

    fn lookup(&self, session: &mut Session, service: &str) -> Result<(), WireError> {
        if service != self.ctx.config.service_name {
            tracing::debug!(peer = %session.peer(), service, "lookup of unknown service");
            return Err(WireError::new(
                ErrorKind::UnknownService,
                format!("no service bound under {service:?}"),
            ));
        }
        session.bound = true;
        Ok(())
    }

    fn register(&self, session: &mut Session, identity: Option<String>) -> Result<(), WireError> {
        let identity = required(identity, "identity")?;
        if identity.is_empty() {
            return Err(WireError::new(
                ErrorKind::InvalidArgument,
                "client identity must not be empty",
            ));
        }

        // A connection re-registering under a new identity leaves its old one.
        if let Some(previous) = session.registered.take() {
            self.ctx.coordinator.deactivate_handle(&previous);
        }

        let handle = Arc::new(ClientHandle::new(identity, session.push.clone()));
        self.ctx.coordinator.register(handle.clone());
        session.registered = Some(handle);
        Ok(())
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, WireError> {
    value.ok_or_else(|| WireError::missing(field))
}
