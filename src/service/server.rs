//! TCP server engine.
//!
//! One dedicated accept task plus one driver task per connection, running on
//! tokio's multi-threaded runtime. The runtime's reactor is the readiness
//! monitor: a driver registers its socket by awaiting it, is woken exactly
//! once per readiness event, and never runs concurrently with itself, so a
//! connection's context needs no lock of its own.
//!
//! ## Lifecycle
//! ```text
//! Stopped -> Binding -> Listening -> ShuttingDown -> Stopped
//! ```
//! `start` binds and listens, then spawns the accept loop. `shutdown`
//! signals the accept loop, joins it, closes the listener, and force-closes
//! every registered connection before returning.

use crate::config::EngineConfig;
use crate::conn::{ConnContext, ConnHandle, ConnRegistry};
use crate::core::frame;
use crate::error::{EngineError, Result};
use crate::protocol::dispatcher::Dispatch;
use crate::protocol::handshake;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `shutdown` waits for forced connection closures to drain.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Binding,
    Listening,
    ShuttingDown,
}

/// Connection-oriented TCP server exchanging length-prefixed messages.
pub struct Server {
    config: Arc<EngineConfig>,
    dispatch: Arc<dyn Dispatch>,
    registry: Arc<ConnRegistry>,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl Server {
    /// Create a stopped server with the given configuration and dispatch
    /// seam.
    pub fn new(config: EngineConfig, dispatch: impl Dispatch) -> Self {
        Self {
            config: Arc::new(config),
            dispatch: Arc::new(dispatch),
            registry: Arc::new(ConnRegistry::new()),
            state: ServerState::Stopped,
            local_addr: None,
            accept_task: None,
            shutdown_tx: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address the listener is bound to, once listening. Useful when
    /// starting on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Shared handle to the connection registry.
    pub fn registry(&self) -> Arc<ConnRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind, listen, and start accepting connections on the given port.
    ///
    /// Returns the bound address. Each failure releases whatever was
    /// acquired before it: a `Listen` or `MonitorInit` error drops the
    /// socket and leaves the server `Stopped`.
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr> {
        if self.state != ServerState::Stopped {
            return Err(EngineError::AlreadyListening);
        }
        self.config.validate_strict()?;

        self.state = ServerState::Binding;
        let listener = match self.bind_and_listen(port) {
            Ok(listener) => listener,
            Err(e) => {
                self.state = ServerState::Stopped;
                return Err(e);
            }
        };

        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state = ServerState::Stopped;
                return Err(EngineError::Listen(e));
            }
        };

        // The reactor doubles as the readiness monitor; without a runtime
        // there is nothing to deliver readiness events.
        if let Err(e) = tokio::runtime::Handle::try_current() {
            self.state = ServerState::Stopped;
            return Err(EngineError::MonitorInit(std::io::Error::other(e)));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            shutdown_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatch),
            Arc::clone(&self.config),
        ));

        self.shutdown_tx = Some(shutdown_tx);
        self.accept_task = Some(accept_task);
        self.local_addr = Some(local_addr);
        self.state = ServerState::Listening;
        info!(addr = %local_addr, "Server listening");

        Ok(local_addr)
    }

    fn bind_and_listen(&self, port: u16) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.listener.host, port)
            .parse()
            .map_err(|e| {
                EngineError::Bind(std::io::Error::new(ErrorKind::InvalidInput, format!("{e}")))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(EngineError::Bind)?;
        socket.set_reuseaddr(true).map_err(EngineError::Bind)?;
        socket.bind(addr).map_err(EngineError::Bind)?;
        debug!(addr = %addr, "Bound listening socket");

        socket
            .listen(self.config.listener.accept_backlog)
            .map_err(EngineError::Listen)
    }

    /// Stop accepting, join the accept task, and force-close every open
    /// connection.
    ///
    /// # Errors
    /// `NotListening` if the server was never started or already stopped.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state != ServerState::Listening {
            return Err(EngineError::NotListening);
        }
        self.state = ServerState::ShuttingDown;
        info!("Server shutting down");

        if let Some(tx) = self.shutdown_tx.take() {
            // The accept task may already be gone; nothing to signal then.
            let _ = tx.send(true);
        }
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Accept task ended abnormally");
            }
        }

        // The listener is dropped inside the accept task. Remaining client
        // connections are told to close and given a bounded drain window.
        for (id, handle) in self.registry.handles() {
            debug!(conn = %id, peer = %handle.peer, "Forcing connection closed");
            handle.closer.notify_one();
        }
        let drained = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
            while !self.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.registry.len(),
                "Shutdown drain timed out with connections still registered"
            );
        }

        self.local_addr = None;
        self.state = ServerState::Stopped;
        info!("Server stopped");
        Ok(())
    }
}

/// Dedicated accept loop, lifetime bound to the listening socket.
///
/// Transient accept failures are logged and retried immediately; the loop
/// ends when the shutdown channel fires, which drops (closes) the listener.
async fn accept_loop(
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
    registry: Arc<ConnRegistry>,
    dispatch: Arc<dyn Dispatch>,
    config: Arc<EngineConfig>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Accept loop received shutdown signal");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let ctx = ConnContext::allocate(
                            peer,
                            &config.buffers,
                            config.handshake.required,
                        );
                        let handle = ConnHandle::new(peer);
                        let closer = Arc::clone(&handle.closer);

                        if let Err(e) = registry.insert(ctx.id, handle) {
                            // A duplicate id is a coordination bug; accepting
                            // further connections on broken bookkeeping helps
                            // nobody.
                            error!(error = %e, conn = %ctx.id, "Registry rejected new connection; stopping accept loop");
                            break;
                        }

                        info!(conn = %ctx.id, peer = %peer, "Accepted connection");
                        tokio::spawn(drive_connection(
                            stream,
                            ctx,
                            closer,
                            Arc::clone(&registry),
                            Arc::clone(&dispatch),
                            Arc::clone(&config),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed; retrying");
                    }
                }
            }
        }
    }
}

/// Own a connection from registration to closure.
///
/// On exit the registry entry is removed first, then the stream and context
/// are dropped, closing the descriptor and releasing the buffer. That order
/// guarantees no lookup can observe a connection whose resources are gone.
async fn drive_connection(
    mut stream: TcpStream,
    mut ctx: ConnContext,
    closer: Arc<Notify>,
    registry: Arc<ConnRegistry>,
    dispatch: Arc<dyn Dispatch>,
    config: Arc<EngineConfig>,
) {
    let id = ctx.id;
    let peer = ctx.peer;

    // The closer races the entire workload, not just the receive wait: a
    // driver parked in the handshake or stalled in a send must still
    // observe a forced close, or shutdown would hang on an uncooperative
    // peer.
    let result = tokio::select! {
        _ = closer.notified() => {
            debug!(conn = %id, "Connection close requested");
            Ok(())
        }
        res = connection_loop(&mut stream, &mut ctx, &dispatch, &config) => res,
    };

    if let Err(e) = registry.remove(id) {
        warn!(conn = %id, error = %e, "Failed to remove connection from registry");
    }

    match result {
        Ok(()) => info!(conn = %id, peer = %peer, "Connection closed"),
        Err(EngineError::PeerDisconnected) => {
            debug!(conn = %id, peer = %peer, "Peer disconnected")
        }
        Err(e) if e.is_connection_scoped() => {
            warn!(conn = %id, peer = %peer, error = %e, "Connection closed on error")
        }
        Err(e) => error!(conn = %id, peer = %peer, error = %e, "Connection closed unexpectedly"),
    }
}

/// Handshake, then the receive/dispatch/send cycle until closure.
async fn connection_loop(
    stream: &mut TcpStream,
    ctx: &mut ConnContext,
    dispatch: &Arc<dyn Dispatch>,
    config: &EngineConfig,
) -> Result<()> {
    if ctx.awaiting_handshake {
        handshake::server_side(stream, &config.handshake).await?;
        ctx.awaiting_handshake = false;
    }

    loop {
        receive_message(stream, ctx, config).await?;
        let response = dispatch.dispatch(ctx.id, ctx.pending_message())?;
        send_response(stream, ctx, &response, config).await?;
    }
}

/// Receive pipeline: one complete message per invocation.
///
/// `read_exact` suspends on would-block and resumes on the next readiness
/// event without disturbing the partial byte count, so a prefix or body
/// spread over many events arrives intact. A zero-length read or any hard
/// error surfaces as `PeerDisconnected`/`Read` and closes the connection.
async fn receive_message(
    stream: &mut TcpStream,
    ctx: &mut ConnContext,
    config: &EngineConfig,
) -> Result<usize> {
    let mut prefix = [0u8; frame::LENGTH_PREFIX_LEN];
    read_exact_or_close(stream, &mut prefix).await?;

    let body_len = frame::decode_length(prefix) as usize;
    frame::check_length(body_len, config.buffers.max_message_size)?;

    ctx.ensure_capacity(body_len);
    if body_len > 0 {
        read_exact_or_close(stream, &mut ctx.recv_buffer[..body_len]).await?;
    }
    ctx.last_body_len = body_len;

    debug!(conn = %ctx.id, bytes = body_len, "Received message");
    Ok(body_len)
}

async fn read_exact_or_close(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(EngineError::PeerDisconnected),
        Err(e) => Err(EngineError::Read(e)),
    }
}

/// Send pipeline: frame and transmit the response, then let the buffer
/// adapt.
///
/// `write_all` loops over partial writes and would-block results. The driver
/// loops straight back into `receive_message` afterward, which is what
/// keeps the connection armed for its next readiness event.
async fn send_response(
    stream: &mut TcpStream,
    ctx: &mut ConnContext,
    body: &[u8],
    config: &EngineConfig,
) -> Result<()> {
    frame::check_length(body.len(), config.buffers.max_message_size)?;

    let mut out = BytesMut::new();
    frame::encode_frame(body, &mut out);
    stream.write_all(&out).await.map_err(EngineError::Write)?;
    stream.flush().await.map_err(EngineError::Write)?;

    debug!(conn = %ctx.id, bytes = body.len(), "Sent response");
    ctx.reset_after_message(&config.buffers);
    Ok(())
}
