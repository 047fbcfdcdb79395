//! One established connection to a remote peer.
//!
//! A [`Session`] multiplexes every negotiated sub-protocol over a single
//! transport and owns the connection's lifecycle:
//!
//! ```text
//!  New ──handshake──▶ HandshakeComplete ──initialize──▶ Initialized
//!                                                           │
//!                                            initiate_disconnect
//!                                                           ▼
//!  Disconnected ◀── Disconnecting ◀──mark_disconnected── DisconnectingProtocols
//! ```
//!
//! The session is driven concurrently by the connection's reader (handshake,
//! inbound frames) and by any component that decides to drop the peer
//! (timeouts, protocol violation checks, shutdown). All lifecycle decisions
//! are a check-and-act on `lifecycle` under one short-held lock. Handler
//! dispatch, resolver lookups and transport calls always happen after that
//! lock is released.
//!
//! Racing a disconnect is normal: once the session is closing, operations
//! that would otherwise be misuse quietly do nothing.

use {
    crate::{
        capability::ProtocolCode,
        config::SessionConfig,
        disconnect::{DisconnectReason, DisconnectType, DisconnectsAnalyzer, NoopDisconnectsAnalyzer},
        error::{Result, SessionError},
        events::{SessionEvent, SessionListener, Subscribers},
        handler::{P2PProtocolHandler, SessionHandler},
        node::{Direction, Node, NodeKey, PeerIdentity},
        packet::{OutboundMessage, RawFrame},
        resolver::{AdaptiveCodeResolver, ResolverCache},
        stats::SessionStats,
        transport::{PacketSender, Transport, TransportContext},
    },
    log::*,
    parking_lot::{Mutex, RwLock},
    std::{
        collections::HashMap,
        fmt,
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::Builder,
        time::Duration,
    },
};

/// Lifecycle states, in the only order a session moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Connected; the transport handshake has not finished.
    New,
    /// The transport confirmed the remote identity.
    HandshakeComplete,
    /// The p2p handshake finished; messages flow both ways.
    Initialized,
    /// Handlers are being told the session is going down.
    DisconnectingProtocols,
    /// The transport is being torn down.
    Disconnecting,
    Disconnected,
}

impl SessionState {
    pub fn is_closing(self) -> bool {
        self > SessionState::Initialized
    }

    pub fn is_closed(self) -> bool {
        self > SessionState::DisconnectingProtocols
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Locally generated session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new_random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    best_state_reached: SessionState,
    pending_disconnect: Option<(DisconnectReason, Option<String>)>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: SessionState::New,
            best_state_reached: SessionState::New,
            pending_disconnect: None,
        }
    }

    fn transition(&mut self, state: SessionState) {
        self.state = state;
        if state <= SessionState::Initialized {
            self.best_state_reached = self.best_state_reached.max(state);
        }
    }
}

/// What `initialize` binds.
struct Binding {
    protocol_version: u8,
    context: Arc<dyn TransportContext>,
    packet_sender: Arc<dyn PacketSender>,
}

struct Registry {
    handlers: HashMap<ProtocolCode, SessionHandler>,
    resolver: Arc<AdaptiveCodeResolver>,
}

/// A peer session. Shared as `Arc<Session>` between the connection reader
/// and whoever may decide to disconnect it.
pub struct Session {
    id: SessionId,
    direction: Direction,
    config: SessionConfig,
    /// Guards every lifecycle decision.
    lifecycle: Mutex<Lifecycle>,
    identity: Mutex<PeerIdentity>,
    is_static: AtomicBool,
    binding: RwLock<Option<Binding>>,
    registry: RwLock<Registry>,
    transport: Arc<dyn Transport>,
    analyzer: Arc<dyn DisconnectsAnalyzer>,
    subscribers: Subscribers,
    stats: Mutex<SessionStats>,
}

impl Session {
    /// A session for a connection the peer dialed. Its identity is learned
    /// from the handshake and the socket.
    pub fn new_inbound(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(Direction::Inbound, PeerIdentity::default(), config, transport)
    }

    /// A session for a connection we dialed to a known node.
    pub fn new_outbound(
        config: SessionConfig,
        remote: NodeKey,
        host: impl Into<String>,
        port: u16,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(
            Direction::Outbound,
            PeerIdentity::known(remote, host.into(), port),
            config,
            transport,
        )
    }

    fn new(
        direction: Direction,
        identity: PeerIdentity,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let session = Self {
            id: SessionId::new_random(),
            direction,
            config,
            lifecycle: Mutex::new(Lifecycle::new()),
            identity: Mutex::new(identity),
            is_static: AtomicBool::new(false),
            binding: RwLock::new(None),
            registry: RwLock::new(Registry {
                handlers: HashMap::new(),
                resolver: ResolverCache::global().get_or_build(std::iter::empty()),
            }),
            transport,
            analyzer: Arc::new(NoopDisconnectsAnalyzer),
            subscribers: Subscribers::default(),
            stats: Mutex::new(SessionStats::new()),
        };
        debug!("{session} created");
        session
    }

    /// Report teardowns to `analyzer` instead of discarding them.
    pub fn with_disconnects_analyzer(mut self, analyzer: Arc<dyn DisconnectsAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// Highest state reached, never past [`SessionState::Initialized`].
    pub fn best_state_reached(&self) -> SessionState {
        self.lifecycle.lock().best_state_reached
    }

    pub fn is_closing(&self) -> bool {
        self.state().is_closing()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Reason of a disconnect requested before initialization, if any.
    pub fn pending_disconnect(&self) -> Option<DisconnectReason> {
        self.lifecycle
            .lock()
            .pending_disconnect
            .as_ref()
            .map(|(reason, _)| *reason)
    }

    /// p2p protocol version agreed at initialization.
    pub fn protocol_version(&self) -> Option<u8> {
        self.binding.read().as_ref().map(|b| b.protocol_version)
    }

    pub fn remote_node_key(&self) -> Option<NodeKey> {
        self.identity.lock().key()
    }

    /// The identity assumed before the handshake revealed a different one.
    pub fn obsolete_remote_node_key(&self) -> Option<NodeKey> {
        self.identity.lock().obsolete_key()
    }

    pub fn remote_host(&self) -> Option<String> {
        self.identity.lock().host().map(str::to_string)
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.identity.lock().port()
    }

    /// The remote node, once key, host and port are all known.
    pub fn node(&self) -> Option<Arc<Node>> {
        self.identity.lock().node()
    }

    /// Record the socket address of an inbound peer. An address that is
    /// already known is kept.
    pub fn set_remote_endpoint(&self, host: impl Into<String>, port: u16) {
        let updated = self.identity.lock().set_endpoint(host.into(), port);
        if !updated {
            debug!("{self} remote endpoint already known, ignoring update");
        }
    }

    pub fn is_static(&self) -> bool {
        self.is_static.load(Ordering::Relaxed)
    }

    /// Mark the peer static, shielding it from low-severity disconnects.
    pub fn set_static(&self, is_static: bool) {
        self.is_static.store(is_static, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    pub fn record_ping_sent(&self) {
        self.stats.lock().record_ping_sent();
    }

    pub fn record_pong_received(&self) {
        self.stats.lock().record_pong_received();
    }

    /// The resolver for the currently registered protocols.
    pub fn resolver(&self) -> Arc<AdaptiveCodeResolver> {
        Arc::clone(&self.registry.read().resolver)
    }

    pub fn try_get_protocol_handler(&self, protocol: &str) -> Option<SessionHandler> {
        self.registry.read().handlers.get(protocol).cloned()
    }

    /// The base protocol handler, for capability queries.
    pub fn p2p_handler(&self) -> Option<Arc<dyn P2PProtocolHandler>> {
        self.registry
            .read()
            .handlers
            .get(ProtocolCode::P2P)
            .and_then(|handler| handler.as_p2p().cloned())
    }

    pub fn subscribe(&self, listener: SessionListener) {
        self.subscribers.subscribe(listener);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// The transport handshake finished and confirmed `remote` as the peer's
    /// identity.
    pub fn handshake(&self, remote: Option<NodeKey>) -> Result<()> {
        let obsolete = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                state if state.is_closing() => {
                    debug!("{self} handshake completed while {state}, ignoring");
                    return Ok(());
                }
                state @ (SessionState::HandshakeComplete | SessionState::Initialized) => {
                    return Err(SessionError::misuse("handshake", state));
                }
                _ => {}
            }
            let obsolete = self.identity.lock().confirm_key(remote);
            lifecycle.transition(SessionState::HandshakeComplete);
            obsolete
        };
        if let Some(obsolete) = obsolete {
            info!(
                "{self} handshake revealed a different identity than dialed ({})",
                obsolete.short_hex()
            );
        }
        debug!("{self} handshake complete");
        self.subscribers.emit(&SessionEvent::HandshakeComplete);
        Ok(())
    }

    /// The p2p handshake finished: bind the agreed version and the
    /// connection's sender, then run any disconnect requested meanwhile.
    ///
    /// Listeners see [`SessionEvent::Initialized`] before a deferred
    /// disconnect starts, so the greeting sent on initialization always goes
    /// out first.
    pub fn initialize(
        &self,
        protocol_version: u8,
        context: Arc<dyn TransportContext>,
        packet_sender: Arc<dyn PacketSender>,
    ) -> Result<()> {
        let pending = {
            let mut lifecycle = self.lifecycle.lock();
            let state = lifecycle.state;
            if state.is_closing() {
                debug!("{self} initialized while {state}, ignoring");
                return Ok(());
            }
            if state != SessionState::HandshakeComplete {
                return Err(SessionError::misuse("initialize", state));
            }
            *self.binding.write() = Some(Binding {
                protocol_version,
                context,
                packet_sender,
            });
            lifecycle.transition(SessionState::Initialized);
            lifecycle.pending_disconnect.take()
        };
        debug!("{self} initialized with p2p version {protocol_version}");
        self.subscribers.emit(&SessionEvent::Initialized);

        if let Some((reason, details)) = pending {
            debug!("{self} running deferred {reason} disconnect");
            self.disconnect_protocols(reason, details.as_deref());
        }
        Ok(())
    }

    /// Switch the connection to compressed frames.
    pub fn enable_compression(&self) -> Result<()> {
        let context = self
            .binding
            .read()
            .as_ref()
            .map(|binding| Arc::clone(&binding.context));
        match context {
            Some(context) => {
                context.enable_compression();
                Ok(())
            }
            None => Err(SessionError::misuse("enable compression on", self.state())),
        }
    }

    /// Register a protocol handler. The p2p handler must come first.
    pub fn add_protocol_handler(&self, handler: SessionHandler) -> Result<()> {
        let protocol = handler.protocol_code().clone();
        let mut registry = self.registry.write();
        if !protocol.is_p2p() && !registry.handlers.contains_key(ProtocolCode::P2P) {
            return Err(SessionError::P2PNotRegistered(protocol));
        }
        if registry.handlers.contains_key(&protocol) {
            return Err(SessionError::DuplicateProtocol(protocol));
        }
        registry.handlers.insert(protocol.clone(), handler);
        registry.resolver = ResolverCache::global().get_or_build(
            registry
                .handlers
                .values()
                .map(|h| (h.protocol_code().clone(), h.message_id_space_size())),
        );
        drop(registry);
        debug!("{self} added {protocol} handler");
        Ok(())
    }

    // ── Traffic ─────────────────────────────────────────────────────────

    /// Route one inbound frame to its protocol handler.
    ///
    /// Never fails: frames that cannot be routed are logged and dropped, and
    /// whether that warrants a disconnect is left to the caller.
    pub fn receive_inbound(&self, frame: RawFrame) {
        let state = self.state();
        if state.is_closing() {
            trace!("{self} dropping frame {} while {state}", frame.adaptive_id);
            return;
        }
        if state < SessionState::Initialized {
            warn!("{self} dropping frame {} received in state {state}", frame.adaptive_id);
            return;
        }
        if frame.payload.len() > self.config.max_inbound_frame_size {
            warn!(
                "{self} dropping oversized frame {} ({} > {} bytes)",
                frame.adaptive_id,
                frame.payload.len(),
                self.config.max_inbound_frame_size
            );
            return;
        }

        let routed = {
            let registry = self.registry.read();
            registry
                .resolver
                .resolve(frame.adaptive_id)
                .map(|(protocol, local_id)| {
                    (
                        protocol.clone(),
                        local_id,
                        registry.handlers.get(protocol).cloned(),
                    )
                })
        };
        let Some((protocol, packet_type, handler)) = routed else {
            self.stats.lock().record_unresolved();
            warn!(
                "{self} unresolved adaptive id {} ({} bytes), frame dropped",
                frame.adaptive_id,
                frame.payload.len()
            );
            return;
        };
        let Some(handler) = handler else {
            warn!("{self} no handler for {protocol}, frame {packet_type} dropped");
            return;
        };

        let size = frame.payload.len();
        self.stats.lock().record_received(size);
        trace!("{self} received {protocol}.{packet_type} ({size} bytes)");
        handler.dispatch(packet_type, &frame.payload);
        self.subscribers.emit(&SessionEvent::MessageReceived {
            protocol,
            packet_type,
            size,
        });
    }

    /// Encode and send one outbound message, returning the number of bytes
    /// handed to the transport.
    ///
    /// A closed session swallows the message and returns `0`. Sending before
    /// initialization, or with a message id outside the protocol's space, is
    /// an error in the caller.
    pub fn deliver_outbound(&self, message: OutboundMessage) -> Result<usize> {
        let state = self.state();
        if state.is_closed() {
            trace!(
                "{self} dropping outbound {}.{} while {state}",
                message.protocol,
                message.local_id
            );
            return Ok(0);
        }
        if state < SessionState::Initialized {
            return Err(SessionError::misuse("deliver a message on", state));
        }

        let OutboundMessage {
            protocol,
            local_id,
            payload,
        } = message;
        let adaptive_id = self.registry.read().resolver.encode(protocol.as_str(), local_id)?;
        let sender = self
            .binding
            .read()
            .as_ref()
            .map(|binding| Arc::clone(&binding.packet_sender))
            .ok_or_else(|| SessionError::misuse("deliver a message on", state))?;

        let size = sender.send(RawFrame {
            adaptive_id,
            payload,
        });
        self.stats.lock().record_delivered(size);
        trace!("{self} delivered {protocol}.{local_id} as {adaptive_id} ({size} bytes)");
        self.subscribers.emit(&SessionEvent::MessageDelivered {
            protocol,
            packet_type: local_id,
            size,
        });
        Ok(size)
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Start a graceful, locally initiated disconnect.
    ///
    /// Low-severity reasons are ignored for static peers. Before
    /// initialization the request is parked and runs right after
    /// [`Session::initialize`]; only the first parked request is kept.
    pub fn initiate_disconnect(&self, reason: DisconnectReason, details: Option<&str>) {
        if self.is_static() && self.config.protects_static_peer_from(reason) {
            debug!("{self} keeping static peer despite {reason} disconnect");
            return;
        }
        self.disconnect_protocols(reason, details);
    }

    fn disconnect_protocols(&self, reason: DisconnectReason, details: Option<&str>) {
        {
            let mut lifecycle = self.lifecycle.lock();
            let state = lifecycle.state;
            if state.is_closing() {
                trace!("{self} already {state}, ignoring {reason} disconnect");
                return;
            }
            if state <= SessionState::HandshakeComplete {
                if lifecycle.pending_disconnect.is_none() {
                    lifecycle.pending_disconnect = Some((reason, details.map(str::to_string)));
                    debug!("{self} deferring {reason} disconnect until initialized");
                }
                return;
            }
            lifecycle.transition(SessionState::DisconnectingProtocols);
        }
        debug!(
            "{self} disconnecting protocols: {reason} {}",
            details.unwrap_or_default()
        );

        for handler in self.handlers_in_teardown_order() {
            let protocol = handler.protocol_code().clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                handler.disconnect_protocol(reason, details)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    let err = SessionError::HandlerTeardown { protocol, source };
                    warn!("{self} {err}");
                }
                Err(_) => warn!("{self} {protocol} handler panicked while disconnecting"),
            }
        }

        self.mark_disconnected(reason, DisconnectType::Local, details);
    }

    /// Sub-protocols first, p2p last, so its `Disconnect` message is the
    /// final thing the peer hears.
    fn handlers_in_teardown_order(&self) -> Vec<SessionHandler> {
        let registry = self.registry.read();
        let mut handlers: Vec<_> = registry.handlers.values().cloned().collect();
        handlers.sort_by(|a, b| {
            let (a, b) = (a.protocol_code(), b.protocol_code());
            (a.is_p2p(), a).cmp(&(b.is_p2p(), b))
        });
        handlers
    }

    /// Tear the session down. Idempotent: only the first call does anything.
    ///
    /// Returns once the session is `Disconnected` and listeners have been
    /// told; the transport closes in the background.
    pub fn mark_disconnected(
        &self,
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        details: Option<&str>,
    ) {
        let was_initialized = {
            let mut lifecycle = self.lifecycle.lock();
            let state = lifecycle.state;
            if state >= SessionState::Disconnecting {
                return;
            }
            lifecycle.transition(SessionState::Disconnecting);
            state >= SessionState::Initialized
        };
        if disconnect_type == DisconnectType::Local {
            debug!("{self} disconnecting: {reason} {}", details.unwrap_or_default());
        } else {
            debug!("{self} disconnected by peer: {reason} {}", details.unwrap_or_default());
        }

        self.analyzer
            .report_disconnect(reason, disconnect_type, details);
        self.subscribers.emit(&SessionEvent::Disconnecting {
            reason,
            disconnect_type,
            details: details.map(str::to_string),
        });

        let delay = if was_initialized && disconnect_type == DisconnectType::Local {
            self.config.disconnect_grace_delay()
        } else {
            Duration::ZERO
        };
        self.spawn_transport_close(delay);

        self.lifecycle.lock().transition(SessionState::Disconnected);
        let notified = self.subscribers.emit(&SessionEvent::Disconnected {
            reason,
            disconnect_type,
            details: details.map(str::to_string),
        });
        if notified == 0 {
            error!("{self} disconnected with no subscribers, the session may be leaked");
        }
    }

    fn spawn_transport_close(&self, delay: Duration) {
        let transport = Arc::clone(&self.transport);
        let label = self.to_string();
        let close = {
            let label = label.clone();
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match transport.close().await {
                    Ok(()) => debug!("{label} transport closed"),
                    Err(err) => {
                        let err = SessionError::TeardownIo(err);
                        warn!("{label} {err}");
                    }
                }
            }
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(close);
            return;
        }
        // Outside a runtime: drive the close on its own thread.
        let spawned = Builder::new()
            .name("trv1SessClose".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(close),
                    Err(err) => error!("{label} cannot build teardown runtime: {err}"),
                }
            });
        if let Err(err) = spawned {
            error!("{self} cannot spawn teardown thread: {err}");
        }
    }

    /// Release every handler. Only valid once the session is disconnected.
    pub fn dispose(&self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Disconnected {
            return Err(SessionError::misuse("dispose", state));
        }
        let handlers: Vec<_> = self
            .registry
            .write()
            .handlers
            .drain()
            .map(|(_, handler)| handler)
            .collect();
        for handler in handlers {
            handler.dispose();
        }
        self.binding.write().take();
        debug!("{self} disposed");
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity.lock();
        write!(f, "{}|{}|", self.direction, self.id)?;
        match identity.host() {
            Some(host) => f.write_str(host)?,
            None => f.write_str("?")?,
        }
        match identity.port() {
            Some(port) => write!(f, ":{port}"),
            None => f.write_str(":?"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .field("remote", &self.remote_node_key())
            .finish_non_exhaustive()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
