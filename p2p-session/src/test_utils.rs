//! Recording fakes for the session's collaborators.

use {
    crate::{
        capability::{Capability, ProtocolCode},
        config::SessionConfig,
        disconnect::{DisconnectReason, DisconnectType, DisconnectsAnalyzer},
        error::HandlerError,
        events::{SessionEvent, SessionListener},
        handler::{
            BufferedProtocolHandler, P2PProtocolHandler, ProtocolHandler, SessionHandler,
            ZeroCopyProtocolHandler,
        },
        node::{NodeKey, NODE_KEY_LEN},
        packet::{Packet, RawFrame, ZeroPacket},
        session::Session,
        transport::{PacketSender, Transport, TransportContext},
    },
    async_trait::async_trait,
    bytes::Bytes,
    parking_lot::Mutex,
    std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    },
    tokio::sync::Notify,
};

/// Initialize env_logger once for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

pub fn node_key(n: u8) -> NodeKey {
    let mut bytes = [0u8; NODE_KEY_LEN];
    bytes[0] = n;
    bytes[NODE_KEY_LEN - 1] = 0xBB;
    NodeKey::new(bytes)
}

/// What a handler observed.
#[derive(Debug, Default)]
pub struct HandlerLog {
    pub received: Vec<(u32, Bytes)>,
    pub disconnects: Vec<(DisconnectReason, Option<String>)>,
    pub disposed: usize,
}

/// How a handler's disconnect callback behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownBehavior {
    Succeed,
    Fail,
    Panic,
}

struct HandlerCore {
    protocol: ProtocolCode,
    version: u8,
    space: u32,
    teardown: TeardownBehavior,
    log: Mutex<HandlerLog>,
}

impl HandlerCore {
    fn new(protocol: &str, version: u8, space: u32) -> Self {
        Self {
            protocol: ProtocolCode::new(protocol),
            version,
            space,
            teardown: TeardownBehavior::Succeed,
            log: Mutex::new(HandlerLog::default()),
        }
    }

    fn disconnect(
        &self,
        reason: DisconnectReason,
        details: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.log
            .lock()
            .disconnects
            .push((reason, details.map(str::to_string)));
        match self.teardown {
            TeardownBehavior::Succeed => Ok(()),
            TeardownBehavior::Fail => Err(format!("{} teardown failed", self.protocol).into()),
            TeardownBehavior::Panic => panic!("{} teardown panicked", self.protocol),
        }
    }
}

macro_rules! impl_protocol_handler {
    ($handler:ty) => {
        impl ProtocolHandler for $handler {
            fn protocol_code(&self) -> &ProtocolCode {
                &self.core.protocol
            }

            fn protocol_version(&self) -> u8 {
                self.core.version
            }

            fn message_id_space_size(&self) -> u32 {
                self.core.space
            }

            fn disconnect_protocol(
                &self,
                reason: DisconnectReason,
                details: Option<&str>,
            ) -> Result<(), HandlerError> {
                self.core.disconnect(reason, details)
            }

            fn dispose(&self) {
                let mut log = self.core.log.lock();
                log.disposed = log.disposed.saturating_add(1);
            }
        }

        impl $handler {
            pub fn with_teardown(mut self, teardown: TeardownBehavior) -> Self {
                self.core.teardown = teardown;
                self
            }

            pub fn received(&self) -> Vec<(u32, Bytes)> {
                self.core.log.lock().received.clone()
            }

            pub fn disconnects(&self) -> Vec<(DisconnectReason, Option<String>)> {
                self.core.log.lock().disconnects.clone()
            }

            pub fn disposed(&self) -> usize {
                self.core.log.lock().disposed
            }
        }
    };
}

/// A buffered handler that records everything it receives.
pub struct RecordingHandler {
    core: HandlerCore,
}

impl RecordingHandler {
    pub fn new(protocol: &str, version: u8, space: u32) -> Self {
        Self {
            core: HandlerCore::new(protocol, version, space),
        }
    }

    pub fn register(self: &Arc<Self>, session: &Session) -> crate::error::Result<()> {
        session.add_protocol_handler(SessionHandler::Buffered(Arc::clone(self) as _))
    }
}

impl_protocol_handler!(RecordingHandler);

impl BufferedProtocolHandler for RecordingHandler {
    fn handle_message(&self, packet: Packet) {
        self.core
            .log
            .lock()
            .received
            .push((packet.packet_type, packet.data));
    }
}

/// A zero-copy handler that copies out what it is shown.
pub struct RecordingZeroCopyHandler {
    core: HandlerCore,
}

impl RecordingZeroCopyHandler {
    pub fn new(protocol: &str, version: u8, space: u32) -> Self {
        Self {
            core: HandlerCore::new(protocol, version, space),
        }
    }

    pub fn register(self: &Arc<Self>, session: &Session) -> crate::error::Result<()> {
        session.add_protocol_handler(SessionHandler::ZeroCopy(Arc::clone(self) as _))
    }
}

impl_protocol_handler!(RecordingZeroCopyHandler);

impl ZeroCopyProtocolHandler for RecordingZeroCopyHandler {
    fn handle_message(&self, packet: &ZeroPacket<'_>) {
        self.core
            .log
            .lock()
            .received
            .push((packet.packet_type, Bytes::copy_from_slice(packet.data)));
    }
}

/// A p2p handler with fixed advertised capabilities.
pub struct TestP2PHandler {
    core: HandlerCore,
    available: Mutex<Vec<Capability>>,
    agreed: Mutex<Vec<Capability>>,
}

impl TestP2PHandler {
    pub const SPACE: u32 = 16;

    pub fn new(version: u8) -> Self {
        Self {
            core: HandlerCore::new(ProtocolCode::P2P, version, Self::SPACE),
            available: Mutex::new(Vec::new()),
            agreed: Mutex::new(Vec::new()),
        }
    }

    pub fn agree(&self, capability: Capability) {
        self.agreed.lock().push(capability);
    }

    pub fn register(self: &Arc<Self>, session: &Session) -> crate::error::Result<()> {
        session.add_protocol_handler(SessionHandler::P2P(Arc::clone(self) as _))
    }
}

impl_protocol_handler!(TestP2PHandler);

impl BufferedProtocolHandler for TestP2PHandler {
    fn handle_message(&self, packet: Packet) {
        self.core
            .log
            .lock()
            .received
            .push((packet.packet_type, packet.data));
    }
}

impl P2PProtocolHandler for TestP2PHandler {
    fn has_available_capability(&self, capability: &Capability) -> bool {
        self.available.lock().contains(capability)
    }

    fn has_agreed_capability(&self, capability: &Capability) -> bool {
        self.agreed.lock().contains(capability)
    }

    fn agreed_capabilities(&self) -> Vec<Capability> {
        self.agreed.lock().clone()
    }

    fn add_supported_capability(&self, capability: Capability) {
        let mut available = self.available.lock();
        if !available.contains(&capability) {
            available.push(capability);
        }
    }
}

/// A transport that records when it was closed.
#[derive(Default)]
pub struct RecordingTransport {
    closes: AtomicUsize,
    closed_at: Mutex<Option<Instant>>,
    fail_close: AtomicBool,
    closed: Notify,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail_close.store(true, Ordering::Relaxed);
        transport
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    pub fn closed_at(&self) -> Option<Instant> {
        *self.closed_at.lock()
    }

    /// Wait until `close` has been called, or give up after `timeout`.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let notified = self.closed.notified();
        if self.close_count() > 0 {
            return true;
        }
        tokio::time::timeout(timeout, notified).await.is_ok() || self.close_count() > 0
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn close(&self) -> std::io::Result<()> {
        *self.closed_at.lock() = Some(Instant::now());
        self.closes.fetch_add(1, Ordering::Relaxed);
        self.closed.notify_waiters();
        if self.fail_close.load(Ordering::Relaxed) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "socket already gone",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingContext {
    compression: AtomicBool,
}

impl RecordingContext {
    pub fn compression_enabled(&self) -> bool {
        self.compression.load(Ordering::Relaxed)
    }
}

impl TransportContext for RecordingContext {
    fn enable_compression(&self) {
        self.compression.store(true, Ordering::Relaxed);
    }
}

/// A packet sender that keeps every frame. Reports the payload length plus
/// one byte of frame header as the sent size.
#[derive(Default)]
pub struct RecordingSender {
    frames: Mutex<Vec<RawFrame>>,
}

impl RecordingSender {
    pub fn frames(&self) -> Vec<RawFrame> {
        self.frames.lock().clone()
    }
}

impl PacketSender for RecordingSender {
    fn send(&self, frame: RawFrame) -> usize {
        let size = frame.payload.len().saturating_add(1);
        self.frames.lock().push(frame);
        size
    }
}

#[derive(Default)]
pub struct RecordingAnalyzer {
    reports: Mutex<Vec<(DisconnectReason, DisconnectType, Option<String>)>>,
}

impl RecordingAnalyzer {
    pub fn reports(&self) -> Vec<(DisconnectReason, DisconnectType, Option<String>)> {
        self.reports.lock().clone()
    }
}

impl DisconnectsAnalyzer for RecordingAnalyzer {
    fn report_disconnect(
        &self,
        reason: DisconnectReason,
        disconnect_type: DisconnectType,
        details: Option<&str>,
    ) {
        self.reports
            .lock()
            .push((reason, disconnect_type, details.map(str::to_string)));
    }
}

/// Collects session events in order.
#[derive(Default, Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventRecorder {
    pub fn listener(&self) -> SessionListener {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &SessionEvent| events.lock().push(event.clone()))
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    /// Events with the message traffic filtered out.
    pub fn lifecycle(&self) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                !matches!(
                    event,
                    SessionEvent::MessageReceived { .. } | SessionEvent::MessageDelivered { .. }
                )
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| pred(event)).count()
    }
}

/// A session wired to recording fakes.
pub struct TestSession {
    pub session: Arc<Session>,
    pub transport: Arc<RecordingTransport>,
    pub context: Arc<RecordingContext>,
    pub sender: Arc<RecordingSender>,
    pub analyzer: Arc<RecordingAnalyzer>,
    pub events: EventRecorder,
    pub p2p: Arc<TestP2PHandler>,
}

impl TestSession {
    /// An outbound session with only the p2p handler registered, still in
    /// state `New`.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_transport(config, Arc::new(RecordingTransport::default()))
    }

    pub fn with_transport(config: SessionConfig, transport: Arc<RecordingTransport>) -> Self {
        let analyzer = Arc::new(RecordingAnalyzer::default());
        let session = Session::new_outbound(
            config,
            node_key(1),
            "127.0.0.1",
            30303,
            Arc::clone(&transport) as _,
        )
        .with_disconnects_analyzer(Arc::clone(&analyzer) as _);
        let events = EventRecorder::default();
        session.subscribe(events.listener());
        let session = Arc::new(session);
        let p2p = Arc::new(TestP2PHandler::new(5));
        p2p.register(&session)
            .expect("p2p is the first handler");
        Self {
            session,
            transport,
            context: Arc::new(RecordingContext::default()),
            sender: Arc::new(RecordingSender::default()),
            analyzer,
            events,
            p2p,
        }
    }

    pub fn handshake(&self) {
        self.session
            .handshake(Some(node_key(1)))
            .expect("handshake from New");
    }

    pub fn initialize(&self) -> crate::error::Result<()> {
        self.session.initialize(
            5,
            Arc::clone(&self.context) as _,
            Arc::clone(&self.sender) as _,
        )
    }

    /// Handshake and initialize.
    pub fn initialized(config: SessionConfig) -> Self {
        let test = Self::new(config);
        test.handshake();
        test.initialize().expect("initialize after handshake");
        test
    }
}
