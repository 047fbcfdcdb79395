//! Remote peer identity.

use std::{fmt, sync::Arc};

/// Length of an uncompressed secp256k1 public key without its prefix byte.
pub const NODE_KEY_LEN: usize = 64;

/// Identity key of a remote node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey([u8; NODE_KEY_LEN]);

impl NodeKey {
    pub const fn new(bytes: [u8; NODE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_KEY_LEN] {
        &self.0
    }

    /// First eight bytes in hex, enough to tell peers apart in logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self.short_hex())
    }
}

/// Which side dialed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("IN"),
            Self::Outbound => f.write_str("OUT"),
        }
    }
}

/// A fully identified remote node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub key: NodeKey,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enode://{}@{}:{}", self.key, self.host, self.port)
    }
}

/// The three separately learned parts of a peer's identity, and the
/// [`Node`] derived from them once all are known.
#[derive(Debug, Default)]
pub(crate) struct PeerIdentity {
    key: Option<NodeKey>,
    obsolete_key: Option<NodeKey>,
    host: Option<String>,
    port: Option<u16>,
    node: Option<Arc<Node>>,
}

impl PeerIdentity {
    pub(crate) fn known(key: NodeKey, host: String, port: u16) -> Self {
        Self {
            key: Some(key),
            host: Some(host),
            port: Some(port),
            ..Self::default()
        }
    }

    pub(crate) fn key(&self) -> Option<NodeKey> {
        self.key
    }

    pub(crate) fn obsolete_key(&self) -> Option<NodeKey> {
        self.obsolete_key
    }

    pub(crate) fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port
    }

    /// Fill in the socket address of an inbound peer. Returns `false` if an
    /// address was already set; it is never overwritten.
    pub(crate) fn set_endpoint(&mut self, host: String, port: u16) -> bool {
        if self.host.is_some() || self.port.is_some() {
            return false;
        }
        self.host = Some(host);
        self.port = Some(port);
        true
    }

    /// Adopt the key confirmed by the transport handshake.
    ///
    /// If a different key had been assumed, it is kept as the obsolete key,
    /// the derived node is invalidated, and the assumed key is returned.
    pub(crate) fn confirm_key(&mut self, confirmed: Option<NodeKey>) -> Option<NodeKey> {
        let confirmed = confirmed?;
        match self.key {
            None => {
                self.key = Some(confirmed);
                None
            }
            Some(assumed) if assumed != confirmed => {
                self.obsolete_key = Some(assumed);
                self.key = Some(confirmed);
                self.node = None;
                Some(assumed)
            }
            Some(_) => None,
        }
    }

    /// The derived node, built on first access once key, host and port are
    /// all known.
    pub(crate) fn node(&mut self) -> Option<Arc<Node>> {
        if self.node.is_none() {
            let (key, host, port) = (self.key?, self.host.clone()?, self.port?);
            self.node = Some(Arc::new(Node { key, host, port }));
        }
        self.node.clone()
    }
}
