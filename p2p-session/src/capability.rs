//! Protocol codes and negotiated capabilities.

use std::{borrow::Borrow, fmt, sync::Arc};

/// Short name of a sub-protocol (`p2p`, `eth`, `snap`, ...).
///
/// Cheap to clone; compared and ordered by its string value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolCode(Arc<str>);

impl ProtocolCode {
    /// Code of the base protocol that carries capability negotiation,
    /// keep-alives and disconnect framing.
    pub const P2P: &'static str = "p2p";

    pub fn new(code: &str) -> Self {
        Self(Arc::from(code))
    }

    pub fn p2p() -> Self {
        Self::new(Self::P2P)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_p2p(&self) -> bool {
        &*self.0 == Self::P2P
    }
}

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl Borrow<str> for ProtocolCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A (protocol, version) pair a peer supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability {
    pub protocol: ProtocolCode,
    pub version: u8,
}

impl Capability {
    pub fn new(protocol: impl Into<ProtocolCode>, version: u8) -> Self {
        Self {
            protocol: protocol.into(),
            version,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.version)
    }
}
