//! The decoder contract every vendor module implements.
//!
//! One capability trait instead of an inheritance chain: a module turns a
//! framed message into zero or more normalized positions and at most one
//! reply payload. Shared behavior lives in the composed codec toolkit and
//! frame assembler, not in a base decoder.

use std::sync::Arc;

use bytes::Bytes;
use trackbee_codec::{
    bcd::BcdError,
    coords::CoordinateError,
    time::TimeError,
};
use trackbee_frame::{
    BlockError,
    Frame,
    Framing,
};
use trackbee_types::Position;

use crate::session::{
    Endpoint,
    Session,
    SessionRegistry,
};

/// A vendor protocol module: construction-time configuration plus a
/// decoder factory. One instance per listener, shared across connections;
/// anything mutable lives in the per-connection decoder or the session.
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Framing discipline for this protocol's listeners. Reply frames are
    /// built against the same value.
    fn framing(&self) -> Framing;

    /// A fresh decoder for one connection (or one datagram).
    fn decoder(&self) -> Box<dyn ProtocolDecoder>;
}

pub trait ProtocolDecoder: Send {
    /// Decodes one framed message.
    ///
    /// Three outcomes are distinct: `Ok` with no positions and no reply
    /// (a pure keep-alive), `Ok` with content, and `Err` for a message
    /// that passed framing but fails semantic validation. Errors never
    /// terminate the connection; the dispatcher logs and drops the frame.
    fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
        frame: &Frame,
    ) -> Result<Decoded, ProtocolError>;
}

/// What one frame decoded into.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Forwarded to persistence in list order — batched frames carry
    /// historical fixes in device order and storage assumes monotonic
    /// time per device within a batch.
    pub positions: Vec<Position>,
    pub reply: Option<Bytes>,
}

impl Decoded {
    /// No record, no reply — a pure acknowledgement or keep-alive.
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn reply(payload: impl Into<Bytes>) -> Self {
        Self {
            positions: Vec::new(),
            reply: Some(payload.into()),
        }
    }

    pub fn record(position: Position) -> Self {
        Self {
            positions: vec![position],
            reply: None,
        }
    }

    pub fn records(positions: Vec<Position>) -> Self {
        Self {
            positions,
            reply: None,
        }
    }

    pub fn with_reply(mut self, payload: impl Into<Bytes>) -> Self {
        self.reply = Some(payload.into());
        self
    }
}

/// Semantic validation failure on an otherwise well-framed message.
#[derive(Debug, thiserror::Error)]
#[error("protocol error")]
pub enum ProtocolError {
    #[error("message truncated")]
    Truncated(#[from] bytes::TryGetError),

    #[error("unknown message type: {message_type}")]
    UnknownMessage { message_type: String },

    #[error("invalid {field}")]
    InvalidField { field: &'static str },

    #[error("message is not valid text")]
    Encoding(#[from] std::str::Utf8Error),

    Bcd(#[from] BcdError),
    Time(#[from] TimeError),
    Coordinate(#[from] CoordinateError),
    Block(#[from] BlockError),
}

/// Session access handed to a decoder for one frame.
///
/// Lazily resolves the session for the frame's endpoint and caches it, so
/// a decoder identifies at most once and the dispatcher can still see
/// which device the frame belonged to afterwards.
#[derive(Debug)]
pub struct DecodeContext<'a> {
    registry: &'a SessionRegistry,
    endpoint: Endpoint,
    protocol: &'static str,
    session: Option<Arc<Session>>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(registry: &'a SessionRegistry, endpoint: Endpoint, protocol: &'static str) -> Self {
        Self {
            registry,
            endpoint,
            protocol,
            session: None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Binds this connection/address to the device behind `unique_id`.
    ///
    /// `None` means the identifier is unknown to the resolution
    /// collaborator; the decoder must drop the message (and typically
    /// send no reply, so the device backs off).
    pub fn identify(&mut self, unique_id: &str) -> Option<Arc<Session>> {
        let session = self
            .registry
            .resolve(self.endpoint, self.protocol, unique_id)?;
        self.session = Some(session.clone());
        Some(session)
    }

    /// The session this frame belongs to, if identification has happened
    /// on this connection (or, for datagrams, this remote address).
    pub fn session(&mut self) -> Option<Arc<Session>> {
        if self.session.is_none() {
            self.session = self.registry.lookup(self.endpoint, self.protocol);
        }
        self.session.clone()
    }

    /// A position template for the identified device. `None` before
    /// identification — messages without a session produce no records.
    pub fn position(&mut self) -> Option<Position> {
        let session = self.session()?;
        Some(Position::new(session.device_id(), self.protocol))
    }
}
