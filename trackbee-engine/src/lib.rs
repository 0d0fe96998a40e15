//! The shared decoding engine every vendor protocol module plugs into.
//!
//! The engine owns everything that is not vendor grammar: session
//! identity ([`session`]), the mechanical frame-to-record dispatch loop
//! ([`dispatch`]), the archive/backlog drain state machine ([`archive`]),
//! reply emission ([`reply`]) and the fire-and-forget persistence handoff
//! ([`sink`]). Vendor modules implement [`Protocol`] and compose the codec
//! toolkit and frame assembler; they never talk to a socket themselves.

pub mod archive;
pub mod decoder;
pub mod dispatch;
pub mod reply;
pub mod session;
pub mod sink;
mod util;

pub use decoder::{
    DecodeContext,
    Decoded,
    Protocol,
    ProtocolDecoder,
    ProtocolError,
};
pub use dispatch::{
    Dispatcher,
    TransportError,
};
pub use session::{
    DeviceIdResolver,
    Endpoint,
    Session,
    SessionRegistry,
};
pub use sink::PositionSink;
pub use util::ConnectionId;
