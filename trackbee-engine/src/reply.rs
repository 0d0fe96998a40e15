//! Reply emission.
//!
//! Vendor decoders return fully framed reply bytes (built through
//! [`Framing::encode`][trackbee_frame::Framing::encode] with the same
//! codec primitives used to parse); this module only moves them to the
//! originating transport. Delivery is best-effort everywhere — decoding
//! never blocks on a reply having reached the device.

use std::net::SocketAddr;

use tokio::{
    io::{
        AsyncWrite,
        AsyncWriteExt,
    },
    net::UdpSocket,
};

/// Writes replies to the connection a request arrived on.
#[derive(Debug)]
pub struct StreamEmitter<W> {
    writer: W,
    protocol: &'static str,
    remote: SocketAddr,
}

impl<W: AsyncWrite + Unpin> StreamEmitter<W> {
    pub fn new(writer: W, protocol: &'static str, remote: SocketAddr) -> Self {
        Self {
            writer,
            protocol,
            remote,
        }
    }

    /// Write failures are logged and swallowed; if the socket is really
    /// gone the read side of the connection task notices on its own.
    pub async fn send(&mut self, payload: &[u8]) {
        if let Err(error) = self.writer.write_all(payload).await {
            tracing::warn!(
                protocol = self.protocol,
                remote = %self.remote,
                %error,
                "failed to write reply"
            );
        }
    }
}

/// Best-effort fire-and-forget reply datagram to the address the request
/// came from.
pub fn send_datagram(socket: &UdpSocket, target: SocketAddr, payload: &[u8], protocol: &'static str) {
    match socket.try_send_to(payload, target) {
        Ok(_) => {}
        Err(error) => {
            tracing::debug!(protocol, remote = %target, %error, "reply datagram not sent");
        }
    }
}
