//! The mechanical frame-to-record loop.
//!
//! One task per stream connection, one call per datagram/HTTP request.
//! The dispatcher performs no field interpretation: it hands each frame
//! to the protocol module, forwards returned records to the persistence
//! sink in list order, and passes any reply payload to the emitter.

use std::{
    net::SocketAddr,
    sync::Arc,
};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{
    AsyncRead,
    AsyncWrite,
};
use tokio_util::sync::CancellationToken;
use trackbee_frame::{
    Frame,
    FrameReader,
    FramingError,
    ReadError,
    single_shot,
};

use crate::{
    decoder::{
        DecodeContext,
        Protocol,
        ProtocolDecoder,
    },
    reply::StreamEmitter,
    session::{
        Endpoint,
        SessionRegistry,
    },
    sink::PositionSink,
    util::{
        AtomicIdGenerator,
        ConnectionId,
    },
};

/// Connection-level failure. Ends the connection's task; the device
/// session persists and the device can reconnect.
#[derive(Debug, thiserror::Error)]
#[error("transport error")]
pub enum TransportError {
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    sink: PositionSink,
    connection_ids: AtomicIdGenerator,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>, sink: PositionSink) -> Self {
        Self {
            registry,
            sink,
            connection_ids: AtomicIdGenerator::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Drives one stream connection until EOF, an I/O error, or shutdown.
    ///
    /// Frames are processed strictly in arrival order. Framing errors are
    /// logged and the loop continues; only transport errors end it.
    pub async fn run_stream<S>(
        &self,
        protocol: &dyn Protocol,
        stream: S,
        remote: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let connection = ConnectionId(self.connection_ids.next());
        let endpoint = Endpoint::Stream { connection, remote };

        let (read_half, write_half) = tokio::io::split(stream);
        let mut frames = FrameReader::new(read_half, protocol.framing());
        let mut emitter = StreamEmitter::new(write_half, protocol.name(), remote);
        let mut decoder = protocol.decoder();

        tracing::debug!(protocol = protocol.name(), %remote, "connection open");

        let result = loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => break Ok(()),
                frame = frames.next() => frame,
            };

            match frame {
                None => break Ok(()),
                Some(Err(ReadError::Io(error))) => break Err(error.into()),
                Some(Err(ReadError::Framing(error))) => {
                    tracing::warn!(
                        protocol = protocol.name(),
                        %remote,
                        %error,
                        "framing error, frame dropped"
                    );
                }
                Some(Ok(frame)) => {
                    if let Some(reply) =
                        self.handle_frame(&mut *decoder, endpoint, protocol.name(), &frame)
                    {
                        emitter.send(&reply).await;
                    }
                }
            }
        };

        // the frame buffer dies with the task; the session survives
        self.registry.unbind_connection(connection);
        tracing::debug!(protocol = protocol.name(), %remote, "connection closed");

        result
    }

    /// Decodes one connectionless input (datagram or HTTP body) and
    /// returns the reply payload, if any, for the caller's transport to
    /// deliver within the same request cycle.
    pub fn dispatch_single_shot(
        &self,
        protocol: &dyn Protocol,
        input: &[u8],
        remote: SocketAddr,
    ) -> Result<Option<Bytes>, FramingError> {
        let frame = single_shot(&protocol.framing(), input)?;
        let mut decoder = protocol.decoder();
        Ok(self.handle_frame(&mut *decoder, Endpoint::Datagram { remote }, protocol.name(), &frame))
    }

    fn handle_frame(
        &self,
        decoder: &mut dyn ProtocolDecoder,
        endpoint: Endpoint,
        protocol: &'static str,
        frame: &Frame,
    ) -> Option<Bytes> {
        let mut ctx = DecodeContext::new(&self.registry, endpoint, protocol);

        match decoder.decode(&mut ctx, frame) {
            Ok(decoded) => {
                let session = ctx.session();
                for position in decoded.positions {
                    if let Err(error) = position.check_coordinates() {
                        tracing::warn!(
                            protocol,
                            device_id = %position.device_id,
                            %error,
                            "dropping record with impossible coordinates"
                        );
                        continue;
                    }

                    if let Some(session) = &session {
                        session.cache_position(&position);
                    }
                    self.sink.submit(position);
                }

                decoded.reply
            }
            Err(error) => {
                let device_id = ctx.session().map(|session| session.device_id());
                tracing::warn!(
                    protocol,
                    ?device_id,
                    %error,
                    "protocol error, frame dropped"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use bytes::Buf;
    use tokio::io::AsyncWriteExt;
    use tokio_util::sync::CancellationToken;
    use trackbee_codec::{
        checksum::ChecksumFamily,
        coords,
    };
    use trackbee_frame::{
        ChecksumSpec,
        Coverage,
        Endianness,
        Frame,
        Framing,
        LengthCount,
        LengthPrefixed,
    };
    use trackbee_types::DeviceId;

    use crate::{
        decoder::{
            DecodeContext,
            Decoded,
            Protocol,
            ProtocolDecoder,
            ProtocolError,
        },
        dispatch::Dispatcher,
        session::{
            DeviceIdResolver,
            SessionRegistry,
        },
        sink::PositionSink,
    };

    /// Minimal length-prefixed, XOR-checksummed protocol: the frame
    /// payload is `[type][lat i32][lon i32]` with coordinates scaled by
    /// 1e6, type 1 meaning a valid fix. Identification is implicit: the
    /// first byte of a type-0 frame carries a numeric unit id.
    struct TestProtocol;

    const TYPE_IDENT: u8 = 0x00;
    const TYPE_FIX: u8 = 0x01;

    impl Protocol for TestProtocol {
        fn name(&self) -> &'static str {
            "test"
        }

        fn framing(&self) -> Framing {
            Framing::LengthPrefixed(LengthPrefixed {
                header: &[],
                length_width: 1,
                length_order: Endianness::Big,
                length_counts: LengthCount::Remainder,
                checksum: Some(ChecksumSpec {
                    family: ChecksumFamily::Xor8,
                    coverage: Coverage::Payload,
                    order: Endianness::Big,
                }),
                trailer: &[],
                max_frame_length: 64,
            })
        }

        fn decoder(&self) -> Box<dyn ProtocolDecoder> {
            Box::new(TestDecoder)
        }
    }

    struct TestDecoder;

    impl ProtocolDecoder for TestDecoder {
        fn decode(
            &mut self,
            ctx: &mut DecodeContext<'_>,
            frame: &Frame,
        ) -> Result<Decoded, ProtocolError> {
            let mut buf = frame.payload.clone();
            let message_type = buf.try_get_u8()?;

            match message_type {
                TYPE_IDENT => {
                    let unit = buf.try_get_u32()?;
                    if ctx.identify(&unit.to_string()).is_none() {
                        return Ok(Decoded::nothing());
                    }
                    Ok(Decoded::reply(&b"ok"[..]))
                }
                TYPE_FIX => {
                    let latitude = buf.try_get_i32()?;
                    let longitude = buf.try_get_i32()?;

                    let Some(mut position) = ctx.position() else {
                        // fix before identification: drop
                        return Ok(Decoded::nothing());
                    };
                    position.valid = true;
                    position.latitude = coords::from_scaled(latitude.into(), 6);
                    position.longitude = coords::from_scaled(longitude.into(), 6);
                    Ok(Decoded::record(position))
                }
                other => {
                    Err(ProtocolError::UnknownMessage {
                        message_type: format!("{other:#04x}"),
                    })
                }
            }
        }
    }

    struct AcceptAll;

    impl DeviceIdResolver for AcceptAll {
        fn resolve(&self, _protocol: &str, unique_id: &str) -> Option<DeviceId> {
            unique_id.parse().ok().map(DeviceId)
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        TestProtocol.framing().encode(payload)
    }

    fn ident_payload(unit: u32) -> Vec<u8> {
        let mut payload = vec![TYPE_IDENT];
        payload.extend_from_slice(&unit.to_be_bytes());
        payload
    }

    fn fix_payload(latitude: f64, longitude: f64) -> Vec<u8> {
        let mut payload = vec![TYPE_FIX];
        payload.extend_from_slice(&(((latitude * 1e6).round() as i32).to_be_bytes()));
        payload.extend_from_slice(&(((longitude * 1e6).round() as i32).to_be_bytes()));
        payload
    }

    #[tokio::test]
    async fn frames_split_across_reads_produce_one_record() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(AcceptAll)));
        let (sink, mut positions) = PositionSink::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(registry, sink));

        let (client, server) = tokio::io::duplex(256);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move {
                dispatcher
                    .run_stream(
                        &TestProtocol,
                        server,
                        "127.0.0.1:9000".parse().unwrap(),
                        shutdown,
                    )
                    .await
            }
        });

        let (mut read_client, mut write_client) = tokio::io::split(client);

        write_client.write_all(&frame(&ident_payload(99))).await.unwrap();

        // the fix frame arrives in three partial reads: 4 bytes, 3
        // bytes, remainder
        let wire = frame(&fix_payload(10.123456, 20.654321));
        write_client.write_all(&wire[..4]).await.unwrap();
        write_client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        write_client.write_all(&wire[4..7]).await.unwrap();
        write_client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        write_client.write_all(&wire[7..]).await.unwrap();

        let position = positions.recv().await.unwrap();
        assert_eq!(position.device_id, DeviceId(99));
        assert!(position.valid);
        assert!((position.latitude - 10.123456).abs() < 1e-6);
        assert!((position.longitude - 20.654321).abs() < 1e-6);

        // the login got its reply
        let mut reply = [0u8; 2];
        tokio::io::AsyncReadExt::read_exact(&mut read_client, &mut reply)
            .await
            .unwrap();
        assert_eq!(&reply, b"ok");

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn corrupt_frame_does_not_close_the_connection() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(AcceptAll)));
        let (sink, mut positions) = PositionSink::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(registry, sink));

        let (client, server) = tokio::io::duplex(256);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move {
                dispatcher
                    .run_stream(
                        &TestProtocol,
                        server,
                        "127.0.0.1:9000".parse().unwrap(),
                        shutdown,
                    )
                    .await
            }
        });

        let (_read_client, mut write_client) = tokio::io::split(client);

        write_client.write_all(&frame(&ident_payload(7))).await.unwrap();

        let mut corrupt = frame(&fix_payload(1.0, 2.0));
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff; // break the checksum
        write_client.write_all(&corrupt).await.unwrap();

        // the connection survives and the next frame decodes
        write_client
            .write_all(&frame(&fix_payload(3.5, -4.5)))
            .await
            .unwrap();

        let position = positions.recv().await.unwrap();
        assert!((position.latitude - 3.5).abs() < 1e-6);
        assert!((position.longitude + 4.5).abs() < 1e-6);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unidentified_messages_are_dropped() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(AcceptAll)));
        let (sink, mut positions) = PositionSink::channel(16);
        let dispatcher = Dispatcher::new(registry, sink);

        let reply = dispatcher
            .dispatch_single_shot(
                &TestProtocol,
                &frame(&fix_payload(1.0, 2.0)),
                "10.1.1.1:5000".parse().unwrap(),
            )
            .unwrap();

        assert_eq!(reply, None);
        assert!(positions.try_recv().is_err());
    }

    #[tokio::test]
    async fn datagram_identification_sticks_to_the_address() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(AcceptAll)));
        let (sink, mut positions) = PositionSink::channel(16);
        let dispatcher = Dispatcher::new(registry, sink);
        let remote = "10.1.1.1:5000".parse().unwrap();

        let reply = dispatcher
            .dispatch_single_shot(&TestProtocol, &frame(&ident_payload(31337)), remote)
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"ok"[..]));

        // a later datagram from the same address needs no identifier
        dispatcher
            .dispatch_single_shot(&TestProtocol, &frame(&fix_payload(5.0, 6.0)), remote)
            .unwrap();

        let position = positions.recv().await.unwrap();
        assert_eq!(position.device_id, DeviceId(31337));
    }
}
