//! Vektor OEM telematics units, TCP or UDP.
//!
//! Frames are `VK`-headed with a little-endian length and a
//! CRC-16/CCITT-FALSE over the payload. The payload is a message type
//! byte followed by an ordered sequence of length-prefixed blocks; a
//! zero-length block marks an absent section. Units identify with a
//! numeric id whose last decimal digit is a Luhn check digit.
//!
//! The units buffer records while offline. Every hello and live position
//! reports the newest stored record index; the server drains the gap
//! since its own cursor through log-request replies, one batch at a
//! time.

use std::time::Duration;

use bytes::{
    Buf,
    Bytes,
};
use serde::Deserialize;
use trackbee_codec::{
    bitmask,
    checksum::{
        ChecksumFamily,
        luhn_valid,
    },
    coords,
    time::Epoch,
};
use trackbee_engine::{
    DecodeContext,
    Decoded,
    Protocol,
    ProtocolDecoder,
    ProtocolError,
    Session,
    archive::ArchiveRequest,
};
use trackbee_frame::{
    BlockReader,
    ChecksumSpec,
    Coverage,
    Endianness,
    Frame,
    Framing,
    LengthCount,
    LengthPrefixed,
};
use trackbee_types::{
    Position,
    attr,
};

const MSG_HELLO: u8 = 0x01;
const MSG_POSITION: u8 = 0x02;
const MSG_LOG: u8 = 0x03;
const MSG_PING: u8 = 0x04;

const MSG_HELLO_ACK: u8 = 0x81;
const MSG_POSITION_ACK: u8 = 0x82;
const MSG_LOG_ACK: u8 = 0x83;
const MSG_PONG: u8 = 0x84;

/// Ack flag: a log request follows.
const FLAG_LOG_REQUEST: u8 = 0x01;

const CACHE_STALENESS: Duration = Duration::from_secs(600);

/// Optional status fields, in wire order by mask bit.
#[derive(Clone, Copy, Debug)]
enum StatusField {
    BatteryMillivolts,
    Adc1,
    Input,
    Output,
    Odometer,
    Rssi,
    Event,
}

const STATUS_FIELDS: &[StatusField] = &[
    StatusField::BatteryMillivolts,
    StatusField::Adc1,
    StatusField::Input,
    StatusField::Output,
    StatusField::Odometer,
    StatusField::Rssi,
    StatusField::Event,
];

fn framing() -> Framing {
    Framing::LengthPrefixed(LengthPrefixed {
        header: &[0x56, 0x4b],
        length_width: 2,
        length_order: Endianness::Little,
        length_counts: LengthCount::Remainder,
        checksum: Some(ChecksumSpec {
            family: ChecksumFamily::Crc16CcittFalse,
            coverage: Coverage::Payload,
            order: Endianness::Little,
        }),
        trailer: &[],
        max_frame_length: 4096,
    })
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct VektorOptions {
    /// Report the analog input value. Off by default; the bytes are on
    /// the wire either way.
    pub include_adc: bool,
    /// Batch size hint sent with log requests.
    pub batch_hint: u16,
}

impl Default for VektorOptions {
    fn default() -> Self {
        Self {
            include_adc: false,
            batch_hint: 16,
        }
    }
}

#[derive(Debug)]
pub struct VektorProtocol {
    options: VektorOptions,
}

impl VektorProtocol {
    pub fn new(options: VektorOptions) -> Self {
        Self { options }
    }
}

impl Protocol for VektorProtocol {
    fn name(&self) -> &'static str {
        "vektor"
    }

    fn framing(&self) -> Framing {
        framing()
    }

    fn decoder(&self) -> Box<dyn ProtocolDecoder> {
        Box::new(VektorDecoder {
            options: self.options,
            framing: framing(),
        })
    }
}

struct VektorDecoder {
    options: VektorOptions,
    framing: Framing,
}

impl VektorDecoder {
    fn ack(&self, message_type: u8, body: &[u8], request: Option<ArchiveRequest>) -> Bytes {
        let mut payload = vec![message_type];
        payload.extend_from_slice(body);
        match request {
            Some(request) => {
                payload.push(FLAG_LOG_REQUEST);
                payload.extend_from_slice(&(request.from_index as u32).to_le_bytes());
                payload.extend_from_slice(&(request.batch_hint as u16).to_le_bytes());
            }
            None => payload.push(0),
        }
        Bytes::from(self.framing.encode(&payload))
    }

    /// The 16-byte GPS group shared by live positions and log records.
    fn decode_gps_fields(
        &self,
        buf: &mut Bytes,
        position: &mut Position,
    ) -> Result<(), ProtocolError> {
        let latitude = buf.try_get_i32_le()?;
        let longitude = buf.try_get_i32_le()?;
        position.latitude = coords::from_scaled(latitude.into(), 6);
        position.longitude = coords::from_scaled(longitude.into(), 6);
        position.speed = f64::from(buf.try_get_u16_le()?) / 10.0;
        position.course = f64::from(buf.try_get_u16_le()?) / 10.0;
        position.altitude = f64::from(buf.try_get_i16_le()?);
        position
            .attributes
            .set(attr::SATELLITES, buf.try_get_u8()?);
        position.valid = bitmask::check(buf.try_get_u8()?.into(), 0);
        Ok(())
    }

    fn decode_status_block(
        &self,
        mut buf: Bytes,
        position: &mut Position,
    ) -> Result<(), ProtocolError> {
        let mask = u64::from(buf.try_get_u16_le()?);
        if mask >> STATUS_FIELDS.len() != 0 {
            return Err(ProtocolError::InvalidField {
                field: "status mask",
            });
        }

        for (_, field) in bitmask::present(mask, STATUS_FIELDS) {
            match field {
                StatusField::BatteryMillivolts => {
                    let millivolts = buf.try_get_u16_le()?;
                    position
                        .attributes
                        .set(attr::BATTERY, f64::from(millivolts) / 1000.0);
                }
                StatusField::Adc1 => {
                    let value = buf.try_get_u16_le()?;
                    if self.options.include_adc {
                        position.attributes.set(attr::ADC1, value);
                    }
                }
                StatusField::Input => {
                    position.attributes.set(attr::INPUT, buf.try_get_u8()?);
                }
                StatusField::Output => {
                    position.attributes.set(attr::OUTPUT, buf.try_get_u8()?);
                }
                StatusField::Odometer => {
                    position
                        .attributes
                        .set(attr::ODOMETER, buf.try_get_u32_le()?);
                }
                StatusField::Rssi => {
                    position.attributes.set(attr::RSSI, buf.try_get_u8()?);
                }
                StatusField::Event => {
                    position.attributes.set(attr::EVENT, buf.try_get_u8()?);
                }
            }
        }

        Ok(())
    }

    fn decode_lbs_block(&self, mut buf: Bytes, position: &mut Position) -> Result<(), ProtocolError> {
        position.attributes.set(attr::MCC, buf.try_get_u16_le()?);
        position.attributes.set(attr::MNC, buf.try_get_u8()?);
        position.attributes.set(attr::LAC, buf.try_get_u16_le()?);
        position.attributes.set(attr::CID, buf.try_get_u32_le()?);
        Ok(())
    }

    fn decode_hello(
        &self,
        ctx: &mut DecodeContext<'_>,
        blocks: &mut BlockReader,
    ) -> Result<Decoded, ProtocolError> {
        let Some(mut identity) = blocks.next_block()? else {
            return Err(ProtocolError::InvalidField { field: "identity" });
        };

        let unit_id = identity.try_get_u32_le()?;
        if !luhn_valid(unit_id.into()) {
            tracing::debug!(unit_id, "vektor: unit id fails its check digit, dropped");
            return Ok(Decoded::nothing());
        }

        let firmware = identity.try_get_u16_le()?;
        let newest_index = identity.try_get_u32_le()?;

        let Some(session) = ctx.identify(&unit_id.to_string()) else {
            tracing::debug!(unit_id, "vektor: unknown unit, hello dropped");
            return Ok(Decoded::nothing());
        };
        tracing::debug!(unit_id, firmware, newest_index, "vektor: hello");

        let request = session.with_archive(|archive| {
            archive.observe_newest(newest_index.into(), self.options.batch_hint.into())
        });

        Ok(Decoded::reply(self.ack(MSG_HELLO_ACK, &[0x01], request)))
    }

    fn decode_position(
        &self,
        session: &Session,
        protocol: &'static str,
        blocks: &mut BlockReader,
    ) -> Result<Decoded, ProtocolError> {
        let Some(mut meta) = blocks.next_block()? else {
            return Err(ProtocolError::InvalidField { field: "meta" });
        };
        let record_index = meta.try_get_u32_le()?;
        let newest_index = meta.try_get_u32_le()?;

        let mut position = Position::new(session.device_id(), protocol);
        position
            .attributes
            .set(attr::ARCHIVE_INDEX, record_index);

        match blocks.next_block()? {
            Some(mut time) if !time.is_empty() => {
                position.fix_time = Some(Epoch::Y2010.plus_seconds(time.try_get_u32_le()?.into())?);
            }
            _ => {}
        }

        match blocks.next_block()? {
            Some(mut gps) if !gps.is_empty() => {
                self.decode_gps_fields(&mut gps, &mut position)?;
            }
            _ => {
                // status-only report: forward the cached fix
                session.fill_from_cache(&mut position, CACHE_STALENESS);
            }
        }

        if let Some(status) = blocks.next_block()? {
            if !status.is_empty() {
                self.decode_status_block(status, &mut position)?;
            }
        }

        if let Some(lbs) = blocks.next_block()? {
            if !lbs.is_empty() {
                self.decode_lbs_block(lbs, &mut position)?;
            }
        }

        let (fresh, request) = session.with_archive(|archive| {
            let request =
                archive.observe_newest(newest_index.into(), self.options.batch_hint.into());
            (archive.accept_record(record_index.into()), request)
        });

        let reply = self.ack(MSG_POSITION_ACK, &record_index.to_le_bytes(), request);
        if fresh {
            Ok(Decoded::record(position).with_reply(reply))
        }
        else {
            // retransmission of a record the server already forwarded
            Ok(Decoded::reply(reply))
        }
    }

    fn decode_log(
        &self,
        session: &Session,
        protocol: &'static str,
        blocks: &mut BlockReader,
    ) -> Result<Decoded, ProtocolError> {
        let mut positions = Vec::new();
        let mut accepted: u16 = 0;

        while let Some(mut record) = blocks.next_block()? {
            if record.is_empty() {
                continue;
            }

            let record_index = record.try_get_u32_le()?;
            let seconds = record.try_get_u32_le()?;

            let fresh = session.with_archive(|archive| archive.accept_record(record_index.into()));
            if !fresh {
                continue;
            }

            let mut position = Position::new(session.device_id(), protocol);
            position.fix_time = Some(Epoch::Y2010.plus_seconds(seconds.into())?);
            position
                .attributes
                .set(attr::ARCHIVE_INDEX, record_index);
            self.decode_gps_fields(&mut record, &mut position)?;

            accepted += 1;
            positions.push(position);
        }

        let request = session.with_archive(|archive| {
            archive.finish_batch(self.options.batch_hint.into())
        });

        let reply = self.ack(MSG_LOG_ACK, &accepted.to_le_bytes(), request);
        Ok(Decoded::records(positions).with_reply(reply))
    }
}

impl ProtocolDecoder for VektorDecoder {
    fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
        frame: &Frame,
    ) -> Result<Decoded, ProtocolError> {
        let mut buf = frame.payload.clone();
        let message_type = buf.try_get_u8()?;
        let mut blocks = BlockReader::new(buf, 1, Endianness::Little);

        match message_type {
            MSG_HELLO => self.decode_hello(ctx, &mut blocks),
            MSG_POSITION => {
                let Some(session) = ctx.session() else {
                    return Ok(Decoded::nothing());
                };
                self.decode_position(&session, ctx.protocol(), &mut blocks)
            }
            MSG_LOG => {
                let Some(session) = ctx.session() else {
                    return Ok(Decoded::nothing());
                };
                self.decode_log(&session, ctx.protocol(), &mut blocks)
            }
            MSG_PING => Ok(Decoded::reply(Bytes::from(self.framing.encode(&[MSG_PONG])))),
            other => {
                Err(ProtocolError::UnknownMessage {
                    message_type: format!("{other:#04x}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use chrono::{
        TimeZone,
        Utc,
    };
    use trackbee_engine::{
        DecodeContext,
        Decoded,
        DeviceIdResolver,
        Endpoint,
        Protocol as _,
        ProtocolError,
        SessionRegistry,
    };
    use trackbee_frame::single_shot;
    use trackbee_types::DeviceId;

    use crate::vektor::{
        FLAG_LOG_REQUEST,
        MSG_HELLO,
        MSG_HELLO_ACK,
        MSG_LOG,
        MSG_LOG_ACK,
        MSG_PING,
        MSG_PONG,
        MSG_POSITION,
        VektorOptions,
        VektorProtocol,
        framing,
    };

    /// 12345 with its Luhn check digit appended.
    const UNIT_ID: u32 = 123455;

    struct UnitResolver;

    impl DeviceIdResolver for UnitResolver {
        fn resolve(&self, _protocol: &str, unique_id: &str) -> Option<DeviceId> {
            unique_id.parse().ok().map(DeviceId)
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::Datagram {
            remote: "172.16.0.9:7700".parse().unwrap(),
        }
    }

    fn decode(
        registry: &SessionRegistry,
        options: VektorOptions,
        payload: &[u8],
    ) -> Result<Decoded, ProtocolError> {
        let frame = single_shot(&framing(), &framing().encode(payload)).unwrap();
        let mut decoder = VektorProtocol::new(options).decoder();
        let mut ctx = DecodeContext::new(registry, endpoint(), "vektor");
        decoder.decode(&mut ctx, &frame)
    }

    fn block(content: &[u8]) -> Vec<u8> {
        let mut bytes = vec![content.len() as u8];
        bytes.extend_from_slice(content);
        bytes
    }

    fn hello_payload(unit_id: u32, newest: u32) -> Vec<u8> {
        let mut identity = Vec::new();
        identity.extend_from_slice(&unit_id.to_le_bytes());
        identity.extend_from_slice(&0x0203u16.to_le_bytes()); // firmware
        identity.extend_from_slice(&newest.to_le_bytes());

        let mut payload = vec![MSG_HELLO];
        payload.extend_from_slice(&block(&identity));
        payload
    }

    fn gps_group(latitude: f64, longitude: f64, valid: bool) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((latitude * 1e6).round() as i32).to_le_bytes());
        bytes.extend_from_slice(&((longitude * 1e6).round() as i32).to_le_bytes());
        bytes.extend_from_slice(&123u16.to_le_bytes()); // 12.3 knots
        bytes.extend_from_slice(&1800u16.to_le_bytes()); // 180.0 degrees
        bytes.extend_from_slice(&35i16.to_le_bytes());
        bytes.push(11); // satellites
        bytes.push(if valid { 0x01 } else { 0x00 });
        bytes
    }

    fn position_payload(
        record_index: u32,
        newest: u32,
        gps: &[u8],
        status: &[u8],
        lbs: &[u8],
    ) -> Vec<u8> {
        let mut meta = Vec::new();
        meta.extend_from_slice(&record_index.to_le_bytes());
        meta.extend_from_slice(&newest.to_le_bytes());

        let mut payload = vec![MSG_POSITION];
        payload.extend_from_slice(&block(&meta));
        payload.extend_from_slice(&block(b"")); // no time block in most tests
        payload.extend_from_slice(&block(gps));
        payload.extend_from_slice(&block(status));
        payload.extend_from_slice(&block(lbs));
        payload
    }

    fn log_record(index: u32, seconds: u32) -> Vec<u8> {
        let mut record = Vec::new();
        record.extend_from_slice(&index.to_le_bytes());
        record.extend_from_slice(&seconds.to_le_bytes());
        record.extend_from_slice(&gps_group(48.1, 11.5, true));
        record
    }

    fn log_payload(records: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = vec![MSG_LOG];
        for record in records {
            payload.extend_from_slice(&block(record));
        }
        payload
    }

    #[test]
    fn first_hello_adopts_the_baseline_without_requesting() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        let decoded = decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 50),
        )
        .unwrap();

        let expected = framing().encode(&[MSG_HELLO_ACK, 0x01, 0x00]);
        assert_eq!(decoded.reply.as_deref(), Some(&expected[..]));

        let session = registry.lookup(endpoint(), "vektor").unwrap();
        assert_eq!(session.device_id(), DeviceId(123455));
        assert_eq!(session.with_archive(|archive| archive.last_index()), 50);
    }

    #[test]
    fn bad_check_digit_drops_the_hello_silently() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        let decoded = decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(123454, 50),
        )
        .unwrap();

        assert!(decoded.reply.is_none());
        assert!(decoded.positions.is_empty());
        assert!(registry.lookup(endpoint(), "vektor").is_none());
    }

    #[test]
    fn reconnect_with_a_backlog_requests_the_gap() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 50),
        )
        .unwrap();

        let decoded = decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 80),
        )
        .unwrap();

        let mut expected = vec![MSG_HELLO_ACK, 0x01, FLAG_LOG_REQUEST];
        expected.extend_from_slice(&50u32.to_le_bytes());
        expected.extend_from_slice(&16u16.to_le_bytes());
        assert_eq!(
            decoded.reply.as_deref(),
            Some(&framing().encode(&expected)[..])
        );
    }

    #[test]
    fn live_position_decodes_blocks_and_advances_the_cursor() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 50),
        )
        .unwrap();

        // status: battery 3970 mV + rssi 21 (bits 0 and 5)
        let mut status = Vec::new();
        status.extend_from_slice(&0b10_0001u16.to_le_bytes());
        status.extend_from_slice(&3970u16.to_le_bytes());
        status.push(21);

        let mut lbs = Vec::new();
        lbs.extend_from_slice(&262u16.to_le_bytes());
        lbs.push(2);
        lbs.extend_from_slice(&0x1234u16.to_le_bytes());
        lbs.extend_from_slice(&0x00ab_cdefu32.to_le_bytes());

        let decoded = decode(
            &registry,
            VektorOptions::default(),
            &position_payload(50, 50, &gps_group(52.52, 13.405, true), &status, &lbs),
        )
        .unwrap();

        let position = &decoded.positions[0];
        assert!(position.valid);
        assert_abs_diff_eq!(position.latitude, 52.52, epsilon = 1e-6);
        assert_abs_diff_eq!(position.longitude, 13.405, epsilon = 1e-6);
        assert_abs_diff_eq!(position.speed, 12.3, epsilon = 1e-9);
        assert_abs_diff_eq!(position.course, 180.0, epsilon = 1e-9);
        assert_eq!(position.altitude, 35.0);
        assert_eq!(position.attributes.get("satellites").unwrap(), 11);
        assert_eq!(position.attributes.get("battery").unwrap(), 3.97);
        assert_eq!(position.attributes.get("rssi").unwrap(), 21);
        assert_eq!(position.attributes.get("mcc").unwrap(), 262);
        assert_eq!(position.attributes.get("cid").unwrap(), 0x00ab_cdef);
        assert_eq!(position.attributes.get("archiveIndex").unwrap(), 50);

        let session = registry.lookup(endpoint(), "vektor").unwrap();
        assert_eq!(session.with_archive(|archive| archive.last_index()), 51);
    }

    #[test]
    fn adc_field_is_consumed_but_only_reported_when_enabled() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 0),
        )
        .unwrap();

        // bits 0, 1 and 5: battery, adc, rssi
        let mut status = Vec::new();
        status.extend_from_slice(&0b10_0011u16.to_le_bytes());
        status.extend_from_slice(&3970u16.to_le_bytes());
        status.extend_from_slice(&512u16.to_le_bytes());
        status.push(9);

        let payload = position_payload(1, 1, &gps_group(1.0, 2.0, true), &status, b"");

        let decoded = decode(&registry, VektorOptions::default(), &payload).unwrap();
        let position = &decoded.positions[0];
        assert!(position.attributes.get("adc1").is_none());
        // rssi still lands on the right value: the adc bytes were consumed
        assert_eq!(position.attributes.get("rssi").unwrap(), 9);

        let with_adc = VektorOptions {
            include_adc: true,
            ..VektorOptions::default()
        };
        let decoded = decode(&registry, with_adc, &payload).unwrap();
        // second delivery of the same record index: deduplicated
        assert!(decoded.positions.is_empty());
    }

    #[test]
    fn undeclared_status_bits_are_a_protocol_error() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 0),
        )
        .unwrap();

        let mut status = Vec::new();
        status.extend_from_slice(&0x8000u16.to_le_bytes());

        let error = decode(
            &registry,
            VektorOptions::default(),
            &position_payload(1, 1, &gps_group(1.0, 2.0, true), &status, b""),
        )
        .unwrap_err();
        assert!(matches!(error, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn log_batch_drains_in_order_and_deduplicates_on_redelivery() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 50),
        )
        .unwrap();
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 53),
        )
        .unwrap();

        let batch = log_payload(&[log_record(50, 1000), log_record(51, 1060)]);
        let decoded = decode(&registry, VektorOptions::default(), &batch).unwrap();

        assert_eq!(decoded.positions.len(), 2);
        assert_eq!(
            decoded.positions[0].attributes.get("archiveIndex").unwrap(),
            50
        );
        assert_eq!(
            decoded.positions[1].attributes.get("archiveIndex").unwrap(),
            51
        );
        assert_eq!(
            decoded.positions[0].fix_time.unwrap(),
            Utc.with_ymd_and_hms(2010, 1, 1, 0, 16, 40).unwrap()
        );

        // the drain isn't done (newest is 53): the ack carries another request
        let reply = decoded.reply.unwrap();
        let frame = single_shot(&framing(), &reply).unwrap();
        assert_eq!(frame.payload[0], MSG_LOG_ACK);
        assert_eq!(frame.payload[3], FLAG_LOG_REQUEST);

        // the device retransmits the same batch: nothing is forwarded twice
        let decoded = decode(&registry, VektorOptions::default(), &batch).unwrap();
        assert!(decoded.positions.is_empty());

        let session = registry.lookup(endpoint(), "vektor").unwrap();
        assert_eq!(session.with_archive(|archive| archive.last_index()), 52);
    }

    #[test]
    fn empty_gps_block_forwards_the_cached_fix() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        decode(
            &registry,
            VektorOptions::default(),
            &hello_payload(UNIT_ID, 0),
        )
        .unwrap();

        let mut fix = decode(
            &registry,
            VektorOptions::default(),
            &position_payload(1, 1, &gps_group(59.33, 18.06, true), b"", b""),
        )
        .unwrap();
        let mut cached = fix.positions.remove(0);
        cached.fix_time = Some(Utc::now());
        let session = registry.lookup(endpoint(), "vektor").unwrap();
        session.cache_position(&cached);

        let decoded = decode(
            &registry,
            VektorOptions::default(),
            &position_payload(2, 2, b"", b"", b""),
        )
        .unwrap();

        let position = &decoded.positions[0];
        assert_abs_diff_eq!(position.latitude, 59.33, epsilon = 1e-6);
        assert_abs_diff_eq!(position.longitude, 18.06, epsilon = 1e-6);
        assert!(position.valid);
    }

    #[test]
    fn ping_gets_a_pong_and_no_record() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        let decoded = decode(&registry, VektorOptions::default(), &[MSG_PING]).unwrap();
        assert!(decoded.positions.is_empty());
        assert_eq!(
            decoded.reply.as_deref(),
            Some(&framing().encode(&[MSG_PONG])[..])
        );
    }

    #[test]
    fn truncated_block_is_a_protocol_error() {
        let registry = SessionRegistry::new(Arc::new(UnitResolver));
        // identity block declares 10 bytes but the payload ends early
        let payload = [MSG_HELLO, 10, 0x01, 0x02];
        let error = decode(&registry, VektorOptions::default(), &payload).unwrap_err();
        assert!(matches!(error, ProtocolError::Block(_)));
    }
}
