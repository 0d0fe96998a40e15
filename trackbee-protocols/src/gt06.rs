//! GT06 family of binary trackers.
//!
//! Frames open with `0x78 0x78`, carry a one-byte length, and close with a
//! CRC-16/X.25 over the length byte through the serial number, then
//! `\r\n`. Devices identify once per connection with a BCD-packed IMEI in
//! the login message; locations use minute-scaled coordinates with
//! hemisphere bits in the course/status word. The server acknowledges
//! login and heartbeat with the request's own serial number.

use std::time::Duration;

use bytes::{
    Buf,
    Bytes,
};
use serde::Deserialize;
use trackbee_codec::{
    bcd,
    bitmask,
};
use trackbee_engine::{
    DecodeContext,
    Decoded,
    Protocol,
    ProtocolDecoder,
    ProtocolError,
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
use trackbee_types::{
    Position,
    attr,
};

const MSG_LOGIN: u8 = 0x01;
const MSG_GPS_LBS: u8 = 0x12;
const MSG_STATUS: u8 = 0x13;
const MSG_ALARM: u8 = 0x16;
const MSG_GPS_LBS_2: u8 = 0x22;

const KNOTS_PER_KPH: f64 = 1.0 / 1.852;

/// How old a cached fix may be before a heartbeat forwarded with it is
/// marked invalid.
const CACHE_STALENESS: Duration = Duration::from_secs(600);

fn framing() -> Framing {
    Framing::LengthPrefixed(LengthPrefixed {
        header: &[0x78, 0x78],
        length_width: 1,
        length_order: Endianness::Big,
        length_counts: LengthCount::Remainder,
        checksum: Some(ChecksumSpec {
            family: trackbee_codec::checksum::ChecksumFamily::Crc16X25,
            coverage: Coverage::LengthAndPayload,
            order: Endianness::Big,
        }),
        trailer: &[0x0d, 0x0a],
        max_frame_length: 1024,
    })
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Gt06Options {
    /// Offset of the device clock from UTC, in seconds. Many firmwares
    /// report local time.
    pub timezone_offset: i64,
}

#[derive(Debug)]
pub struct Gt06Protocol {
    options: Gt06Options,
}

impl Gt06Protocol {
    pub fn new(options: Gt06Options) -> Self {
        Self { options }
    }
}

impl Protocol for Gt06Protocol {
    fn name(&self) -> &'static str {
        "gt06"
    }

    fn framing(&self) -> Framing {
        framing()
    }

    fn decoder(&self) -> Box<dyn ProtocolDecoder> {
        Box::new(Gt06Decoder {
            options: self.options,
            framing: framing(),
        })
    }
}

struct Gt06Decoder {
    options: Gt06Options,
    framing: Framing,
}

impl Gt06Decoder {
    fn ack(&self, message_type: u8, serial: u16) -> Bytes {
        let payload = [message_type, (serial >> 8) as u8, serial as u8];
        Bytes::from(self.framing.encode(&payload))
    }

    fn decode_time(&self, buf: &mut Bytes) -> Result<chrono::DateTime<chrono::Utc>, ProtocolError> {
        let mut components = [0u64; 6];
        for component in &mut components {
            *component = bcd::decode(&[buf.try_get_u8()?])?;
        }

        let [year, month, day, hour, minute, second] = components;
        Ok(trackbee_codec::time::DateBuilder::new()
            .date(year as i32, month as u32, day as u32)
            .time(hour as u32, minute as u32, second as u32)
            .timezone_offset(self.options.timezone_offset)
            .build()?)
    }

    fn decode_gps(&self, buf: &mut Bytes, position: &mut Position) -> Result<(), ProtocolError> {
        position.fix_time = Some(self.decode_time(buf)?);

        let gps_info = buf.try_get_u8()?;
        position.attributes.set(attr::SATELLITES, gps_info & 0x0f);

        let raw_latitude = buf.try_get_u32()?;
        let raw_longitude = buf.try_get_u32()?;
        let speed_kph = buf.try_get_u8()?;
        let flags = buf.try_get_u16()?;

        // coordinates are minutes scaled by 30000; sign comes from the
        // course/status word, validity from the fix bit
        let mut latitude = f64::from(raw_latitude) / 30000.0 / 60.0;
        let mut longitude = f64::from(raw_longitude) / 30000.0 / 60.0;
        if !bitmask::check(flags.into(), 10) {
            latitude = -latitude;
        }
        if bitmask::check(flags.into(), 11) {
            longitude = -longitude;
        }

        position.valid = bitmask::check(flags.into(), 12);
        position.latitude = latitude;
        position.longitude = longitude;
        position.course = f64::from(flags & 0x03ff);
        position.speed = f64::from(speed_kph) * KNOTS_PER_KPH;

        Ok(())
    }

    fn decode_lbs(&self, buf: &mut Bytes, position: &mut Position) -> Result<(), ProtocolError> {
        position.attributes.set(attr::MCC, buf.try_get_u16()?);
        position.attributes.set(attr::MNC, buf.try_get_u8()?);
        position.attributes.set(attr::LAC, buf.try_get_u16()?);
        let cid = u32::from(buf.try_get_u8()?) << 16 | u32::from(buf.try_get_u16()?);
        position.attributes.set(attr::CID, cid);
        Ok(())
    }

    fn decode_status(&self, buf: &mut Bytes, position: &mut Position) -> Result<(), ProtocolError> {
        let terminal_info = buf.try_get_u8()?;
        let voltage_level = buf.try_get_u8()?;
        let gsm_signal = buf.try_get_u8()?;

        position
            .attributes
            .set(attr::IGNITION, bitmask::check(terminal_info.into(), 1));
        position
            .attributes
            .set(attr::CHARGE, bitmask::check(terminal_info.into(), 2));
        // voltage level is a 0..=6 scale
        position
            .attributes
            .set(attr::BATTERY_LEVEL, (u16::from(voltage_level) * 100 / 6).min(100));
        position.attributes.set(attr::RSSI, gsm_signal);

        Ok(())
    }
}

fn alarm_name(code: u8) -> Option<&'static str> {
    match code {
        0x01 => Some("sos"),
        0x02 => Some("powerCut"),
        0x03 => Some("vibration"),
        0x04 => Some("geofenceEnter"),
        0x05 => Some("geofenceExit"),
        _ => None,
    }
}

/// Request serial number: the last two payload bytes.
fn serial(payload: &Bytes) -> u16 {
    if payload.len() < 2 {
        return 0;
    }
    u16::from_be_bytes([payload[payload.len() - 2], payload[payload.len() - 1]])
}

impl ProtocolDecoder for Gt06Decoder {
    fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
        frame: &Frame,
    ) -> Result<Decoded, ProtocolError> {
        let serial = serial(&frame.payload);
        let mut buf = frame.payload.clone();
        let message_type = buf.try_get_u8()?;

        match message_type {
            MSG_LOGIN => {
                let imei = buf.try_get_u64()?.to_be_bytes();
                // 8 BCD bytes hold 16 digits; an IMEI has 15, the first
                // nibble is padding
                let digits = bcd::decode_digits(&imei)?;
                let unique_id = &digits[1..];

                if ctx.identify(unique_id).is_none() {
                    tracing::debug!(unique_id, "gt06: unknown device, login dropped");
                    return Ok(Decoded::nothing());
                }

                Ok(Decoded::reply(self.ack(MSG_LOGIN, serial)))
            }
            MSG_GPS_LBS | MSG_GPS_LBS_2 => {
                let Some(mut position) = ctx.position() else {
                    return Ok(Decoded::nothing());
                };

                self.decode_gps(&mut buf, &mut position)?;
                self.decode_lbs(&mut buf, &mut position)?;

                Ok(Decoded::record(position))
            }
            MSG_STATUS => {
                let Some(session) = ctx.session() else {
                    return Ok(Decoded::nothing());
                };
                let mut position = Position::new(session.device_id(), ctx.protocol());

                self.decode_status(&mut buf, &mut position)?;
                session.fill_from_cache(&mut position, CACHE_STALENESS);

                Ok(Decoded::record(position).with_reply(self.ack(MSG_STATUS, serial)))
            }
            MSG_ALARM => {
                let Some(mut position) = ctx.position() else {
                    return Ok(Decoded::nothing());
                };

                self.decode_gps(&mut buf, &mut position)?;
                self.decode_lbs(&mut buf, &mut position)?;

                let _terminal_info = buf.try_get_u8()?;
                let _voltage_level = buf.try_get_u8()?;
                let _gsm_signal = buf.try_get_u8()?;
                let alarm = buf.try_get_u8()?;
                if let Some(name) = alarm_name(alarm) {
                    position.attributes.set(attr::ALARM, name);
                }

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
