//! H02-style text trackers.
//!
//! Messages are `*`-to-`#` delimited comma-separated text, e.g.
//!
//! ```plain
//! *HQ,135790246811220,V1,050316,A,2212.8745,N,11346.6574,E,14.28,028,020922,FFFFFBFF#
//! ```
//!
//! Coordinates are degree-minute digit groups with hemisphere letters.
//! The IMEI rides in every message, so there is no login handshake and a
//! datagram variant needs no address binding. The status word is
//! active-low: a cleared bit means the condition is raised.

use trackbee_codec::{
    bitmask,
    coords::{
        self,
        Hemisphere,
    },
    time::DateBuilder,
};
use trackbee_engine::{
    DecodeContext,
    Decoded,
    Protocol,
    ProtocolDecoder,
    ProtocolError,
};
use trackbee_frame::{
    Delimited,
    Frame,
    Framing,
};
use trackbee_types::attr;

fn framing() -> Framing {
    Framing::Delimited(Delimited {
        start: Some(b'*'),
        end: b"#",
        max_frame_length: 1024,
    })
}

#[derive(Debug, Default)]
pub struct H02Protocol;

impl H02Protocol {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for H02Protocol {
    fn name(&self) -> &'static str {
        "h02"
    }

    fn framing(&self) -> Framing {
        framing()
    }

    fn decoder(&self) -> Box<dyn ProtocolDecoder> {
        Box::new(H02Decoder)
    }
}

struct H02Decoder;

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ProtocolError> {
    fields
        .get(index)
        .copied()
        .ok_or(ProtocolError::InvalidField { field: name })
}

fn number(value: &str, name: &'static str) -> Result<f64, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidField { field: name })
}

fn two_digits(value: &str, offset: usize, name: &'static str) -> Result<u32, ProtocolError> {
    value
        .get(offset..offset + 2)
        .and_then(|digits| digits.parse().ok())
        .ok_or(ProtocolError::InvalidField { field: name })
}

/// Active-low alarm bits of the status word.
fn alarm_name(status: u32) -> Option<&'static str> {
    let raised = |bit| !bitmask::check(status.into(), bit);
    if raised(0) {
        Some("vibration")
    }
    else if raised(1) {
        Some("sos")
    }
    else if raised(2) {
        Some("overspeed")
    }
    else if raised(19) {
        Some("powerCut")
    }
    else {
        None
    }
}

impl ProtocolDecoder for H02Decoder {
    fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
        frame: &Frame,
    ) -> Result<Decoded, ProtocolError> {
        let text = str::from_utf8(&frame.payload)?;
        let fields: Vec<&str> = text.split(',').collect();

        let unique_id = field(&fields, 1, "imei")?;
        let command = field(&fields, 2, "command")?;

        match command {
            "V1" => {
                if ctx.identify(unique_id).is_none() {
                    tracing::debug!(unique_id, "h02: unknown device, message dropped");
                    return Ok(Decoded::nothing());
                }
                let Some(mut position) = ctx.position() else {
                    return Ok(Decoded::nothing());
                };

                let time = field(&fields, 3, "time")?;
                let date = field(&fields, 11, "date")?;
                position.fix_time = Some(
                    DateBuilder::new()
                        .year(two_digits(date, 4, "date")? as i32)
                        .month(two_digits(date, 2, "date")?)
                        .day(two_digits(date, 0, "date")?)
                        .time(
                            two_digits(time, 0, "time")?,
                            two_digits(time, 2, "time")?,
                            two_digits(time, 4, "time")?,
                        )
                        .build()?,
                );

                position.valid = field(&fields, 4, "validity")? == "A";

                let latitude = number(field(&fields, 5, "latitude")?, "latitude")?;
                let latitude_hemisphere = field(&fields, 6, "latitude hemisphere")?;
                let longitude = number(field(&fields, 7, "longitude")?, "longitude")?;
                let longitude_hemisphere = field(&fields, 8, "longitude hemisphere")?;

                position.latitude = coords::from_degree_minutes(
                    latitude,
                    hemisphere(latitude_hemisphere)?,
                )?;
                position.longitude = coords::from_degree_minutes(
                    longitude,
                    hemisphere(longitude_hemisphere)?,
                )?;

                position.speed = number(field(&fields, 9, "speed")?, "speed")?;
                position.course = number(field(&fields, 10, "course")?, "course")?;

                let status = u32::from_str_radix(field(&fields, 12, "status")?, 16)
                    .map_err(|_| ProtocolError::InvalidField { field: "status" })?;
                position
                    .attributes
                    .set(attr::IGNITION, !bitmask::check(status.into(), 10));
                if let Some(alarm) = alarm_name(status) {
                    position.attributes.set(attr::ALARM, alarm);
                }

                Ok(Decoded::record(position))
            }
            // periodic link keep-alive, nothing to record
            "HTBT" => Ok(Decoded::nothing()),
            other => {
                Err(ProtocolError::UnknownMessage {
                    message_type: other.to_owned(),
                })
            }
        }
    }
}

fn hemisphere(value: &str) -> Result<Hemisphere, ProtocolError> {
    let c = value
        .chars()
        .next()
        .ok_or(ProtocolError::InvalidField { field: "hemisphere" })?;
    Ok(Hemisphere::from_char(c)?)
}
