//! OsmAnd-style HTTP reporting.
//!
//! Phone clients and simple integrations POST `key=value` pairs, either
//! as a query string or a form body. The whole body is the frame; the
//! device identifier rides in every request, and the timestamp is a
//! plain Unix offset. There is no reply payload — the HTTP status line
//! is the acknowledgement.

use trackbee_codec::time::Epoch;
use trackbee_engine::{
    DecodeContext,
    Decoded,
    Protocol,
    ProtocolDecoder,
    ProtocolError,
};
use trackbee_frame::{
    Frame,
    Framing,
};
use trackbee_types::attr;

fn framing() -> Framing {
    Framing::Raw {
        max_frame_length: 8192,
    }
}

#[derive(Debug, Default)]
pub struct OsmandProtocol;

impl OsmandProtocol {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for OsmandProtocol {
    fn name(&self) -> &'static str {
        "osmand"
    }

    fn framing(&self) -> Framing {
        framing()
    }

    fn decoder(&self) -> Box<dyn ProtocolDecoder> {
        Box::new(OsmandDecoder)
    }
}

struct OsmandDecoder;

fn parse_number(value: &str, name: &'static str) -> Result<f64, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidField { field: name })
}

impl ProtocolDecoder for OsmandDecoder {
    fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
        frame: &Frame,
    ) -> Result<Decoded, ProtocolError> {
        let text = str::from_utf8(&frame.payload)?;

        let mut unique_id = None;
        let mut latitude = None;
        let mut longitude = None;
        let mut timestamp = None;
        let mut valid = true;
        let mut extras = Vec::new();

        for pair in text.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "id" | "deviceid" => unique_id = Some(value),
                "lat" => latitude = Some(parse_number(value, "lat")?),
                "lon" => longitude = Some(parse_number(value, "lon")?),
                "timestamp" => {
                    let seconds = value
                        .parse()
                        .map_err(|_| ProtocolError::InvalidField { field: "timestamp" })?;
                    timestamp = Some(Epoch::Unix.plus_seconds(seconds)?);
                }
                "valid" => valid = value == "true" || value == "1",
                _ => extras.push((key, value)),
            }
        }

        let unique_id = unique_id.ok_or(ProtocolError::InvalidField { field: "id" })?;
        let Some(session) = ctx.identify(unique_id) else {
            tracing::debug!(unique_id, "osmand: unknown device, request dropped");
            return Ok(Decoded::nothing());
        };

        let mut position = trackbee_types::Position::new(session.device_id(), ctx.protocol());
        position.fix_time = timestamp;

        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => {
                position.valid = valid;
                position.latitude = latitude;
                position.longitude = longitude;
            }
            _ => {
                return Err(ProtocolError::InvalidField { field: "lat/lon" });
            }
        }

        for (key, value) in extras {
            match key {
                "speed" => position.speed = parse_number(value, "speed")?,
                "bearing" | "heading" => position.course = parse_number(value, "bearing")?,
                "altitude" => position.altitude = parse_number(value, "altitude")?,
                "batt" => {
                    position
                        .attributes
                        .set(attr::BATTERY_LEVEL, parse_number(value, "batt")?);
                }
                // anything else is forwarded as-is
                _ => position.attributes.set(key, value),
            }
        }

        Ok(Decoded::record(position))
    }
}
