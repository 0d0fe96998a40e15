//! Vendor protocol modules.
//!
//! Each module is one implementation of the engine's
//! [`Protocol`][trackbee_engine::Protocol] capability trait, composed from
//! the codec toolkit and frame assembler. Together the shipped modules
//! cover every framing discipline and codec primitive the engine
//! supports:
//!
//! | module | transport | framing | identification |
//! |---|---|---|---|
//! | [`gt06`] | TCP | header + length prefix, CRC-16/X.25, BCD | login message, once per connection |
//! | [`h02`] | TCP | `*…#` delimiters, degree-minute coordinates | IMEI in every message |
//! | [`vektor`] | TCP/UDP | length prefix + nested blocks, CRC-16/CCITT-FALSE, archive drain | Luhn-checked unit id in hello |
//! | [`osmand`] | HTTP | raw body, `key=value` pairs | id parameter in every request |

pub mod gt06;
pub mod h02;
pub mod osmand;
pub mod vektor;

use std::sync::Arc;

use trackbee_engine::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("invalid options for {protocol}")]
    InvalidOptions {
        protocol: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Instantiates a protocol module by configured name.
///
/// `options` is the module's option object from the listener
/// configuration; `{}` or `null` selects the defaults.
pub fn create(name: &str, options: &serde_json::Value) -> Result<Arc<dyn Protocol>, CreateError> {
    // an omitted options key deserializes to null; treat it as empty
    let options = match options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    let invalid = |source| {
        CreateError::InvalidOptions {
            protocol: name.to_owned(),
            source,
        }
    };

    match name {
        "gt06" => {
            let options = serde_json::from_value(options).map_err(invalid)?;
            Ok(Arc::new(gt06::Gt06Protocol::new(options)))
        }
        "h02" => Ok(Arc::new(h02::H02Protocol::new())),
        "vektor" => {
            let options = serde_json::from_value(options).map_err(invalid)?;
            Ok(Arc::new(vektor::VektorProtocol::new(options)))
        }
        "osmand" => Ok(Arc::new(osmand::OsmandProtocol::new())),
        _ => Err(CreateError::UnknownProtocol(name.to_owned())),
    }
}
