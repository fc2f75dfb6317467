//! # MQTT protocol layer
//!
//! Everything between the typed fan API and the broker: payload encoding and decoding,
//! request/reply correlation and the session itself.
//!
//! ```text
//! mqtt/
//! ├── message.rs       - Commands, outbound payloads and inbound parsing
//! ├── response.rs      - Status and sensor reply decoders
//! ├── correlation.rs   - Matching replies to waiting requests
//! ├── transport.rs     - Connector / Transport seam
//! └── mqtt_handler.rs  - rumqttc session and the session handle
//! ```
//!
//! Each fan listens on `<product code>/<username>/command` and answers on
//! `<product code>/<username>/status/current`.

pub mod correlation;
pub mod message;
pub mod mqtt_handler;
pub mod response;
pub mod transport;

use crate::model::FanModel;

/// Command and status topics of one fan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub status: String,
}

impl Topics {
    pub fn new(model: FanModel, username: &str) -> Self {
        let base = format!("{}/{}", model.product_code(), username);
        Self {
            command: format!("{}/command", base),
            status: format!("{}/status/current", base),
        }
    }
}
