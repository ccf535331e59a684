//! # GELF wire records.
//!
//! Each forwarded line becomes one GELF 1.1 JSON object terminated by a NUL
//! byte (the TCP framing GELF receivers expect):
//!
//! ```text
//! {"version":"1.1","host":"prod-eu","short_message":"Log event in ...", ... }\0
//! ```

use serde::Serialize;

use crate::platform::Target;

const SHORT_MESSAGE_CHARS: usize = 50;
const LEVEL_ERROR: u8 = 3;

/// One GELF record.
#[derive(Debug, Serialize)]
pub struct GelfMessage<'a> {
    version: &'static str,
    host: &'a str,
    short_message: String,
    full_message: &'a str,
    timestamp: f64,
    level: u8,
    #[serde(rename = "_namespace")]
    namespace: &'a str,
    #[serde(rename = "_pod_name")]
    pod_name: &'a str,
    #[serde(rename = "_container_name")]
    container_name: &'a str,
    #[serde(rename = "_node_name")]
    node_name: &'a str,
}

impl<'a> GelfMessage<'a> {
    /// Builds the record for `message` read from `target`.
    ///
    /// `timestamp` is seconds since the Unix epoch.
    pub fn new(host: &'a str, target: &'a Target, message: &'a str, timestamp: f64) -> Self {
        Self {
            version: "1.1",
            host,
            short_message: short_message(target, message),
            full_message: message,
            timestamp,
            level: LEVEL_ERROR,
            namespace: &target.namespace,
            pod_name: &target.pod,
            container_name: &target.container,
            node_name: &target.node,
        }
    }

    /// Serializes to JSON followed by the `\0` frame delimiter.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(0);
        Ok(buf)
    }
}

/// `Log event in <ns> from <container> in <pod> on <node>: <first 50 chars> ...`
///
/// Messages of at most 50 characters are carried whole.
pub fn short_message(target: &Target, message: &str) -> String {
    let head = format!(
        "Log event in {} from {} in {} on {}: ",
        target.namespace, target.container, target.pod, target.node
    );
    match message.char_indices().nth(SHORT_MESSAGE_CHARS) {
        Some((cut, _)) => format!("{head}{} ...", &message[..cut]),
        None => format!("{head}{message}"),
    }
}

/// Current wall-clock time as fractional Unix seconds.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
