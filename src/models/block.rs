//! Timestamp-tagged output block captured from agent output.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One `[timestamp] tag` block and its body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapturedBlock {
    /// Timestamp text exactly as it appeared between the brackets.
    pub timestamp: String,
    /// Header tag with surrounding whitespace removed.
    pub tag: String,
    /// Text after the header line, up to the next header or end of text.
    pub body: String,
    /// Reconstructed header line plus body.
    pub raw: String,
}

impl CapturedBlock {
    /// Construct a block, reconstructing its raw text.
    #[must_use]
    pub fn new(timestamp: &str, tag: &str, body: &str) -> Self {
        Self {
            timestamp: timestamp.to_owned(),
            tag: tag.to_owned(),
            body: body.to_owned(),
            raw: format!("[{timestamp}] {tag}\n{body}"),
        }
    }

    /// Parse the second-precision prefix of the timestamp.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        let prefix = self.timestamp.get(..19)?;
        NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S").ok()
    }
}
