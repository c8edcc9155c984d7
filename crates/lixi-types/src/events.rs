use serde::{Deserialize, Serialize};

use crate::api::Content;
use crate::models::{DEFAULT_OPENER, Envelope, EnvelopeKind};

/// Events sent FROM server TO client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Full ledger, sent once right after the connection is accepted
    Init { envelopes: Vec<Envelope> },

    /// Someone else created an envelope
    Add { envelope: Envelope },

    /// Someone else opened an envelope
    Open { envelope: Envelope },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Create a new envelope
    Add {
        #[serde(rename = "envelopeType", default)]
        envelope_type: EnvelopeKind,
        #[serde(default)]
        sender: Option<String>,
        #[serde(default)]
        content: Option<Content>,
    },

    /// Claim an existing envelope
    Open {
        id: u64,
        #[serde(rename = "openedBy", default)]
        opened_by: Option<String>,
        /// Older clients name the opener `receiver`.
        #[serde(default)]
        receiver: Option<String>,
    },
}

impl ClientCommand {
    /// Parse a raw text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Pick the opener label: `openedBy` if non-empty, else `receiver` if
/// non-empty, else `DEFAULT_OPENER`.
pub fn resolve_opener(opened_by: Option<String>, receiver: Option<String>) -> String {
    opened_by
        .filter(|s| !s.is_empty())
        .or_else(|| receiver.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_OPENER.to_string())
}
