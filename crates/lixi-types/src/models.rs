use serde::{Deserialize, Serialize};

/// Sender label used when a client does not supply one.
pub const DEFAULT_SENDER: &str = "Người dùng";

/// Opener label used when an `open` command does not supply one.
pub const DEFAULT_OPENER: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    #[default]
    Money,
    Wish,
}

/// One lucky-money or wish record in the shared ledger.
///
/// Exactly one of `amount` / `wish` is set, according to `kind`. The
/// `received_*` fields stay empty until the envelope is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: u64,
    // Older snapshots stored the kind under `type`.
    #[serde(alias = "type")]
    pub kind: EnvelopeKind,
    pub amount: Option<i64>,
    pub wish: Option<String>,
    pub sender: String,
    pub opened: bool,
    pub opened_by: Option<String>,
    pub received_amount: Option<i64>,
    pub received_wish: Option<String>,
    #[serde(alias = "timestamp")]
    pub created_at: String,
}

impl Envelope {
    /// Whether `opener` is allowed to claim this envelope right now.
    pub fn can_be_opened_by(&self, opener: &str) -> bool {
        !self.opened && self.sender != opener
    }

    /// Terminal transition: mark opened and copy the content into the
    /// matching `received_*` field.
    pub fn mark_opened(&mut self, opener: String) {
        self.opened = true;
        self.opened_by = Some(opener);
        match self.kind {
            EnvelopeKind::Money => self.received_amount = self.amount,
            EnvelopeKind::Wish => self.received_wish = self.wish.clone(),
        }
    }
}
