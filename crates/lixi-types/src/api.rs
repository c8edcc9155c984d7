use serde::{Deserialize, Serialize};

use crate::models::EnvelopeKind;

// -- Envelope content --

/// Raw `content` value of an `add` command. Clients send either a string or
/// a bare JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Number(serde_json::Number),
}

impl Content {
    /// Interpret the content as a money amount.
    ///
    /// Strings use leading-integer semantics: optional whitespace and sign,
    /// then digits up to the first non-digit (`"100k"` is 100). Returns
    /// `None` when no digits are found or the value does not fit.
    pub fn as_amount(&self) -> Option<i64> {
        match self {
            Self::Text(s) => parse_leading_int(s),
            Self::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            }),
        }
    }

    /// Interpret the content as wish text.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let value: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -value } else { value })
}

// -- Store requests --

/// Everything the store needs to mint a new envelope.
#[derive(Debug, Clone, Default)]
pub struct CreateEnvelope {
    pub kind: EnvelopeKind,
    pub sender: Option<String>,
    pub content: Option<Content>,
}

impl CreateEnvelope {
    pub fn money(sender: Option<&str>, content: Option<&str>) -> Self {
        Self {
            kind: EnvelopeKind::Money,
            sender: sender.map(str::to_owned),
            content: content.map(|c| Content::Text(c.to_owned())),
        }
    }

    pub fn wish(sender: Option<&str>, content: Option<&str>) -> Self {
        Self {
            kind: EnvelopeKind::Wish,
            sender: sender.map(str::to_owned),
            content: content.map(|c| Content::Text(c.to_owned())),
        }
    }
}
