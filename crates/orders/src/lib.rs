use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod status;

pub use status::OrderStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopId(String);

impl ShopId {
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(IdError::Empty("shop id"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document id assigned by the feed. Treated as opaque; only emptiness is
/// checked, by the notifier, since the feed may deliver anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First `n` characters, used when the order carries no short id.
    pub fn prefix(&self, n: usize) -> String {
        self.0.chars().take(n).collect()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ChangeKind,
    pub id: OrderId,
    #[serde(default)]
    pub data: Value,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            id: OrderId::new(id),
            data,
        }
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary::from_payload(&self.data)
    }
}

/// One delivery from the live feed: the changes since the previous delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub shop_id: ShopId,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

/// The fields the notifier reads out of an order payload. Everything is
/// optional because the payload schema belongs to the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSummary {
    pub short_id: Option<String>,
    pub total_amount: Option<f64>,
    pub status: Option<OrderStatus>,
}

impl OrderSummary {
    pub fn from_payload(data: &Value) -> Self {
        let short_id = data
            .get("shortId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let total_amount = match data.get("totalAmount") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|amount| amount.is_finite());

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());

        Self {
            short_id,
            total_amount,
            status,
        }
    }

    /// Label shown to the owner: the short id when present, otherwise the
    /// first four characters of the document id.
    pub fn display_label(&self, id: &OrderId) -> String {
        self.short_id.clone().unwrap_or_else(|| id.prefix(4))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeedErrorCode {
    PermissionDenied,
    Unavailable,
    Other(String),
}

impl From<String> for FeedErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "permission-denied" => Self::PermissionDenied,
            "unavailable" => Self::Unavailable,
            _ => Self::Other(code),
        }
    }
}

impl From<FeedErrorCode> for String {
    fn from(code: FeedErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl FeedErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unavailable => "unavailable",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FeedErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("feed error ({code}): {message}")]
pub struct FeedError {
    pub code: FeedErrorCode,
    #[serde(default)]
    pub message: String,
}

impl FeedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: FeedErrorCode::from(code.into()),
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == FeedErrorCode::PermissionDenied
    }
}
