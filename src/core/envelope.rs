use std::fmt;

use serde::{Deserialize, Serialize};
use sonic_rs::Value;

use super::types::{PushError, PushResult};

/// Closed set of message kinds multiplexed over the push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Initial,
    DownloadUpdate,
    UploadUpdate,
    CleanupUpdate,
    StatisticsUpdate,
    Pong,
    Error,
}

impl Category {
    pub const COUNT: usize = 7;

    pub const ALL: [Category; Category::COUNT] = [
        Category::Initial,
        Category::DownloadUpdate,
        Category::UploadUpdate,
        Category::CleanupUpdate,
        Category::StatisticsUpdate,
        Category::Pong,
        Category::Error,
    ];

    /// Stable slot index used by per-category tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Category::Initial => 0,
            Category::DownloadUpdate => 1,
            Category::UploadUpdate => 2,
            Category::CleanupUpdate => 3,
            Category::StatisticsUpdate => 4,
            Category::Pong => 5,
            Category::Error => 6,
        }
    }

    /// Wire name as it appears in the `type` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Initial => "initial",
            Category::DownloadUpdate => "download_update",
            Category::UploadUpdate => "upload_update",
            Category::CleanupUpdate => "cleanup_update",
            Category::StatisticsUpdate => "statistics_update",
            Category::Pong => "pong",
            Category::Error => "error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded unit of pushed data.
///
/// `data` is opaque to this crate; subscribers own its meaning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            seq: None,
            data: None,
            message: None,
        }
    }

    pub fn sequenced(category: Category, seq: u64) -> Self {
        Self {
            seq: Some(seq),
            ..Self::new(category)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Decode a text/binary frame payload.
    pub fn decode(bytes: &[u8]) -> PushResult<Self> {
        sonic_rs::from_slice(bytes).map_err(|err| PushError::Decode(err.to_string()))
    }

    pub fn encode(&self) -> PushResult<String> {
        sonic_rs::to_string(self).map_err(|err| PushError::Decode(err.to_string()))
    }
}

/// Outbound keep-alive request. Carries no sequence number.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;
