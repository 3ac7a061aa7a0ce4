//! Monitor definitions, change records and the check request envelope.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Opaque identifier carried through a check unchanged.
///
/// Upstream systems use both numeric and string keys, so either is accepted
/// and echoed back in the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Number(i64),
    Text(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identifier {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Identifier {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// How a monitor's element is observed and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ComparisonType {
    /// Rendered text content.
    Text,
    /// Selected attribute values, hrefs resolved to absolute URLs.
    Attribute,
    /// Full computed style.
    Style,
    /// Concatenated outer markup of the direct child elements.
    Children,
    /// Caller-supplied extraction.
    Custom,
}

impl ComparisonType {
    pub const ALL: [ComparisonType; 5] = [
        Self::Text,
        Self::Attribute,
        Self::Style,
        Self::Children,
        Self::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Attribute => "attribute",
            Self::Style => "style",
            Self::Children => "children",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison type name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported comparison type {0:?}")]
pub struct UnknownComparisonType(pub String);

impl FromStr for ComparisonType {
    type Err = UnknownComparisonType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownComparisonType(s.to_string()))
    }
}

impl TryFrom<String> for ComparisonType {
    type Error = UnknownComparisonType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One watch definition: a selector, how to compare it, and the last
/// known-good value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSpec {
    #[serde(rename = "MonitorID")]
    pub monitor_id: Identifier,
    #[serde(rename = "WebsiteID", default)]
    pub website_id: Option<Identifier>,
    #[serde(rename = "UserID", default)]
    pub user_id: Option<Identifier>,
    #[serde(rename = "SnapshotID", default)]
    pub snapshot_id: Option<Identifier>,
    #[serde(rename = "Selector")]
    pub selector: String,
    #[serde(rename = "ComparisonType", alias = "Type")]
    pub comparison_type: ComparisonType,
    /// Attribute names to read. Only consulted for
    /// [`ComparisonType::Attribute`].
    #[serde(rename = "Attributes", default, deserialize_with = "null_as_empty")]
    pub attributes: Vec<String>,
    #[serde(rename = "ExpectedValue", alias = "Value", default)]
    pub expected_value: Value,
}

impl MonitorSpec {
    /// Create a monitor with no attributes and a `null` expected value.
    pub fn new(
        monitor_id: impl Into<Identifier>,
        selector: impl Into<String>,
        comparison_type: ComparisonType,
    ) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            website_id: None,
            user_id: None,
            snapshot_id: None,
            selector: selector.into(),
            comparison_type,
            attributes: Vec::new(),
            expected_value: Value::Null,
        }
    }

    /// Set the attribute names to watch.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expected value.
    pub fn expecting(mut self, value: Value) -> Self {
        self.expected_value = value;
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A detected mismatch between a monitor's current and expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "MonitorID")]
    pub monitor_id: Identifier,
    #[serde(rename = "WebsiteID")]
    pub website_id: Option<Identifier>,
    #[serde(rename = "UserID")]
    pub user_id: Option<Identifier>,
    #[serde(rename = "Selector")]
    pub selector: String,
    #[serde(rename = "ComparisonType")]
    pub comparison_type: ComparisonType,
    #[serde(rename = "Attributes")]
    pub attributes: Vec<String>,
    #[serde(rename = "SnapshotID")]
    pub snapshot_id: Option<Identifier>,
    #[serde(rename = "ExpectedValue")]
    pub expected_value: Value,
    pub current: Value,
    pub expected: Value,
    #[serde(rename = "DetectedAt")]
    pub detected_at: DateTime<Utc>,
    /// Why extraction failed, when the change is a broken selector.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeRecord {
    /// Build a record for `monitor` observed with value `current`.
    pub fn new(monitor: &MonitorSpec, current: Value, detected_at: DateTime<Utc>) -> Self {
        Self {
            monitor_id: monitor.monitor_id.clone(),
            website_id: monitor.website_id.clone(),
            user_id: monitor.user_id.clone(),
            selector: monitor.selector.clone(),
            comparison_type: monitor.comparison_type,
            attributes: monitor.attributes.clone(),
            snapshot_id: monitor.snapshot_id.clone(),
            expected_value: monitor.expected_value.clone(),
            current,
            expected: monitor.expected_value.clone(),
            detected_at,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

/// The ingestion envelope: a page and the monitors to check on it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRequest {
    pub website_url: String,
    pub monitors: Vec<MonitorSpec>,
}

impl CheckRequest {
    /// Parse an envelope from JSON text.
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidRequest(format!("not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parse an envelope from a JSON value.
    ///
    /// Queue messages arrive as a JSON string holding the envelope, so a
    /// string value is decoded one more time.
    pub fn from_value(value: Value) -> EngineResult<Self> {
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
                EngineError::InvalidRequest(format!("encoded envelope is not valid JSON: {e}"))
            })?,
            other => other,
        };

        let Value::Object(mut envelope) = value else {
            return Err(EngineError::InvalidRequest(
                "envelope must be a JSON object".into(),
            ));
        };

        let website_url = match envelope.remove("WebsiteURL") {
            Some(Value::String(url)) => url,
            _ => {
                return Err(EngineError::InvalidRequest(
                    "WebsiteURL must be a string".into(),
                ))
            }
        };

        let raw_monitors = match envelope.remove("Monitors") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(EngineError::InvalidRequest(
                    "Monitors must be an array".into(),
                ))
            }
        };

        let monitors = raw_monitors
            .into_iter()
            .enumerate()
            .map(|(index, raw)| parse_monitor(index, raw))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            website_url,
            monitors,
        })
    }
}

fn parse_monitor(index: usize, raw: Value) -> EngineResult<MonitorSpec> {
    let label = raw
        .get("MonitorID")
        .and_then(|id| serde_json::from_value::<Identifier>(id.clone()).ok())
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("#{index}"));

    let kind = raw.get("ComparisonType").or_else(|| raw.get("Type"));
    if let Some(Value::String(kind)) = kind {
        if let Err(UnknownComparisonType(kind)) = kind.parse::<ComparisonType>() {
            return Err(EngineError::UnsupportedComparisonType {
                monitor: label,
                kind,
            });
        }
    }

    serde_json::from_value(raw)
        .map_err(|e| EngineError::InvalidRequest(format!("monitor {label}: {e}")))
}
