//! Per-comparison-type extraction and equality rules.
//!
//! A monitor's type decides three things: which [`Probe`] is evaluated in
//! the page, how the raw result is normalized, and what value stands in
//! when the selector matches nothing.

use crate::config::MissingElementPolicy;
use crate::error::EngineResult;
use crate::model::{ComparisonType, MonitorSpec};
use crate::renderer::{ElementQuery, Extraction, Probe, RenderContext};
use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

/// Caller-supplied extraction for [`ComparisonType::Custom`] monitors.
#[async_trait]
pub trait CustomExtractor: Send + Sync {
    /// Read the monitor's current value from the settled page.
    async fn extract(
        &self,
        page: &dyn RenderContext,
        monitor: &MonitorSpec,
    ) -> EngineResult<Extraction>;
}

/// Everything extraction needs besides the monitor itself.
#[derive(Clone, Copy)]
pub struct ExtractionScope<'a> {
    pub page: &'a dyn RenderContext,
    /// Document URL that relative hrefs resolve against; `None` leaves them as-is.
    pub base: Option<&'a Url>,
    pub missing_element: MissingElementPolicy,
    pub custom: Option<&'a dyn CustomExtractor>,
}

/// The in-page query for a monitor, or `None` for custom monitors.
///
/// `Attributes` is only consulted for attribute monitors.
pub fn probe_for(monitor: &MonitorSpec) -> Option<Probe<'_>> {
    match monitor.comparison_type {
        ComparisonType::Text => Some(Probe::Text),
        ComparisonType::Attribute => Some(Probe::Attributes(&monitor.attributes)),
        ComparisonType::Style => Some(Probe::Style),
        ComparisonType::Children => Some(Probe::Children),
        ComparisonType::Custom => None,
    }
}

/// Value reported when a monitor's element is missing or unreadable.
pub fn missing_value(kind: ComparisonType, policy: MissingElementPolicy) -> Value {
    match (policy, kind) {
        (MissingElementPolicy::Absent, _) => Value::Null,
        (MissingElementPolicy::PerType, ComparisonType::Text) => Value::Null,
        (
            MissingElementPolicy::PerType,
            ComparisonType::Attribute
            | ComparisonType::Style
            | ComparisonType::Children
            | ComparisonType::Custom,
        ) => Value::Object(Map::new()),
    }
}

/// Extract a monitor's current value from the page.
pub async fn extract(scope: ExtractionScope<'_>, monitor: &MonitorSpec) -> EngineResult<Value> {
    let extraction = match probe_for(monitor) {
        Some(probe) => {
            let query = ElementQuery {
                selector: &monitor.selector,
                probe,
            };
            scope.page.evaluate(&query).await?
        }
        None => match scope.custom {
            Some(custom) => custom.extract(scope.page, monitor).await?,
            None => Extraction::Found(Value::Object(Map::new())),
        },
    };

    Ok(match extraction {
        Extraction::Found(raw) => normalize(monitor.comparison_type, raw, scope.base),
        Extraction::NotFound => missing_value(monitor.comparison_type, scope.missing_element),
    })
}

/// Normalize a raw in-page result so equivalent states compare equal.
pub fn normalize(kind: ComparisonType, raw: Value, base: Option<&Url>) -> Value {
    match (kind, raw, base) {
        (ComparisonType::Attribute, Value::Object(attrs), Some(base)) => Value::Object(
            attrs
                .into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::String(href) if name.eq_ignore_ascii_case("href") => {
                            Value::String(resolve_href(&href, base))
                        }
                        other => other,
                    };
                    (name, value)
                })
                .collect(),
        ),
        (_, raw, _) => raw,
    }
}

/// Resolve an href the way the browser's `anchor.href` does: against the
/// document URL, so `about`, `#top` and `?q=1` keep the page's path.
/// Unresolvable values are kept.
pub fn resolve_href(href: &str, base: &Url) -> String {
    base.join(href)
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

/// The settled page URL as a base for href resolution.
///
/// URLs that cannot be a base (`about:blank`, `data:` URLs) yield `None`.
pub fn document_base(page_url: &str) -> Option<Url> {
    Url::parse(page_url).ok().filter(|url| !url.cannot_be_a_base())
}

/// Deep structural equality over JSON values.
///
/// Mappings compare regardless of key order, sequences element by element,
/// and numbers by numeric value, so `1` equals `1.0`.
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| structurally_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| structurally_equal(a, b)))
        }
        _ => a == b,
    }
}
