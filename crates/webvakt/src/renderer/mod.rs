//! The rendering boundary: everything the engine needs from a browser.
//!
//! The detector only talks to [`Renderer`] and [`RenderContext`], so the
//! Chromium backend can be swapped for [`fixture::FixtureRenderer`], which
//! serves canned HTML without launching anything.

pub mod chromium;
pub mod fixture;

use crate::config::NavigationOptions;
use crate::error::EngineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of navigating a context to a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The URL after redirects.
    pub final_url: String,
    /// Time from navigation start until the page settled.
    pub load_time_ms: u64,
}

/// What to read from the element a selector matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<'a> {
    /// `textContent`.
    Text,
    /// Raw attribute values, `null` where the attribute is unset.
    Attributes(&'a [String]),
    /// Every property of the computed style.
    Style,
    /// `outerHTML` of each direct child element, joined in document order.
    Children,
}

/// A selector-scoped read against the settled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementQuery<'a> {
    pub selector: &'a str,
    pub probe: Probe<'a>,
}

/// Outcome of evaluating an [`ElementQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The selector matched and the probe produced this raw value.
    Found(Value),
    /// The selector matched nothing.
    NotFound,
}

/// A source of isolated page contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh context owned exclusively by the caller.
    async fn new_context(&self) -> EngineResult<Box<dyn RenderContext>>;
}

/// One live page.
///
/// Implementations must release their underlying resources when dropped
/// without [`close`](RenderContext::close) having been called.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Load `url` and wait until the page settles per `options`.
    async fn navigate(
        &mut self,
        url: &str,
        options: &NavigationOptions,
    ) -> EngineResult<NavigationResult>;

    /// Evaluate a selector-scoped query. Must not mutate the page.
    async fn evaluate(&self, query: &ElementQuery<'_>) -> EngineResult<Extraction>;

    /// Run an arbitrary script and return its JSON result.
    async fn execute_js(&self, script: &str) -> EngineResult<Value>;

    /// Release the page and everything behind it.
    async fn close(self: Box<Self>) -> EngineResult<()>;
}
