//! Static HTML backend for tests and offline checks.
//!
//! Pages are canned HTML keyed by URL and queried with `scraper`, so no
//! browser is involved. There is no script execution or layout; "computed
//! style" is approximated by the element's inline `style` declarations.

use crate::config::NavigationOptions;
use crate::error::{EngineError, EngineResult};
use crate::renderer::{ElementQuery, Extraction, NavigationResult, Probe, RenderContext, Renderer};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

/// Open/release counters shared by a renderer and its contexts.
#[derive(Debug, Default)]
struct ContextStats {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Serves canned pages from memory.
#[derive(Clone, Default)]
pub struct FixtureRenderer {
    pages: Arc<RwLock<HashMap<String, String>>>,
    latency: Option<Duration>,
    stats: Arc<ContextStats>,
}

impl FixtureRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.set_page(url, html);
        self
    }

    /// Delay every navigation, to simulate a slow page.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the page served for `url`; affects later navigations only.
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        let url: String = url.into();
        if let Ok(mut pages) = self.pages.write() {
            pages.insert(page_key(&url), html.into());
        }
    }

    /// Contexts handed out so far.
    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Contexts released so far, by `close` or by drop.
    pub fn released(&self) -> usize {
        self.stats.released.load(Ordering::SeqCst)
    }

    /// Contexts currently alive.
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.released())
    }

    fn lookup(&self, url: &str) -> Option<String> {
        self.pages.read().ok()?.get(&page_key(url)).cloned()
    }
}

/// Registration and navigation agree on a page regardless of a trailing
/// slash or spelling differences `Url` normalizes away (host case, default
/// port).
fn page_key(url: &str) -> String {
    let normalized = Url::parse(url).map_or_else(|_| url.to_string(), String::from);
    normalized.trim_end_matches('/').to_string()
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn new_context(&self) -> EngineResult<Box<dyn RenderContext>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureContext {
            renderer: self.clone(),
            document: None,
            released: false,
        }))
    }
}

/// One page of a [`FixtureRenderer`].
pub struct FixtureContext {
    renderer: FixtureRenderer,
    /// Source of the current page; parsed per query since `Html` is not `Send`.
    document: Option<String>,
    released: bool,
}

impl FixtureContext {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.renderer.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FixtureContext {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl RenderContext for FixtureContext {
    async fn navigate(
        &mut self,
        url: &str,
        _options: &NavigationOptions,
    ) -> EngineResult<NavigationResult> {
        if let Some(latency) = self.renderer.latency {
            tokio::time::sleep(latency).await;
        }

        let html = self
            .renderer
            .lookup(url)
            .ok_or_else(|| EngineError::Navigation {
                url: url.to_string(),
                reason: "no fixture for url".into(),
            })?;
        self.document = Some(html);

        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: self.renderer.latency.map_or(0, |d| d.as_millis() as u64),
        })
    }

    async fn evaluate(&self, query: &ElementQuery<'_>) -> EngineResult<Extraction> {
        let source = self.document.as_deref().ok_or_else(|| EngineError::Extraction {
            selector: query.selector.to_string(),
            reason: "no page loaded".into(),
        })?;
        evaluate_html(source, query)
    }

    async fn execute_js(&self, _script: &str) -> EngineResult<Value> {
        Err(EngineError::Extraction {
            selector: String::new(),
            reason: "static fixtures cannot run scripts".into(),
        })
    }

    async fn close(self: Box<Self>) -> EngineResult<()> {
        let mut context = self;
        context.release();
        Ok(())
    }
}

/// Evaluate a query against an HTML document.
pub fn evaluate_html(source: &str, query: &ElementQuery<'_>) -> EngineResult<Extraction> {
    let selector = Selector::parse(query.selector).map_err(|e| EngineError::Extraction {
        selector: query.selector.to_string(),
        reason: format!("invalid selector: {e}"),
    })?;

    let document = Html::parse_document(source);
    let Some(element) = document.select(&selector).next() else {
        return Ok(Extraction::NotFound);
    };

    let value = match query.probe {
        Probe::Text => Value::String(element.text().collect()),
        Probe::Attributes(names) => Value::Object(
            names
                .iter()
                .map(|name| {
                    let value = element
                        .value()
                        .attr(name)
                        .map_or(Value::Null, |v| Value::String(v.to_string()));
                    (name.clone(), value)
                })
                .collect(),
        ),
        Probe::Style => Value::Object(inline_style(element)),
        Probe::Children => Value::String(
            element
                .children()
                .filter_map(ElementRef::wrap)
                .map(|child| child.html())
                .collect(),
        ),
    };

    Ok(Extraction::Found(value))
}

fn inline_style(element: ElementRef<'_>) -> Map<String, Value> {
    element
        .value()
        .attr("style")
        .unwrap_or("")
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            if prop.is_empty() {
                return None;
            }
            Some((prop, Value::String(value.trim().to_string())))
        })
        .collect()
}
