//! Headless Chromium backend built on `chromiumoxide`.
//!
//! Every context is a separate browser process with a single page and its
//! own throwaway profile directory, so concurrent checks share nothing.

use crate::config::{BrowserSettings, NavigationOptions, WaitUntil};
use crate::error::{EngineError, EngineResult};
use crate::renderer::{ElementQuery, Extraction, NavigationResult, Probe, RenderContext, Renderer};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often the settle loop samples the page.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READY_STATE: &str = "document.readyState";

/// Launches one headless browser per context.
pub struct ChromiumRenderer {
    settings: BrowserSettings,
}

impl ChromiumRenderer {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, profile_dir: &PathBuf) -> EngineResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder().user_data_dir(profile_dir);
        if let Some(path) = &self.settings.chromium_path {
            builder = builder.chrome_executable(path);
        }
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(EngineError::Browser)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> EngineResult<Box<dyn RenderContext>> {
        let profile_dir =
            std::env::temp_dir().join(format!("webvakt-profile-{}", uuid::Uuid::new_v4()));
        let config = self.browser_config(&profile_dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::Browser(format!("launching chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler event error: {e}");
                }
            }
        });

        let opened = match browser.new_page("about:blank").await {
            Ok(page) => track_network(&page)
                .await
                .map(|(network, task)| (page, network, task))
                .map_err(|e| format!("subscribing to network events: {e}")),
            Err(e) => Err(format!("opening page: {e}")),
        };
        let (page, network, network_task) = match opened {
            Ok(opened) => opened,
            Err(reason) => {
                // Browser's own Drop kills the process.
                handler_task.abort();
                remove_profile(&profile_dir);
                return Err(EngineError::Browser(reason));
            }
        };

        Ok(Box::new(ChromiumContext {
            browser: Mutex::new(browser),
            page,
            handler: HandlerGuard(handler_task),
            network,
            network_task: HandlerGuard(network_task),
            profile_dir,
        }))
    }
}

/// A browser process plus its single page.
///
/// Dropping an unclosed context kills the process (Browser's own Drop) and
/// stops the CDP handler task.
pub struct ChromiumContext {
    browser: Mutex<Browser>,
    page: Page,
    handler: HandlerGuard,
    network: Arc<NetworkActivity>,
    network_task: HandlerGuard,
    profile_dir: PathBuf,
}

/// Aborts a background task when dropped.
struct HandlerGuard(JoinHandle<()>);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Requests the page has in flight, fed by CDP network events.
#[derive(Debug, Default)]
struct NetworkActivity {
    in_flight: AtomicUsize,
    /// Bumped on every request start or end, so a request that begins and
    /// ends between two samples still counts as activity.
    events: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NetworkSnapshot {
    in_flight: usize,
    events: u64,
}

impl NetworkActivity {
    fn record(&self, in_flight: usize) {
        self.in_flight.store(in_flight, Ordering::SeqCst);
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            events: self.events.load(Ordering::SeqCst),
        }
    }
}

enum RequestEvent {
    Started(String),
    Ended(String),
}

/// Subscribe to the page's request lifecycle and keep a live in-flight count.
///
/// Redirects reuse their request id, so ids are tracked as a set rather
/// than a counter.
async fn track_network(page: &Page) -> Result<(Arc<NetworkActivity>, JoinHandle<()>), String> {
    let started = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| e.to_string())?;
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(|e| e.to_string())?;
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(|e| e.to_string())?;

    let mut events = stream::select_all([
        started
            .map(|e| RequestEvent::Started(e.request_id.inner().clone()))
            .boxed(),
        finished
            .map(|e| RequestEvent::Ended(e.request_id.inner().clone()))
            .boxed(),
        failed
            .map(|e| RequestEvent::Ended(e.request_id.inner().clone()))
            .boxed(),
    ]);

    let activity = Arc::new(NetworkActivity::default());
    let shared = Arc::clone(&activity);
    let task = tokio::spawn(async move {
        let mut pending = HashSet::new();
        while let Some(event) = events.next().await {
            match event {
                RequestEvent::Started(id) => {
                    pending.insert(id);
                }
                RequestEvent::Ended(id) => {
                    pending.remove(&id);
                }
            }
            shared.record(pending.len());
        }
    });

    Ok((activity, task))
}

/// Network-idle settle condition: the document is complete, nothing is in
/// flight, and no request started or ended for the whole window.
#[derive(Debug)]
struct IdleWatch {
    window: Duration,
    last_events: Option<u64>,
    quiet_since: Instant,
}

impl IdleWatch {
    fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_events: None,
            quiet_since: now,
        }
    }

    /// Feed one sample; true once the page has been idle for the window.
    fn observe(&mut self, ready: bool, network: NetworkSnapshot, now: Instant) -> bool {
        if !ready || network.in_flight > 0 || self.last_events != Some(network.events) {
            self.last_events = Some(network.events);
            self.quiet_since = now;
            return false;
        }
        now.duration_since(self.quiet_since) >= self.window
    }
}

impl ChromiumContext {
    async fn evaluate_value(&self, script: &str) -> Result<Value, String> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| e.to_string())?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_network_idle(&self, idle_window: Duration) -> Result<(), String> {
        let mut idle = IdleWatch::new(idle_window, Instant::now());
        loop {
            let ready = self.evaluate_value(READY_STATE).await?.as_str() == Some("complete");
            if idle.observe(ready, self.network.snapshot(), Instant::now()) {
                return Ok(());
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        options: &NavigationOptions,
    ) -> EngineResult<NavigationResult> {
        let started = Instant::now();
        let nav_error = |reason: String| EngineError::Navigation {
            url: url.to_string(),
            reason,
        };

        self.page
            .goto(url)
            .await
            .map_err(|e| nav_error(e.to_string()))?;

        if options.wait_until == WaitUntil::NetworkIdle {
            self.wait_for_network_idle(options.idle_window)
                .await
                .map_err(nav_error)?;
        }

        let final_url = self
            .page
            .url()
            .await
            .map_err(|e| nav_error(e.to_string()))?
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn evaluate(&self, query: &ElementQuery<'_>) -> EngineResult<Extraction> {
        let script = query_script(query);
        let result = self
            .evaluate_value(&script)
            .await
            .map_err(|reason| EngineError::Extraction {
                selector: query.selector.to_string(),
                reason,
            })?;

        if result.get("found").and_then(Value::as_bool) == Some(true) {
            Ok(Extraction::Found(
                result.get("value").cloned().unwrap_or(Value::Null),
            ))
        } else {
            Ok(Extraction::NotFound)
        }
    }

    async fn execute_js(&self, script: &str) -> EngineResult<Value> {
        self.evaluate_value(script)
            .await
            .map_err(|reason| EngineError::Extraction {
                selector: String::new(),
                reason,
            })
    }

    async fn close(self: Box<Self>) -> EngineResult<()> {
        let ChromiumContext {
            browser,
            page,
            handler,
            network: _,
            network_task,
            profile_dir,
        } = *self;
        let mut browser = browser.into_inner();

        if let Err(e) = page.close().await {
            debug!("closing page: {e}");
        }
        let closed = browser
            .close()
            .await
            .map_err(|e| EngineError::Browser(format!("closing browser: {e}")));
        if let Err(e) = browser.wait().await {
            warn!("waiting for browser exit: {e}");
        }
        drop(network_task);
        drop(handler);
        remove_profile(&profile_dir);

        closed.map(|_| ())
    }
}

fn remove_profile(dir: &PathBuf) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!("removing profile {}: {e}", dir.display());
    }
}

/// Build the in-page script for one query.
///
/// The script always evaluates to `{found: false}` or
/// `{found: true, value: ...}`; an invalid selector throws.
pub fn query_script(query: &ElementQuery<'_>) -> String {
    let selector = Value::String(query.selector.to_string()).to_string();

    let body = match query.probe {
        Probe::Text => "return el.textContent;".to_string(),
        Probe::Attributes(names) => {
            let names = Value::from(names.to_vec()).to_string();
            format!(
                r#"var out = {{}};
                var names = {names};
                for (var i = 0; i < names.length; i++) {{
                    var v = el.getAttribute(names[i]);
                    if (v !== null && names[i].toLowerCase() === 'href'
                        && typeof el.href === 'string') {{
                        v = el.href;
                    }}
                    out[names[i]] = v;
                }}
                return out;"#
            )
        }
        Probe::Style => r#"var cs = window.getComputedStyle(el);
                var out = {};
                for (var i = 0; i < cs.length; i++) {
                    out[cs[i]] = cs.getPropertyValue(cs[i]);
                }
                return out;"#
            .to_string(),
        Probe::Children => r#"var html = '';
                for (var i = 0; i < el.children.length; i++) {
                    html += el.children[i].outerHTML;
                }
                return html;"#
            .to_string(),
    };

    format!(
        r#"(function() {{
            var el = document.querySelector({selector});
            if (!el) return {{ found: false }};
            var read = function() {{
                {body}
            }};
            return {{ found: true, value: read() }};
        }})()"#
    )
}
