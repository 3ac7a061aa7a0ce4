//! Page sessions: one exclusively owned browser page per check run.
//!
//! A session is created at the start of a check and released exactly once,
//! either by [`PageSession::close`] or, if the check is abandoned, from
//! `Drop`. Sessions are never shared between runs.

use crate::config::NavigationOptions;
use crate::error::{EngineError, EngineResult};
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A browser page owned by a single check run.
pub struct PageSession {
    /// Unique session identifier, used in log fields.
    id: String,
    /// `None` once released.
    context: Option<Box<dyn RenderContext>>,
    /// When the session was opened.
    created_at: Instant,
}

impl PageSession {
    /// Open a fresh context from `renderer`.
    pub async fn open(renderer: &dyn Renderer) -> EngineResult<Self> {
        let context = renderer.new_context().await?;
        let id = format!("sess-{}", uuid::Uuid::new_v4().simple());
        debug!(session = %id, "page session opened");

        Ok(Self {
            id,
            context: Some(context),
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the page for read-only extraction.
    pub fn context(&self) -> EngineResult<&dyn RenderContext> {
        self.context.as_deref().ok_or(EngineError::SessionClosed)
    }

    /// Navigate the page, bounded by the navigation deadline.
    pub async fn navigate(
        &mut self,
        url: &str,
        options: &NavigationOptions,
    ) -> EngineResult<NavigationResult> {
        let context = self.context.as_mut().ok_or(EngineError::SessionClosed)?;

        match tokio::time::timeout(options.timeout, context.navigate(url, options)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::SettleTimeout {
                url: url.to_string(),
                timeout_ms: options.timeout.as_millis() as u64,
            }),
        }
    }

    /// Release the page and its browser.
    pub async fn close(mut self) -> EngineResult<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };
        debug!(session = %self.id, age_ms = self.age().as_millis() as u64, "page session closed");
        context.close().await
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        warn!(session = %self.id, "page session abandoned, releasing in background");

        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        warn!(session = %id, "background release failed: {e}");
                    }
                });
            }
            // No runtime left to close gracefully; the context's own Drop
            // releases the resource.
            Err(_) => drop(context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fixture::FixtureRenderer;

    const URL: &str = "https://example.com/";

    #[tokio::test]
    async fn test_close_releases_once() {
        let renderer = FixtureRenderer::new().with_page(URL, "<p>hi</p>");
        let mut session = PageSession::open(&renderer).await.unwrap();
        session
            .navigate(URL, &NavigationOptions::default())
            .await
            .unwrap();
        assert!(session.id().starts_with("sess-"));
        assert_eq!(renderer.live(), 1);

        session.close().await.unwrap();
        assert_eq!(renderer.opened(), 1);
        assert_eq!(renderer.released(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let renderer = FixtureRenderer::new().with_page(URL, "<p>hi</p>");
        let session = PageSession::open(&renderer).await.unwrap();
        drop(session);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(renderer.released(), 1);
        assert_eq!(renderer.live(), 0);
    }

    #[tokio::test]
    async fn test_navigation_deadline() {
        let renderer = FixtureRenderer::new()
            .with_page(URL, "<p>hi</p>")
            .with_latency(Duration::from_millis(500));
        let mut session = PageSession::open(&renderer).await.unwrap();

        let options = NavigationOptions {
            timeout: Duration::from_millis(20),
            ..NavigationOptions::default()
        };
        let err = session.navigate(URL, &options).await.unwrap_err();
        assert!(matches!(err, EngineError::SettleTimeout { timeout_ms: 20, .. }));

        session.close().await.unwrap();
        assert_eq!(renderer.released(), 1);
    }
}
