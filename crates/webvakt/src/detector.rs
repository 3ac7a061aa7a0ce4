//! The difference detector: one check of one page against its monitors.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{ChangeRecord, MonitorSpec};
use crate::renderer::Renderer;
use crate::session::PageSession;
use crate::strategy::{self, CustomExtractor, ExtractionScope};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// What one monitor's extraction produced.
#[derive(Debug, Clone, PartialEq)]
struct Observation {
    current: Value,
    /// Set when the extraction failed and `current` is a stand-in.
    error: Option<String>,
}

/// Checks pages for changes against their monitors.
///
/// A detector holds no per-check state: every [`check`](Self::check) opens
/// its own page session, so one detector can serve concurrent checks.
pub struct DifferenceDetector {
    renderer: Arc<dyn Renderer>,
    config: EngineConfig,
    custom: Option<Arc<dyn CustomExtractor>>,
}

impl DifferenceDetector {
    pub fn new(renderer: Arc<dyn Renderer>, config: EngineConfig) -> Self {
        Self {
            renderer,
            config,
            custom: None,
        }
    }

    /// Register the extractor used for `custom` monitors.
    pub fn with_custom_extractor(mut self, extractor: Arc<dyn CustomExtractor>) -> Self {
        self.custom = Some(extractor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render `url` once and report every monitor whose current value
    /// differs from its expected value, in input order.
    ///
    /// An empty result means nothing changed. Navigation failures abort the
    /// whole check; a failing selector only affects its own monitor, which
    /// is then reported with its missing-element value and an error.
    pub async fn check(&self, url: &str, monitors: &[MonitorSpec]) -> EngineResult<Vec<ChangeRecord>> {
        Url::parse(url).map_err(|e| EngineError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if monitors.is_empty() {
            debug!(url, "no monitors, skipping render");
            return Ok(Vec::new());
        }

        let mut session = PageSession::open(self.renderer.as_ref()).await?;
        let outcome = self.run(&mut session, url, monitors).await;

        let session_id = session.id().to_string();
        if let Err(e) = session.close().await {
            warn!(session = %session_id, "failed to release page session: {e}");
        }

        if let Ok(records) = &outcome {
            info!(
                url,
                session = %session_id,
                monitors = monitors.len(),
                changes = records.len(),
                "check complete"
            );
        }
        outcome
    }

    async fn run(
        &self,
        session: &mut PageSession,
        url: &str,
        monitors: &[MonitorSpec],
    ) -> EngineResult<Vec<ChangeRecord>> {
        let nav = session.navigate(url, &self.config.navigation).await?;
        debug!(
            url,
            session = %session.id(),
            final_url = %nav.final_url,
            load_time_ms = nav.load_time_ms,
            "page settled"
        );

        let base = strategy::document_base(&nav.final_url);
        let scope = ExtractionScope {
            page: session.context()?,
            base: base.as_ref(),
            missing_element: self.config.missing_element,
            custom: self.custom.as_deref(),
        };

        // `buffered` keeps results in input order regardless of completion order.
        let observations: Vec<Observation> = stream::iter(monitors)
            .map(|monitor| self.observe(scope, monitor))
            .buffered(self.config.max_concurrent_extractions.max(1))
            .collect()
            .await;

        let detected_at = Utc::now();
        let records = monitors
            .iter()
            .zip(observations)
            .filter(|(monitor, observation)| {
                observation.error.is_some()
                    || !strategy::structurally_equal(&observation.current, &monitor.expected_value)
            })
            .map(|(monitor, observation)| {
                ChangeRecord::new(monitor, observation.current, detected_at)
                    .with_error(observation.error)
            })
            .collect();

        Ok(records)
    }

    /// Extract one monitor, folding failures into a stand-in value.
    async fn observe(&self, scope: ExtractionScope<'_>, monitor: &MonitorSpec) -> Observation {
        let deadline = self.config.extraction_timeout;
        let result = match tokio::time::timeout(deadline, strategy::extract(scope, monitor)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Extraction {
                selector: monitor.selector.clone(),
                reason: format!("evaluation exceeded {}ms", deadline.as_millis()),
            }),
        };

        match result {
            Ok(current) => Observation {
                current,
                error: None,
            },
            Err(e) => {
                warn!(
                    monitor = %monitor.monitor_id,
                    selector = %monitor.selector,
                    "extraction failed: {e}"
                );
                Observation {
                    current: strategy::missing_value(
                        monitor.comparison_type,
                        scope.missing_element,
                    ),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Check `url` with a one-off detector over `renderer`.
pub async fn check(
    renderer: Arc<dyn Renderer>,
    config: EngineConfig,
    url: &str,
    monitors: &[MonitorSpec],
) -> EngineResult<Vec<ChangeRecord>> {
    DifferenceDetector::new(renderer, config)
        .check(url, monitors)
        .await
}
