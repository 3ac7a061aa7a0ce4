//! # webvakt
//!
//! Change-detection engine for WebVakt. Given a page URL and a set of
//! monitors (selector, comparison type, expected value), it renders the page
//! once, extracts each monitor's current value and reports every monitor
//! whose value no longer matches.
//!
//! ```ignore
//! use std::sync::Arc;
//! use webvakt::{BrowserSettings, ChromiumRenderer, DifferenceDetector, EngineConfig};
//!
//! let renderer = Arc::new(ChromiumRenderer::new(BrowserSettings::from_env()));
//! let detector = DifferenceDetector::new(renderer, EngineConfig::from_env()?);
//! let changes = detector.check("https://example.com/", &monitors).await?;
//! ```
//!
//! The engine owns no persistence and no transport: monitors and expected
//! values come from the caller, and change records go back to it.

pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod renderer;
pub mod session;
pub mod strategy;

pub use config::{BrowserSettings, EngineConfig, MissingElementPolicy, NavigationOptions, WaitUntil};
pub use detector::{check, DifferenceDetector};
pub use error::{EngineError, EngineResult};
pub use model::{ChangeRecord, CheckRequest, ComparisonType, Identifier, MonitorSpec};
pub use renderer::chromium::ChromiumRenderer;
pub use renderer::fixture::FixtureRenderer;
pub use renderer::{ElementQuery, Extraction, NavigationResult, Probe, RenderContext, Renderer};
pub use session::PageSession;
pub use strategy::CustomExtractor;
