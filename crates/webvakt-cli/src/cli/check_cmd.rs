//! `webvakt check`: run one check request and print the change envelope.

use crate::cli::output::{self, CheckResponse, OutputMode, Styled};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use webvakt::{
    BrowserSettings, CheckRequest, ChromiumRenderer, DifferenceDetector, EngineConfig,
    FixtureRenderer, MissingElementPolicy, Renderer, WaitUntil,
};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Request envelope `{"WebsiteURL", "Monitors"}` as a file, or `-` for stdin.
    #[arg(long, short, conflicts_with_all = ["url", "monitors"])]
    pub request: Option<String>,

    /// Page to check (use together with --monitors).
    #[arg(long, requires = "monitors")]
    pub url: Option<String>,

    /// JSON file holding the monitor array for --url.
    #[arg(long, requires = "url")]
    pub monitors: Option<PathBuf>,

    /// Settle condition: `load` or `networkidle`.
    #[arg(long)]
    pub wait_until: Option<WaitUntil>,

    /// Navigation deadline in milliseconds.
    #[arg(long)]
    pub navigation_timeout_ms: Option<u64>,

    /// Per-monitor extraction deadline in milliseconds.
    #[arg(long)]
    pub extraction_timeout_ms: Option<u64>,

    /// Extractions run concurrently against the page.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Value for missing elements: `per-type` or `absent`.
    #[arg(long)]
    pub missing_element: Option<MissingElementPolicy>,

    /// Chromium executable to launch.
    #[arg(long)]
    pub chromium_path: Option<PathBuf>,

    /// Launch Chromium with --no-sandbox.
    #[arg(long)]
    pub no_sandbox: bool,

    /// Show the browser window.
    #[arg(long)]
    pub headed: bool,

    /// Serve this HTML file as the page instead of launching a browser.
    #[arg(long)]
    pub fixture_html: Option<PathBuf>,
}

pub async fn run(args: CheckArgs, mode: OutputMode) -> Result<()> {
    let request = load_request(&args)?;
    let config = engine_config(&args)?;
    let renderer = build_renderer(&args, &request.website_url)?;

    tracing::debug!(
        url = %request.website_url,
        monitors = request.monitors.len(),
        "running check"
    );

    let detector = DifferenceDetector::new(renderer, config);
    let changes = detector
        .check(&request.website_url, &request.monitors)
        .await?;

    output::print_json(&CheckResponse::new(&changes));
    if !mode.quiet {
        output::print_change_summary(&Styled::new(), &request.website_url, &changes);
    }
    Ok(())
}

/// Read the request from `--request` or assemble it from `--url`/`--monitors`.
fn load_request(args: &CheckArgs) -> Result<CheckRequest> {
    if let (Some(url), Some(monitors)) = (&args.url, &args.monitors) {
        let monitors: Value = serde_json::from_str(&read_source(monitors)?)
            .with_context(|| format!("parsing monitors from {}", monitors.display()))?;
        let envelope = serde_json::json!({ "WebsiteURL": url, "Monitors": monitors });
        return Ok(CheckRequest::from_value(envelope)?);
    }

    let source = args.request.as_deref().unwrap_or("-");
    let text = read_source(Path::new(source))?;
    if text.trim().is_empty() {
        bail!("empty check request");
    }
    Ok(CheckRequest::from_json(&text)?)
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading request from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Environment settings first, then command-line overrides.
fn engine_config(args: &CheckArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;
    if let Some(wait_until) = args.wait_until {
        config.navigation.wait_until = wait_until;
    }
    if let Some(ms) = args.navigation_timeout_ms {
        config.navigation.timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.extraction_timeout_ms {
        config.extraction_timeout = Duration::from_millis(ms);
    }
    if let Some(n) = args.max_concurrent {
        if n == 0 {
            bail!("--max-concurrent must be at least 1");
        }
        config.max_concurrent_extractions = n;
    }
    if let Some(policy) = args.missing_element {
        config.missing_element = policy;
    }
    Ok(config)
}

fn build_renderer(args: &CheckArgs, url: &str) -> Result<Arc<dyn Renderer>> {
    if let Some(path) = &args.fixture_html {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        return Ok(Arc::new(FixtureRenderer::new().with_page(url, html)));
    }

    let mut settings = BrowserSettings::from_env();
    if let Some(path) = &args.chromium_path {
        settings.chromium_path = Some(path.clone());
    }
    settings.no_sandbox |= args.no_sandbox;
    settings.headless = !args.headed;
    Ok(Arc::new(ChromiumRenderer::new(settings)))
}
