//! Engine settings, loadable from `WEBVAKT_*` environment variables.

use crate::error::{EngineError, EngineResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_NETWORK_IDLE_MS: u64 = 500;
pub const DEFAULT_EXTRACTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_CONCURRENT_EXTRACTIONS: usize = 8;

/// When a freshly navigated page counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The load event has fired.
    Load,
    /// The load event has fired and no new network requests were started
    /// for the idle window.
    #[default]
    NetworkIdle,
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "networkidle" | "networkidle0" | "network-idle" => Ok(Self::NetworkIdle),
            other => Err(format!("expected `load` or `networkidle`, got {other:?}")),
        }
    }
}

/// Value reported for a monitor whose selector matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingElementPolicy {
    /// `text` reports `null`; every other type reports `{}`.
    #[default]
    PerType,
    /// Every type reports `null`.
    Absent,
}

impl FromStr for MissingElementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-type" | "pertype" => Ok(Self::PerType),
            "absent" | "null" => Ok(Self::Absent),
            other => Err(format!("expected `per-type` or `absent`, got {other:?}")),
        }
    }
}

/// How to navigate and when to give up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOptions {
    pub wait_until: WaitUntil,
    /// Deadline covering load and settle together.
    pub timeout: Duration,
    /// Quiet period required by [`WaitUntil::NetworkIdle`].
    pub idle_window: Duration,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::default(),
            timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            idle_window: Duration::from_millis(DEFAULT_NETWORK_IDLE_MS),
        }
    }
}

/// Settings for one [`DifferenceDetector`](crate::detector::DifferenceDetector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub navigation: NavigationOptions,
    /// Deadline for a single monitor's evaluation.
    pub extraction_timeout: Duration,
    /// Upper bound on evaluations in flight against one page.
    pub max_concurrent_extractions: usize,
    pub missing_element: MissingElementPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            navigation: NavigationOptions::default(),
            extraction_timeout: Duration::from_millis(DEFAULT_EXTRACTION_TIMEOUT_MS),
            max_concurrent_extractions: DEFAULT_MAX_CONCURRENT_EXTRACTIONS,
            missing_element: MissingElementPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load settings from the process environment, falling back to defaults.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_setting::<WaitUntil>(&lookup, "WEBVAKT_WAIT_UNTIL")? {
            config.navigation.wait_until = v;
        }
        if let Some(ms) = parse_setting::<u64>(&lookup, "WEBVAKT_NAVIGATION_TIMEOUT_MS")? {
            config.navigation.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_setting::<u64>(&lookup, "WEBVAKT_NETWORK_IDLE_MS")? {
            config.navigation.idle_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_setting::<u64>(&lookup, "WEBVAKT_EXTRACTION_TIMEOUT_MS")? {
            config.extraction_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_setting::<usize>(&lookup, "WEBVAKT_MAX_CONCURRENT_EXTRACTIONS")? {
            if n == 0 {
                return Err(EngineError::Config {
                    key: "WEBVAKT_MAX_CONCURRENT_EXTRACTIONS".into(),
                    reason: "must be at least 1".into(),
                });
            }
            config.max_concurrent_extractions = n;
        }
        if let Some(p) = parse_setting::<MissingElementPolicy>(&lookup, "WEBVAKT_MISSING_ELEMENT")? {
            config.missing_element = p;
        }

        Ok(config)
    }
}

/// Settings for launching the Chromium backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Explicit executable; `None` lets the backend detect one.
    pub chromium_path: Option<PathBuf>,
    /// Pass `--no-sandbox` (needed in most containers).
    pub no_sandbox: bool,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            no_sandbox: false,
            headless: true,
        }
    }
}

impl BrowserSettings {
    /// Resolve the executable and sandbox flag from the environment.
    pub fn from_env() -> Self {
        Self {
            chromium_path: find_chromium(),
            no_sandbox: std::env::var("WEBVAKT_CHROMIUM_NO_SANDBOX").is_ok(),
            headless: true,
        }
    }
}

/// Directory for WebVakt's local state, `$WEBVAKT_HOME` or `~/.webvakt`.
pub fn webvakt_home() -> PathBuf {
    if let Ok(p) = std::env::var("WEBVAKT_HOME") {
        return PathBuf::from(p);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".webvakt")
}

/// Find a Chromium binary by checking multiple locations.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. Explicit override
    if let Ok(p) = std::env::var("WEBVAKT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. A browser installed under ~/.webvakt/chromium/
    let home = webvakt_home();
    let candidates = if cfg!(target_os = "macos") {
        vec![
            home.join("chromium/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            home.join("chromium/chrome"),
        ]
    } else {
        vec![
            home.join("chromium/chrome"),
            home.join("chromium/chrome-linux64/chrome"),
        ]
    };
    if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
        return Some(found);
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

fn parse_setting<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> EngineResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| EngineError::Config {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}
