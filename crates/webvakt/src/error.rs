//! Error types for the detection engine.

/// Errors that can occur while checking a page.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The target URL could not be parsed.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The page failed to load.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The page loaded but never reached its settle condition.
    #[error("navigation to {url} did not settle within {timeout_ms}ms")]
    SettleTimeout { url: String, timeout_ms: u64 },

    /// Evaluating one monitor's selector threw inside the page.
    #[error("extraction for selector {selector:?} failed: {reason}")]
    Extraction { selector: String, reason: String },

    /// A monitor names a comparison type outside the supported set.
    #[error("monitor {monitor}: unsupported comparison type {kind:?}")]
    UnsupportedComparisonType { monitor: String, kind: String },

    /// Launching or driving the browser failed.
    #[error("browser error: {0}")]
    Browser(String),

    /// The page session was already released.
    #[error("page session already closed")]
    SessionClosed,

    /// The request envelope is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An environment setting could not be parsed.
    #[error("invalid setting {key}: {reason}")]
    Config { key: String, reason: String },
}

impl EngineError {
    /// Whether this error belongs to the navigation family
    /// (load failure or missed settle deadline).
    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::SettleTimeout { .. })
    }

    /// Whether this error aborts a whole check run.
    ///
    /// Only extraction failures are recoverable; they are scoped to a
    /// single monitor.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Extraction { .. })
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_family() {
        let nav = EngineError::Navigation {
            url: "https://example.com".into(),
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        };
        let timeout = EngineError::SettleTimeout {
            url: "https://example.com".into(),
            timeout_ms: 100,
        };
        assert!(nav.is_navigation());
        assert!(timeout.is_navigation());
        assert!(!EngineError::SessionClosed.is_navigation());
    }

    #[test]
    fn test_only_extraction_is_recoverable() {
        let extraction = EngineError::Extraction {
            selector: "p[".into(),
            reason: "syntax error".into(),
        };
        assert!(!extraction.is_fatal());
        assert!(EngineError::Browser("crashed".into()).is_fatal());
        assert!(EngineError::UnsupportedComparisonType {
            monitor: "7".into(),
            kind: "pixel".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_display() {
        let err = EngineError::SettleTimeout {
            url: "https://example.com".into(),
            timeout_ms: 250,
        };
        assert_eq!(
            err.to_string(),
            "navigation to https://example.com did not settle within 250ms"
        );
    }
}
