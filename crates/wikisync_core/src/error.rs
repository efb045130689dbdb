//! Item-level error taxonomy for the sync pipeline.
//!
//! Parse, translation and remote-call failures are caught per document and
//! turned into report entries. Category resolution and root discovery
//! failures abort the run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The document could not be read or has no usable title.
    #[error("parse failure for {path}: {reason}")]
    Parse { path: String, reason: String },

    /// Translation produced no content blocks.
    #[error("no content blocks produced for {title}")]
    TranslationEmpty { title: String },

    /// A remote store call failed (authorization, validation, rate limit, network).
    #[error("remote call failed for {title}: {message}")]
    RemoteCall { title: String, message: String },

    /// A category parent page could not be found or created.
    #[error("category resolution failed for {category}: {message}")]
    CategoryResolution { category: String, message: String },

    /// No root page is reachable for the integration.
    #[error("root page discovery failed: {0}")]
    RootDiscovery(String),
}

impl SyncError {
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn remote(title: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::RemoteCall {
            title: title.into(),
            message: format!("{error:#}"),
        }
    }

    /// Short tag used in reports and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_failure",
            Self::TranslationEmpty { .. } => "translation_empty",
            Self::RemoteCall { .. } => "remote_call_failure",
            Self::CategoryResolution { .. } => "category_resolution_failure",
            Self::RootDiscovery(_) => "root_discovery_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncError;

    #[test]
    fn remote_error_keeps_context_chain() {
        let error = anyhow::anyhow!("HTTP 429").context("append children failed");
        let converted = SyncError::remote("Auth Guide", &error);
        assert_eq!(converted.kind(), "remote_call_failure");
        assert!(converted.to_string().contains("append children failed: HTTP 429"));
    }

    #[test]
    fn parse_error_names_path() {
        let error = SyncError::parse("backend/auth.html", "missing title");
        assert_eq!(
            error.to_string(),
            "parse failure for backend/auth.html: missing title"
        );
    }
}
