use thiserror::Error;

/// Failures while reading a sitemap. These always reach the caller: a broken
/// sitemap invalidates every scenario built on top of it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SitemapError {
    #[error("Failed to fetch sitemap: {status} {reason}")]
    Fetch { status: u16, reason: String },

    #[error("Invalid content type: {}", .0.as_deref().unwrap_or("none"))]
    ContentType(Option<String>),

    #[error("Invalid sitemap format: {0}")]
    Format(String),

    #[error("Failed to parse sitemap: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Sitemap(#[from] SitemapError),

    #[error("Form is not ready or visible")]
    FormNotReady,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element handle no longer belongs to the loaded document")]
    StaleElement,

    #[error("Browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("Could not launch browser: {0}")]
    BrowserLaunch(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
