//! Page-driver abstraction.
//!
//! Everything the link checker and the form page object need from a browser
//! goes through [`Page`]. Elements are described by [`Locator`]s and resolved
//! to an [`ElementHandle`] on every operation, so a locator stays valid across
//! navigations while a handle does not.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// How far a navigation must progress before `goto` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The document has been parsed; subresources and background traffic are
    /// not awaited.
    #[default]
    DomContentLoaded,
    Load,
}

/// Response of the main document of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
}

/// Structural description of the element(s) to find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector; the first match in document order.
    Css(String),
    /// Case-insensitive regular expression over an element's own text.
    Text(String),
    /// First `outer` element that has a descendant matching `inner`.
    Containing { outer: String, inner: String },
    /// Matches of `inner` inside the first element matched by `scope`.
    Within {
        scope: Box<Locator>,
        inner: Box<Locator>,
    },
    /// Prioritised alternatives: the first pattern with a hit wins, even when
    /// a later pattern matches earlier in the document.
    AnyOf(Vec<Locator>),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Self::Text(pattern.into())
    }

    pub fn containing(outer: impl Into<String>, inner: impl Into<String>) -> Self {
        Self::Containing {
            outer: outer.into(),
            inner: inner.into(),
        }
    }

    pub fn within(scope: Locator, inner: Locator) -> Self {
        Self::Within {
            scope: Box::new(scope),
            inner: Box::new(inner),
        }
    }

    pub fn any_of(locators: impl IntoIterator<Item = Locator>) -> Self {
        Self::AnyOf(locators.into_iter().collect())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{}", css),
            Locator::Text(pattern) => write!(f, "text=/{}/i", pattern),
            Locator::Containing { outer, inner } => write!(f, "{}:has({})", outer, inner),
            Locator::Within { scope, inner } => write!(f, "{} >> {}", scope, inner),
            Locator::AnyOf(locators) => {
                let parts: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}

/// Opaque reference to an element of one loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementHandle {
    pub(crate) document: u64,
    pub(crate) index: usize,
}

impl ElementHandle {
    pub fn new(document: u64, index: usize) -> Self {
        Self { document, index }
    }

    pub fn document(&self) -> u64 {
        self.document
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to `url`. `Ok(None)` means the navigation produced no
    /// response for the main document.
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<NavigationResponse>>;

    async fn current_url(&self) -> Option<String>;

    async fn title(&self) -> Result<Option<String>>;

    /// Raw `href` attribute values of every `a[href]`, in document order.
    async fn anchor_hrefs(&self) -> Result<Vec<String>>;

    async fn query_first(&self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn count(&self, locator: &Locator) -> Result<usize>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool>;

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()>;

    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<()>;

    /// The element's native constraint-validation result.
    async fn check_validity(&self, element: &ElementHandle) -> Result<bool>;

    /// Release the page. Drivers without resources to free keep the default.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the first element matching `locator` is visible; `false` when
    /// nothing matches.
    async fn is_locator_visible(&self, locator: &Locator) -> Result<bool> {
        match self.query_first(locator).await? {
            Some(element) => self.is_visible(&element).await,
            None => Ok(false),
        }
    }
}
