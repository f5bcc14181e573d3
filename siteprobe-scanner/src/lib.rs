pub mod browser;
pub mod error;
pub mod form;
pub mod http;
pub mod links;
pub mod page;
pub mod probe;
pub mod result;
pub mod sitemap;
pub mod static_page;
pub mod wait;

pub use browser::{BrowserOptions, BrowserPage, BrowserSession};
pub use error::{Result, ScanError, SitemapError};
pub use form::{FormPhase, FormSelectors, FormTimeouts, LeadForm, SubmitSignal};
pub use links::{CheckedLinkRegistry, LinkCheckOptions, LinkCheckReport, LinkChecker};
pub use page::{ElementHandle, Locator, NavigationResponse, Page, WaitUntil};
pub use probe::{HttpProbe, ProbeOutcome};
pub use result::{BrokenLinkRecord, FormValidationOutcome};
pub use sitemap::{SitemapEntry, SitemapReader};
pub use static_page::StaticPage;
