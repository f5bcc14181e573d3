//! Sampled broken-link checking.
//!
//! A bounded number of sitemap pages is visited and a bounded number of
//! same-origin links per page is probed with HEAD. Only a hard 404 or a
//! transport failure counts as broken. Page and link failures are recorded
//! or skipped locally so one bad page never stops the rest of the sample.

use crate::error::Result;
use crate::page::{Page, WaitUntil};
use crate::probe::{HttpProbe, ProbeOutcome};
use crate::result::BrokenLinkRecord;
use crate::sitemap::SitemapReader;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_MAX_PAGES_TO_CHECK: usize = 3;
pub const DEFAULT_MAX_LINKS_PER_PAGE: usize = 10;

const SKIPPED_PREFIXES: &[&str] = &["#", "mailto:", "tel:", "javascript:"];

#[derive(Debug, Clone)]
pub struct LinkCheckOptions {
    pub base_url: Url,
    pub max_pages_to_check: usize,
    pub max_links_per_page: usize,
    pub navigation_timeout: Duration,
}

impl LinkCheckOptions {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            max_pages_to_check: DEFAULT_MAX_PAGES_TO_CHECK,
            max_links_per_page: DEFAULT_MAX_LINKS_PER_PAGE,
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages_to_check = pages;
        self
    }

    pub fn with_max_links_per_page(mut self, links: usize) -> Self {
        self.max_links_per_page = links;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

/// Absolute URLs already probed during one check. Entries are only ever
/// added.
#[derive(Debug, Default, Clone)]
pub struct CheckedLinkRegistry {
    urls: HashSet<String>,
}

impl CheckedLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Returns `false` when the URL was already registered.
    pub fn register(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct LinkCheckReport {
    pub broken_links: Vec<BrokenLinkRecord>,
    pub pages_checked: Vec<String>,
    pub pages_skipped: Vec<String>,
    pub checked: CheckedLinkRegistry,
}

impl LinkCheckReport {
    pub fn is_clean(&self) -> bool {
        self.broken_links.is_empty()
    }
}

/// The first `cap` page URLs, in sitemap order.
pub fn sample_pages(urls: &[String], cap: usize) -> Vec<String> {
    urls.iter().take(cap).cloned().collect()
}

/// Drop fragment-only, `mailto:`, `tel:` and `javascript:` targets and keep
/// at most `cap` of the rest.
pub fn filter_hrefs(hrefs: Vec<String>, cap: usize) -> Vec<String> {
    hrefs
        .into_iter()
        .filter(|href| {
            let trimmed = href.trim();
            let lower = trimmed.to_ascii_lowercase();
            !trimmed.is_empty() && !SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
        .take(cap)
        .collect()
}

/// Resolve `href` against the base and keep it only when it shares the
/// base's origin.
pub fn resolve_same_origin(base: &Url, href: &str) -> Option<String> {
    let resolved = base.join(href.trim()).ok()?;
    if resolved.origin() == base.origin() {
        Some(resolved.to_string())
    } else {
        None
    }
}

pub struct LinkChecker<'a, P: Page + ?Sized> {
    page: &'a P,
    probe: &'a HttpProbe,
    options: LinkCheckOptions,
}

impl<'a, P: Page + ?Sized> LinkChecker<'a, P> {
    pub fn new(page: &'a P, probe: &'a HttpProbe, options: LinkCheckOptions) -> Self {
        Self {
            page,
            probe,
            options,
        }
    }

    /// Read the sitemap and check a sample of its pages. Sitemap errors are
    /// returned; everything after that is reported in the result.
    pub async fn check_sitemap(
        &self,
        reader: &SitemapReader,
        sitemap_url: &str,
    ) -> Result<LinkCheckReport> {
        let urls = reader.get_sitemap_urls(sitemap_url).await?;
        Ok(self.check_pages(&urls).await)
    }

    pub async fn check_pages(&self, page_urls: &[String]) -> LinkCheckReport {
        let sample = sample_pages(page_urls, self.options.max_pages_to_check);
        info!(
            "Checking links on {} of {} pages (up to {} links each)",
            sample.len(),
            page_urls.len(),
            self.options.max_links_per_page
        );

        let mut report = LinkCheckReport::default();
        for page_url in sample {
            self.check_page(&page_url, &mut report).await;
        }

        info!(
            "Link check complete: {} probed, {} broken",
            report.checked.len(),
            report.broken_links.len()
        );
        report
    }

    async fn check_page(&self, page_url: &str, report: &mut LinkCheckReport) {
        info!("Checking links on page: {}", page_url);

        match self
            .page
            .goto(page_url, WaitUntil::DomContentLoaded, self.options.navigation_timeout)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Failed to load page: {}", page_url);
                report.pages_skipped.push(page_url.to_string());
                return;
            }
            Err(e) => {
                warn!("Error processing page {}: {}", page_url, e);
                report.pages_skipped.push(page_url.to_string());
                return;
            }
        }

        let hrefs = match self.page.anchor_hrefs().await {
            Ok(hrefs) => hrefs,
            Err(e) => {
                warn!("Could not read links on {}: {}", page_url, e);
                report.pages_skipped.push(page_url.to_string());
                return;
            }
        };
        report.pages_checked.push(page_url.to_string());

        for href in filter_hrefs(hrefs, self.options.max_links_per_page) {
            let Some(absolute_url) = resolve_same_origin(&self.options.base_url, &href) else {
                debug!("  -> {} is external, skipping", href);
                continue;
            };
            if !report.checked.register(&absolute_url) {
                debug!("  -> {} already checked", absolute_url);
                continue;
            }

            match self.probe.head(&absolute_url).await {
                ProbeOutcome::Status(404) => {
                    report.broken_links.push(BrokenLinkRecord::not_found(
                        page_url.to_string(),
                        absolute_url,
                    ));
                }
                ProbeOutcome::Status(_) => {}
                ProbeOutcome::Failed(reason) => {
                    warn!("Error checking link {}: {}", absolute_url, reason);
                    report.broken_links.push(BrokenLinkRecord::transport_failure(
                        page_url.to_string(),
                        absolute_url,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_page::StaticPage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><head><title>t</title></head><body>{}</body></html>", body),
            "text/html",
        )
    }

    async fn mount_page(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html(body))
            .mount(server)
            .await;
    }

    async fn mount_head(server: &MockServer, route: &str, status: u16, expected: u64) {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn options(server: &MockServer) -> LinkCheckOptions {
        LinkCheckOptions::new(Url::parse(&server.uri()).unwrap())
            .with_navigation_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_filter_hrefs_skips_non_navigational_targets() {
        let hrefs = vec![
            "/pricing".to_string(),
            "#main".to_string(),
            "mailto:sales@example.com".to_string(),
            "tel:+15555550100".to_string(),
            "javascript:void(0)".to_string(),
            "JavaScript:alert(1)".to_string(),
            "".to_string(),
            "https://example.com/docs".to_string(),
        ];
        assert_eq!(
            filter_hrefs(hrefs, 10),
            vec!["/pricing", "https://example.com/docs"]
        );
    }

    #[test]
    fn test_filter_hrefs_truncates_after_filtering() {
        let hrefs: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
        let kept = filter_hrefs(hrefs, 10);
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[0], "/p0");
        assert_eq!(kept[9], "/p9");
    }

    #[test]
    fn test_resolve_same_origin() {
        let base = Url::parse("https://www.example.com").unwrap();
        assert_eq!(
            resolve_same_origin(&base, "/pricing").as_deref(),
            Some("https://www.example.com/pricing")
        );
        assert_eq!(
            resolve_same_origin(&base, "https://www.example.com/a?b=c").as_deref(),
            Some("https://www.example.com/a?b=c")
        );
        assert_eq!(resolve_same_origin(&base, "https://other.com/"), None);
        assert_eq!(resolve_same_origin(&base, "//cdn.example.com/x.js"), None);
        assert_eq!(resolve_same_origin(&base, "http://www.example.com/"), None);
    }

    #[test]
    fn test_sample_pages_caps_and_keeps_order() {
        let urls: Vec<String> = ["c", "a", "b", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(sample_pages(&urls, 3), vec!["c", "a", "b"]);
        assert_eq!(sample_pages(&urls, 10).len(), 4);
        assert!(sample_pages(&urls, 0).is_empty());
    }

    #[test]
    fn test_registry_never_forgets() {
        let mut registry = CheckedLinkRegistry::new();
        assert!(registry.register("https://example.com/a"));
        assert!(!registry.register("https://example.com/a"));
        assert!(registry.contains("https://example.com/a"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_only_404_is_broken() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/",
            r#"<a href="/ok">ok</a><a href="/moved">moved</a><a href="/error">error</a><a href="/missing">missing</a>"#,
        )
        .await;
        mount_head(&server, "/ok", 200, 1).await;
        mount_head(&server, "/moved", 301, 1).await;
        mount_head(&server, "/error", 500, 1).await;
        mount_head(&server, "/missing", 404, 1).await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let report = checker.check_pages(&[format!("{}/", server.uri())]).await;

        assert_eq!(report.broken_links.len(), 1);
        let record = &report.broken_links[0];
        assert_eq!(record.status, 404);
        assert_eq!(record.link, format!("{}/missing", server.uri()));
        assert_eq!(record.origin_page, format!("{}/", server.uri()));
    }

    #[tokio::test]
    async fn test_cross_origin_links_are_never_probed() {
        let server = MockServer::start().await;
        let external = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&external)
            .await;

        mount_page(
            &server,
            "/",
            &format!(r#"<a href="{}/missing">external</a>"#, external.uri()),
        )
        .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let report = checker.check_pages(&[format!("{}/", server.uri())]).await;
        assert!(report.is_clean());
        assert!(report.checked.is_empty());
    }

    #[tokio::test]
    async fn test_shared_link_is_probed_once() {
        let server = MockServer::start().await;
        mount_page(&server, "/one", r#"<a href="/shared">shared</a>"#).await;
        mount_page(&server, "/two", r#"<a href="/shared">shared again</a>"#).await;
        mount_head(&server, "/shared", 200, 1).await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let pages = vec![format!("{}/one", server.uri()), format!("{}/two", server.uri())];
        let report = checker.check_pages(&pages).await;

        assert!(report.is_clean());
        assert_eq!(report.checked.len(), 1);
        assert_eq!(report.pages_checked.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded_with_status_zero() {
        let server = MockServer::start().await;
        mount_page(&server, "/", r#"<a href="/slow">slow</a>"#).await;
        Mock::given(method("HEAD"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_millis(200)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let report = checker.check_pages(&[format!("{}/", server.uri())]).await;
        assert_eq!(report.broken_links.len(), 1);
        assert!(report.broken_links[0].is_transport_failure());
    }

    #[tokio::test]
    async fn test_page_cap_limits_visits() {
        let server = MockServer::start().await;
        for route in ["/a", "/b"] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(html("<p>no links</p>"))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/c"))
            .respond_with(html("<p>never visited</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server).with_max_pages(2));

        let pages: Vec<String> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let report = checker.check_pages(&pages).await;
        assert_eq!(report.pages_checked.len(), 2);
    }

    #[tokio::test]
    async fn test_link_cap_per_page() {
        let server = MockServer::start().await;
        let body: String = (0..5).map(|i| format!(r#"<a href="/l{}">l</a>"#, i)).collect();
        mount_page(&server, "/", &body).await;
        mount_head(&server, "/l0", 200, 1).await;
        mount_head(&server, "/l1", 200, 1).await;
        mount_head(&server, "/l2", 404, 0).await;
        mount_head(&server, "/l3", 404, 0).await;
        mount_head(&server, "/l4", 404, 0).await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server).with_max_links_per_page(2));

        let report = checker.check_pages(&[format!("{}/", server.uri())]).await;
        assert!(report.is_clean());
        assert_eq!(report.checked.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_page_is_skipped_not_recorded() {
        let server = MockServer::start().await;
        mount_page(&server, "/good", r#"<a href="/missing">missing</a>"#).await;
        mount_head(&server, "/missing", 404, 1).await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let pages = vec![
            "http://127.0.0.1:1/unreachable".to_string(),
            format!("{}/good", server.uri()),
        ];
        let report = checker.check_pages(&pages).await;

        assert_eq!(report.pages_skipped, vec!["http://127.0.0.1:1/unreachable"]);
        assert_eq!(report.broken_links.len(), 1);
        assert_eq!(report.broken_links[0].origin_page, format!("{}/good", server.uri()));
    }

    #[tokio::test]
    async fn test_check_sitemap_propagates_sitemap_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let reader = SitemapReader::new(Duration::from_secs(5)).unwrap();
        let checker = LinkChecker::new(&page, &probe, options(&server));

        let result = checker
            .check_sitemap(&reader, &format!("{}/sitemap.xml", server.uri()))
            .await;
        assert!(matches!(
            result,
            Err(crate::error::ScanError::Sitemap(crate::error::SitemapError::Fetch { status: 404, .. }))
        ));
    }
}
