//! Acceptance scenarios and the suite runner.
//!
//! A scenario collects failures instead of stopping at the first one, so the
//! outcome lists every offending page, link or expectation.

use crate::config::SuiteConfig;
use crate::fixtures::{SPECIAL_CHARACTER_EMAIL, VALID_EMAILS};
use futures::StreamExt;
use serde::{Deserialize, Serialize, Serializer};
use siteprobe_scanner::http::build_client;
use siteprobe_scanner::{
    BrowserSession, HttpProbe, LeadForm, LinkChecker, Locator, Page, SitemapReader, WaitUntil,
    wait::wait_for_visible,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    SitemapWellFormed,
    ImportantPagesListed,
    SitemapSampleAccessible,
    NoBrokenLinks,
    LeadFormVisible,
    LeadFormEmailAttributes,
    LeadFormValidatesFormat,
    LeadFormRejectsEmpty,
    LeadFormAcceptsSpecialCharacters,
}

impl Scenario {
    pub const ALL: [Scenario; 9] = [
        Scenario::SitemapWellFormed,
        Scenario::ImportantPagesListed,
        Scenario::SitemapSampleAccessible,
        Scenario::NoBrokenLinks,
        Scenario::LeadFormVisible,
        Scenario::LeadFormEmailAttributes,
        Scenario::LeadFormValidatesFormat,
        Scenario::LeadFormRejectsEmpty,
        Scenario::LeadFormAcceptsSpecialCharacters,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::SitemapWellFormed => "sitemap-well-formed",
            Scenario::ImportantPagesListed => "important-pages-listed",
            Scenario::SitemapSampleAccessible => "sitemap-sample-accessible",
            Scenario::NoBrokenLinks => "no-broken-links",
            Scenario::LeadFormVisible => "lead-form-visible",
            Scenario::LeadFormEmailAttributes => "lead-form-email-attributes",
            Scenario::LeadFormValidatesFormat => "lead-form-validates-format",
            Scenario::LeadFormRejectsEmpty => "lead-form-rejects-empty",
            Scenario::LeadFormAcceptsSpecialCharacters => "lead-form-accepts-special-characters",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::SitemapWellFormed => "sitemap.xml exists and is valid XML",
            Scenario::ImportantPagesListed => "important pages are included in the sitemap",
            Scenario::SitemapSampleAccessible => "a sample of sitemap URLs load with a title and description",
            Scenario::NoBrokenLinks => "a sample of same-site links are not broken",
            Scenario::LeadFormVisible => "the newsletter form is present and visible",
            Scenario::LeadFormEmailAttributes => "the email input has the email type and is visible",
            Scenario::LeadFormValidatesFormat => "the form rejects a malformed address and accepts a valid one",
            Scenario::LeadFormRejectsEmpty => "the form rejects an empty submission",
            Scenario::LeadFormAcceptsSpecialCharacters => "the form accepts plus and dot in the address",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub failures: Vec<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Called as each scenario finishes.
pub type ScenarioCallback = Arc<dyn Fn(&ScenarioOutcome) + Send + Sync>;

/// Run `scenarios` in a headless browser, one tab per scenario.
///
/// Fails only when the browser cannot be started; scenario failures are
/// reported in the outcomes.
pub async fn run_suite(
    config: &SuiteConfig,
    scenarios: &[Scenario],
    on_complete: Option<ScenarioCallback>,
) -> siteprobe_scanner::Result<Vec<ScenarioOutcome>> {
    let mut session = BrowserSession::launch(&config.browser, config.timeouts.navigation).await?;
    let outcomes = run_suite_with(config, scenarios, on_complete, || session.new_page()).await;
    if let Err(e) = session.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }
    Ok(outcomes)
}

/// Run `scenarios` with at most `config.workers` in flight. Every scenario
/// gets its own page from `new_page`; outcomes come back in input order.
pub async fn run_suite_with<P, F, Fut>(
    config: &SuiteConfig,
    scenarios: &[Scenario],
    on_complete: Option<ScenarioCallback>,
    new_page: F,
) -> Vec<ScenarioOutcome>
where
    P: Page,
    F: Fn() -> Fut,
    Fut: Future<Output = siteprobe_scanner::Result<P>>,
{
    let workers = config.workers.max(1);
    info!("Running {} scenarios with {} workers", scenarios.len(), workers);

    futures::stream::iter(scenarios.iter().copied())
        .map(|scenario| {
            let page = new_page();
            let on_complete = on_complete.clone();
            async move {
                let started = Instant::now();
                let failures = match page.await {
                    Ok(page) => {
                        let failures = run_bounded(scenario, config, &page).await;
                        if let Err(e) = page.close().await {
                            warn!("Could not close page for {}: {}", scenario, e);
                        }
                        failures
                    }
                    Err(e) => vec![format!("Could not create page: {}", e)],
                };
                let outcome = ScenarioOutcome {
                    scenario,
                    failures,
                    elapsed: started.elapsed(),
                };
                if let Some(callback) = on_complete {
                    callback(&outcome);
                }
                outcome
            }
        })
        .buffered(workers)
        .collect()
        .await
}

async fn run_bounded<P: Page + ?Sized>(
    scenario: Scenario,
    config: &SuiteConfig,
    page: &P,
) -> Vec<String> {
    let budget = config.timeouts.scenario;
    match tokio::time::timeout(budget, run_scenario(scenario, config, page)).await {
        Ok(failures) => failures,
        Err(_) => {
            warn!("Scenario {} exceeded {:?}", scenario, budget);
            vec![format!("Scenario timed out after {:?}", budget)]
        }
    }
}

/// Run one scenario and return its failures.
pub async fn run_scenario<P: Page + ?Sized>(
    scenario: Scenario,
    config: &SuiteConfig,
    page: &P,
) -> Vec<String> {
    info!("Scenario: {}", scenario);
    match scenario {
        Scenario::SitemapWellFormed => check_sitemap_well_formed(config).await,
        Scenario::ImportantPagesListed => check_important_pages(config).await,
        Scenario::SitemapSampleAccessible => check_sitemap_sample(config, page).await,
        Scenario::NoBrokenLinks => check_broken_links(config, page).await,
        Scenario::LeadFormVisible => check_form_visible(config, page).await,
        Scenario::LeadFormEmailAttributes => check_email_attributes(config, page).await,
        Scenario::LeadFormValidatesFormat => check_validates_format(config, page).await,
        Scenario::LeadFormRejectsEmpty => {
            check_submission(config, page, "", false, "Should reject empty email").await
        }
        Scenario::LeadFormAcceptsSpecialCharacters => {
            check_submission(
                config,
                page,
                SPECIAL_CHARACTER_EMAIL,
                true,
                "Should accept email with special characters",
            )
            .await
        }
    }
}

fn sitemap_reader(config: &SuiteConfig) -> Result<SitemapReader, String> {
    SitemapReader::new(config.timeouts.navigation).map_err(|e| format!("Could not build HTTP client: {}", e))
}

async fn sitemap_urls(config: &SuiteConfig) -> Result<Vec<String>, String> {
    let reader = sitemap_reader(config)?;
    reader
        .get_sitemap_urls(&config.sitemap_url())
        .await
        .map_err(|e| e.to_string())
}

pub async fn check_sitemap_well_formed(config: &SuiteConfig) -> Vec<String> {
    let sitemap_url = config.sitemap_url();
    let client = match build_client(config.timeouts.navigation) {
        Ok(client) => client,
        Err(e) => return vec![format!("Could not build HTTP client: {}", e)],
    };

    let response = match client.get(&sitemap_url).send().await {
        Ok(response) => response,
        Err(e) => return vec![format!("Failed to fetch {}: {}", sitemap_url, e)],
    };

    let mut failures = Vec::new();
    let status = response.status().as_u16();
    if status != 200 {
        failures.push(format!("Expected status 200 for {}, got {}", sitemap_url, status));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    match content_type {
        Some(ref ct) if ct.to_ascii_lowercase().contains("xml") => {}
        Some(ct) => failures.push(format!("Content type '{}' is not XML", ct)),
        None => failures.push("Response has no content type".to_string()),
    }

    match response.text().await {
        Ok(body) => {
            if !body.contains("<?xml") {
                failures.push("Body is missing the <?xml declaration".to_string());
            }
            if !body.contains("<urlset") {
                failures.push("Body is missing a <urlset> element".to_string());
            }
        }
        Err(e) => failures.push(format!("Failed to read sitemap body: {}", e)),
    }
    failures
}

pub async fn check_important_pages(config: &SuiteConfig) -> Vec<String> {
    let urls = match sitemap_urls(config).await {
        Ok(urls) => urls,
        Err(e) => return vec![e],
    };
    let lowered: Vec<String> = urls.iter().map(|u| u.to_lowercase()).collect();

    config
        .important_paths
        .iter()
        .map(|path| config.page_url(path))
        .filter(|full_url| {
            let prefix = full_url.to_lowercase();
            !lowered.iter().any(|u| u.starts_with(&prefix))
        })
        .map(|full_url| format!("Important page {} not found in sitemap", full_url))
        .collect()
}

pub async fn check_sitemap_sample<P: Page + ?Sized>(config: &SuiteConfig, page: &P) -> Vec<String> {
    let urls = match sitemap_urls(config).await {
        Ok(urls) => urls,
        Err(e) => return vec![e],
    };

    let mut issues = Vec::new();
    for url in urls.iter().take(config.max_urls_to_check) {
        for issue in page_issues(page, url, config.timeouts.navigation).await {
            issues.push(format!("{}: {}", url, issue));
        }
    }
    issues
}

async fn page_issues<P: Page + ?Sized>(page: &P, url: &str, timeout: Duration) -> Vec<String> {
    let response = match page.goto(url, WaitUntil::DomContentLoaded, timeout).await {
        Ok(Some(response)) => response,
        Ok(None) => return vec!["No response received".to_string()],
        Err(e) => return vec![format!("Error: {}", e)],
    };

    match response.status {
        200 => {}
        404 => return vec!["404 Not Found".to_string()],
        status => return vec![format!("Unexpected status: {}", status)],
    }

    let mut issues = Vec::new();
    match page.title().await {
        Ok(Some(title)) if !title.trim().is_empty() => {}
        Ok(_) => issues.push("Missing page title".to_string()),
        Err(e) => return vec![format!("Error: {}", e)],
    }
    match page.count(&Locator::css(r#"meta[name="description"]"#)).await {
        Ok(0) => issues.push("Missing meta description".to_string()),
        Ok(_) => {}
        Err(e) => issues.push(format!("Error: {}", e)),
    }
    issues
}

pub async fn check_broken_links<P: Page + ?Sized>(config: &SuiteConfig, page: &P) -> Vec<String> {
    let options = match config.link_check_options() {
        Ok(options) => options,
        Err(e) => return vec![e.to_string()],
    };
    let reader = match sitemap_reader(config) {
        Ok(reader) => reader,
        Err(e) => return vec![e],
    };
    let probe = match HttpProbe::new(config.timeouts.probe) {
        Ok(probe) => probe,
        Err(e) => return vec![format!("Could not build HTTP client: {}", e)],
    };

    let checker = LinkChecker::new(page, &probe, options);
    match checker.check_sitemap(&reader, &config.sitemap_url()).await {
        Ok(report) => report
            .broken_links
            .iter()
            .map(|record| format!("Broken link: {}", record))
            .collect(),
        Err(e) => vec![e.to_string()],
    }
}

async fn open_form<'a, P: Page + ?Sized>(
    config: &SuiteConfig,
    page: &'a P,
) -> Result<LeadForm<'a, P>, String> {
    let mut form = LeadForm::with_options(
        page,
        config.form_url(),
        Default::default(),
        config.form_timeouts(),
    );
    form.goto()
        .await
        .map_err(|e| format!("Failed to load form page: {}", e))?;
    Ok(form)
}

pub async fn check_form_visible<P: Page + ?Sized>(config: &SuiteConfig, page: &P) -> Vec<String> {
    let mut form = match open_form(config, page).await {
        Ok(form) => form,
        Err(e) => return vec![e],
    };
    if form.wait_for_form_ready().await {
        Vec::new()
    } else {
        vec!["Newsletter form should be visible".to_string()]
    }
}

pub async fn check_email_attributes<P: Page + ?Sized>(config: &SuiteConfig, page: &P) -> Vec<String> {
    let mut form = match open_form(config, page).await {
        Ok(form) => form,
        Err(e) => return vec![e],
    };
    form.wait_for_form_ready().await;

    let selectors = form.selectors().clone();
    let mut failures = Vec::new();

    match page.query_first(&selectors.email_input).await {
        Ok(Some(input)) => match page.attribute(&input, "type").await {
            Ok(Some(kind)) if kind.eq_ignore_ascii_case("email") => {}
            Ok(kind) => failures.push(format!(
                "Email input type is {:?}, expected \"email\"",
                kind.unwrap_or_default()
            )),
            Err(e) => failures.push(format!("Error: {}", e)),
        },
        Ok(None) => failures.push("Email input not found".to_string()),
        Err(e) => failures.push(format!("Error: {}", e)),
    }

    let t = config.timeouts;
    for (what, locator) in [("Email input", &selectors.email_input), ("Submit control", &selectors.submit)] {
        match wait_for_visible(page, locator, t.assertion, t.poll_interval).await {
            Ok(true) => {}
            Ok(false) => failures.push(format!("{} is not visible", what)),
            Err(e) => failures.push(format!("Error: {}", e)),
        }
    }
    failures
}

pub async fn check_validates_format<P: Page + ?Sized>(config: &SuiteConfig, page: &P) -> Vec<String> {
    let mut failures = check_submission(config, page, "invalid-email", false, "Should reject invalid email").await;

    // Reload for a clean form before the valid address.
    failures.extend(
        check_submission(config, page, VALID_EMAILS[0], true, "Should accept valid email").await,
    );
    failures
}

/// Load the form, submit `email` and compare the derived validity.
pub async fn check_submission<P: Page + ?Sized>(
    config: &SuiteConfig,
    page: &P,
    email: &str,
    expect_valid: bool,
    expectation: &str,
) -> Vec<String> {
    let mut form = match open_form(config, page).await {
        Ok(form) => form,
        Err(e) => return vec![e],
    };
    if let Err(e) = form.fill_form(email).await {
        return vec![format!("Submitting {:?} failed: {}", email, e)];
    }

    let outcome = form.form_validation_state().await;
    if outcome.is_valid == expect_valid {
        return Vec::new();
    }
    match outcome.message {
        Some(message) => vec![format!("{} ({:?}): {}", expectation, email, message)],
        None => vec![format!("{} ({:?})", expectation, email)],
    }
}
