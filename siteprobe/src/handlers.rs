use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use siteprobe_core::config::{ConfigError, ConfigOverrides, SuiteConfig};
use siteprobe_core::fixtures::generate_test_email;
use siteprobe_core::report::{ReportFormat, SuiteReport, save_report};
use siteprobe_core::scenario::{Scenario, ScenarioCallback, ScenarioOutcome, run_suite};
use siteprobe_scanner::{
    BrokenLinkRecord, BrowserSession, HttpProbe, LeadForm, LinkChecker, Page, SitemapReader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Exit code for a run whose checks failed.
pub const EXIT_FAILED: i32 = 1;
/// Exit code for bad configuration or arguments.
pub const EXIT_USAGE: i32 = 2;

const DEFAULT_LOG_FILTER: &str = "siteprobe=info,siteprobe_core=info,siteprobe_scanner=info";
const VERBOSE_LOG_FILTER: &str = "siteprobe=debug,siteprobe_core=debug,siteprobe_scanner=debug";
const QUIET_LOG_FILTER: &str = "warn";

pub fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        VERBOSE_LOG_FILTER
    } else if quiet {
        QUIET_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Map a handler error to a process exit code.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
        EXIT_USAGE
    } else {
        EXIT_FAILED
    }
}

/// Command-line values that take precedence over the config file.
pub fn overrides_from_args(args: &ArgMatches) -> ConfigOverrides {
    ConfigOverrides {
        base_url: args.get_one::<Url>("url").map(|u| u.to_string()),
        max_pages_to_check: args.get_one::<usize>("max-pages").copied(),
        max_links_per_page: args.get_one::<usize>("max-links").copied(),
        max_urls_to_check: args.get_one::<usize>("max-urls").copied(),
        workers: args.try_get_one::<usize>("workers").ok().flatten().copied(),
        headed: args.get_flag("headed"),
        browser_executable: args.get_one::<PathBuf>("chrome").cloned(),
    }
}

/// Defaults, then the config file, then command-line values.
pub fn resolve_config(args: &ArgMatches) -> Result<SuiteConfig> {
    let explicit = args
        .get_one::<String>("config")
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()));
    let mut config = SuiteConfig::load_or_default(explicit.as_deref())?;
    config.apply(&overrides_from_args(args));
    config.validate()?;
    debug!("Resolved config: {:?}", config);
    Ok(config)
}

/// Scenarios named on the command line, in suite order; all of them when
/// none are named.
pub fn parse_scenarios<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<Scenario>> {
    let mut selected = Vec::new();
    for name in names {
        let scenario = Scenario::from_name(name).ok_or_else(|| ConfigError::InvalidValue {
            field: "scenario",
            reason: format!("unknown scenario '{}', see `siteprobe scenarios`", name),
        })?;
        selected.push(scenario);
    }
    if selected.is_empty() {
        return Ok(Scenario::ALL.to_vec());
    }
    Ok(Scenario::ALL
        .into_iter()
        .filter(|s| selected.contains(s))
        .collect())
}

pub fn format_outcome_line(outcome: &ScenarioOutcome) -> String {
    let status = if outcome.passed() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    let mut line = format!(
        "{} {} ({} ms)",
        status,
        outcome.scenario.name(),
        outcome.elapsed.as_millis()
    );
    if !outcome.passed() {
        line.push_str(&format!(" - {} failure(s)", outcome.failures.len()));
    }
    line
}

fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    spinner
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

pub async fn handle_run(args: &ArgMatches, quiet: bool) -> Result<bool> {
    let config = resolve_config(args)?;
    let names = args
        .get_many::<String>("scenario")
        .map(|values| values.map(|s| s.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();
    let scenarios = parse_scenarios(names)?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    let output = args.get_one::<PathBuf>("output");
    // Machine-readable output on stdout stays clean.
    let summarise = !quiet && (format == ReportFormat::Text || output.is_some());

    if summarise {
        println!("\n🔎 Probing {}", config.base_url.bold());
        println!("Scenarios: {}", scenarios.len());
        println!("Workers: {}\n", config.workers);
    }

    let progress = spinner("Running scenarios...", quiet);
    let total = scenarios.len();
    let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let progress_clone = progress.clone();
    let callback: ScenarioCallback = Arc::new(move |outcome: &ScenarioOutcome| {
        let finished = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        progress_clone.println(format_outcome_line(outcome));
        progress_clone.set_message(format!("Running scenarios... {}/{} finished", finished, total));
    });

    let started_at = chrono::Utc::now();
    let outcomes = run_suite(&config, &scenarios, Some(callback)).await;
    progress.finish_and_clear();
    let outcomes = outcomes.context("Could not start the browser")?;

    let report = SuiteReport::new(config.base_url.clone(), started_at, outcomes);
    let rendered = report.render(format).context("Failed to render report")?;

    match output {
        Some(path) => {
            let path = expand_path(path);
            save_report(&rendered, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("{} Report saved to {}", "✓".green().bold(), path.display());
        }
        None => print!("{}", rendered),
    }

    if summarise {
        if report.all_passed() {
            println!("\n{} All {} scenarios passed", "✓".green().bold(), report.outcomes.len());
        } else {
            println!(
                "\n{} {} of {} scenarios failed",
                "✗".red().bold(),
                report.failed_count(),
                report.outcomes.len()
            );
        }
    }
    Ok(report.all_passed())
}

pub async fn handle_sitemap(args: &ArgMatches, quiet: bool) -> Result<bool> {
    let config = resolve_config(args)?;
    let sitemap_url = config.sitemap_url();
    let limit = args.get_one::<usize>("limit").copied();

    let progress = spinner(&format!("Fetching {}", sitemap_url), quiet);
    let reader = SitemapReader::new(config.timeouts.navigation)?;
    let entries = reader.fetch_sitemap_entries(&sitemap_url).await;
    progress.finish_and_clear();
    let entries = entries.with_context(|| format!("Could not read {}", sitemap_url))?;

    let shown = limit.unwrap_or(entries.len()).min(entries.len());
    for entry in entries.iter().take(shown) {
        match entry.last_modified {
            Some(ref modified) => println!("{}  {}", entry.location, modified.dimmed()),
            None => println!("{}", entry.location),
        }
    }
    if !quiet {
        println!(
            "\n{} {} URLs in sitemap ({} shown)",
            "✓".green().bold(),
            entries.len(),
            shown
        );
    }
    Ok(true)
}

pub fn format_broken_link(record: &BrokenLinkRecord) -> String {
    let status = if record.is_transport_failure() {
        "no response".to_string()
    } else {
        record.status.to_string()
    };
    format!("  [{}] {}\n        on {}", status.red(), record.link, record.origin_page)
}

async fn launch_browser(config: &SuiteConfig) -> Result<BrowserSession> {
    BrowserSession::launch(&config.browser, config.timeouts.navigation)
        .await
        .context("Could not start the browser")
}

pub async fn handle_links(args: &ArgMatches, quiet: bool) -> Result<bool> {
    let config = resolve_config(args)?;
    let mut session = launch_browser(&config).await?;
    let page = session.new_page().await.context("Could not open a browser tab")?;

    let result = check_links(&config, &page, quiet).await;
    if let Err(e) = session.close().await {
        debug!("Browser did not close cleanly: {}", e);
    }
    result
}

/// Sample the sitemap's pages in `page` and print every broken link.
pub async fn check_links<P: Page>(config: &SuiteConfig, page: &P, quiet: bool) -> Result<bool> {
    let options = config.link_check_options()?;
    let reader = SitemapReader::new(config.timeouts.navigation)?;
    let probe = HttpProbe::new(config.timeouts.probe)?;

    let progress = spinner("Checking links...", quiet);
    let checker = LinkChecker::new(page, &probe, options);
    let result = checker.check_sitemap(&reader, &config.sitemap_url()).await;
    progress.finish_and_clear();
    let report = result.context("Link check could not start")?;

    for skipped in &report.pages_skipped {
        println!("{} Skipped {} (failed to load)", "⚠".yellow(), skipped);
    }
    for record in &report.broken_links {
        println!("{}", format_broken_link(record));
    }

    println!(
        "\n{} {} pages, {} links checked, {} broken",
        if report.is_clean() { "✓".green().bold() } else { "✗".red().bold() },
        report.pages_checked.len(),
        report.checked.len(),
        report.broken_links.len()
    );
    Ok(report.is_clean())
}

pub async fn handle_form(args: &ArgMatches, quiet: bool) -> Result<bool> {
    let config = resolve_config(args)?;
    let email = args
        .get_one::<String>("email")
        .cloned()
        .unwrap_or_else(generate_test_email);
    let mut session = launch_browser(&config).await?;
    let page = session.new_page().await.context("Could not open a browser tab")?;

    let result = submit_form(&config, &page, &email, quiet).await;
    if let Err(e) = session.close().await {
        debug!("Browser did not close cleanly: {}", e);
    }
    result
}

/// Submit `email` to the lead form in `page` and print the derived outcome.
/// `Ok(false)` means the form never became ready.
pub async fn submit_form<P: Page>(
    config: &SuiteConfig,
    page: &P,
    email: &str,
    quiet: bool,
) -> Result<bool> {
    let mut form = LeadForm::with_options(
        page,
        config.form_url(),
        Default::default(),
        config.form_timeouts(),
    );

    let progress = spinner(&format!("Loading {}", config.form_url()), quiet);
    let ready = form.goto().await;
    progress.finish_and_clear();
    if !ready.context("Could not load the form page")? {
        println!("{} Form is not ready or visible", "✗".red().bold());
        return Ok(false);
    }

    let signal = form.fill_form(email).await.context("Submission failed")?;
    let outcome = form.form_validation_state().await;

    println!("Email:    {:?}", email);
    println!(
        "Signal:   {}",
        signal.map(|s| format!("{:?}", s)).unwrap_or_else(|| "none".to_string())
    );
    println!(
        "Valid:    {}",
        if outcome.is_valid { "yes".green() } else { "no".red() }
    );
    if let Some(ref message) = outcome.message {
        println!("Message:  {}", message);
    }
    Ok(true)
}

pub fn handle_scenarios() -> Result<bool> {
    for scenario in Scenario::ALL {
        println!("{:<40} {}", scenario.name().bold(), scenario.description());
    }
    Ok(true)
}
