use colored::Colorize;

pub mod config;
pub mod fixtures;
pub mod report;
pub mod scenario;

pub use config::{ConfigError, ConfigOverrides, SuiteConfig, Timeouts};
pub use report::{ReportFormat, SuiteReport};
pub use scenario::{Scenario, ScenarioOutcome, run_suite};

pub fn print_banner() {
    let banner = r#"
      _ _                       _
  ___(_) |_ ___ _ __  _ __ ___ | |__   ___
 / __| | __/ _ \ '_ \| '__/ _ \| '_ \ / _ \
 \__ \ | ||  __/ |_) | | | (_) | |_) |  __/
 |___/_|\__\___| .__/|_|  \___/|_.__/ \___|
               |_|"#;
    eprintln!("{}", banner.cyan().bold());
    eprintln!(
        "  {} {}\n",
        "sitemap, link and lead-form checks".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
