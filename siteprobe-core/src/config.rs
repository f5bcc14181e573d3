//! Suite configuration.
//!
//! Defaults are overlaid by an optional TOML file, which is in turn overlaid
//! by command-line values. The resolved [`SuiteConfig`] is passed into every
//! scenario; nothing reads a process-wide default.

use serde::{Deserialize, Serialize};
use siteprobe_scanner::browser::BrowserOptions;
use siteprobe_scanner::form::FormTimeouts;
use siteprobe_scanner::links::LinkCheckOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/siteprobe/config.toml";
pub const DEFAULT_BASE_URL: &str = "https://www.netlify.com";
pub const DEFAULT_IMPORTANT_PATHS: &[&str] = &["/", "/products", "/pricing", "/enterprise", "/contact"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteConfig {
    /// Site under test, without a trailing slash.
    pub base_url: String,
    pub sitemap_path: String,
    /// Page carrying the lead form.
    pub form_page: String,
    /// Paths the sitemap must list.
    pub important_paths: Vec<String>,
    pub max_pages_to_check: usize,
    pub max_urls_to_check: usize,
    pub max_links_per_page: usize,
    /// Scenarios allowed to run at once.
    pub workers: usize,
    pub timeouts: Timeouts,
    pub browser: BrowserOptions,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sitemap_path: "/sitemap.xml".to_string(),
            form_page: "/".to_string(),
            important_paths: DEFAULT_IMPORTANT_PATHS.iter().map(|p| p.to_string()).collect(),
            max_pages_to_check: 3,
            max_urls_to_check: 5,
            max_links_per_page: 10,
            workers: 3,
            timeouts: Timeouts::default(),
            browser: BrowserOptions::default(),
        }
    }
}

/// Time budgets, written in milliseconds in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(rename = "navigation_ms", with = "millis")]
    pub navigation: Duration,
    /// Waiting for the form's controls to appear.
    #[serde(rename = "action_ms", with = "millis")]
    pub action: Duration,
    /// Submit click and the success/error race.
    #[serde(rename = "submit_ms", with = "millis")]
    pub submit: Duration,
    #[serde(rename = "assertion_ms", with = "millis")]
    pub assertion: Duration,
    /// Single HEAD probe.
    #[serde(rename = "probe_ms", with = "millis")]
    pub probe: Duration,
    /// Pause before reading the form's validation state.
    #[serde(rename = "settle_ms", with = "millis")]
    pub settle: Duration,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Whole-scenario budget.
    #[serde(rename = "scenario_ms", with = "millis")]
    pub scenario: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            action: Duration::from_secs(15),
            submit: Duration::from_secs(5),
            assertion: Duration::from_secs(10),
            probe: Duration::from_secs(10),
            settle: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            scenario: Duration::from_secs(60),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Values supplied on the command line or through `SITEPROBE_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub max_pages_to_check: Option<usize>,
    pub max_links_per_page: Option<usize>,
    pub max_urls_to_check: Option<usize>,
    pub workers: Option<usize>,
    /// Show the browser window.
    pub headed: bool,
    pub browser_executable: Option<PathBuf>,
}

impl SuiteConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a config file. A missing file is an error here.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content, path)
    }

    /// Use `explicit` when given; otherwise the default location if a file
    /// exists there; otherwise built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = default_config_path();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref base_url) = overrides.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(pages) = overrides.max_pages_to_check {
            self.max_pages_to_check = pages;
        }
        if let Some(links) = overrides.max_links_per_page {
            self.max_links_per_page = links;
        }
        if let Some(urls) = overrides.max_urls_to_check {
            self.max_urls_to_check = urls;
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if overrides.headed {
            self.browser.headless = false;
        }
        if let Some(ref executable) = overrides.browser_executable {
            self.browser.executable = Some(executable.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }

        for (field, value) in [
            ("sitemap_path", &self.sitemap_path),
            ("form_page", &self.form_page),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("'{}' must start with '/'", value),
                });
            }
        }
        if let Some(path) = self.important_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::InvalidValue {
                field: "important_paths",
                reason: format!("'{}' must start with '/'", path),
            });
        }

        for (field, value) in [
            ("max_pages_to_check", self.max_pages_to_check),
            ("max_urls_to_check", self.max_urls_to_check),
            ("max_links_per_page", self.max_links_per_page),
            ("workers", self.workers),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "browser.window_width",
                reason: "window size must be at least 1x1".to_string(),
            });
        }

        let t = &self.timeouts;
        for (field, value) in [
            ("timeouts.navigation_ms", t.navigation),
            ("timeouts.action_ms", t.action),
            ("timeouts.submit_ms", t.submit),
            ("timeouts.assertion_ms", t.assertion),
            ("timeouts.probe_ms", t.probe),
            ("timeouts.poll_interval_ms", t.poll_interval),
            ("timeouts.scenario_ms", t.scenario),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))
    }

    /// `base_url` with `path` appended verbatim.
    pub fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn sitemap_url(&self) -> String {
        self.page_url(&self.sitemap_path)
    }

    pub fn form_url(&self) -> String {
        self.page_url(&self.form_page)
    }

    pub fn link_check_options(&self) -> Result<LinkCheckOptions, ConfigError> {
        Ok(LinkCheckOptions::new(self.base()?)
            .with_max_pages(self.max_pages_to_check)
            .with_max_links_per_page(self.max_links_per_page)
            .with_navigation_timeout(self.timeouts.navigation))
    }

    pub fn form_timeouts(&self) -> FormTimeouts {
        FormTimeouts {
            navigation: self.timeouts.navigation,
            ready: self.timeouts.action,
            submit: self.timeouts.submit,
            settle: self.timeouts.settle,
            poll_interval: self.timeouts.poll_interval,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}
