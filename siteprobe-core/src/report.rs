// Report generation from suite outcomes

use crate::scenario::ScenarioOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const LIGHT_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SuiteReport {
    pub fn new(base_url: impl Into<String>, started_at: DateTime<Utc>, outcomes: Vec<ScenarioOutcome>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            base_url: base_url.into(),
            started_at,
            outcomes,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed())
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(generate_text_report(self)),
            ReportFormat::Json => generate_json_report(self),
            ReportFormat::Markdown => Ok(generate_markdown_report(self)),
        }
    }
}

pub fn generate_text_report(report: &SuiteReport) -> String {
    let mut out = String::new();

    out.push_str(HEAVY_RULE);
    out.push_str("                         SITEPROBE ACCEPTANCE REPORT\n");
    out.push_str(HEAVY_RULE);
    out.push('\n');

    out.push_str(&format!("Run ID:       {}\n", report.run_id));
    out.push_str(&format!("Target:       {}\n", report.base_url));
    out.push_str(&format!("Started:      {}\n", report.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "Scenarios:    {} passed, {} failed\n\n",
        report.passed_count(),
        report.failed_count()
    ));

    out.push_str(HEAVY_RULE);
    out.push_str("SCENARIOS\n");
    out.push_str(HEAVY_RULE);
    out.push('\n');

    for outcome in &report.outcomes {
        let status = if outcome.passed() { "PASS" } else { "FAIL" };
        out.push_str(&format!(
            "  [{}] {:<40} {:>8} ms\n",
            status,
            outcome.scenario.name(),
            outcome.elapsed.as_millis()
        ));
    }
    out.push('\n');

    let failed: Vec<&ScenarioOutcome> = report.outcomes.iter().filter(|o| !o.passed()).collect();
    if !failed.is_empty() {
        out.push_str(HEAVY_RULE);
        out.push_str("FAILURES\n");
        out.push_str(HEAVY_RULE);
        out.push('\n');

        for (idx, outcome) in failed.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", idx + 1, outcome.scenario.name()));
            out.push_str(&format!("    {}\n\n", outcome.scenario.description()));
            for failure in &outcome.failures {
                out.push_str(&wrap_text(failure, 80, "  - ", "    "));
            }
            out.push('\n');
            out.push_str(LIGHT_RULE);
            out.push('\n');
        }
    }

    out.push_str(HEAVY_RULE);
    out.push_str("                                End of Report\n");
    out.push_str(HEAVY_RULE);
    out
}

pub fn generate_json_report(report: &SuiteReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "siteprobe",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": report.run_id,
                "base_url": report.base_url,
                "started_at": report.started_at.to_rfc3339(),
            },
            "summary": {
                "total": report.outcomes.len(),
                "passed": report.passed_count(),
                "failed": report.failed_count()
            },
            "scenarios": report.outcomes
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(report: &SuiteReport) -> String {
    let mut out = String::new();
    out.push_str("# Siteprobe acceptance report\n\n");
    out.push_str(&format!("- **Run ID:** `{}`\n", report.run_id));
    out.push_str(&format!("- **Target:** {}\n", report.base_url));
    out.push_str(&format!("- **Started:** {}\n", report.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "- **Result:** {} passed, {} failed\n\n",
        report.passed_count(),
        report.failed_count()
    ));

    out.push_str("| Scenario | Result | Time (ms) |\n");
    out.push_str("|----------|--------|-----------|\n");
    for outcome in &report.outcomes {
        out.push_str(&format!(
            "| `{}` | {} | {} |\n",
            outcome.scenario.name(),
            if outcome.passed() { "pass" } else { "**fail**" },
            outcome.elapsed.as_millis()
        ));
    }

    for outcome in report.outcomes.iter().filter(|o| !o.passed()) {
        out.push_str(&format!("\n## {}\n\n", outcome.scenario.name()));
        out.push_str(&format!("_{}_\n\n", outcome.scenario.description()));
        for failure in &outcome.failures {
            out.push_str(&format!("- {}\n", failure.replace('|', "\\|")));
        }
    }
    out
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Word-wrap `text`, starting with `first_indent` and continuing with
/// `indent`. Words longer than the line are kept whole.
fn wrap_text(text: &str, width: usize, first_indent: &str, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();
    let mut prefix = first_indent;

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > width - prefix.len() {
            result.push_str(prefix);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
            prefix = indent;
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(prefix);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
