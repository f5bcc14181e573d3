use crate::CLAP_STYLING;
use clap::{Arg, arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("siteprobe")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("siteprobe")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log debug detail (overridden by RUST_LOG)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("run")
                .about("Run the acceptance suite against a site")
                .args(target_args())
                .arg(
                    arg!(-s --"scenario" <NAME>)
                        .required(false)
                        .help("Run only this scenario (repeatable, see `siteprobe scenarios`)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Scenarios to run at the same time [default: 3]")
                        .env("SITEPROBE_WORKERS")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown", "md"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("sitemap")
                .about("Fetch and print the URLs listed in the site's sitemap")
                .args(target_args())
                .arg(
                    arg!(-l --"limit" <COUNT>)
                        .required(false)
                        .help("Print at most this many URLs")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            command!("links")
                .about(
                    "Check a sample of same-site links on the first sitemap pages and print \
                the broken ones",
                )
                .args(target_args()),
        )
        .subcommand(
            command!("form")
                .about("Submit one address to the lead form and print how the page reacted")
                .args(target_args())
                .arg(
                    arg!(-e --"email" <EMAIL>)
                        .required(false)
                        .help("Address to submit (default: a generated test.user+<millis>@example.com)"),
                ),
        )
        .subcommand(command!("scenarios").about("List the scenarios the suite knows about"))
}

/// Site selection, sampling caps and browser launch options shared by every
/// network command.
fn target_args() -> Vec<Arg> {
    vec![
        arg!(-c --"config" <PATH>)
            .required(false)
            .help("Config file (default: ~/.config/siteprobe/config.toml when present)")
            .env("SITEPROBE_CONFIG"),
        arg!(-u --"url" <URL>)
            .required(false)
            .help("Base URL of the site under test [default: https://www.netlify.com]")
            .env("SITEPROBE_URL")
            .value_parser(clap::value_parser!(Url)),
        arg!(--"max-pages" <COUNT>)
            .required(false)
            .help("Sitemap pages to scan for links [default: 3]")
            .env("SITEPROBE_MAX_PAGES")
            .value_parser(clap::value_parser!(usize)),
        arg!(--"max-links" <COUNT>)
            .required(false)
            .help("Links to probe per page [default: 10]")
            .env("SITEPROBE_MAX_LINKS")
            .value_parser(clap::value_parser!(usize)),
        arg!(--"max-urls" <COUNT>)
            .required(false)
            .help("Sitemap URLs to load in the accessibility sample [default: 5]")
            .env("SITEPROBE_MAX_URLS")
            .value_parser(clap::value_parser!(usize)),
        arg!(--"headed" "Show the browser window instead of running headless")
            .required(false),
        arg!(--"chrome" <PATH>)
            .required(false)
            .help("Chrome or Chromium binary (default: detected)")
            .env("SITEPROBE_CHROME")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    ]
}
