use colored::Colorize;
use siteprobe::command_argument_builder;
use siteprobe::handlers::{
    exit_code_for, handle_form, handle_links, handle_run, handle_scenarios, handle_sitemap,
    init_logging, EXIT_FAILED,
};
use siteprobe_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    init_logging(verbose, quiet);

    let result = match chosen_command.subcommand() {
        Some(("run", primary_command)) => handle_run(primary_command, quiet).await,
        Some(("sitemap", primary_command)) => handle_sitemap(primary_command, quiet).await,
        Some(("links", primary_command)) => handle_links(primary_command, quiet).await,
        Some(("form", primary_command)) => handle_form(primary_command, quiet).await,
        Some(("scenarios", _)) => handle_scenarios(),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_FAILED),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(exit_code_for(&e));
        }
    }
}
