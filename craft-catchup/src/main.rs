//! craft-catchup - publish works missing on one platform

use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use libcraftcast::poster::RunReport;
use libcraftcast::setup::{build_orchestrator, resolve_platforms};
use libcraftcast::{Config, Result};

#[derive(Parser, Debug)]
#[command(name = "craft-catchup")]
#[command(version, about = "Publish works posted elsewhere but missing here")]
#[command(long_about = r#"Publish works posted elsewhere but missing here.

For each platform, selects up to --limit works that are not yet posted
on it but are posted on at least one other platform, oldest first.
Independent of the daily scheduled/basic flow.

EXAMPLES:
    # One catch-up post per configured platform
    craft-catchup

    # Fill X specifically, up to five works
    craft-catchup --platform x --limit 5

    # Preview without publishing
    craft-catchup --dry-run

EXIT CODES:
    0 - Run completed (including runs with per-work failures recorded)
    1 - Unhandled error (config, ledger connectivity)
    2 - Authentication error
    3 - Invalid input
"#)]
struct Cli {
    /// Target platform(s), comma-separated (default: configured platforms)
    #[arg(short, long, value_name = "NAME")]
    platform: Option<String>,

    /// Max catch-up works per platform
    #[arg(short = 'n', long, default_value = "1", value_name = "N")]
    limit: usize,

    /// Preview selection without publishing or writing to the ledger
    #[arg(long)]
    dry_run: bool,

    /// Config file path (default: XDG config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

fn print_report(report: &RunReport, format: &str) {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report).unwrap());
        return;
    }

    if report.dry_run {
        println!("Dry run: nothing was published.");
    }
    println!("Processed {} work(s)", report.processed.len());
    for (platform, titles) in &report.published {
        println!("  {}: {}", platform, titles.join(", "));
    }
    for skipped in &report.skipped_platforms {
        println!("Skipped: {}", skipped);
    }
    for error in &report.errors {
        println!("Error: {}", error);
    }
}

#[tokio::main]
async fn main() {
    libcraftcast::logging::init_default();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let platforms = resolve_platforms(cli.platform.as_deref(), &config)?;

    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator
        .run_catchup(
            Local::now().date_naive(),
            &platforms,
            cli.limit,
            cli.dry_run,
        )
        .await?;

    print_report(&report, &cli.format);
    Ok(())
}
