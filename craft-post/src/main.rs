//! craft-post - daily publishing run

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::Parser;
use libcraftcast::poster::{RunOptions, RunReport};
use libcraftcast::setup::{build_orchestrator, resolve_platforms};
use libcraftcast::{Config, CraftcastError, Result};

#[derive(Parser, Debug)]
#[command(name = "craft-post")]
#[command(version, about = "Publish today's works to social platforms")]
#[command(long_about = r#"Publish today's works to social platforms.

Selection per platform, in order:
  1. Works scheduled for the target date (uncapped)
  2. Catch-up works already posted elsewhere (--catchup-limit)
  3. Oldest wholly-unposted works (--basic-limit)

EXAMPLES:
    # Post today's selection to all configured platforms
    craft-post

    # Preview without publishing or writing to the ledger
    craft-post --dry-run

    # One platform, a specific date
    craft-post --platform instagram --date 2026-03-01

    # Tighter limits
    craft-post --basic-limit 1 --catchup-limit 0

    # JSON report for scripting
    craft-post --format json | jq '.errors'

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

    /// Target date, YYYY-MM-DD (default: today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<String>,

    /// Preview selection without publishing or writing to the ledger
    #[arg(long)]
    dry_run: bool,

    /// Max basic-tier works per platform
    #[arg(short = 'b', long, default_value = "2", value_name = "N")]
    basic_limit: usize,

    /// Max catch-up works per platform
    #[arg(short = 'c', long, default_value = "1", value_name = "N")]
    catchup_limit: usize,

    /// Config file path (default: XDG config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

fn parse_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(raw) => raw.parse().map_err(|_| {
            CraftcastError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", raw))
        }),
        None => Ok(Local::now().date_naive()),
    }
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
    let date = parse_date(cli.date.as_deref())?;

    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator
        .run_daily(&RunOptions {
            date,
            platforms,
            basic_limit: cli.basic_limit,
            catchup_limit: cli.catchup_limit,
            dry_run: cli.dry_run,
        })
        .await?;

    print_report(&report, &cli.format);
    Ok(())
}
