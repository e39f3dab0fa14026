//! Command-line interface for the event digest.

use std::path::PathBuf;

use clap::Parser;

use crate::render::Layout;

/// Scrapes the configured Sapporo venue sites for one day and writes the
/// digest into a copy of the HTML template.
///
/// ```sh
/// event-digest --date 2025-05-01 --layout per-source --parallel
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Target date as YYYY-MM-DD (default: today in Asia/Tokyo)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Source configuration file
    #[arg(short, long, default_value = "config/auto_sources.json")]
    pub config: PathBuf,

    /// HTML template containing the site block markers
    #[arg(short, long, default_value = "event-summary.template.html")]
    pub template: PathBuf,

    /// Where the digest is written
    #[arg(short, long, default_value = "event-summary.html")]
    pub output: PathBuf,

    /// Arrangement of the digest
    #[arg(long, value_enum, default_value_t = Layout::Global)]
    pub layout: Layout,

    /// Scrape sources concurrently, one thread per source
    #[arg(long)]
    pub parallel: bool,

    /// Retry certificate failures without verification
    #[arg(long)]
    pub allow_insecure_tls: bool,

    /// Per-request timeout; overrides the configuration file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Print the registered source types and exit
    #[arg(long)]
    pub list_sources: bool,
}
