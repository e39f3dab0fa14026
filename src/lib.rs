mod cli;
mod config;
mod locale;
mod models;
mod render;
pub mod scraping;
mod sorting;
mod template;
mod utils;

use std::io::IsTerminal;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::{AppConfig, ConfigError, SourceConfig};
use locale::DateLocale;
use render::Layout;
use scraping::http::HttpTransport;
use scraping::{RunMode, ScrapeContext};
use template::TemplateError;

/// Problems with the invocation itself; all are caught before any request.
#[derive(Debug, Error)]
enum SetupError {
    #[error("--date は YYYY-MM-DD 形式で指定してください (got {0:?})")]
    InvalidDate(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

struct Setup {
    date: NaiveDate,
    config: AppConfig,
    template: String,
}

struct Digest {
    html: String,
    sites: usize,
    events: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

fn parse_target_date(arg: Option<&str>, locale: &DateLocale) -> Result<NaiveDate, SetupError> {
    match arg {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| SetupError::InvalidDate(raw.to_string())),
        None => Ok(locale.today()),
    }
}

fn prepare(args: &Cli, locale: &DateLocale) -> Result<Setup, SetupError> {
    let date = parse_target_date(args.date.as_deref(), locale)?;
    let mut config = config::load_config(&args.config)?;
    let template = template::load_template(&args.template)?;

    if args.allow_insecure_tls {
        config.http.allow_insecure_tls = true;
    }
    if let Some(secs) = args.timeout_secs {
        config.http.timeout_secs = secs;
    }
    Ok(Setup {
        date,
        config,
        template,
    })
}

fn build_digest(
    ctx: &ScrapeContext<'_>,
    sources: &[SourceConfig],
    date: NaiveDate,
    layout: Layout,
    mode: RunMode,
    template: &str,
) -> Result<Digest, TemplateError> {
    let results = scraping::run_all(ctx, sources, date, mode);
    let sites = sorting::order_sites(results);
    let fragment = render::render_fragment(layout, date, &sites, ctx.locale);
    let html = template::compose(template, &fragment, date)?;
    Ok(Digest {
        html,
        sites: sites.len(),
        events: sites.iter().map(|site| site.events.len()).sum(),
    })
}

pub fn run() -> ExitCode {
    init_tracing();
    let args = Cli::parse();

    if args.list_sources {
        for source_type in scraping::list_source_types() {
            println!("{source_type}");
        }
        return ExitCode::SUCCESS;
    }

    let locale = DateLocale::default();
    let setup = match prepare(&args, &locale) {
        Ok(setup) => setup,
        Err(err) => {
            error!(error = %err, "cannot start");
            return ExitCode::from(2);
        }
    };

    let transport = match HttpTransport::new(setup.config.http.clone()) {
        Ok(transport) => transport,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let ctx = ScrapeContext {
        fetcher: &transport,
        locale: &locale,
    };
    let sources = setup.config.enabled_sources();
    let mode = if args.parallel {
        RunMode::Parallel
    } else {
        RunMode::Sequential
    };
    info!(date = %setup.date, sources = sources.len(), ?mode, layout = ?args.layout, "building digest");

    let digest = match build_digest(&ctx, &sources, setup.date, args.layout, mode, &setup.template) {
        Ok(digest) => digest,
        Err(err) => {
            error!(error = %err, "template rejected");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = utils::write_output(&args.output, &digest.html) {
        error!(path = %args.output.display(), error = %err, "failed to write digest");
        return ExitCode::FAILURE;
    }
    info!(
        output = %args.output.display(),
        sites = digest.sites,
        events = digest.events,
        "generated digest"
    );
    ExitCode::SUCCESS
}
