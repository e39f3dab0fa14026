pub mod axes_json;
pub mod base;
pub mod http;
pub mod kitara_html;
pub mod kyobun_html;
pub mod makomanai_pdf;
pub mod mountalive_xml;
pub mod musicfun_html;
pub mod plaza_html;
pub mod sapporo_dome_html;
pub mod shiminhall_html;
pub mod sora_scc_html;
pub mod wess_json;
pub mod zepp_html;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use tracing::{info, warn};

use self::http::Fetch;
use crate::config::SourceConfig;
use crate::locale::DateLocale;
use crate::models::{SiteResult, UNSUPPORTED_SOURCE};

/// What every adapter gets from the pipeline: the network and the locale.
pub struct ScrapeContext<'a> {
    pub fetcher: &'a dyn Fetch,
    pub locale: &'a DateLocale,
}

pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> &'static str;
    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult>;
}

type AdapterFactory = fn(&SourceConfig) -> Box<dyn SourceAdapter>;

static REGISTRY: Lazy<HashMap<&'static str, AdapterFactory>> = Lazy::new(|| {
    let entries: [(&'static str, AdapterFactory); 12] = [
        (kitara_html::SOURCE_TYPE, |_| Box::new(kitara_html::Kitara)),
        (plaza_html::SOURCE_TYPE, |conf| {
            Box::new(plaza_html::CommunityPlaza::from_config(conf))
        }),
        (shiminhall_html::SOURCE_TYPE, |_| {
            Box::new(shiminhall_html::ShiminHall)
        }),
        (musicfun_html::SOURCE_TYPE, |_| Box::new(musicfun_html::MusicFun)),
        (mountalive_xml::SOURCE_TYPE, |_| {
            Box::new(mountalive_xml::MountAlive)
        }),
        (wess_json::SOURCE_TYPE, |_| Box::new(wess_json::Wess)),
        (kyobun_html::SOURCE_TYPE, |_| Box::new(kyobun_html::Kyobun)),
        (sapporo_dome_html::SOURCE_TYPE, |_| {
            Box::new(sapporo_dome_html::SapporoDome)
        }),
        (sora_scc_html::SOURCE_TYPE, |_| Box::new(sora_scc_html::SoraScc)),
        (axes_json::SOURCE_TYPE, |_| Box::new(axes_json::Axes)),
        (makomanai_pdf::SOURCE_TYPE, |_| {
            Box::new(makomanai_pdf::MakomanaiIceArena)
        }),
        (zepp_html::SOURCE_TYPE, |_| Box::new(zepp_html::ZeppSapporo)),
    ];
    entries.into_iter().collect()
});

pub fn list_source_types() -> Vec<&'static str> {
    let mut types: Vec<_> = REGISTRY.keys().copied().collect();
    types.sort_unstable();
    types
}

pub fn adapter_for(source: &SourceConfig) -> Option<Box<dyn SourceAdapter>> {
    REGISTRY
        .get(source.source_type.as_str())
        .map(|factory| factory(source))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Sequential,
    /// One scoped thread per source.
    Parallel,
}

/// Runs every configured source, always returning one result per source in
/// configuration order. Adapter errors and panics become failure notes.
pub fn run_all(
    ctx: &ScrapeContext<'_>,
    sources: &[SourceConfig],
    date: NaiveDate,
    mode: RunMode,
) -> Vec<SiteResult> {
    match mode {
        RunMode::Sequential => sources
            .iter()
            .map(|source| run_single(ctx, source, date))
            .collect(),
        RunMode::Parallel => thread::scope(|scope| {
            let handles: Vec<_> = sources
                .iter()
                .map(|source| (source, scope.spawn(move || run_single(ctx, source, date))))
                .collect();
            handles
                .into_iter()
                .map(|(source, handle)| {
                    handle.join().unwrap_or_else(|payload| {
                        failure_result(source, date, &panic_message(payload.as_ref()))
                    })
                })
                .collect()
        }),
    }
}

pub fn run_single(ctx: &ScrapeContext<'_>, source: &SourceConfig, date: NaiveDate) -> SiteResult {
    let label = source.display_label();
    let Some(adapter) = adapter_for(source) else {
        warn!(source = %label, source_type = %source.source_type, "no adapter registered");
        return SiteResult::failed(&source.source_type, label, date, UNSUPPORTED_SOURCE);
    };

    run_adapter(ctx, adapter.as_ref(), source, date)
}

fn run_adapter(
    ctx: &ScrapeContext<'_>,
    adapter: &dyn SourceAdapter,
    source: &SourceConfig,
    date: NaiveDate,
) -> SiteResult {
    let label = source.display_label();
    info!(source = %label, %date, "scraping");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| adapter.scrape(ctx, date, label)));
    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => failure_result(source, date, &format!("{err:#}")),
        Err(payload) => failure_result(source, date, &panic_message(payload.as_ref())),
    };

    if result.events.is_empty() {
        info!(source = %label, note = %result.note, "no events");
    } else if result.is_partial() {
        warn!(source = %label, events = result.events.len(), note = %result.note, "scraped with partial failures");
    } else {
        info!(source = %label, events = result.events.len(), "scraped");
    }
    result
}

fn failure_result(source: &SourceConfig, date: NaiveDate, reason: &str) -> SiteResult {
    let label = source.display_label();
    warn!(source = %label, error = %reason, "scrape failed");
    SiteResult::failed(&source.source_type, label, date, format!("取得失敗: {reason}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "adapter panicked".to_string()
    }
}
