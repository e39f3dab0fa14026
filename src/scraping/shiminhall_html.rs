use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult};

pub const SOURCE_TYPE: &str = "sapporo_shiminhall";
const LIST_URL: &str = "https://www.sapporo-shiminhall.org/event/";
const VENUE: &str = "カナモトホール（札幌市民ホール）";

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(r#"tr[id^="event"]"#));
static DAY_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.day"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("td.tbody01"));
static OPEN_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(r#"td[data-label="開場"]"#));
static START_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(r#"td[data-label="開演"]"#));
static FLYER_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.flyer a[href]"));

pub struct ShiminHall;

fn day_url(date: NaiveDate) -> String {
    format!("{LIST_URL}?ymd={}", date.format("%Y/%m/%d"))
}

impl ShiminHall {
    fn parse_day(
        &self,
        html: &str,
        url: &str,
        ctx: &ScrapeContext<'_>,
        date: NaiveDate,
        label: &str,
    ) -> Vec<EventItem> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();

        for row in document.select(&ROW_SELECTOR) {
            let day = base::first_text(&row, &DAY_SELECTOR)
                .and_then(|text| text.trim().parse::<u32>().ok());
            if day != Some(date.day()) {
                continue;
            }
            let Some(title) = base::first_text(&row, &TITLE_SELECTOR) else {
                continue;
            };
            let row_id = row.value().id().unwrap_or_default();

            let open = base::first_text(&row, &OPEN_SELECTOR)
                .and_then(|text| base::extract_any_hhmm(&text));
            let start = base::first_text(&row, &START_SELECTOR)
                .and_then(|text| base::extract_any_hhmm(&text));

            let links = row
                .select(&FLYER_LINK_SELECTOR)
                .next()
                .and_then(|a| {
                    let href = base::absolute_url(url, a.value().attr("href")?)?;
                    Some(base::build_link(&a.inner_html(), href))
                })
                .into_iter()
                .collect();

            events.push(
                EventItem::new(
                    label,
                    base::clean_text(&title),
                    date,
                    ctx.locale.display(date),
                    format!("{url}#{row_id}"),
                )
                .with_venue(VENUE)
                .with_times(open, start, None, false)
                .with_links(links),
            );
        }
        events
    }
}

impl SourceAdapter for ShiminHall {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let url = day_url(date);
        let page = ctx.fetcher.fetch_text(&url)?;
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);
        result.events = self.parse_day(&page, &url, ctx, date, label);
        Ok(result.finish())
    }
}
