use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, Times};
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "kyobun";
const LIST_URL: &str = "https://www.kyobun.org/event_schedule.html";

static DATE_DT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("dt.date"));
static TITLE_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.title a[href]"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.title"));
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.time"));
static PHOTO_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("div.event_photo img[src]"));
static HALL_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("p.icon"));

pub struct Kyobun;

fn month_url(date: NaiveDate) -> String {
    format!("{LIST_URL}?k=lst&ym={}&h=a", date.format("%Y%m"))
}

fn parse_entry(
    dd: ElementRef<'_>,
    page_url: &str,
    ctx: &ScrapeContext<'_>,
    date: NaiveDate,
    label: &str,
) -> EventItem {
    let link = dd.select(&TITLE_LINK_SELECTOR).next();
    let title = link
        .map(base::inner_text)
        .filter(|text| !text.is_empty())
        .or_else(|| base::first_text(&dd, &TITLE_SELECTOR))
        .map(|text| base::clean_text(&text))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let url = link
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| base::absolute_url(page_url, href))
        .unwrap_or_else(|| page_url.to_string());

    let times = dd
        .select(&TIME_SELECTOR)
        .next()
        .map(|p| Times::from_html(&p.inner_html()))
        .unwrap_or_default();
    let venue = base::first_text(&dd, &HALL_SELECTOR).map(|text| base::clean_text(&text));
    let flyer = base::first_attr(&dd, &PHOTO_SELECTOR, "src")
        .and_then(|src| base::absolute_url(page_url, &src));
    let alt = format!("{title} フライヤー");

    EventItem::new(label, title, date, ctx.locale.display(date), url)
        .with_venue(base::or_not_specified(venue))
        .with_times(times.open, times.start, times.end, times.end_estimated)
        .with_flyer(flyer, alt)
}

impl SourceAdapter for Kyobun {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let url = month_url(date);
        let page = ctx.fetcher.fetch_text(&url)?;
        let document = Html::parse_document(&page);
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        for dt in document.select(&DATE_DT_SELECTOR) {
            if !base::contains_date(&base::inner_text(dt), date) {
                continue;
            }
            let Some(dd) = base::next_dd(dt)
                .filter(|dd| dd.value().classes().any(|class| class == "event_link"))
            else {
                continue;
            };
            result.events.push(parse_entry(dd, &url, ctx, date, label));
        }

        Ok(result.finish())
    }
}
