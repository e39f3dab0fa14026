use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "sapporo_dome";
const LIST_URL: &str = "https://www.sapporo-dome.co.jp/eventlist/";
const VENUE: &str = "大和ハウス プレミストドーム（札幌ドーム）";

static ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector("li.un_eventlist_item[data-event-day]"));
static MAIN_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(".un_eventlist_detailTtl__main"));
static SUB_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(".un_eventlist_detailTtl__sub"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("a.js_eventItemLink[href]"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".un_eventlist_img img"));
static TIME_DT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector("dt.un_eventlist_opentimeTtl"));

pub struct SapporoDome;

#[derive(Default)]
struct SlotTimes {
    open: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

fn slot_times(item: &ElementRef<'_>) -> SlotTimes {
    let mut times = SlotTimes::default();
    for dt in item.select(&TIME_DT_SELECTOR) {
        let key = base::inner_text(dt);
        let value =
            base::next_dd(dt).and_then(|dd| base::extract_any_hhmm(&base::inner_text(dd)));
        if key.contains("開場") {
            times.open = value;
        } else if key.contains("開始") || key.contains("開演") {
            times.start = value;
        } else if key.contains("終了") {
            times.end = value;
        }
    }
    times
}

fn item_title(item: &ElementRef<'_>) -> String {
    let main = base::first_text(item, &MAIN_TITLE_SELECTOR).map(|text| base::clean_text(&text));
    let sub = base::first_text(item, &SUB_TITLE_SELECTOR).map(|text| base::clean_text(&text));
    match (sub, main) {
        (Some(sub), Some(main)) => format!("{sub} {main}"),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => UNKNOWN_TITLE.to_string(),
    }
}

fn item_image(item: &ElementRef<'_>) -> Option<String> {
    let img = item.select(&IMG_SELECTOR).next()?;
    let src = img
        .value()
        .attr("data-src")
        .or_else(|| img.value().attr("src"))?;
    base::absolute_url(LIST_URL, src)
}

impl SourceAdapter for SapporoDome {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let page = ctx.fetcher.fetch_text(LIST_URL)?;
        let document = Html::parse_document(&page);
        let target = date.format("%Y%m%d").to_string();
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        for item in document.select(&ITEM_SELECTOR) {
            if item.value().attr("data-event-day") != Some(target.as_str()) {
                continue;
            }
            let title = item_title(&item);
            let url = base::first_attr(&item, &LINK_SELECTOR, "href")
                .and_then(|href| base::absolute_url(LIST_URL, &href))
                .unwrap_or_else(|| LIST_URL.to_string());
            let times = slot_times(&item);
            let alt = format!("{title} フライヤー");

            result.events.push(
                EventItem::new(label, title, date, ctx.locale.display(date), url)
                    .with_venue(VENUE)
                    .with_times(times.open, times.start, times.end, false)
                    .with_flyer(item_image(&item), alt),
            );
        }

        Ok(result.finish())
    }
}
