use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, LinkItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "sora_scc";
const LIST_URL: &str = "https://www.sora-scc.jp/event/";
const VENUE: &str = "札幌コンベンションセンター";

static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("li > time"));
static DT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("dt"));

pub struct SoraScc;

fn parse_block(
    block: ElementRef<'_>,
    date_text: String,
    ctx: &ScrapeContext<'_>,
    date: NaiveDate,
    label: &str,
) -> EventItem {
    let field = |name: &str| {
        base::dd_by_label(&block, &DT_SELECTOR, name)
            .map(|dd| base::clean_text(&base::inner_text(dd)))
            .filter(|text| !text.is_empty())
    };
    let title = field("催事名").unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let links = field("主催者名")
        .map(|organizer| LinkItem {
            label: format!("主催者: {organizer}"),
            url: LIST_URL.to_string(),
        })
        .into_iter()
        .collect();
    let date_text = Some(date_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| ctx.locale.display(date));

    EventItem::new(label, title, date, date_text, LIST_URL)
        .with_venue(VENUE)
        .with_links(links)
}

impl SourceAdapter for SoraScc {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let page = ctx.fetcher.fetch_text(LIST_URL)?;
        let document = Html::parse_document(&page);
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        for time in document.select(&TIME_SELECTOR) {
            let date_text = base::clean_text(&base::inner_text(time));
            if !base::contains_date(&date_text, date) {
                continue;
            }
            let Some(block) = time.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            result
                .events
                .push(parse_block(block, date_text, ctx, date, label));
        }

        Ok(result.finish())
    }
}
