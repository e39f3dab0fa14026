use std::collections::HashSet;

use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, Times};
use super::{ScrapeContext, SourceAdapter};
use crate::config::SourceConfig;
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "sapporo_community_plaza";
const LIST_URL: &str = "https://www.sapporo-community-plaza.jp/event.php";
const DEFAULT_KIND: u32 = 2;
const FRONT_FLYER_CAPTION: &str = "チラシ表";

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<p class="date">(.*?)</p>.*?<h4 class="txt_b"><a href="([^"]+)">(.*?)</a>"#)
        .expect("plaza entry regex")
});
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("h3.title"));
static DT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("dt"));
static FLYER_IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("img.w.top[src]"));

/// Sapporo Community Plaza; `kind` selects the listing category.
pub struct CommunityPlaza {
    kind: u32,
}

struct Entry {
    date_text: String,
    detail_url: String,
    title: String,
}

impl CommunityPlaza {
    pub fn from_config(source: &SourceConfig) -> Self {
        Self {
            kind: source.param_u32("kind").unwrap_or(DEFAULT_KIND),
        }
    }

    fn list_url(&self) -> String {
        format!("{LIST_URL}?kind={}", self.kind)
    }

    fn parse_listing(&self, html: &str, page_url: &str, date: NaiveDate) -> Vec<Entry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for caps in ENTRY_RE.captures_iter(html) {
            let date_text = base::strip_markup(&caps[1]);
            if !base::contains_date(&date_text, date) {
                continue;
            }
            let detail_url = match base::absolute_url(page_url, &caps[2]) {
                Some(url) => url,
                None => continue,
            };
            if !seen.insert(detail_url.clone()) {
                continue;
            }
            entries.push(Entry {
                date_text: base::first_line(&date_text),
                detail_url,
                title: base::clean_text(&base::strip_markup(&caps[3])),
            });
        }
        entries
    }

    fn parse_detail(
        &self,
        html: &str,
        detail_url: &str,
        ctx: &ScrapeContext<'_>,
        date: NaiveDate,
        label: &str,
    ) -> EventItem {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let title = base::first_text(&root, &TITLE_SELECTOR)
            .map(|text| base::clean_text(&text))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        let schedule = base::dd_by_label(&root, &DT_SELECTOR, "日時")
            .map(base::inner_text)
            .unwrap_or_default();
        let segment = base::schedule_segment(&schedule, date);
        let date_text = segment
            .as_deref()
            .map(base::first_line)
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| ctx.locale.display(date));
        let times = segment.as_deref().map(Times::from_text).unwrap_or_default();

        let venue = base::dd_by_label(&root, &DT_SELECTOR, "会場")
            .map(|dd| base::first_line(&base::inner_text(dd)))
            .filter(|venue| !venue.is_empty());

        let links = base::dd_by_label(&root, &DT_SELECTOR, "チラシダウンロード")
            .map(|dd| base::collect_links(&dd.inner_html(), detail_url))
            .unwrap_or_default();

        let (flyer, caption) = match pick_flyer(&root, detail_url) {
            Some((src, caption)) => (Some(src), caption),
            None => (None, String::new()),
        };
        let alt = if caption.is_empty() {
            format!("{title} フライヤー")
        } else {
            caption
        };

        EventItem::new(label, title, date, date_text, detail_url)
            .with_venue(base::or_not_specified(venue))
            .with_times(times.open, times.start, times.end, times.end_estimated)
            .with_flyer(flyer, alt)
            .with_links(links)
    }
}

/// Captioned images; the front side of the flyer wins when present.
fn pick_flyer(root: &ElementRef<'_>, page_url: &str) -> Option<(String, String)> {
    let candidates: Vec<(String, String)> = root
        .select(&FLYER_IMG_SELECTOR)
        .filter_map(|img| {
            let src = base::absolute_url(page_url, img.value().attr("src")?)?;
            let caption = img
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .next()
                .filter(|el| el.value().name() == "p")
                .map(base::inner_text)
                .map(|text| base::clean_text(&text))?;
            Some((src, caption))
        })
        .collect();

    candidates
        .iter()
        .find(|(_, caption)| caption.contains(FRONT_FLYER_CAPTION))
        .or_else(|| candidates.first())
        .cloned()
}

impl SourceAdapter for CommunityPlaza {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let url = self.list_url();
        let page = ctx.fetcher.fetch_text(&url)?;
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        for entry in self.parse_listing(&page, &url, date) {
            let event = match ctx.fetcher.fetch_text(&entry.detail_url) {
                Ok(detail) => self.parse_detail(&detail, &entry.detail_url, ctx, date, label),
                Err(err) => {
                    result.note_partial_failure(&err);
                    let title = Some(entry.title)
                        .filter(|title| !title.is_empty())
                        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
                    EventItem::new(label, title, date, entry.date_text, entry.detail_url)
                }
            };
            result.events.push(event);
        }

        Ok(result.finish())
    }
}
