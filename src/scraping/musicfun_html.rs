use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base::{self, Times};
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "musicfun";
const LIST_URL: &str = "https://musicfun.co.jp/schedule";

static ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<li>\s*<a href="([^"]+)">\s*<img[^>]+src="([^"]+)"[^>]*>\s*<div>\s*<h5>(.*?)</h5>\s*<p class="date">(.*?)</p>\s*<p class="lead">(.*?)</p>"#,
    )
    .expect("musicfun item regex")
});
static MAIN_IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("div.main img[src]"));

pub struct MusicFun;

struct Item {
    detail_url: String,
    thumbnail: Option<String>,
    title: String,
    date_text: String,
    venue: Option<String>,
}

#[derive(Clone, Default)]
struct Detail {
    flyer: Option<String>,
    times: Times,
}

fn parse_listing(html: &str, date: NaiveDate) -> Vec<Item> {
    ITEM_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let date_text = base::strip_markup(&caps[4]);
            if base::parse_jp_date(&date_text) != Some(date) {
                return None;
            }
            Some(Item {
                detail_url: base::absolute_url(LIST_URL, &caps[1])?,
                thumbnail: base::absolute_url(LIST_URL, &caps[2]),
                title: base::clean_text(&base::strip_markup(&caps[3])),
                date_text: base::first_line(&date_text),
                venue: Some(base::first_line(&base::strip_markup(&caps[5])))
                    .filter(|venue| !venue.is_empty()),
            })
        })
        .collect()
}

fn parse_detail(html: &str, detail_url: &str, date: NaiveDate) -> Detail {
    let flyer = {
        let document = Html::parse_document(html);
        base::first_attr(&document.root_element(), &MAIN_IMG_SELECTOR, "src")
            .and_then(|src| base::absolute_url(detail_url, &src))
    };
    let times = base::date_segment(&base::strip_markup(html), date)
        .map(|segment| Times::from_text(&segment))
        .unwrap_or_default();
    Detail { flyer, times }
}

impl SourceAdapter for MusicFun {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let page = ctx.fetcher.fetch_text(LIST_URL)?;
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);
        let mut details: HashMap<String, Detail> = HashMap::new();

        for item in parse_listing(&page, date) {
            let detail = match details.get(&item.detail_url) {
                Some(cached) => cached.clone(),
                None => {
                    let detail = match ctx.fetcher.fetch_text(&item.detail_url) {
                        Ok(html) => parse_detail(&html, &item.detail_url, date),
                        Err(err) => {
                            result.note_partial_failure(&err);
                            Detail::default()
                        }
                    };
                    details.insert(item.detail_url.clone(), detail.clone());
                    detail
                }
            };

            let title = Some(item.title)
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
            let date_text = Some(item.date_text)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| ctx.locale.display(date));
            let alt = format!("{title} フライヤー");
            let times = detail.times;

            result.events.push(
                EventItem::new(label, title, date, date_text, item.detail_url)
                    .with_venue(base::or_not_specified(item.venue))
                    .with_times(times.open, times.start, times.end, times.end_estimated)
                    .with_flyer(detail.flyer.or(item.thumbnail), alt),
            );
        }

        Ok(result.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::DateLocale;
    use crate::models::NOT_SPECIFIED;
    use crate::scraping::testing::{may_first, StubFetcher};

    const LISTING: &str = r#"
    <ul class="schedule">
      <li>
        <a href="/schedule/abc">
          <img src="/thumb/abc.jpg" alt="">
          <div>
            <h5>THE BAND TOUR 2025</h5>
            <p class="date">2025年5月1日（木）</p>
            <p class="lead">Zepp Sapporo<br>（札幌市中央区）</p>
          </div>
        </a>
      </li>
      <li>
        <a href="/schedule/abc">
          <img src="/thumb/abc.jpg" alt="">
          <div>
            <h5>THE BAND TOUR 2025 追加公演</h5>
            <p class="date">2025年5月1日（木）</p>
            <p class="lead">Zepp Sapporo</p>
          </div>
        </a>
      </li>
      <li>
        <a href="/schedule/xyz">
          <img src="/thumb/xyz.jpg" alt="">
          <div>
            <h5>SOLO LIVE</h5>
            <p class="date">2025年5月1日（木）</p>
            <p class="lead">PENNY LANE24</p>
          </div>
        </a>
      </li>
      <li>
        <a href="/schedule/other">
          <img src="/thumb/other.jpg" alt="">
          <div>
            <h5>OTHER DAY</h5>
            <p class="date">2025年5月3日（土）</p>
            <p class="lead">cube garden</p>
          </div>
        </a>
      </li>
    </ul>
    "#;

    const DETAIL: &str = r#"
    <html><body>
    <div class="main"><img src="/flyer/abc.jpg"></div>
    <div class="info">
      2025年4月29日（火・祝）<br>OPEN 17:00 / START 18:00<br>
      2025年5月1日（木）<br>開場 18:00 / 開演 19:00<br>
    </div>
    </body></html>
    "#;

    #[test]
    fn detail_pages_are_fetched_once_and_supply_times() {
        let stub = StubFetcher::new()
            .with_page(LIST_URL, LISTING)
            .with_page("https://musicfun.co.jp/schedule/abc", DETAIL);
        let locale = DateLocale::default();
        let result = MusicFun
            .scrape(&stub.context(&locale), may_first(), "MusicFun")
            .expect("scrape");

        assert_eq!(result.events.len(), 3);
        let band = &result.events[0];
        assert_eq!(band.title, "THE BAND TOUR 2025");
        assert_eq!(band.venue, "Zepp Sapporo");
        assert_eq!(band.open_time, "18:00");
        assert_eq!(band.start_time, "19:00");
        assert_eq!(band.flyer_image, "https://musicfun.co.jp/flyer/abc.jpg");
        assert_eq!(result.events[1].start_time, "19:00");

        let solo = &result.events[2];
        assert_eq!(solo.start_time, NOT_SPECIFIED);
        assert_eq!(solo.flyer_image, "https://musicfun.co.jp/thumb/xyz.jpg");
        assert!(result.is_partial());
    }
}
