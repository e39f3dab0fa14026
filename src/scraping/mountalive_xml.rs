use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use encoding_rs::{EUC_JP, SHIFT_JIS, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base;
use super::http::decode_bytes;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "mountalive";
const FEED_URL: &str = "http://www.mountalive.com/schedule/schedule.xml";
const SCHEDULE_BASE: &str = "http://www.mountalive.com/schedule/";
const DESCRIPTION_PREFIXES: [&str; 3] = ["公演日", "会場", "出演"];

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<item>(.*?)</item>").expect("item regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("title regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link>(.*?)</link>").expect("link regex"));
static DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<description>(.*?)</description>").expect("description regex"));
static CDATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*<!\[CDATA\[(.*)\]\]>\s*$").expect("cdata regex"));
static PERFORMANCE_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"公演日[：:]\s*([0-9]{4})年([0-9]{1,2})月([0-9]{1,2})日").expect("performance date regex")
});
static VENUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"会場[：:](.+)").expect("venue regex"));
static FEED_IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=['"]([^'"]+)['"]"#).expect("feed image regex"));
static OPEN_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)OPEN\s*/\s*([0-9]{1,2}:[0-9]{2}).*?START\s*/\s*([0-9]{1,2}:[0-9]{2})")
        .expect("open/start regex")
});

static DATE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("#op_st_date"));
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("#op_st_time"));
static HALL_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("#hall_name"));
static SLIDE_IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector("div.swiper-slide img[src]"));

pub struct MountAlive;

/// One `<item>` of the schedule feed.
#[derive(Debug)]
struct FeedItem {
    title: String,
    detail_url: String,
    date: NaiveDate,
    venue: Option<String>,
    flyer: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct Detail {
    date_text: Option<String>,
    open: Option<String>,
    start: Option<String>,
    venue: Option<String>,
    flyer: Option<String>,
}

fn unwrap_cdata(raw: &str) -> Option<&str> {
    CDATA_RE.captures(raw).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Feed fields are either CDATA (raw markup) or entity-escaped markup.
fn field_markup(raw: &str) -> String {
    match unwrap_cdata(raw) {
        Some(inner) => inner.to_string(),
        None => base::unescape_entities(raw),
    }
}

fn parse_item(item: &str) -> Option<FeedItem> {
    let link = LINK_RE.captures(item)?;
    let description = DESCRIPTION_RE.captures(item)?;
    let description = field_markup(&description[1]);
    let text = base::strip_markup(&description);

    let caps = PERFORMANCE_DATE_RE.captures(&text)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;

    let feed_title = TITLE_RE
        .captures(item)
        .map(|caps| base::clean_text(&base::strip_markup(&field_markup(&caps[1]))))
        .filter(|title| !title.is_empty());
    let title = text
        .lines()
        .find(|line| !DESCRIPTION_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
        .map(str::to_string)
        .or(feed_title)
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let detail_url = base::absolute_url(SCHEDULE_BASE, &field_markup(&link[1]))?;
    let venue = VENUE_RE
        .captures(&text)
        .map(|caps| base::clean_text(&caps[1]))
        .filter(|venue| !venue.is_empty());
    let flyer = FEED_IMG_RE
        .captures(&description)
        .and_then(|caps| base::absolute_url(&detail_url, &caps[1]));

    Some(FeedItem {
        title,
        detail_url,
        date,
        venue,
        flyer,
    })
}

fn parse_feed(xml: &str) -> Vec<FeedItem> {
    ITEM_RE
        .captures_iter(xml)
        .filter_map(|caps| parse_item(&caps[1]))
        .collect()
}

fn parse_detail(html: &str, detail_url: &str) -> Detail {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let (open, start) = base::first_text(&root, &TIME_SELECTOR)
        .and_then(|text| {
            let caps = OPEN_START_RE.captures(&text)?;
            Some((base::normalize_hhmm(&caps[1]), base::normalize_hhmm(&caps[2])))
        })
        .unwrap_or_default();

    Detail {
        date_text: base::first_text(&root, &DATE_SELECTOR).map(|text| base::clean_text(&text)),
        open,
        start,
        venue: base::first_text(&root, &HALL_SELECTOR).map(|text| base::clean_text(&text)),
        flyer: base::first_attr(&root, &SLIDE_IMG_SELECTOR, "src")
            .and_then(|src| base::absolute_url(detail_url, &src)),
    }
}

impl SourceAdapter for MountAlive {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let bytes = ctx.fetcher.fetch_bytes(FEED_URL)?;
        let xml = decode_bytes(&bytes, &[EUC_JP, SHIFT_JIS, UTF_8]);
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);
        let mut details: HashMap<String, Detail> = HashMap::new();

        for item in parse_feed(&xml).into_iter().filter(|item| item.date == date) {
            if !details.contains_key(&item.detail_url) {
                let detail = match ctx.fetcher.fetch_text(&item.detail_url) {
                    Ok(html) => parse_detail(&html, &item.detail_url),
                    Err(err) => {
                        result.note_partial_failure(&err);
                        Detail::default()
                    }
                };
                details.insert(item.detail_url.clone(), detail);
            }
            let detail = details.get(&item.detail_url).cloned().unwrap_or_default();

            let date_text = detail
                .date_text
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| ctx.locale.display(date));
            let alt = format!("{} フライヤー", item.title);

            result.events.push(
                EventItem::new(label, item.title, date, date_text, item.detail_url)
                    .with_venue(base::or_not_specified(item.venue.or(detail.venue)))
                    .with_times(detail.open, detail.start, None, false)
                    .with_flyer(item.flyer.or(detail.flyer), alt),
            );
        }

        Ok(result.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::DateLocale;
    use crate::models::{NOT_SPECIFIED, NO_MATCHING_EVENTS};
    use crate::scraping::testing::{may_first, StubFetcher};

    const FEED: &str = r#"<?xml version="1.0" encoding="EUC-JP"?>
<rss version="2.0"><channel>
<item>
  <title>ROCK TOUR</title>
  <link>detail.php?id=501</link>
  <description>&lt;img src='img/501.jpg'&gt;&lt;br&gt;公演日：2025年5月1日(木)&lt;br&gt;ROCK TOUR 2025 札幌公演&lt;br&gt;会場：札幌ファクトリーホール&lt;br&gt;出演：THE ROCKERS</description>
</item>
<item>
  <title><![CDATA[ACOUSTIC NIGHT]]></title>
  <link>detail.php?id=502</link>
  <description><![CDATA[公演日：2025年5月1日(木)<br>会場：cube garden]]></description>
</item>
<item>
  <title>NEXT WEEK</title>
  <link>detail.php?id=503</link>
  <description>公演日：2025年5月8日(木)</description>
</item>
</channel></rss>"#;

    const DETAIL: &str = r#"
    <html><body>
    <p id="op_st_date">2025年5月1日（木）</p>
    <p id='op_st_time'>OPEN / 17:30　START / 18:30</p>
    <p id='hall_name'>Zepp Sapporo</p>
    <div class="swiper-slide"><img src="/upload/501_big.jpg"></div>
    </body></html>
    "#;

    fn euc_jp(text: &str) -> Vec<u8> {
        let (bytes, _, _) = EUC_JP.encode(text);
        bytes.into_owned()
    }

    #[test]
    fn feed_fields_win_and_detail_adds_times() {
        let stub = StubFetcher::new()
            .with_bytes(FEED_URL, euc_jp(FEED))
            .with_page("http://www.mountalive.com/schedule/detail.php?id=501", DETAIL);
        let locale = DateLocale::default();
        let result = MountAlive
            .scrape(&stub.context(&locale), may_first(), "Mount Alive")
            .expect("scrape");

        assert_eq!(result.events.len(), 2);
        let rock = &result.events[0];
        assert_eq!(rock.title, "ROCK TOUR 2025 札幌公演");
        assert_eq!(rock.venue, "札幌ファクトリーホール");
        assert_eq!(rock.flyer_image, "http://www.mountalive.com/schedule/img/501.jpg");
        assert_eq!(rock.open_time, "17:30");
        assert_eq!(rock.start_time, "18:30");
        assert_eq!(rock.date_text, "2025年5月1日（木）");
        assert_eq!(rock.url, "http://www.mountalive.com/schedule/detail.php?id=501");

        let acoustic = &result.events[1];
        assert_eq!(acoustic.title, "ACOUSTIC NIGHT");
        assert_eq!(acoustic.venue, "cube garden");
        assert_eq!(acoustic.start_time, NOT_SPECIFIED);
        assert_eq!(acoustic.date_text, "2025年5月1日（木）");
        assert!(result.is_partial());
    }

    #[test]
    fn detail_image_used_when_feed_has_none() {
        let item = parse_item(
            "<title>X</title><link>detail.php?id=9</link><description>公演日：2025年5月1日</description>",
        )
        .expect("item");
        assert_eq!(item.title, "X");
        assert!(item.flyer.is_none());
        let detail = parse_detail(DETAIL, &item.detail_url);
        assert_eq!(
            detail.flyer.as_deref(),
            Some("http://www.mountalive.com/upload/501_big.jpg")
        );
    }

    #[test]
    fn other_dates_are_ignored() {
        let stub = StubFetcher::new().with_bytes(FEED_URL, euc_jp(FEED));
        let locale = DateLocale::default();
        let date = NaiveDate::from_ymd_opt(2025, 5, 2).expect("date");
        let result = MountAlive
            .scrape(&stub.context(&locale), date, "Mount Alive")
            .expect("scrape");
        assert_eq!(result.note, NO_MATCHING_EVENTS);
    }
}
