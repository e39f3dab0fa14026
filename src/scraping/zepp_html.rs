use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "zepp_sapporo";
const LIST_URL: &str = "https://www.zepp.co.jp/hall/sapporo/schedule/";
const VENUE: &str = "Zepp Sapporo";

// Cards are not wrapped in a common container, so each one runs from its
// opening anchor to the next.
static BLOCK_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<a class="sch-content[^"]*" href="https://www\.zepp\.co\.jp/hall/sapporo/schedule/single/\?rid=[0-9]+">"#,
    )
    .expect("zepp block regex")
});
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})\.([0-9]{1,2})$").expect("month.day regex"));

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("a[href]"));
static YEAR_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".sch-content-date__year"));
static MONTH_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".sch-content-date__month"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".sch-content-img img[src]"));
static PERFORMER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(".sch-content-text__performer"));
static TTL_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".sch-content-text__ttl"));
static SLOT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector(".sch-content-text-date"));
static OPEN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(".sch-content-text-date__open"));
static START_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(".sch-content-text-date__start"));

pub struct ZeppSapporo;

fn month_url(date: NaiveDate) -> String {
    format!("{LIST_URL}?_y={}&_m={}", date.year(), date.month())
}

fn split_blocks(page: &str) -> Vec<&str> {
    let starts: Vec<usize> = BLOCK_START_RE.find_iter(page).map(|m| m.start()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(idx, &start)| {
            let end = starts.get(idx + 1).copied().unwrap_or(page.len());
            &page[start..end]
        })
        .collect()
}

fn block_date(root: &ElementRef<'_>) -> Option<NaiveDate> {
    let year = base::first_text(root, &YEAR_SELECTOR)?.trim().parse().ok()?;
    let month_day = base::first_text(root, &MONTH_SELECTOR)?;
    let caps = MONTH_DAY_RE.captures(month_day.trim())?;
    NaiveDate::from_ymd_opt(year, caps[1].parse().ok()?, caps[2].parse().ok()?)
}

fn block_title(root: &ElementRef<'_>) -> String {
    let performer =
        base::first_text(root, &PERFORMER_SELECTOR).map(|text| base::clean_text(&text));
    let ttl = base::first_text(root, &TTL_SELECTOR).map(|text| base::clean_text(&text));
    match (performer, ttl) {
        (Some(performer), Some(ttl)) if performer != ttl => format!("{performer} / {ttl}"),
        (_, Some(ttl)) => ttl,
        (Some(performer), None) => performer,
        (None, None) => UNKNOWN_TITLE.to_string(),
    }
}

/// Open/start pairs, one per performance slot; a row missing either is skipped.
fn slots(root: &ElementRef<'_>) -> Vec<(String, String)> {
    root.select(&SLOT_SELECTOR)
        .filter_map(|row| {
            let open = base::first_text(&row, &OPEN_SELECTOR)?;
            let start = base::first_text(&row, &START_SELECTOR)?;
            Some((base::normalize_hhmm(&open)?, base::normalize_hhmm(&start)?))
        })
        .collect()
}

fn parse_block(
    block: &str,
    page_url: &str,
    ctx: &ScrapeContext<'_>,
    date: NaiveDate,
    label: &str,
) -> Vec<EventItem> {
    let fragment = Html::parse_fragment(block);
    let root = fragment.root_element();
    if block_date(&root) != Some(date) {
        return Vec::new();
    }

    let title = block_title(&root);
    let url = base::first_attr(&root, &ANCHOR_SELECTOR, "href")
        .and_then(|href| base::absolute_url(page_url, &href))
        .unwrap_or_else(|| page_url.to_string());
    let flyer = base::first_attr(&root, &IMG_SELECTOR, "src")
        .and_then(|src| base::absolute_url(page_url, &src));
    let alt = format!("{title} フライヤー");
    let event = |title: String, open: Option<String>, start: Option<String>| {
        EventItem::new(label, title, date, ctx.locale.display(date), url.clone())
            .with_venue(VENUE)
            .with_times(open, start, None, false)
            .with_flyer(flyer.clone(), alt.clone())
    };

    let slots = slots(&root);
    match slots.len() {
        0 => vec![event(title, None, None)],
        1 => {
            let (open, start) = slots[0].clone();
            vec![event(title, Some(open), Some(start))]
        }
        _ => slots
            .into_iter()
            .enumerate()
            .map(|(idx, (open, start))| {
                event(format!("{title}（{}部）", idx + 1), Some(open), Some(start))
            })
            .collect(),
    }
}

impl SourceAdapter for ZeppSapporo {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let url = month_url(date);
        let page = ctx.fetcher.fetch_text(&url)?;
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);
        for block in split_blocks(&page) {
            result
                .events
                .extend(parse_block(block, &url, ctx, date, label));
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

    const URL: &str = "https://www.zepp.co.jp/hall/sapporo/schedule/?_y=2025&_m=5";

    const PAGE: &str = r#"
    <div class="sch-list">
    <a class="sch-content is-live" href="https://www.zepp.co.jp/hall/sapporo/schedule/single/?rid=111">
      <div class="sch-content-date"><p class="sch-content-date__year">2025</p><p class="sch-content-date__month">5.1</p></div>
      <div class="sch-content-img"><img src="/uploads/111.jpg"></div>
      <div class="sch-content-text">
        <h2 class="sch-content-text__performer">THE BAND</h2>
        <h3 class="sch-content-text__ttl">SPRING TOUR</h3>
        <p class="sch-content-text-date"><span class="sch-content-text-date__open">12:00</span><span class="sch-content-text-date__start">13:00</span></p>
        <p class="sch-content-text-date"><span class="sch-content-text-date__open">17:00</span><span class="sch-content-text-date__start">18:00</span></p>
      </div>
    </a>
    <a class="sch-content" href="https://www.zepp.co.jp/hall/sapporo/schedule/single/?rid=112">
      <div class="sch-content-date"><p class="sch-content-date__year">2025</p><p class="sch-content-date__month">5.1</p></div>
      <div class="sch-content-text">
        <h2 class="sch-content-text__performer">SOLO</h2>
        <h3 class="sch-content-text__ttl">SOLO</h3>
        <p class="sch-content-text-date"><span class="sch-content-text-date__open">18:00</span><span class="sch-content-text-date__start">19:00</span></p>
      </div>
    </a>
    <a class="sch-content" href="https://www.zepp.co.jp/hall/sapporo/schedule/single/?rid=113">
      <div class="sch-content-date"><p class="sch-content-date__year">2025</p><p class="sch-content-date__month">5.1</p></div>
      <div class="sch-content-text"><h3 class="sch-content-text__ttl">時間未定公演</h3></div>
    </a>
    <a class="sch-content" href="https://www.zepp.co.jp/hall/sapporo/schedule/single/?rid=114">
      <div class="sch-content-date"><p class="sch-content-date__year">2025</p><p class="sch-content-date__month">5.11</p></div>
      <div class="sch-content-text"><h3 class="sch-content-text__ttl">別日</h3></div>
    </a>
    </div>
    "#;

    #[test]
    fn expands_multi_slot_days() {
        let stub = StubFetcher::new().with_page(URL, PAGE);
        let locale = DateLocale::default();
        let result = ZeppSapporo
            .scrape(&stub.context(&locale), may_first(), "Zepp")
            .expect("scrape");

        let titles: Vec<&str> = result.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "THE BAND / SPRING TOUR（1部）",
                "THE BAND / SPRING TOUR（2部）",
                "SOLO",
                "時間未定公演",
            ]
        );

        let matinee = &result.events[0];
        assert_eq!(matinee.open_time, "12:00");
        assert_eq!(matinee.start_time, "13:00");
        assert_eq!(matinee.venue, VENUE);
        assert_eq!(
            matinee.url,
            "https://www.zepp.co.jp/hall/sapporo/schedule/single/?rid=111"
        );
        assert_eq!(matinee.flyer_image, "https://www.zepp.co.jp/uploads/111.jpg");
        assert_eq!(matinee.flyer_alt, "THE BAND / SPRING TOUR フライヤー");
        assert_eq!(result.events[1].start_time, "18:00");
        assert_eq!(result.events[2].start_time, "19:00");
        assert_eq!(result.events[3].start_time, NOT_SPECIFIED);
    }

    #[test]
    fn no_cards_for_the_day() {
        let stub = StubFetcher::new().with_page(URL, "<div class=\"sch-list\"></div>");
        let locale = DateLocale::default();
        let result = ZeppSapporo
            .scrape(&stub.context(&locale), may_first(), "Zepp")
            .expect("scrape");
        assert_eq!(result.note, NO_MATCHING_EVENTS);
    }
}
