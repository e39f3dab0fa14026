use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::base::{self, Times};
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, NOT_SPECIFIED};

pub const SOURCE_TYPE: &str = "kitara";
const LIST_URL: &str = "https://www.kitara-sapporo.or.jp/event/index.html";
const NO_PERFORMANCES: &str = "該当する公演はありません";

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("article.card"));
static CARD_DATE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("span.date"));
static CARD_TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("h4.title"));
static DETAIL_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| base::selector(r#"a[href*="event_detail.php?num="]"#));
static THUMB_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("div.thumb img"));
static PLACE_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("b.place"));
/// Site chrome uses classed headings; the performance title is a bare `<h2>`.
static HEADING_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("h2:not([class])"));
static TIME_DT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("dt#d_time"));
static FLYER_DT_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("dt#d_flyer"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| base::selector("img[src]"));

pub struct Kitara;

/// What the monthly list shows for one performance.
#[derive(Debug, Clone)]
struct Card {
    title: String,
    date_text: String,
    detail_url: String,
    venue: Option<String>,
    thumbnail: Option<String>,
}

impl SourceAdapter for Kitara {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let url = list_url(date);
        let page = ctx.fetcher.fetch_text(&url)?;
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        for card in self.parse_listing(&page, &url, date) {
            let event = match ctx.fetcher.fetch_text(&card.detail_url) {
                Ok(detail) => self.parse_detail(&detail, &card, label, date),
                Err(err) => {
                    result.note_partial_failure(&err);
                    card_only_event(&card, label, date)
                }
            };
            result.events.push(event);
        }

        Ok(result.finish())
    }
}

fn list_url(date: NaiveDate) -> String {
    format!("{LIST_URL}?dsp=list&month={}", date.format("%Y-%m"))
}

impl Kitara {
    fn parse_listing(&self, html: &str, page_url: &str, date: NaiveDate) -> Vec<Card> {
        if html.contains(NO_PERFORMANCES) {
            return Vec::new();
        }
        let document = Html::parse_document(html);
        let mut cards = Vec::new();

        for card in document.select(&CARD_SELECTOR) {
            let date_text = match base::first_text(&card, &CARD_DATE_SELECTOR) {
                Some(text) => text,
                None => continue,
            };
            if base::parse_jp_date(&date_text) != Some(date) {
                continue;
            }
            let title = match base::first_text(&card, &CARD_TITLE_SELECTOR) {
                Some(text) => text,
                None => continue,
            };
            let detail_url = match base::first_attr(&card, &DETAIL_LINK_SELECTOR, "href")
                .and_then(|href| base::absolute_url(page_url, &href))
            {
                Some(url) => url,
                None => continue,
            };

            cards.push(Card {
                title,
                date_text: base::first_line(&date_text),
                detail_url,
                venue: base::first_text(&card, &PLACE_SELECTOR),
                thumbnail: base::first_attr(&card, &THUMB_SELECTOR, "src")
                    .and_then(|src| base::absolute_url(page_url, &src)),
            });
        }
        cards
    }

    fn parse_detail(&self, html: &str, card: &Card, label: &str, date: NaiveDate) -> EventItem {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let detail_url = card.detail_url.as_str();

        let title = base::first_text(&root, &HEADING_SELECTOR)
            .map(|text| base::clean_text(&text))
            .unwrap_or_else(|| card.title.clone());

        let time_dd = root.select(&TIME_DT_SELECTOR).next().and_then(base::next_dd);
        let venue = time_dd
            .and_then(|dd| base::first_text(&dd, &PLACE_SELECTOR))
            .or_else(|| card.venue.clone());

        let time_block = time_dd.map(base::inner_text).unwrap_or_default();
        let segment = base::schedule_segment(&time_block, date);
        let date_text = segment
            .as_deref()
            .map(base::first_line)
            .filter(|line| !line.is_empty())
            .or_else(|| Some(card.date_text.clone()).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| NOT_SPECIFIED.to_string());
        let times = segment.as_deref().map(Times::from_text).unwrap_or_default();

        let flyer_dd = root.select(&FLYER_DT_SELECTOR).next().and_then(base::next_dd);
        let flyer = flyer_dd
            .and_then(|dd| base::first_attr(&dd, &IMG_SELECTOR, "src"))
            .and_then(|src| base::absolute_url(detail_url, &src));
        let links = flyer_dd
            .map(|dd| base::collect_links(&dd.inner_html(), detail_url))
            .unwrap_or_default();

        let event = EventItem::new(label, title.clone(), date, date_text, detail_url)
            .with_venue(base::or_not_specified(venue))
            .with_times(times.open, times.start, times.end, times.end_estimated)
            .with_links(links);

        match flyer {
            Some(src) => event.with_flyer(Some(src), format!("{title} フライヤー")),
            None => {
                let thumbnail = card.thumbnail.clone();
                event.with_flyer(thumbnail, format!("{title} 画像"))
            }
        }
    }
}

fn card_only_event(card: &Card, label: &str, date: NaiveDate) -> EventItem {
    EventItem::new(label, card.title.clone(), date, card.date_text.clone(), card.detail_url.clone())
        .with_venue(base::or_not_specified(card.venue.clone()))
        .with_flyer(card.thumbnail.clone(), format!("{} 画像", card.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::DateLocale;
    use crate::models::NO_MATCHING_EVENTS;
    use crate::scraping::testing::{may_first, StubFetcher};

    const LIST: &str = "https://www.kitara-sapporo.or.jp/event/index.html?dsp=list&month=2025-05";
    const DETAIL_1: &str = "https://www.kitara-sapporo.or.jp/event/event_detail.php?num=101";
    const DETAIL_2: &str = "https://www.kitara-sapporo.or.jp/event/event_detail.php?num=102";

    const LISTING: &str = r#"
    <html><body>
    <article class="card">
        <div class="thumb"><img src="/img/event/101.jpg"></div>
        <span class="date">2025年5月1日（木）</span>
        <h4 class="title">春のオルガンコンサート</h4>
        <b class="place">大ホール</b>
        <a href="event_detail.php?num=101">詳細</a>
    </article>
    <article class="card">
        <div class="thumb"><img src="/img/event/102.jpg"></div>
        <span class="date">2025年5月1日（木）</span>
        <h4 class="title">弦楽四重奏の夕べ</h4>
        <b class="place">小ホール</b>
        <a href="event_detail.php?num=102">詳細</a>
    </article>
    <article class="card">
        <span class="date">2025年5月11日（日）</span>
        <h4 class="title">別の日</h4>
        <a href="event_detail.php?num=103">詳細</a>
    </article>
    </body></html>
    "#;

    const DETAIL: &str = r#"
    <html><body>
    <h2>春のオルガン<br>コンサート</h2>
    <dl>
        <dt id="d_time">日時</dt>
        <dd><p>2025年5月1日（木）<br>18:30開場 19:00開演<br>20:45終演予定</p><b class="place">大ホール</b></dd>
        <dt id="d_flyer">チラシ</dt>
        <dd><img src="../flyer/101.jpg"><a href="../flyer/101.pdf">チラシPDF</a></dd>
    </dl>
    </body></html>
    "#;

    #[test]
    fn enriches_cards_from_detail_pages() {
        let stub = StubFetcher::new()
            .with_page(LIST, LISTING)
            .with_page(DETAIL_1, DETAIL)
            .with_page(DETAIL_2, "<html><body><h2>弦楽四重奏の夕べ</h2></body></html>");
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");

        assert!(result.note.is_empty());
        assert_eq!(result.events.len(), 2);

        let organ = &result.events[0];
        assert_eq!(organ.title, "春のオルガン コンサート");
        assert_eq!(organ.date_iso, "2025-05-01");
        assert_eq!(organ.date_text, "2025年5月1日（木）");
        assert_eq!(organ.venue, "大ホール");
        assert_eq!(organ.open_time, "18:30");
        assert_eq!(organ.start_time, "19:00");
        assert_eq!(organ.end_time, "20:45");
        assert!(organ.end_estimated);
        assert_eq!(organ.flyer_image, "https://www.kitara-sapporo.or.jp/flyer/101.jpg");
        assert_eq!(organ.links.len(), 1);
        assert_eq!(organ.links[0].url, "https://www.kitara-sapporo.or.jp/flyer/101.pdf");

        let strings = &result.events[1];
        assert_eq!(strings.venue, "小ホール", "falls back to the card venue");
        assert_eq!(strings.start_time, NOT_SPECIFIED);
        assert_eq!(strings.flyer_image, "https://www.kitara-sapporo.or.jp/img/event/102.jpg");
        assert_eq!(strings.flyer_alt, "弦楽四重奏の夕べ 画像");
    }

    #[test]
    fn title_skips_site_chrome_headings() {
        let detail = r#"<html><body>
            <header><h2 class="site-name">札幌コンサートホール Kitara</h2></header>
            <h2>春のオルガンコンサート</h2>
            </body></html>"#;
        let stub = StubFetcher::new()
            .with_page(LIST, LISTING)
            .with_page(DETAIL_1, detail)
            .with_page(DETAIL_2, DETAIL);
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");
        assert_eq!(result.events[0].title, "春のオルガンコンサート");
    }

    #[test]
    fn year_less_schedule_uses_the_target_day() {
        let detail = r#"<html><body><h2>弦楽四重奏の夕べ</h2><dl>
            <dt id="d_time">日時</dt>
            <dd><p>4月30日（水）13:30開場 14:00開演<br>5月1日（木）18:00開場 18:30開演</p></dd>
            </dl></body></html>"#;
        let stub = StubFetcher::new()
            .with_page(LIST, LISTING)
            .with_page(DETAIL_1, DETAIL)
            .with_page(DETAIL_2, detail);
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");

        let strings = &result.events[1];
        assert_eq!(strings.date_text, "5月1日（木）18:00開場 18:30開演");
        assert_eq!(strings.open_time, "18:00");
        assert_eq!(strings.start_time, "18:30");
    }

    #[test]
    fn other_days_only_falls_back_to_card_date() {
        let detail = r#"<html><body><h2>弦楽四重奏の夕べ</h2><dl>
            <dt id="d_time">日時</dt>
            <dd><p>4月29日（火）14:00開演<br>4月30日（水）18:30開演</p></dd>
            </dl></body></html>"#;
        let stub = StubFetcher::new()
            .with_page(LIST, LISTING)
            .with_page(DETAIL_1, DETAIL)
            .with_page(DETAIL_2, detail);
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");

        let strings = &result.events[1];
        assert_eq!(strings.date_text, "2025年5月1日（木）");
        assert_eq!(strings.start_time, NOT_SPECIFIED);
    }

    #[test]
    fn detail_failure_keeps_listing_event() {
        let stub = StubFetcher::new()
            .with_page(LIST, LISTING)
            .with_page(DETAIL_1, DETAIL);
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");

        assert_eq!(result.events.len(), 2);
        assert!(result.is_partial());
        assert!(result.note.starts_with("一部取得失敗"));
        let fallback = &result.events[1];
        assert_eq!(fallback.title, "弦楽四重奏の夕べ");
        assert_eq!(fallback.url, DETAIL_2);
        assert_eq!(fallback.start_time, NOT_SPECIFIED);
    }

    #[test]
    fn empty_month_banner_means_no_events() {
        let stub = StubFetcher::new().with_page(LIST, "<p>該当する公演はありません</p>");
        let locale = DateLocale::default();
        let result = Kitara
            .scrape(&stub.context(&locale), may_first(), "Kitara")
            .expect("scrape");
        assert!(result.events.is_empty());
        assert_eq!(result.note, NO_MATCHING_EVENTS);
    }
}
