use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult, UNKNOWN_TITLE};

pub const SOURCE_TYPE: &str = "wess";
const POSTS_URL: &str = "https://wess.jp/wp-json/posts?filter[posts_per_page]=500";
const SITE_URL: &str = "https://wess.jp/";

pub struct Wess;

/// Meta values arrive as strings or bare numbers depending on the field.
fn meta_text(meta: &Value, key: &str) -> String {
    match meta.get(key) {
        Some(Value::String(text)) => base::clean_text(text),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn post_title(post: &Value) -> String {
    let raw = match post.get("title") {
        Some(Value::String(text)) => text.as_str(),
        Some(Value::Object(obj)) => obj
            .get("rendered")
            .and_then(Value::as_str)
            .unwrap_or_default(),
        _ => "",
    };
    base::clean_text(&base::strip_markup(raw))
}

fn merged_title(artist: &str, concert: &str, fallback: String) -> String {
    match (artist.is_empty(), concert.is_empty()) {
        (false, false) if artist != concert => format!("{artist} / {concert}"),
        (_, false) => concert.to_string(),
        (false, true) => artist.to_string(),
        (true, true) if !fallback.is_empty() => fallback,
        _ => UNKNOWN_TITLE.to_string(),
    }
}

fn event_from_post(
    post: &Value,
    ctx: &ScrapeContext<'_>,
    date: NaiveDate,
    label: &str,
) -> EventItem {
    let meta = post.get("meta").unwrap_or(&Value::Null);
    let title = merged_title(
        &meta_text(meta, "artist"),
        &meta_text(meta, "concerttitle"),
        post_title(post),
    );
    let url = post
        .get("link")
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .unwrap_or(SITE_URL);
    let venue = Some(meta_text(meta, "kaijo")).filter(|venue| !venue.is_empty());
    let flyer = Some(meta_text(meta, "thumbnail_url")).filter(|src| !src.is_empty());
    let alt = format!("{title} フライヤー");

    EventItem::new(label, title, date, ctx.locale.display(date), url)
        .with_venue(base::or_not_specified(venue))
        .with_times(
            base::normalize_hhmm(&meta_text(meta, "kaijojikan")),
            base::normalize_hhmm(&meta_text(meta, "kaienjikan")),
            None,
            false,
        )
        .with_flyer(flyer, alt)
}

impl SourceAdapter for Wess {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let raw = ctx.fetcher.fetch_text(POSTS_URL)?;
        let posts: Vec<Value> =
            serde_json::from_str(&raw).context("WESS posts are not a JSON array")?;
        let target = date.format("%Y%m%d").to_string();
        let mut result = SiteResult::new(SOURCE_TYPE, label, date);

        result.events = posts
            .iter()
            .filter(|post| {
                let meta = post.get("meta").unwrap_or(&Value::Null);
                meta_text(meta, "kouenbi") == target
            })
            .map(|post| event_from_post(post, ctx, date, label))
            .collect();

        Ok(result.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::DateLocale;
    use crate::models::{NOT_SPECIFIED, NO_FLYER};
    use crate::scraping::testing::{may_first, StubFetcher};

    const POSTS: &str = r#"[
      {
        "title": "ignored",
        "link": "https://wess.jp/concert/1001/",
        "meta": {
          "kouenbi": "20250501",
          "artist": "THE BAND",
          "concerttitle": "SPRING  TOUR",
          "kaijo": "Zepp Sapporo",
          "kaijojikan": "18:00",
          "kaienjikan": "19:00",
          "thumbnail_url": "https://wess.jp/wp-content/uploads/1001.jpg"
        }
      },
      {
        "title": {"rendered": "Numbered &amp; Solo"},
        "link": "",
        "meta": {"kouenbi": 20250501, "artist": "", "concerttitle": "", "kaienjikan": "9:5"}
      },
      {
        "title": "Same",
        "meta": {"kouenbi": "20250501", "artist": "SOLO", "concerttitle": "SOLO"}
      },
      {
        "title": "Another day",
        "meta": {"kouenbi": "20250502"}
      }
    ]"#;

    #[test]
    fn matches_posts_by_performance_day() {
        let stub = StubFetcher::new().with_page(POSTS_URL, POSTS);
        let locale = DateLocale::default();
        let result = Wess
            .scrape(&stub.context(&locale), may_first(), "WESS")
            .expect("scrape");

        assert_eq!(result.events.len(), 3);
        let band = &result.events[0];
        assert_eq!(band.title, "THE BAND / SPRING TOUR");
        assert_eq!(band.venue, "Zepp Sapporo");
        assert_eq!(band.open_time, "18:00");
        assert_eq!(band.start_time, "19:00");
        assert_eq!(band.url, "https://wess.jp/concert/1001/");
        assert_eq!(band.flyer_image, "https://wess.jp/wp-content/uploads/1001.jpg");
        assert_eq!(band.date_text, "2025年5月1日（木）");

        let numbered = &result.events[1];
        assert_eq!(numbered.title, "Numbered & Solo");
        assert_eq!(numbered.url, SITE_URL);
        assert_eq!(numbered.start_time, NOT_SPECIFIED);
        assert_eq!(numbered.venue, NOT_SPECIFIED);
        assert_eq!(numbered.flyer_missing, NO_FLYER);

        assert_eq!(result.events[2].title, "SOLO");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let stub = StubFetcher::new().with_page(POSTS_URL, "<html>maintenance</html>");
        let locale = DateLocale::default();
        assert!(Wess.scrape(&stub.context(&locale), may_first(), "WESS").is_err());
    }
}
