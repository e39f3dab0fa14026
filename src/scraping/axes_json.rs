use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use tracing::warn;

use super::base;
use super::{ScrapeContext, SourceAdapter};
use crate::models::{EventItem, SiteResult};

pub const SOURCE_TYPE: &str = "axes";
const FEED_URL: &str = "https://www.axes.or.jp/event_calendar/event.json";
const PAGE_URL: &str = "https://www.axes.or.jp/event_calendar/index.php";
const VENUE: &str = "アクセスサッポロ";
const UNKNOWN_EVENT: &str = "催事名不明";
const STALE_FEED_NOTE: &str =
    "月別イベントデータを自動取得できません（JS描画/提供JSON未更新の可能性）";

pub struct Axes;

/// Calendar numbers come as JSON numbers or numeric strings.
fn as_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn load_feed(ctx: &ScrapeContext<'_>) -> Result<Value> {
    let raw = ctx.fetcher.fetch_text(FEED_URL)?;
    Ok(serde_json::from_str(&raw)?)
}

fn events_for_day(
    feed: &Value,
    ctx: &ScrapeContext<'_>,
    date: NaiveDate,
    label: &str,
) -> Vec<EventItem> {
    let same_month = as_number(feed.get("year")) == Some(date.year() as u32)
        && as_number(feed.get("month")) == Some(date.month());
    if !same_month {
        return Vec::new();
    }
    let Some(entries) = feed.get("event").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| as_number(entry.get("day")) == Some(date.day()))
        .map(|entry| {
            let title = entry
                .get("title")
                .and_then(Value::as_str)
                .map(base::clean_text)
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNKNOWN_EVENT.to_string());
            EventItem::new(label, title, date, ctx.locale.display(date), PAGE_URL)
                .with_venue(VENUE)
        })
        .collect()
}

impl SourceAdapter for Axes {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>, date: NaiveDate, label: &str) -> Result<SiteResult> {
        let feed = match load_feed(ctx) {
            Ok(feed) => feed,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(source = %label, error = %reason, "event calendar unavailable");
                return Ok(SiteResult::failed(
                    SOURCE_TYPE,
                    label,
                    date,
                    format!("取得失敗（event.json）: {reason}"),
                ));
            }
        };

        let mut result = SiteResult::new(SOURCE_TYPE, label, date);
        result.events = events_for_day(&feed, ctx, date, label);
        if result.events.is_empty() {
            result.note = STALE_FEED_NOTE.to_string();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::DateLocale;
    use crate::models::NOT_SPECIFIED;
    use crate::scraping::testing::{may_first, StubFetcher};

    const FEED: &str = r#"{
      "year": "2025",
      "month": 5,
      "event": [
        {"day": 1, "title": "北海道  ギフトショー"},
        {"day": "1", "title": ""},
        {"day": 2, "title": "翌日"},
        {"title": "日付なし"}
      ]
    }"#;

    fn scrape(stub: &StubFetcher) -> SiteResult {
        let locale = DateLocale::default();
        Axes.scrape(&stub.context(&locale), may_first(), "アクセス")
            .expect("axes never errors")
    }

    #[test]
    fn filters_current_month_by_day() {
        let result = scrape(&StubFetcher::new().with_page(FEED_URL, FEED));
        assert!(result.note.is_empty());
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].title, "北海道 ギフトショー");
        assert_eq!(result.events[0].venue, VENUE);
        assert_eq!(result.events[0].url, PAGE_URL);
        assert_eq!(result.events[0].start_time, NOT_SPECIFIED);
        assert_eq!(result.events[1].title, UNKNOWN_EVENT);
    }

    #[test]
    fn stale_month_gets_explanation() {
        let stale = r#"{"year": 2025, "month": 4, "event": [{"day": 1, "title": "x"}]}"#;
        let result = scrape(&StubFetcher::new().with_page(FEED_URL, stale));
        assert!(result.events.is_empty());
        assert_eq!(result.note, STALE_FEED_NOTE);
    }

    #[test]
    fn feed_failure_is_a_note() {
        let result = scrape(&StubFetcher::new());
        assert!(result.events.is_empty());
        assert!(result.note.starts_with("取得失敗（event.json）: "), "{}", result.note);

        let result = scrape(&StubFetcher::new().with_page(FEED_URL, "not json"));
        assert!(result.note.starts_with("取得失敗（event.json）: "), "{}", result.note);
    }
}
