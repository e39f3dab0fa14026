use std::cmp::Ordering;

use crate::models::{EventItem, SiteResult};
use crate::scraping::base::is_hhmm;

/// Sorts after every real clock time.
pub const SORT_SENTINEL: &str = "99:99";

pub fn effective_start(event: &EventItem) -> &str {
    if is_hhmm(&event.start_time) {
        &event.start_time
    } else {
        SORT_SENTINEL
    }
}

fn compare_events(a: &EventItem, b: &EventItem) -> Ordering {
    (a.date_iso.as_str(), effective_start(a), a.title.as_str()).cmp(&(
        b.date_iso.as_str(),
        effective_start(b),
        b.title.as_str(),
    ))
}

/// Stable ascending sort by date, start time, then title.
pub fn sort_events(events: &mut [EventItem]) {
    events.sort_by(compare_events);
}

pub fn site_order_key(site: &SiteResult) -> (String, String, String) {
    match site.events.iter().min_by(|a, b| compare_events(a, b)) {
        Some(first) => (
            first.date_iso.clone(),
            effective_start(first).to_string(),
            site.label.clone(),
        ),
        None => (
            SORT_SENTINEL.to_string(),
            SORT_SENTINEL.to_string(),
            site.label.clone(),
        ),
    }
}

/// Sorts each site's events, then the sites by their earliest event.
pub fn order_sites(mut sites: Vec<SiteResult>) -> Vec<SiteResult> {
    for site in &mut sites {
        sort_events(&mut site.events);
    }
    sites.sort_by_cached_key(site_order_key);
    sites
}

/// Every event across all sites in one sorted list.
pub fn merged_events(sites: &[SiteResult]) -> Vec<EventItem> {
    let mut events: Vec<EventItem> = sites
        .iter()
        .flat_map(|site| site.events.iter().cloned())
        .collect();
    sort_events(&mut events);
    events
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::NOT_SPECIFIED;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn event(title: &str, start: Option<&str>) -> EventItem {
        EventItem::new("site", title, date(), "2025年5月1日", "https://example.jp/")
            .with_times(None, start.map(str::to_string), None, false)
    }

    fn titles(events: &[EventItem]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn orders_by_start_then_title() {
        let mut events = vec![
            event("夜公演", Some("19:00")),
            event("未定B", None),
            event("昼公演", Some("13:00")),
            event("未定A", None),
            event("同時刻B", Some("13:00")),
        ];
        sort_events(&mut events);
        assert_eq!(
            titles(&events),
            vec!["同時刻B", "昼公演", "夜公演", "未定A", "未定B"]
        );
        assert_eq!(effective_start(&events[3]), SORT_SENTINEL);
        assert_eq!(events[3].start_time, NOT_SPECIFIED);
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let base = vec![
            event("c", Some("18:30")),
            event("a", None),
            event("b", Some("09:00")),
            event("d", Some("18:30")),
        ];
        let mut expected = base.clone();
        sort_events(&mut expected);

        let mut reversed: Vec<_> = base.iter().rev().cloned().collect();
        sort_events(&mut reversed);
        assert_eq!(reversed, expected);

        let mut rotated = base.clone();
        rotated.rotate_left(2);
        sort_events(&mut rotated);
        assert_eq!(rotated, expected);

        let mut again = expected.clone();
        sort_events(&mut again);
        assert_eq!(again, expected);
    }

    #[test]
    fn empty_sites_go_last_by_label() {
        let mut late = SiteResult::new("b", "B会場", date());
        late.events.push(event("夜", Some("19:00")));
        let mut early = SiteResult::new("c", "C会場", date());
        early.events.push(event("未定", None));
        early.events.push(event("朝", Some("10:00")));
        let empty_z = SiteResult::new("z", "Z会場", date()).finish();
        let empty_a = SiteResult::new("a", "A会場", date()).finish();

        let ordered = order_sites(vec![empty_z, late, empty_a, early]);
        let labels: Vec<&str> = ordered.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["C会場", "B会場", "A会場", "Z会場"]);
        assert_eq!(titles(&ordered[0].events), vec!["朝", "未定"]);
    }

    #[test]
    fn merges_all_sites() {
        let mut one = SiteResult::new("a", "A", date());
        one.events.push(event("x", Some("20:00")));
        let mut two = SiteResult::new("b", "B", date());
        two.events.push(event("y", Some("08:00")));
        assert_eq!(titles(&merged_events(&[one, two])), vec!["y", "x"]);
    }
}
