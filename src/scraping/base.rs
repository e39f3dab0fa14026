use std::ops::Range;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{ElementRef, Selector};

use crate::models::{LinkItem, NOT_SPECIFIED};

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t\r\n ]+").expect("whitespace regex"));
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br regex"));
static PARA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").expect("paragraph regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static JP_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{4})\s*年\s*([0-9]{1,2})\s*月\s*([0-9]{1,2})\s*日").expect("jp date regex")
});
/// Any date marker, with or without the year.
static DATE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[0-9]{4}\s*年\s*)?[0-9]{1,2}\s*月\s*[0-9]{1,2}\s*日")
        .expect("date marker regex")
});
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,7});")
        .expect("entity regex")
});
static HHMM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,2}):([0-9]{2})").expect("hh:mm regex"));
static ESTIMATED_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)終演.*予定|予定.*終演").expect("estimated end regex"));
static STRICT_HHMM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{2}):([0-9]{2})$").expect("strict hh:mm regex"));
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]+href=["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("anchor regex")
});

const SEGMENT_MAX_LINES: usize = 6;

pub const OPEN_LABEL: &str = "開場";
pub const START_LABEL: &str = "開演";
pub const END_LABEL: &str = "終演";

/// Collapses runs of ASCII whitespace (newlines included) into one space.
pub fn clean_text(input: &str) -> String {
    WS_RE.replace_all(input, " ").trim().to_string()
}

/// Turns an HTML snippet into plain text while keeping its line structure:
/// `<br>` and paragraph boundaries become newlines before tags are dropped.
pub fn strip_markup(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let text = BR_RE.replace_all(html, "\n");
    let text = PARA_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = unescape_entities(&text).replace('\u{a0}', " ");
    text.split('\n')
        .map(clean_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "yen" => '¥',
        "copy" => '©',
        "reg" => '®',
        "times" => '×',
        "middot" => '·',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '\u{2014}',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        _ => return None,
    };
    Some(ch)
}

fn decode_entity(body: &str) -> Option<char> {
    match body.strip_prefix('#') {
        Some(num) => {
            let hex = num.strip_prefix('x').or_else(|| num.strip_prefix('X'));
            let code = match hex {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
        None => named_entity(body),
    }
}

/// Decodes character references only; anything else, stray `<` included,
/// is left as it is. Unknown references stay verbatim.
pub fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| match decode_entity(&caps[1]) {
            Some(ch) => ch.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn first_line(text: &str) -> String {
    text.split('\n').next().unwrap_or_default().trim().to_string()
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    strip_markup(&element.inner_html())
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// The first `<dd>` following an element, usually the value of a `<dt>`.
pub fn next_dd<'a>(dt: ElementRef<'a>) -> Option<ElementRef<'a>> {
    dt.next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|el| el.value().name() == "dd")
}

/// Finds `<dt>label</dt><dd>..</dd>` and returns the `<dd>` element.
pub fn dd_by_label<'a>(
    scope: &ElementRef<'a>,
    dt_selector: &Selector,
    label: &str,
) -> Option<ElementRef<'a>> {
    scope
        .select(dt_selector)
        .find(|dt| clean_text(&dt.text().collect::<String>()) == label)
        .and_then(next_dd)
}

pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub fn build_link(label_html: &str, url: String) -> LinkItem {
    LinkItem {
        label: clean_text(&strip_markup(label_html)),
        url,
    }
}

/// Every `<a href>` in an HTML snippet, resolved against `base`.
pub fn collect_links(html: &str, base: &str) -> Vec<LinkItem> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let url = absolute_url(base, &caps[1])?;
            Some(build_link(&caps[2], url))
        })
        .collect()
}

/// Parses `2025年5月1日`; spaces are allowed on either side of each unit.
pub fn parse_jp_date(text: &str) -> Option<NaiveDate> {
    let caps = JP_DATE_RE.captures(text)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn date_pattern(date: NaiveDate) -> Regex {
    Regex::new(&format!(
        r"{}\s*年\s*{}\s*月\s*{}\s*日",
        date.year(),
        date.month(),
        date.day()
    ))
    .expect("date pattern regex")
}

/// `5月1日` not preceded by another digit; group 1 is the marker.
fn month_day_pattern(date: NaiveDate) -> Regex {
    Regex::new(&format!(
        r"(?:^|[^0-9])({}\s*月\s*{}\s*日)",
        date.month(),
        date.day()
    ))
    .expect("month/day pattern regex")
}

/// Where `date` is named in `text`: the full marker first, then `M月D日`.
fn find_date_marker(text: &str, date: NaiveDate) -> Option<Range<usize>> {
    if let Some(found) = date_pattern(date).find(text) {
        return Some(found.range());
    }
    month_day_pattern(date)
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|found| found.range())
}

pub fn contains_date(text: &str, date: NaiveDate) -> bool {
    date_pattern(date).is_match(text)
}

/// The part of a multi-date text that belongs to `date`: from that date's
/// marker up to the next date marker, at most a few lines.
pub fn date_segment(text: &str, date: NaiveDate) -> Option<String> {
    let marker = find_date_marker(text, date)?;
    let rest = &text[marker.start..];
    let marker_len = marker.len();
    let end = DATE_MARKER_RE
        .find(&rest[marker_len..])
        .map(|next| marker_len + next.start())
        .unwrap_or(rest.len());
    let segment = rest[..end]
        .split('\n')
        .take(SEGMENT_MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    Some(segment)
}

/// Text to read times from for `date`: its segment, or the whole block when
/// the block names at most one date. `None` when other dates are listed but
/// `date` is not, so no other day's times are borrowed.
pub fn schedule_segment(text: &str, date: NaiveDate) -> Option<String> {
    date_segment(text, date)
        .or_else(|| (DATE_MARKER_RE.find_iter(text).count() <= 1).then(|| text.to_string()))
}

/// Finds a clock time next to `label`: `18:30開場` first, then `開場 18:30`.
pub fn extract_time(text: &str, label: &str) -> Option<String> {
    let label = regex::escape(label);
    let patterns = [
        format!(r"([0-9]{{1,2}}:[0-9]{{2}})\s*{label}"),
        format!(r"{label}[^0-9]*([0-9]{{1,2}}:[0-9]{{2}})"),
    ];
    patterns.iter().find_map(|pattern| {
        Regex::new(pattern)
            .ok()?
            .captures(text)
            .map(|caps| caps[1].to_string())
    })
}

/// Strict `HH:MM`; a single-digit minute or out-of-range value is rejected.
pub fn normalize_hhmm(value: &str) -> Option<String> {
    let caps = HHMM_RE.captures(value)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

pub fn extract_any_hhmm(text: &str) -> Option<String> {
    HHMM_RE
        .find(text)
        .and_then(|m| normalize_hhmm(m.as_str()))
}

pub fn labeled_time(text: &str, label: &str) -> Option<String> {
    extract_time(text, label).and_then(|token| normalize_hhmm(&token))
}

pub fn is_hhmm(value: &str) -> bool {
    STRICT_HHMM_RE
        .captures(value)
        .map(|caps| {
            let hour: u32 = caps[1].parse().unwrap_or(99);
            let minute: u32 = caps[2].parse().unwrap_or(99);
            hour <= 23 && minute <= 59
        })
        .unwrap_or(false)
}

pub fn is_end_estimated(text: &str) -> bool {
    ESTIMATED_END_RE.is_match(text)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Times {
    pub open: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub end_estimated: bool,
}

impl Times {
    pub fn from_text(text: &str) -> Self {
        Self {
            open: labeled_time(text, OPEN_LABEL),
            start: labeled_time(text, START_LABEL),
            end: labeled_time(text, END_LABEL),
            end_estimated: is_end_estimated(text),
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self::from_text(&strip_markup(html))
    }
}

pub fn or_not_specified(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

pub fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}
