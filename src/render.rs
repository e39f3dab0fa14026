use chrono::NaiveDate;
use clap::ValueEnum;

use crate::locale::DateLocale;
use crate::models::{EventItem, SiteResult, NOT_SPECIFIED, NO_FLYER, NO_MATCHING_EVENTS};
use crate::scraping::base::is_hhmm;
use crate::sorting;
use crate::template::{SITE_BLOCK_END, SITE_BLOCK_START};

const GCAL_LABEL: &str = "Googleカレンダーに追加";
const ALL_SOURCES_LABEL: &str = "全サイト横断";
const EMPTY_NOTE_FALLBACK: &str = "対象日の掲載イベントは見つかりませんでした";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    /// One list of every event ordered by start time.
    #[default]
    Global,
    /// One section per source.
    PerSource,
}

pub fn esc(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn slash_date(date_iso: &str) -> String {
    date_iso.replace('-', "/")
}

fn is_iso_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() && value.len() == 10
}

pub fn render_flyer(event: &EventItem) -> String {
    if event.flyer_image.is_empty() {
        let missing = if event.flyer_missing.is_empty() {
            NO_FLYER
        } else {
            &event.flyer_missing
        };
        return format!(r#"<div class="flyer none">{}</div>"#, esc(missing));
    }
    let alt = if event.flyer_alt.is_empty() {
        format!("{} フライヤー", event.title)
    } else {
        event.flyer_alt.clone()
    };
    format!(
        r#"<div class="flyer"><img src="{}" alt="{}"></div>"#,
        esc(&event.flyer_image),
        esc(&alt)
    )
}

/// Only offered when the event can be placed on a calendar exactly.
pub fn render_gcal_button(event: &EventItem) -> Option<String> {
    let placeable =
        is_iso_date(&event.date_iso) && is_hhmm(&event.start_time) && is_hhmm(&event.end_time);
    if !placeable {
        return None;
    }
    Some(format!(
        r##"<a class="btn gcal gcal-btn" href="#" data-title="{}" data-date="{}" data-start="{}" data-end="{}" data-location="{}" data-url="{}">{GCAL_LABEL}</a>"##,
        esc(&event.title),
        esc(&event.date_iso),
        esc(&event.start_time),
        esc(&event.end_time),
        esc(&event.venue),
        esc(&event.url),
    ))
}

pub fn render_links(event: &EventItem) -> String {
    let mut items: Vec<String> = render_gcal_button(event).into_iter().collect();
    items.extend(event.links.iter().map(|link| {
        format!(
            r#"<a class="btn" href="{}" target="_blank" rel="noopener">{}</a>"#,
            esc(&link.url),
            esc(&link.label)
        )
    }));
    if items.is_empty() {
        return String::new();
    }
    format!(r#"<div class="links">{}</div>"#, items.concat())
}

fn or_sentinel(value: &str) -> &str {
    if value.is_empty() {
        NOT_SPECIFIED
    } else {
        value
    }
}

pub fn render_event_card(event: &EventItem) -> String {
    let end = if event.end_estimated && event.end_time != NOT_SPECIFIED {
        format!("{}（予定）", event.end_time)
    } else {
        event.end_time.clone()
    };
    let rows = [
        ("日時", or_sentinel(&event.date_text)),
        ("会場", or_sentinel(&event.venue)),
        ("開場", or_sentinel(&event.open_time)),
        ("開演", or_sentinel(&event.start_time)),
        ("終演", or_sentinel(&end)),
    ];

    let mut html = String::from(r#"<article class="card">"#);
    html.push_str(&render_flyer(event));
    html.push_str(r#"<div class="body">"#);
    html.push_str(&format!(r#"<h3 class="title">{}</h3>"#, esc(&event.title)));
    html.push_str(&format!(
        r#"<div class="chips"><span class="chip">{}</span><span class="chip">{}</span></div>"#,
        esc(&event.site),
        esc(&slash_date(&event.date_iso))
    ));
    html.push_str("<dl>");
    for (term, value) in rows {
        html.push_str(&format!("<dt>{term}</dt><dd>{}</dd>", esc(value)));
    }
    html.push_str(&format!(
        r#"<dt>URL</dt><dd><a href="{}" target="_blank" rel="noopener">詳細ページ</a></dd>"#,
        esc(&event.url)
    ));
    html.push_str("</dl>");
    html.push_str(&render_links(event));
    html.push_str("</div></article>");
    html
}

/// Placeholder for a source that produced nothing, carrying its note.
pub fn render_empty_card(label: &str, note: &str, date: NaiveDate, locale: &DateLocale) -> String {
    let note = if note.is_empty() { EMPTY_NOTE_FALLBACK } else { note };
    format!(
        concat!(
            r#"<article class="card">"#,
            r#"<div class="flyer none">{none}</div>"#,
            r#"<div class="body">"#,
            r#"<h3 class="title">{label}（{display}）</h3>"#,
            r#"<div class="chips"><span class="chip">{label}</span><span class="chip">{slash}</span></div>"#,
            "<dl><dt>状態</dt><dd>{none}</dd><dt>補足</dt><dd>{note}</dd></dl>",
            "</div></article>"
        ),
        none = NO_MATCHING_EVENTS,
        label = esc(label),
        display = esc(&locale.display(date)),
        slash = esc(&slash_date(&date.format("%Y-%m-%d").to_string())),
        note = esc(note),
    )
}

fn section(heading: &str, body: &str) -> String {
    format!(
        r#"<section class="site-block"><h2>{}</h2><div class="grid">{body}</div></section>"#,
        esc(heading)
    )
}

pub fn render_site_block(site: &SiteResult, locale: &DateLocale) -> String {
    let heading = format!("{}（{}）", site.label, locale.display(site.date));
    let mut body = String::new();
    if site.events.is_empty() {
        body.push_str(&render_empty_card(&site.label, &site.note, site.date, locale));
    } else {
        if site.is_partial() {
            body.push_str(&format!(r#"<p class="note">{}</p>"#, esc(&site.note)));
        }
        let mut events = site.events.clone();
        sorting::sort_events(&mut events);
        body.extend(events.iter().map(render_event_card));
    }
    section(&heading, &body)
}

/// Every event in start order, then one placeholder per source that had none.
pub fn render_global_block(date: NaiveDate, sites: &[SiteResult], locale: &DateLocale) -> String {
    let heading = format!("当日イベント一覧（開演順）{}", locale.display(date));
    let events = sorting::merged_events(sites);
    let mut body = String::new();
    if events.is_empty() {
        body.push_str(&render_empty_card(ALL_SOURCES_LABEL, NO_MATCHING_EVENTS, date, locale));
    }
    body.extend(events.iter().map(render_event_card));
    body.extend(
        sites
            .iter()
            .filter(|site| site.events.is_empty())
            .map(|site| render_empty_card(&site.label, &site.note, site.date, locale)),
    );
    section(&heading, &body)
}

/// The replacement for the template's marked span, markers included, so the
/// output can serve as a template again. `sites` must already be ordered.
pub fn render_fragment(
    layout: Layout,
    date: NaiveDate,
    sites: &[SiteResult],
    locale: &DateLocale,
) -> String {
    let body = match layout {
        Layout::Global => render_global_block(date, sites, locale),
        Layout::PerSource => sites
            .iter()
            .map(|site| render_site_block(site, locale))
            .collect(),
    };
    format!("{SITE_BLOCK_START}{body}{SITE_BLOCK_END}")
}
