use chrono::NaiveDate;

pub const NOT_SPECIFIED: &str = "記載なし";
pub const NO_FLYER: &str = "フライヤーなし（掲載なし）";
pub const NO_MATCHING_EVENTS: &str = "該当イベントなし";
pub const UNKNOWN_TITLE: &str = "公演名不明";
pub const UNSUPPORTED_SOURCE: &str = "未対応ソース";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkItem {
    pub label: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventItem {
    pub site: String,
    pub title: String,
    pub date_iso: String,
    pub date_text: String,
    pub venue: String,
    pub open_time: String,  // HH:MM or NOT_SPECIFIED
    pub start_time: String, // HH:MM or NOT_SPECIFIED
    pub end_time: String,   // HH:MM or NOT_SPECIFIED
    pub end_estimated: bool,
    pub url: String,
    pub flyer_image: String,
    pub flyer_alt: String,
    pub flyer_missing: String,
    pub links: Vec<LinkItem>,
}

impl EventItem {
    /// Starts an event with every optional field at its sentinel value.
    pub fn new(
        site: &str,
        title: impl Into<String>,
        date: NaiveDate,
        date_text: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            site: site.to_string(),
            title: title.into(),
            date_iso: date.format("%Y-%m-%d").to_string(),
            date_text: date_text.into(),
            venue: NOT_SPECIFIED.to_string(),
            open_time: NOT_SPECIFIED.to_string(),
            start_time: NOT_SPECIFIED.to_string(),
            end_time: NOT_SPECIFIED.to_string(),
            end_estimated: false,
            url: url.into(),
            flyer_image: String::new(),
            flyer_alt: String::new(),
            flyer_missing: NO_FLYER.to_string(),
            links: Vec::new(),
        }
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        let venue = venue.into();
        if !venue.trim().is_empty() {
            self.venue = venue;
        }
        self
    }

    pub fn with_times(
        mut self,
        open: Option<String>,
        start: Option<String>,
        end: Option<String>,
        end_estimated: bool,
    ) -> Self {
        self.end_estimated = end_estimated && end.is_some();
        self.open_time = open.unwrap_or_else(|| NOT_SPECIFIED.to_string());
        self.start_time = start.unwrap_or_else(|| NOT_SPECIFIED.to_string());
        self.end_time = end.unwrap_or_else(|| NOT_SPECIFIED.to_string());
        self
    }

    /// Sets the flyer image, keeping `flyer_missing` non-empty exactly when
    /// there is no image.
    pub fn with_flyer(mut self, image: Option<String>, alt: impl Into<String>) -> Self {
        match image.filter(|src| !src.trim().is_empty()) {
            Some(src) => {
                self.flyer_image = src;
                self.flyer_alt = alt.into();
                self.flyer_missing.clear();
            }
            None => {
                self.flyer_image.clear();
                self.flyer_alt.clear();
                if self.flyer_missing.is_empty() {
                    self.flyer_missing = NO_FLYER.to_string();
                }
            }
        }
        self
    }

    pub fn with_flyer_missing(mut self, text: impl Into<String>) -> Self {
        if self.flyer_image.is_empty() {
            self.flyer_missing = text.into();
        }
        self
    }

    pub fn with_links(mut self, links: Vec<LinkItem>) -> Self {
        self.links = links;
        self
    }
}

#[derive(Clone, Debug)]
pub struct SiteResult {
    pub key: String,
    pub label: String,
    pub date: NaiveDate,
    pub events: Vec<EventItem>,
    pub note: String,
}

impl SiteResult {
    pub fn new(key: &str, label: &str, date: NaiveDate) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            date,
            events: Vec::new(),
            note: String::new(),
        }
    }

    /// A result that only explains why the source produced nothing.
    pub fn failed(key: &str, label: &str, date: NaiveDate, note: impl Into<String>) -> Self {
        let mut result = Self::new(key, label, date);
        result.note = note.into();
        result
    }

    /// Records a per-event enrichment failure without dropping the event.
    pub fn note_partial_failure(&mut self, err: &anyhow::Error) {
        self.note = format!("一部取得失敗: {err:#}");
    }

    /// Applies the empty-result note once an adapter has finished matching.
    pub fn finish(mut self) -> Self {
        if self.events.is_empty() && self.note.is_empty() {
            self.note = NO_MATCHING_EVENTS.to_string();
        }
        self
    }

    pub fn is_partial(&self) -> bool {
        !self.events.is_empty() && !self.note.is_empty()
    }
}
