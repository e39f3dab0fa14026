use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;

const JA_WEEKDAYS: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];

/// Timezone and weekday names used to resolve "today" and to print dates
/// the way the source sites write them.
#[derive(Clone, Copy, Debug)]
pub struct DateLocale {
    pub timezone: Tz,
    pub weekdays: [&'static str; 7],
}

impl Default for DateLocale {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Tokyo,
            weekdays: JA_WEEKDAYS,
        }
    }
}

impl DateLocale {
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// `2025年5月1日`
    pub fn compact(&self, date: NaiveDate) -> String {
        format!("{}年{}月{}日", date.year(), date.month(), date.day())
    }

    /// `2025年5月1日（木）`
    pub fn display(&self, date: NaiveDate) -> String {
        let weekday = self.weekdays[date.weekday().num_days_from_monday() as usize];
        format!("{}（{}）", self.compact(date), weekday)
    }
}
