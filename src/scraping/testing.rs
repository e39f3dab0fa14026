use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use super::http::Fetch;
use super::ScrapeContext;
use crate::locale::DateLocale;

/// Serves canned bodies by exact URL; any other URL fails like a dead host.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, Vec<u8>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.pages.insert(url.to_string(), body);
        self
    }

    pub fn context<'a>(&'a self, locale: &'a DateLocale) -> ScrapeContext<'a> {
        ScrapeContext {
            fetcher: self,
            locale,
        }
    }
}

impl Fetch for StubFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("request failed for {url}: connection refused"))
    }
}

pub fn may_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date")
}
