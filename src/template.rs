use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use thiserror::Error;
use tracing::warn;

pub const SITE_BLOCK_START: &str = "<!-- SITE BLOCK START -->";
pub const SITE_BLOCK_END: &str = "<!-- SITE BLOCK END -->";

static DATE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"作成日\s*:\s*YYYY-MM-DD").expect("date placeholder regex"));

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template is missing the `{0}` marker")]
    MarkerMissing(&'static str),
}

/// Byte range of the first marked span, markers included.
fn marked_span(template: &str) -> Result<(usize, usize), TemplateError> {
    let start = template
        .find(SITE_BLOCK_START)
        .ok_or(TemplateError::MarkerMissing(SITE_BLOCK_START))?;
    let after_start = start + SITE_BLOCK_START.len();
    let end = template[after_start..]
        .find(SITE_BLOCK_END)
        .map(|offset| after_start + offset + SITE_BLOCK_END.len())
        .ok_or(TemplateError::MarkerMissing(SITE_BLOCK_END))?;
    Ok((start, end))
}

pub fn validate(template: &str) -> Result<(), TemplateError> {
    marked_span(template).map(|_| ())
}

/// Reads a template and checks its markers before anything is scraped.
pub fn load_template(path: &Path) -> Result<String, TemplateError> {
    if !path.exists() {
        return Err(TemplateError::NotFound(path.to_path_buf()));
    }
    let template = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&template)?;
    Ok(template)
}

/// Stamps the creation date and swaps the first marked span for `fragment`.
pub fn compose(template: &str, fragment: &str, date: NaiveDate) -> Result<String, TemplateError> {
    let stamp = format!("作成日 : {}", date.format("%Y-%m-%d"));
    let stamped = if DATE_PLACEHOLDER_RE.is_match(template) {
        DATE_PLACEHOLDER_RE
            .replace(template, NoExpand(&stamp))
            .into_owned()
    } else {
        warn!("template has no 作成日 placeholder; leaving the date unstamped");
        template.to_string()
    };

    let (start, end) = marked_span(&stamped)?;
    let mut out = String::with_capacity(stamped.len() + fragment.len());
    out.push_str(&stamped[..start]);
    out.push_str(fragment);
    out.push_str(&stamped[end..]);
    Ok(out)
}
