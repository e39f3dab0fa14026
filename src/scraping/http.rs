use std::error::Error as StdError;
use std::time::Duration;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::config::HttpSettings;

const MIN_EXTENDED_TIMEOUT: Duration = Duration::from_secs(30);

/// The only way adapters reach the network.
pub trait Fetch: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Certificate,
    Timeout,
    Other,
}

/// What to do after the first attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Same deadline, certificate checks off.
    Insecure,
    /// Same client, longer deadline.
    Extended(Duration),
    /// Certificate failure without the opt-in flag.
    CertificateRefused,
    GiveUp,
}

fn retry_plan(kind: FailureKind, allow_insecure_tls: bool, timeout: Duration) -> Retry {
    match kind {
        FailureKind::Certificate if allow_insecure_tls => Retry::Insecure,
        FailureKind::Certificate => Retry::CertificateRefused,
        FailureKind::Timeout => Retry::Extended(extended_timeout(timeout)),
        FailureKind::Other => Retry::GiveUp,
    }
}

fn extended_timeout(timeout: Duration) -> Duration {
    timeout.saturating_mul(2).max(MIN_EXTENDED_TIMEOUT)
}

struct Body {
    charset: Option<String>,
    bytes: Vec<u8>,
}

pub struct HttpTransport {
    settings: HttpSettings,
    client: Client,
    insecure: OnceCell<Client>,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = build_client(&settings, false)?;
        Ok(Self {
            settings,
            client,
            insecure: OnceCell::new(),
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    fn insecure_client(&self) -> Result<&Client> {
        self.insecure
            .get_or_try_init(|| build_client(&self.settings, true))
    }

    fn get(&self, url: &str) -> Result<Body> {
        let timeout = self.timeout();
        let err = match attempt(&self.client, url, timeout) {
            Ok(body) => return Ok(body),
            Err(err) => err,
        };
        match retry_plan(failure_kind(&err), self.settings.allow_insecure_tls, timeout) {
            Retry::Insecure => {
                warn!(%url, error = %err, "certificate validation failed; retrying without verification");
                attempt(self.insecure_client()?, url, timeout)
                    .with_context(|| format!("insecure retry failed for {url}"))
            }
            Retry::Extended(extended) => {
                warn!(%url, ?extended, "request timed out; retrying with a longer deadline");
                attempt(&self.client, url, extended)
                    .with_context(|| format!("request timed out twice for {url}"))
            }
            Retry::CertificateRefused => Err(err).with_context(|| {
                format!(
                    "certificate validation failed for {url} (pass --allow-insecure-tls to retry without verification)"
                )
            }),
            Retry::GiveUp => Err(err).with_context(|| format!("request failed for {url}")),
        }
    }
}

impl Fetch for HttpTransport {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.get(url)?;
        debug!(%url, bytes = body.bytes.len(), charset = ?body.charset, "fetched page");
        Ok(decode_declared(&body.bytes, body.charset.as_deref()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let body = self.get(url)?;
        debug!(%url, bytes = body.bytes.len(), "fetched bytes");
        Ok(body.bytes)
    }
}

fn build_client(settings: &HttpSettings, accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .user_agent(settings.user_agent.clone())
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .context("unable to build http client")
}

fn attempt(client: &Client, url: &str, timeout: Duration) -> reqwest::Result<Body> {
    let response = client.get(url).timeout(timeout).send()?.error_for_status()?;
    let charset = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(charset_from_content_type);
    let bytes = response.bytes()?.to_vec();
    Ok(Body { charset, bytes })
}

fn failure_kind(err: &reqwest::Error) -> FailureKind {
    if is_certificate_error(err) {
        FailureKind::Certificate
    } else if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Other
    }
}

/// rustls reports certificate problems somewhere down the source chain.
fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(inner) = source {
        if inner.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        source = inner.source();
    }
    false
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Decodes with the server-declared charset, or lossy UTF-8 without one.
pub fn decode_declared(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.and_then(|label| Encoding::for_label(label.as_bytes())) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Tries each candidate encoding strictly, in order, before falling back to
/// lossy UTF-8.
pub fn decode_bytes(bytes: &[u8], candidates: &[&'static Encoding]) -> String {
    for encoding in candidates {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}
