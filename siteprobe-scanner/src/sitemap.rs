//! Sitemap retrieval and parsing.
//!
//! A sitemap is fetched once (no retry, no caching), checked for a successful
//! status and an XML content type, then parsed into a flat list of entries in
//! document order.

use crate::error::SitemapError;
use crate::http::build_client;
use quick_xml::events::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// One `<url>` element of a sitemap `<urlset>`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f32>,
}

pub struct SitemapReader {
    client: Client,
}

impl SitemapReader {
    pub fn new(timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self::with_client(build_client(timeout)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch a sitemap and return the location of every entry, in order.
    pub async fn get_sitemap_urls(&self, sitemap_url: &str) -> Result<Vec<String>, SitemapError> {
        let entries = self.fetch_sitemap_entries(sitemap_url).await?;
        Ok(entries.into_iter().map(|entry| entry.location).collect())
    }

    pub async fn fetch_sitemap_entries(
        &self,
        sitemap_url: &str,
    ) -> Result<Vec<SitemapEntry>, SitemapError> {
        info!("Fetching sitemap {}", sitemap_url);

        let response = self
            .client
            .get(sitemap_url)
            .send()
            .await
            .map_err(|e| SitemapError::Parse(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Fetch {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if !is_xml_content_type(content_type.as_deref()) {
            return Err(SitemapError::ContentType(content_type));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SitemapError::Parse(e.to_string()))?;

        let entries = parse_sitemap(&body)?;
        info!("Sitemap lists {} URLs", entries.len());
        Ok(entries)
    }

    /// HEAD the sitemap URL. Any transport failure is reported as `false`.
    pub async fn validate_sitemap_url(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Sitemap HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Purely syntactic check, no I/O.
pub fn is_valid_sitemap_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

fn is_xml_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("xml"))
        .unwrap_or(false)
}

#[derive(Clone, Copy)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
    Other,
}

impl Field {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"loc" => Field::Loc,
            b"lastmod" => Field::LastMod,
            b"changefreq" => Field::ChangeFreq,
            b"priority" => Field::Priority,
            _ => Field::Other,
        }
    }
}

/// Parse sitemap XML into entries.
///
/// The root element must be `urlset` and it must hold at least one `url`
/// child; a single `url` yields a one-element list exactly like many do.
/// Entries without a `loc` are dropped, and a sitemap where no entry has a
/// `loc` is rejected rather than returned empty.
pub fn parse_sitemap(xml: &str) -> Result<Vec<SitemapEntry>, SitemapError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut saw_urlset = false;
    let mut url_elements = 0usize;
    let mut current: Option<SitemapEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut url_set: Option<UrlSet> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = e.local_name();
                match depth {
                    1 => {
                        if name.as_ref() != b"urlset" {
                            return Err(missing_urlset());
                        }
                        saw_urlset = true;
                    }
                    2 if name.as_ref() == b"url" => {
                        url_elements += 1;
                        current = Some(SitemapEntry::default());
                    }
                    3 if current.is_some() => {
                        field = Some(Field::from_name(name.as_ref()));
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.local_name();
                match depth {
                    0 => {
                        if name.as_ref() != b"urlset" {
                            return Err(missing_urlset());
                        }
                        saw_urlset = true;
                    }
                    1 if name.as_ref() == b"url" => {
                        url_elements += 1;
                        warn!("Skipping empty <url> element");
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if field.is_some() {
                    let unescaped = e.unescape().map_err(|e| SitemapError::Parse(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(ref e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                match depth {
                    3 => {
                        if let (Some(entry), Some(f)) = (current.as_mut(), field.take()) {
                            apply_field(entry, f, text.trim());
                        }
                    }
                    2 => {
                        if let Some(entry) = current.take() {
                            if entry.location.is_empty() {
                                warn!("Skipping <url> element without <loc>");
                            } else {
                                url_set = Some(match url_set {
                                    None => UrlSet::Single(entry),
                                    Some(set) => set.push(entry),
                                });
                            }
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SitemapError::Parse(e.to_string())),
            _ => {}
        }
    }

    if !saw_urlset || url_elements == 0 {
        return Err(missing_urlset());
    }
    let entries = url_set
        .map(UrlSet::into_entries)
        .ok_or_else(|| SitemapError::Format("no url entry has a loc".to_string()))?;

    debug!("Parsed {} sitemap entries", entries.len());
    Ok(entries)
}

/// Shape of the `<url>` children as they appear in the document. Never
/// leaves this module: callers always receive a list.
#[derive(Debug)]
enum UrlSet {
    Single(SitemapEntry),
    Multiple(Vec<SitemapEntry>),
}

impl UrlSet {
    fn push(self, entry: SitemapEntry) -> Self {
        match self {
            UrlSet::Single(first) => UrlSet::Multiple(vec![first, entry]),
            UrlSet::Multiple(mut entries) => {
                entries.push(entry);
                UrlSet::Multiple(entries)
            }
        }
    }

    fn into_entries(self) -> Vec<SitemapEntry> {
        match self {
            UrlSet::Single(entry) => vec![entry],
            UrlSet::Multiple(entries) => entries,
        }
    }
}

fn apply_field(entry: &mut SitemapEntry, field: Field, value: &str) {
    if value.is_empty() {
        return;
    }
    match field {
        Field::Loc => entry.location = value.to_string(),
        Field::LastMod => entry.last_modified = Some(value.to_string()),
        Field::ChangeFreq => entry.change_frequency = Some(value.to_string()),
        Field::Priority => entry.priority = value.parse::<f32>().ok(),
        Field::Other => {}
    }
}

fn missing_urlset() -> SitemapError {
    SitemapError::Format("missing urlset or url entries".to_string())
}
