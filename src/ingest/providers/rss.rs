// src/ingest/providers/rss.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::clock::Clock;
use crate::error::FetchError;
use crate::ingest::title::split_title;
use crate::ingest::types::{pub_date, CandidateRecord, FeedSource};
use crate::ingest::{normalize_opt, normalize_text};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "category", default)]
    category: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse an RSS date. RFC 2822 is what feeds are supposed to send; some send
/// RFC 3339 instead.
fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
        .or_else(|| pub_date::parse(ts))
}

/// Result of parsing one feed document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub records: Vec<CandidateRecord>,
    /// Items dropped because they had no usable link.
    pub skipped: usize,
}

/// Parse RSS 2.0 XML into candidate records, in document order.
///
/// `host` is the publisher fallback for titles without a `" - "` suffix.
/// Items without a `pubDate` (or with one we cannot read) are stamped `now`.
pub fn parse_feed(xml: &str, host: Option<&str>, now: DateTime<Utc>) -> Result<ParsedFeed, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut out = ParsedFeed {
        records: Vec::with_capacity(rss.channel.item.len()),
        skipped: 0,
    };
    for it in rss.channel.item {
        let link = it.link.as_deref().map(str::trim).unwrap_or_default();
        if link.is_empty() {
            tracing::debug!(target: "ingest", title = ?it.title, "feed item without link skipped");
            out.skipped += 1;
            continue;
        }

        let raw_title = normalize_text(it.title.as_deref().unwrap_or_default());
        let split = split_title(&raw_title, host);
        let published_at = match it.pub_date.as_deref().and_then(parse_pub_date) {
            Some(ts) => ts,
            None => {
                tracing::debug!(target: "ingest", link, "missing/unreadable pubDate, using ingest time");
                now
            }
        };

        out.records.push(CandidateRecord {
            raw_title,
            display_title: split.headline,
            source_publisher: split.publisher,
            link: link.to_string(),
            published_at,
            description: normalize_opt(it.description.as_deref()),
            author: normalize_opt(it.author.as_deref()),
            tags: it
                .category
                .iter()
                .map(|c| normalize_text(&c.value))
                .filter(|c| !c.is_empty())
                .collect(),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_items_fetched_total").increment(out.records.len() as u64);
    counter!("ingest_items_skipped_total").increment(out.skipped as u64);
    Ok(out)
}

/// RSS feed source: either a live HTTP endpoint or an in-memory fixture.
pub struct RssFeed {
    mode: Mode,
    host: Option<String>,
}

enum Mode {
    Fixture(String),
    Http { url: Url, client: reqwest::Client },
}

impl RssFeed {
    /// Feed backed by a fixed XML document; `host` stands in for the URL host.
    pub fn from_fixture(xml: &str, host: Option<&str>) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            host: host.map(str::to_string),
        }
    }

    pub fn from_url(url: &str, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()?;
        let host = parsed.host_str().map(str::to_string);
        Ok(Self {
            mode: Mode::Http {
                url: parsed,
                client,
            },
            host,
        })
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    async fn download(url: &Url, client: &reqwest::Client) -> Result<String, FetchError> {
        let resp = client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_latest(&self, clock: &dyn Clock) -> Result<Vec<CandidateRecord>, FetchError> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { url, client } => Self::download(url, client).await?,
        };
        let parsed = parse_feed(&body, self.host(), clock.now())?;
        if parsed.skipped > 0 {
            tracing::info!(target: "ingest", skipped = parsed.skipped, "feed items without link ignored");
        }
        Ok(parsed.records)
    }

    fn name(&self) -> &str {
        match &self.mode {
            Mode::Fixture(_) => "rss-fixture",
            Mode::Http { .. } => "rss",
        }
    }
}

/// Replace HTML-only named entities that are not valid XML and would make
/// the XML reader bail.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
