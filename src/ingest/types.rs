// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::FetchError;

/// One item as read from the feed, before it is compared with the store.
/// `display_title` and `source_publisher` come from the title split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub raw_title: String,
    pub display_title: String,
    pub source_publisher: Option<String>,
    pub link: String, // identity
    pub published_at: DateTime<Utc>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EnrichmentStatus {
    Enriched,
    #[default]
    FallbackOriginal,
}

/// A record as stored in the collection file. Field names are the JSON
/// contract read by the display layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct EnrichedRecord {
    #[serde(rename = "title")]
    pub display_title: String,
    pub raw_title: String,
    pub link: String,
    #[serde(rename = "pubDate", with = "pub_date")]
    pub published_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(rename = "categories", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "publisher", skip_serializing_if = "Option::is_none")]
    pub source_publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    #[serde(rename = "aiNote", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub enrichment_status: EnrichmentStatus,
}

/// Read side of [`EnrichedRecord`]. Older writers used other names for some
/// fields, and some wrote both spellings; each spelling gets its own slot and
/// the current name wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    raw_title: Option<String>,
    link: String,
    #[serde(rename = "pubDate", with = "pub_date")]
    published_at: DateTime<Utc>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    source_publisher: Option<String>,
    #[serde(default)]
    short_title: Option<String>,
    #[serde(default)]
    ai_note: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    enrichment_status: Option<EnrichmentStatus>,
}

/// First non-blank spelling, else whichever spelling was present at all.
fn pick_title(options: [Option<String>; 3]) -> Option<String> {
    let present: Vec<String> = options.into_iter().flatten().collect();
    match present.iter().position(|s| !s.trim().is_empty()) {
        Some(i) => present.into_iter().nth(i),
        None => present.into_iter().next(),
    }
}

impl TryFrom<StoredRecord> for EnrichedRecord {
    type Error = String;

    fn try_from(r: StoredRecord) -> Result<Self, Self::Error> {
        let display_title = pick_title([r.title, r.display_title, r.headline])
            .ok_or_else(|| format!("record {} has no title", r.link))?;
        Ok(Self {
            display_title,
            raw_title: r.raw_title.unwrap_or_default(),
            link: r.link,
            published_at: r.published_at,
            description: r.description,
            author: r.author,
            tags: r.categories.unwrap_or_default(),
            source_publisher: r.publisher.or(r.source_publisher),
            short_title: r.short_title,
            note: r.ai_note.or(r.note),
            enrichment_status: r.enrichment_status.unwrap_or_default(),
        })
    }
}

impl EnrichedRecord {
    pub fn enriched(c: CandidateRecord, short_title: String, note: String) -> Self {
        Self::build(c, Some(short_title), Some(note), EnrichmentStatus::Enriched)
    }

    /// Keeps the headline as the short title and leaves the note empty.
    pub fn fallback(c: CandidateRecord) -> Self {
        let short = c.display_title.clone();
        Self::build(c, Some(short), None, EnrichmentStatus::FallbackOriginal)
    }

    fn build(
        c: CandidateRecord,
        short_title: Option<String>,
        note: Option<String>,
        status: EnrichmentStatus,
    ) -> Self {
        Self {
            display_title: c.display_title,
            raw_title: c.raw_title,
            link: c.link,
            published_at: c.published_at,
            description: c.description,
            author: c.author,
            tags: c.tags,
            source_publisher: c.source_publisher,
            short_title,
            note,
            enrichment_status: status,
        }
    }
}

/// Where candidate records come from. Implementations do not retry; the
/// pipeline owns the retry policy.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self, clock: &dyn Clock) -> Result<Vec<CandidateRecord>, FetchError>;
    fn name(&self) -> &str;
}

/// `pubDate` is written as RFC 3339; older files may carry RFC 2822.
pub mod pub_date {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unparseable pubDate {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let t = raw.trim();
        DateTime::parse_from_rfc3339(t)
            .or_else(|_| DateTime::parse_from_rfc2822(t))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
