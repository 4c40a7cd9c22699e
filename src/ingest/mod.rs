// src/ingest/mod.rs
pub mod merge;
pub mod providers;
pub mod rank;
pub mod title;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// Hard ceiling on the number of records kept in the collection.
pub const MAX_ITEMS: usize = 1000;

/// One-time metrics registration (so series carry descriptions when exported).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_fetched_total", "Items parsed from the feed.");
        describe_counter!(
            "ingest_items_skipped_total",
            "Feed items skipped because they had no link."
        );
        describe_counter!(
            "ingest_items_added_total",
            "Items newly added to the collection."
        );
        describe_counter!(
            "ingest_items_dropped_total",
            "Items dropped by the capacity bound."
        );
        describe_counter!("ingest_fetch_errors_total", "Feed fetch/parse failures.");
        describe_counter!("ingest_runs_total", "Completed runs by outcome.");
        describe_counter!("enrich_calls_total", "Enrichment calls attempted.");
        describe_counter!(
            "enrich_fallback_total",
            "Records stored with their original title after a failed enrichment."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("enrich_call_ms", "Enrichment call latency in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last finished."
        );
    });
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (descriptions are frequently escaped HTML)
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| {
        regex::Regex::new(r"(?is)</?[a-z][^>]*>").expect("static tag regex")
    });
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace (incl. ideographic space)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{3000}]+").expect("static ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 4) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Like [`normalize_text`] but maps an empty result to `None`.
pub fn normalize_opt(s: Option<&str>) -> Option<String> {
    s.map(normalize_text).filter(|t| !t.is_empty())
}
