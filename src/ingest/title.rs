// src/ingest/title.rs
//! Headline/publisher split for aggregator titles of the form
//! `"<headline> - <publisher>"`.
//!
//! Only the last `" - "` counts, so a headline that itself contains `" - "`
//! keeps everything before the final separator. Headlines whose real text
//! ends in `" - something"` without a publisher suffix get mis-split; that is
//! a known limitation of the format, not something this function tries to
//! guess around.

const SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitTitle {
    pub headline: String,
    pub publisher: Option<String>,
}

/// Split `raw` on its last `" - "`. Falls back to the whole title and
/// `fallback_publisher` when there is no separator or either side is blank.
pub fn split_title(raw: &str, fallback_publisher: Option<&str>) -> SplitTitle {
    let trimmed = raw.trim();
    if let Some(idx) = trimmed.rfind(SEPARATOR) {
        let headline = trimmed[..idx].trim();
        let publisher = trimmed[idx + SEPARATOR.len()..].trim();
        if !headline.is_empty() && !publisher.is_empty() {
            return SplitTitle {
                headline: headline.to_string(),
                publisher: Some(publisher.to_string()),
            };
        }
    }
    SplitTitle {
        headline: trimmed.to_string(),
        publisher: fallback_publisher
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_separator_keeps_title_and_uses_host() {
        let s = split_title("府中市で花火大会", Some("news.google.com"));
        assert_eq!(s.headline, "府中市で花火大会");
        assert_eq!(s.publisher.as_deref(), Some("news.google.com"));
    }

    #[test]
    fn single_separator_splits() {
        let s = split_title("府中市で花火大会 - 東京新聞", Some("news.google.com"));
        assert_eq!(s.headline, "府中市で花火大会");
        assert_eq!(s.publisher.as_deref(), Some("東京新聞"));
    }

    #[test]
    fn multiple_separators_split_on_last() {
        let s = split_title("Fuchu - city hall - budget talks - Tokyo Shimbun", None);
        assert_eq!(s.headline, "Fuchu - city hall - budget talks");
        assert_eq!(s.publisher.as_deref(), Some("Tokyo Shimbun"));
    }

    #[test]
    fn hyphen_without_spaces_is_not_a_separator() {
        let s = split_title("Well-known shop re-opens", None);
        assert_eq!(s.headline, "Well-known shop re-opens");
        assert_eq!(s.publisher, None);
    }

    #[test]
    fn blank_side_falls_back() {
        let s = split_title("Headline only - ", Some("example.test"));
        assert_eq!(s.headline, "Headline only -");
        assert_eq!(s.publisher.as_deref(), Some("example.test"));

        let s = split_title(" - Publisher", None);
        assert_eq!(s.headline, "- Publisher");
        assert_eq!(s.publisher, None);
    }

    #[test]
    fn blank_fallback_publisher_is_none() {
        let s = split_title("Title", Some("  "));
        assert_eq!(s.publisher, None);
    }
}
