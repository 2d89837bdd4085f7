//! Locale-aware text normalization shared by the extractors and the review
//! harvest: scaled counts, rating blobs, dates, natural keys, language tags.

use std::sync::LazyLock;

use regex::Regex;

static RATING_BLOB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\s*[•·]\s*([\d,.]+\s*(?:万|萬|[kK])?)").unwrap()
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*").unwrap());

/// Parse a human count that may carry a locale scale suffix.
///
/// `万` / `萬` multiply by 10 000, `k` / `K` by 1 000; fractional prefixes are
/// floored after scaling, so `1.2万` becomes 12 000. Plain numbers may carry
/// thousands separators.
pub fn parse_scaled_count(raw: &str) -> Option<u64> {
    let s = raw.trim();
    let (prefix, scale) = if let Some(p) = s.strip_suffix('万').or_else(|| s.strip_suffix('萬')) {
        (p, 10_000f64)
    } else if let Some(p) = s.strip_suffix(['k', 'K']) {
        (p, 1_000f64)
    } else {
        (s, 1f64)
    };
    let cleaned = prefix.trim().replace(',', "");
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * scale).floor() as u64)
}

/// Render a count with thousands separators, `12000` -> `"12,000"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Parse + regroup in one step: `"1.2万"` -> `"12,000"`.
pub fn normalized_count(raw: &str) -> Option<String> {
    parse_scaled_count(raw).map(group_thousands)
}

/// Split a combined rating blob like `"4.5 • 1.2万 則評分"` into the rating
/// and the raw count part. Returns `None` when the separator is absent.
pub fn split_rating_blob(text: &str) -> Option<(String, String)> {
    let caps = RATING_BLOB.captures(text)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

/// First decimal number inside a text, used for bare Android ratings.
pub fn first_number(text: &str) -> Option<String> {
    FIRST_NUMBER.find(text).map(|m| m.as_str().to_string())
}

/// Canonicalize assorted upstream date shapes to `YYYY-MM-DD`.
pub fn canonical_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    None
}

/// `YYYY-MM-DD` from a unix timestamp in seconds.
pub fn date_from_unix(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Natural key for a review entry: date and username joined with `_`.
pub fn review_key(date: &str, username: &str) -> String {
    format!("{date}_{username}")
}

fn is_emoji(c: char) -> bool {
    matches!(u32::from(c),
        0x1F300..=0x1FAFF   // pictographs, transport, supplemental symbols
        | 0x2600..=0x27BF   // misc symbols + dingbats
        | 0x1F1E6..=0x1F1FF // regional indicators
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
    )
}

/// Drop emoji and joiners before language detection so a review that is all
/// pictographs does not skew the classifier.
pub fn strip_emoji(text: &str) -> String {
    text.chars().filter(|c| !is_emoji(*c)).collect()
}

fn has_cjk(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(u32::from(c), 0x4E00..=0x9FFF))
}

/// Tag a review body: any CJK ideograph wins `zh` outright, otherwise a
/// statistical pass decides between `en` and `unknown`.
pub fn detect_language(text: &str) -> &'static str {
    let cleaned = strip_emoji(text);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return "unknown";
    }
    if has_cjk(cleaned) {
        return "zh";
    }
    match whatlang::detect(cleaned) {
        Some(info) if info.lang() == whatlang::Lang::Eng => "en",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_counts() {
        assert_eq!(parse_scaled_count("1.2万"), Some(12_000));
        assert_eq!(parse_scaled_count("3萬"), Some(30_000));
        assert_eq!(parse_scaled_count("4.7k"), Some(4_700));
        assert_eq!(parse_scaled_count("12K"), Some(12_000));
        assert_eq!(parse_scaled_count("1,234"), Some(1_234));
        assert_eq!(parse_scaled_count("987"), Some(987));
        assert_eq!(parse_scaled_count("則評論"), None);
    }

    #[test]
    fn scaling_floors_after_multiplying() {
        assert_eq!(parse_scaled_count("1.23万"), Some(12_300));
        assert_eq!(parse_scaled_count("0.1k"), Some(100));
        assert_eq!(parse_scaled_count("1.2345万"), Some(12_345));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(12_000), "12,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(normalized_count("1.2万").as_deref(), Some("12,000"));
    }

    #[test]
    fn rating_blob_splits_on_middle_dot() {
        let (rating, count) = split_rating_blob("4.5 • 1.2万 則評分").unwrap();
        assert_eq!(rating, "4.5");
        assert_eq!(count, "1.2万");
        assert!(split_rating_blob("4.5 顆星").is_none());
    }

    #[test]
    fn date_shapes_collapse_to_day() {
        assert_eq!(
            canonical_date("2023-05-01T08:30:00Z").as_deref(),
            Some("2023-05-01")
        );
        assert_eq!(
            canonical_date("2023-05-01T08:30:00").as_deref(),
            Some("2023-05-01")
        );
        assert_eq!(canonical_date("2023-05-01").as_deref(), Some("2023-05-01"));
        assert_eq!(canonical_date("yesterday"), None);
        assert_eq!(date_from_unix(1_683_000_000).as_deref(), Some("2023-05-02"));
    }

    #[test]
    fn review_keys_join_date_and_user() {
        assert_eq!(review_key("2023-05-01", "小明"), "2023-05-01_小明");
    }

    #[test]
    fn language_tagging() {
        assert_eq!(detect_language("這個應用程式非常好用"), "zh");
        // mixed text with any ideograph is zh regardless of the rest
        assert_eq!(detect_language("great app 超讚"), "zh");
        assert_eq!(
            detect_language("This application works great and saves me time"),
            "en"
        );
        assert_eq!(detect_language("👍👍👍"), "unknown");
        assert_eq!(detect_language(""), "unknown");
    }
}
