//! Store listing URL contracts. Only two shapes are accepted, everything else
//! is a caller error surfaced before any network traffic.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Result, ScrapeError};

static APPLE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"apps\.apple\.com/(\w+)/app/([^/]+)/id(\d+)").unwrap()
});

/// Identity of one App Store listing, parsed from its public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleTarget {
    /// Two-letter storefront code, e.g. `tw`.
    pub country: String,
    /// URL slug of the listing, kept verbatim (may be percent-encoded).
    pub slug: String,
    /// Numeric catalog id.
    pub app_id: String,
}

/// Parse `https://apps.apple.com/{country}/app/{slug}/id{digits}`.
pub fn parse_apple_url(raw: &str) -> Result<AppleTarget> {
    let caps = APPLE_URL
        .captures(raw)
        .ok_or_else(|| ScrapeError::BadStoreUrl(raw.to_string()))?;
    Ok(AppleTarget {
        country: caps[1].to_string(),
        slug: caps[2].to_string(),
        app_id: caps[3].to_string(),
    })
}

/// Parse a Play Store listing URL and return its package id (`id=` query
/// parameter).
pub fn parse_google_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|_| ScrapeError::BadStoreUrl(raw.to_string()))?;
    if !url
        .host_str()
        .is_some_and(|h| h.ends_with("play.google.com"))
    {
        return Err(ScrapeError::BadStoreUrl(raw.to_string()));
    }
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ScrapeError::BadStoreUrl(raw.to_string()))
}

/// Force a Play Store URL into the Taiwan storefront in Traditional Chinese
/// without clobbering parameters the caller already set.
pub fn force_play_locale(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let has = |url: &Url, key: &str| url.query_pairs().any(|(k, _)| k == key);
    if !has(&url, "hl") {
        url.query_pairs_mut().append_pair("hl", "zh-TW");
    }
    if !has(&url, "gl") {
        url.query_pairs_mut().append_pair("gl", "TW");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_url_yields_country_slug_and_id() {
        let t = parse_apple_url("https://apps.apple.com/tw/app/line/id443904275").unwrap();
        assert_eq!(t.country, "tw");
        assert_eq!(t.slug, "line");
        assert_eq!(t.app_id, "443904275");
    }

    #[test]
    fn apple_slug_kept_verbatim_even_when_encoded() {
        let t = parse_apple_url(
            "https://apps.apple.com/tw/app/%E5%9C%B0%E5%9C%96/id915056765?see-all=reviews",
        )
        .unwrap();
        assert_eq!(t.slug, "%E5%9C%B0%E5%9C%96");
        assert_eq!(t.app_id, "915056765");
    }

    #[test]
    fn non_store_urls_are_rejected() {
        assert!(parse_apple_url("https://example.com/app/id123").is_err());
        assert!(parse_google_url("https://example.com/store/apps/details?id=a.b").is_err());
        assert!(parse_google_url("https://play.google.com/store/apps/details").is_err());
    }

    #[test]
    fn google_url_yields_package_id() {
        let id =
            parse_google_url("https://play.google.com/store/apps/details?id=jp.naver.line.android")
                .unwrap();
        assert_eq!(id, "jp.naver.line.android");
    }

    #[test]
    fn play_locale_forced_only_when_absent() {
        let forced = force_play_locale("https://play.google.com/store/apps/details?id=a.b");
        assert!(forced.contains("hl=zh-TW"));
        assert!(forced.contains("gl=TW"));

        let kept = force_play_locale(
            "https://play.google.com/store/apps/details?id=a.b&hl=ja&gl=JP",
        );
        assert!(kept.contains("hl=ja"));
        assert!(!kept.contains("hl=zh-TW"));
    }
}
