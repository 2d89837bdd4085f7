//! App Store listing extraction. Selectors target the zh-TW storefront
//! markup; every field degrades to its sentinel independently.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::locator::{FieldSpec, Locator, non_empty, raw_first};
use crate::normalize::{normalized_count, split_rating_blob};
use crate::record::{ListingRecord, Platform, sentinel};
use crate::session::RenderSession;

static AGE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\d+\+$").unwrap());
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new("「(.+?)」").unwrap());

/// Titles carry a trailing age rating chip rendered as part of the heading,
/// e.g. `LINE 12+`.
fn strip_age_tag(raw: &str) -> Option<String> {
    non_empty(&AGE_TAG.replace(raw, ""))
}

const NAME: FieldSpec = FieldSpec {
    name: "app_name",
    sentinel: sentinel::NAME,
    strategies: &[Locator::text(".product-header__title", 10_000)],
    normalize: strip_age_tag,
};

const DEVELOPER: FieldSpec = FieldSpec {
    name: "developer",
    sentinel: sentinel::DEVELOPER,
    strategies: &[
        Locator::text(".app-header__identity a", 10_000),
        Locator::text(".product-header__identity a", 2_000),
    ],
    normalize: non_empty,
};

const ICON: FieldSpec = FieldSpec {
    name: "icon_url",
    sentinel: sentinel::ICON_URL,
    strategies: &[
        Locator::attr("picture source[type=\"image/webp\"]", "srcset", 5_000),
        Locator::attr(".product-hero__media img", "src", 0),
    ],
    normalize: first_srcset_url,
};

/// `srcset` lists candidates as `url width, url width, ...`; the first URL is
/// the smallest rendition, which is all a catalog needs.
fn first_srcset_url(raw: &str) -> Option<String> {
    raw.split(',')
        .next()?
        .split_whitespace()
        .next()
        .map(|s| s.to_string())
}

const RATING_BLOB: &[Locator] = &[Locator::text(".we-rating-count", 10_000)];

/// Rating and rating-count come fused in one caption, `4.5 • 1.2万 則評分`.
async fn extract_rating(session: &RenderSession) -> Result<(String, String)> {
    let Some(raw) = raw_first(session, RATING_BLOB).await? else {
        return Ok((
            sentinel::RATING.to_string(),
            sentinel::RATING_COUNT.to_string(),
        ));
    };
    match split_rating_blob(&raw) {
        Some((rating, count)) => {
            let count = normalized_count(&count).unwrap_or(count);
            Ok((rating, count))
        }
        None => {
            debug!(raw = %raw, "rating caption did not split");
            Ok((raw.trim().to_string(), sentinel::RATING_COUNT.to_string()))
        }
    }
}

/// Texts of the information chips under the header. Category and price both
/// live here, so they share one scan.
async fn inline_chips(session: &RenderSession) -> Result<Vec<String>> {
    if session
        .wait_for(".inline-list__item", std::time::Duration::from_secs(5))
        .await
        .is_err()
    {
        return Ok(Vec::new());
    }
    let mut texts = Vec::new();
    for el in session.find_all(".inline-list__item").await? {
        let t = el.text().await?;
        if !t.is_empty() {
            texts.push(t);
        }
    }
    Ok(texts)
}

fn category_from_chips(chips: &[String]) -> Option<String> {
    chips
        .iter()
        .find_map(|t| BRACKETED.captures(t).map(|c| c[1].to_string()))
}

fn price_from_chips(chips: &[String]) -> Option<String> {
    chips
        .iter()
        .find(|t| t.contains(sentinel::FREE) || t.contains('$'))
        .map(|t| t.trim().to_string())
}

/// Version and release date, pulled from the what's-new section when it is
/// inline and from the version-history modal when it is not. Best-effort:
/// failures leave both fields empty and never sink the scrape.
async fn version_history(session: &RenderSession) -> (Option<String>, Option<String>) {
    match try_version_history(session).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(error = %e, "version history extraction failed");
            (None, None)
        }
    }
}

async fn try_version_history(
    session: &RenderSession,
) -> Result<(Option<String>, Option<String>)> {
    let inline_version = raw_first(
        session,
        &[Locator::text(".whats-new__latest__version", 2_000)],
    )
    .await?
    .and_then(|t| non_empty(t.trim_start_matches("版本").trim()));
    let inline_date = raw_first(
        session,
        &[
            Locator::attr(".whats-new time", "datetime", 0),
            Locator::text(".whats-new time", 0),
        ],
    )
    .await?
    .map(|t| crate::normalize::canonical_date(&t).unwrap_or(t));

    if inline_version.is_some() {
        return Ok((inline_version, inline_date));
    }

    // Fall back to the modal; it needs a click to render.
    let opener = match session.find("button.we-modal__show").await {
        Ok(el) => el,
        Err(ScrapeError::ElementNotFound { .. }) => return Ok((None, inline_date)),
        Err(e) => return Err(e),
    };
    opener.click().await?;
    let version = raw_first(
        session,
        &[Locator::text(
            ".we-modal__content .version-history__item__version-number",
            3_000,
        )],
    )
    .await?
    .and_then(|t| non_empty(&t));
    let date = raw_first(
        session,
        &[Locator::text(
            ".we-modal__content .version-history__item__release-date",
            0,
        )],
    )
    .await?
    .map(|t| crate::normalize::canonical_date(&t).unwrap_or(t));

    // Dismiss so later waits see the page, not the overlay.
    if let Err(e) = session
        .execute("document.querySelector('.we-modal__close')?.click();")
        .await
    {
        debug!(error = %e, "version history modal dismissal failed");
    }
    Ok((version, date.or(inline_date)))
}

/// Navigate to an App Store listing and pull every field, sentinels where
/// the page withholds one.
pub async fn extract(session: &RenderSession, url: &str) -> Result<ListingRecord> {
    session.navigate(url).await?;
    let mut record = ListingRecord::unknown(Platform::Ios, url);
    record.app_name = NAME.extract(session).await?;
    record.developer = DEVELOPER.extract(session).await?;
    (record.rating, record.rating_count) = extract_rating(session).await?;

    let chips = inline_chips(session).await?;
    record.category = category_from_chips(&chips);
    if let Some(price) = price_from_chips(&chips) {
        record.price = price;
    }
    record.icon_url = ICON.extract(session).await?;
    (record.version, record.update_date) = version_history(session).await;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_tag_is_stripped_from_titles() {
        assert_eq!(strip_age_tag("LINE 12+").as_deref(), Some("LINE"));
        assert_eq!(strip_age_tag("LINE").as_deref(), Some("LINE"));
        assert_eq!(strip_age_tag("4+"), None);
    }

    #[test]
    fn developer_tries_app_header_first_with_the_long_wait() {
        let [first, second] = DEVELOPER.strategies else {
            panic!("developer spec should carry two strategies");
        };
        assert_eq!(first.css, ".app-header__identity a");
        assert_eq!(first.wait, std::time::Duration::from_secs(10));
        assert_eq!(second.css, ".product-header__identity a");
        assert_eq!(second.wait, std::time::Duration::from_secs(2));
    }

    #[test]
    fn srcset_yields_first_candidate_url() {
        let raw = "https://a.mzstatic.com/icon.webp 246w, https://a.mzstatic.com/icon@2x.webp 492w";
        assert_eq!(
            first_srcset_url(raw).as_deref(),
            Some("https://a.mzstatic.com/icon.webp")
        );
    }

    #[test]
    fn chips_yield_category_and_price() {
        let chips = vec![
            "排行：「社交」類第 2 名".to_string(),
            "免費".to_string(),
            "提供App內購買".to_string(),
        ];
        assert_eq!(category_from_chips(&chips).as_deref(), Some("社交"));
        assert_eq!(price_from_chips(&chips).as_deref(), Some("免費"));

        let paid = vec!["「遊戲」".to_string(), "NT$ 90".to_string()];
        assert_eq!(price_from_chips(&paid).as_deref(), Some("NT$ 90"));
        assert!(category_from_chips(&[]).is_none());
    }
}
