//! Play Store listing extraction. The storefront is forced to zh-TW/TW
//! before navigation and the page is scrolled to coax lazy sections in.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::locator::{FieldSpec, Locator, non_empty, raw_first};
use crate::normalize::{first_number, normalized_count};
use crate::record::{ListingRecord, Platform, sentinel};
use crate::session::RenderSession;
use crate::urls::force_play_locale;

const NAME: FieldSpec = FieldSpec {
    name: "app_name",
    sentinel: sentinel::NAME,
    strategies: &[Locator::text("h1 span", 5_000)],
    normalize: non_empty,
};

const DEVELOPER: FieldSpec = FieldSpec {
    name: "developer",
    sentinel: sentinel::DEVELOPER,
    strategies: &[Locator::text(".Vbfug.auoIOc a span", 5_000)],
    normalize: non_empty,
};

const RATING: FieldSpec = FieldSpec {
    name: "rating",
    sentinel: sentinel::RATING,
    strategies: &[Locator::text(".TT9eCd", 5_000)],
    normalize: first_number,
};

const ICON: FieldSpec = FieldSpec {
    name: "icon_url",
    sentinel: sentinel::ICON_URL,
    strategies: &[
        Locator::attr("img[itemprop=\"image\"]", "src", 5_000),
        Locator::attr("img[alt=\"圖示圖片\"]", "src", 0),
    ],
    normalize: non_empty,
};

/// Review-count chips read `1.2万 則評論`; scale, floor, regroup.
fn review_count(raw: &str) -> Option<String> {
    let cleaned = raw.replace("則評論", "").replace("篇評論", "");
    normalized_count(cleaned.trim())
}

const RATING_COUNT: FieldSpec = FieldSpec {
    name: "rating_count",
    sentinel: sentinel::RATING_COUNT,
    strategies: &[Locator::text(".g1rdde", 5_000)],
    normalize: review_count,
};

/// Paid apps expose the price inside the buy button's accessible label,
/// `購買：$33.00`; an install button means the listing is free.
async fn extract_price(session: &RenderSession) -> Result<String> {
    let buy = raw_first(
        session,
        &[Locator::attr("button[aria-label*=\"購買：\"]", "aria-label", 0)],
    )
    .await?;
    if let Some(label) = buy {
        if let Some(price) = label.split("購買：").nth(1) {
            let price = price.trim();
            if !price.is_empty() {
                return Ok(price.to_string());
            }
        }
    }
    match session.find("button[aria-label=\"安裝\"]").await {
        Ok(_) => Ok(sentinel::FREE.to_string()),
        Err(ScrapeError::ElementNotFound { .. }) => Ok(sentinel::PRICE.to_string()),
        Err(e) => Err(e),
    }
}

/// Scroll-to-bottom cycles so lazily rendered sections (rating block,
/// developer row) materialize before extraction.
async fn settle_page(session: &RenderSession) -> Result<()> {
    for _ in 0..3 {
        session
            .execute("window.scrollTo(0, document.body.scrollHeight);")
            .await?;
        sleep(Duration::from_secs(1)).await;
    }
    session.execute("window.scrollTo(0, 0);").await?;
    Ok(())
}

/// Navigate to a Play Store listing and pull every field. Category stays
/// empty here; it is borrowed from a matched App Store listing later.
pub async fn extract(session: &RenderSession, url: &str) -> Result<ListingRecord> {
    let localized = force_play_locale(url);
    if localized != url {
        debug!(url, "storefront locale forced to zh-TW/TW");
    }
    session.navigate(&localized).await?;
    settle_page(session).await?;

    let mut record = ListingRecord::unknown(Platform::Android, url);
    record.app_name = NAME.extract(session).await?;
    record.developer = DEVELOPER.extract(session).await?;
    record.rating = RATING.extract(session).await?;
    record.rating_count = RATING_COUNT.extract(session).await?;
    record.price = extract_price(session).await?;
    record.icon_url = ICON.extract(session).await?;
    Ok(record)
}
