//! Batch listing scrapes: a small semaphore bounds concurrent browser
//! sessions, each URL gets a wall-clock budget, and failures become per-URL
//! error objects instead of sinking the batch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::listing::scrape_listing;
use crate::matcher;
use crate::record::{ListingRecord, Platform, sentinel};
use crate::session::SessionConfig;

/// Browser sessions alive at once. Each one is a whole Chrome.
pub const SCRAPE_CONCURRENCY: usize = 2;
/// Wall-clock budget per URL, retries included.
pub const URL_BUDGET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub session: SessionConfig,
    pub concurrency: usize,
    pub url_budget: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            concurrency: SCRAPE_CONCURRENCY,
            url_budget: URL_BUDGET,
        }
    }
}

/// Per-URL result: a full record or an error object naming the URL.
#[derive(Debug)]
pub enum ScrapeOutcome {
    Listing(ListingRecord),
    Failure { error: String, url: String },
}

impl ScrapeOutcome {
    pub fn to_value(&self) -> Value {
        match self {
            ScrapeOutcome::Listing(record) => record.export(),
            ScrapeOutcome::Failure { error, url } => json!({ "error": error, "url": url }),
        }
    }

    pub fn as_listing(&self) -> Option<&ListingRecord> {
        match self {
            ScrapeOutcome::Listing(record) => Some(record),
            ScrapeOutcome::Failure { .. } => None,
        }
    }
}

/// Scrape a batch of same-platform URLs. Output order matches input order
/// regardless of completion order.
pub async fn scrape_batch(
    cfg: &BatchConfig,
    platform: Platform,
    urls: &[String],
) -> Vec<ScrapeOutcome> {
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let mut tasks: JoinSet<(usize, ScrapeOutcome)> = JoinSet::new();
    for (index, url) in urls.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let session = cfg.session.clone();
        let budget = cfg.url_budget;
        let url = url.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = match scrape_listing(&session, platform, &url, Some(budget)).await {
                Ok(record) => ScrapeOutcome::Listing(record),
                Err(e) => {
                    warn!(url = %url, error = %e, "listing scrape failed");
                    ScrapeOutcome::Failure {
                        error: e.to_string(),
                        url: url.clone(),
                    }
                }
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<ScrapeOutcome>> = urls.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => warn!(error = %e, "scrape task aborted"),
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| ScrapeOutcome::Failure {
                error: "scrape task aborted".to_string(),
                url: urls[index].clone(),
            })
        })
        .collect()
}

/// iOS candidates for identity matching: listings whose name actually
/// resolved, paired with their category (sentinel when unknown), in scrape
/// order.
fn match_candidates(ios: &[ScrapeOutcome]) -> Vec<(String, String)> {
    ios.iter()
        .filter_map(ScrapeOutcome::as_listing)
        .filter(|record| record.app_name != sentinel::NAME)
        .map(|record| {
            (
                record.app_name.clone(),
                record
                    .category
                    .clone()
                    .unwrap_or_else(|| sentinel::CATEGORY.to_string()),
            )
        })
        .collect()
}

/// Scrape both platforms and annotate each Android record with its closest
/// iOS counterpart, borrowing the category the Play page never shows.
pub async fn scrape_all(
    cfg: &BatchConfig,
    ios_urls: &[String],
    android_urls: &[String],
) -> (Vec<ScrapeOutcome>, Vec<ScrapeOutcome>) {
    let ios = scrape_batch(cfg, Platform::Ios, ios_urls).await;
    let candidates = match_candidates(&ios);
    let mut android = scrape_batch(cfg, Platform::Android, android_urls).await;
    for outcome in &mut android {
        if let ScrapeOutcome::Listing(record) = outcome {
            if record.app_name == sentinel::NAME {
                continue;
            }
            if let Some(m) = matcher::best_match(&record.app_name, &candidates) {
                record.annotate_match(&m.ios_name, &m.category, m.score);
            }
        }
    }
    (ios, android)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, category: Option<&str>) -> ScrapeOutcome {
        let mut record = ListingRecord::unknown(Platform::Ios, "u");
        record.app_name = name.to_string();
        record.category = category.map(|c| c.to_string());
        ScrapeOutcome::Listing(record)
    }

    #[test]
    fn candidates_skip_failures_and_unnamed_records() {
        let ios = vec![
            listing("LINE", Some("社交")),
            ScrapeOutcome::Failure {
                error: "x".to_string(),
                url: "u".to_string(),
            },
            listing(sentinel::NAME, Some("工具")),
            listing("地圖", None),
        ];
        let candidates = match_candidates(&ios);
        assert_eq!(
            candidates,
            vec![
                ("LINE".to_string(), "社交".to_string()),
                ("地圖".to_string(), sentinel::CATEGORY.to_string()),
            ]
        );
    }

    #[test]
    fn failure_outcome_serializes_error_and_url() {
        let outcome = ScrapeOutcome::Failure {
            error: "boom".to_string(),
            url: "https://apps.apple.com/tw/app/x/id1".to_string(),
        };
        let doc = outcome.to_value();
        assert_eq!(doc["error"], "boom");
        assert_eq!(doc["url"], "https://apps.apple.com/tw/app/x/id1");
    }
}
