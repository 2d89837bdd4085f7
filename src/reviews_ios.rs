//! App Store review harvesting: a bearer token scraped from the public
//! listing page unlocks the catalog reviews API, which is then walked with
//! an offset pager under rate-limit backoff.

use std::sync::LazyLock;
use std::time::Duration;

use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};
use crate::retry::RetryPolicy;
use crate::urls::AppleTarget;

/// Reviews per page, the maximum the endpoint serves.
pub const PAGE_LIMIT: u32 = 20;
/// Hard ceiling on the offset cursor; the API stops serving long before.
pub const MAX_OFFSET: u64 = 100_000;
/// Pause between successfully fetched pages.
const THROTTLE: Duration = Duration::from_millis(500);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
];

// The token travels percent-encoded inside the environment config meta tag.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"token%22%3A%22(.+?)%22").unwrap());
static NEXT_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"offset=([0-9]+)").unwrap());

fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// One page-fetch outcome, separated from transport errors so the pager can
/// give each status its own policy.
#[derive(Debug)]
pub enum PageOutcome {
    Page {
        entries: Vec<Value>,
        next_offset: Option<u64>,
    },
    /// 429; retry the same offset after backing off.
    RateLimited,
    /// 404; the catalog has no more pages.
    EndOfStream,
    /// Any other non-200; stop and keep what was collected.
    Failed { status: u16 },
}

/// Seam between the pager and the wire so pagination and backoff can be
/// exercised against a scripted server.
pub trait ReviewsApi {
    fn fetch_page(&self, offset: u64) -> impl Future<Output = Result<PageOutcome>> + Send;
}

/// Live client for the catalog reviews endpoint.
pub struct AppleReviewsClient {
    client: reqwest::Client,
    target: AppleTarget,
    landing_url: String,
    token: String,
}

fn landing_url(target: &AppleTarget) -> String {
    format!(
        "https://apps.apple.com/{}/app/{}/id{}",
        target.country, target.slug, target.app_id
    )
}

fn token_from_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    if let Ok(sel) = Selector::parse(r#"meta[name="web-experience-app/config/environment"]"#) {
        for meta in doc.select(&sel) {
            if let Some(content) = meta.value().attr("content") {
                if let Some(caps) = TOKEN.captures(content) {
                    return Some(caps[1].to_string());
                }
            }
        }
    }
    // Markup drifts; the raw scan has outlived several redesigns.
    TOKEN.captures(html).map(|caps| caps[1].to_string())
}

impl AppleReviewsClient {
    /// Fetch the listing page and lift the bearer token out of its
    /// environment config. No token means no session.
    pub async fn connect(target: AppleTarget) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let landing = landing_url(&target);
        let body = client
            .get(&landing)
            .header("User-Agent", pick_user_agent())
            .send()
            .await?
            .text()
            .await?;
        let token = token_from_html(&body).ok_or_else(|| ScrapeError::AuthTokenMissing {
            url: landing.clone(),
        })?;
        debug!(app_id = %target.app_id, "bearer token acquired");
        Ok(Self {
            client,
            target,
            landing_url: landing,
            token,
        })
    }
}

impl ReviewsApi for AppleReviewsClient {
    async fn fetch_page(&self, offset: u64) -> Result<PageOutcome> {
        let url = format!(
            "https://amp-api.apps.apple.com/v1/catalog/{}/apps/{}/reviews",
            self.target.country, self.target.app_id
        );
        let res = self
            .client
            .get(&url)
            .query(&[
                ("l", "zh-TW"),
                ("offset", &offset.to_string()),
                ("limit", &PAGE_LIMIT.to_string()),
                ("platform", "web"),
                ("additionalPlatforms", "appletv,ipad,iphone,mac"),
            ])
            .header("Accept", "application/json")
            .header("Authorization", format!("bearer {}", self.token))
            .header("Origin", "https://apps.apple.com")
            .header("Referer", &self.landing_url)
            .header("User-Agent", pick_user_agent())
            .send()
            .await?;

        match res.status() {
            StatusCode::OK => {
                let doc: Value = res.json().await?;
                let entries = doc
                    .get("data")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .ok_or_else(|| ScrapeError::MalformedResponse {
                        context: "reviews payload missing data array".to_string(),
                    })?;
                let next_offset = doc
                    .get("next")
                    .and_then(|v| v.as_str())
                    .and_then(|next| NEXT_OFFSET.captures(next))
                    .and_then(|caps| caps[1].parse().ok());
                Ok(PageOutcome::Page {
                    entries,
                    next_offset,
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Ok(PageOutcome::RateLimited),
            StatusCode::NOT_FOUND => Ok(PageOutcome::EndOfStream),
            status => Ok(PageOutcome::Failed {
                status: status.as_u16(),
            }),
        }
    }
}

/// Walk every page from offset 1, stamping provenance onto each entry.
///
/// Rate limits retry the same offset with linearly growing pauses; once the
/// retry budget is spent, or on any hard failure, the reviews gathered so
/// far are kept and returned.
pub async fn pull_all<A: ReviewsApi>(api: &A, app_id: &str) -> Result<Vec<Value>> {
    let policy = RetryPolicy::rate_limit();
    let mut collected = Vec::new();
    let mut cursor = Some(1u64);
    let mut pages = 0u64;

    'pages: while let Some(offset) = cursor {
        if offset > MAX_OFFSET {
            warn!(offset, "offset ceiling reached, stopping");
            break;
        }
        let mut rate_hits = 0usize;
        let outcome = loop {
            match api.fetch_page(offset).await? {
                PageOutcome::RateLimited => {
                    rate_hits += 1;
                    if rate_hits > policy.max_attempts {
                        let err = ScrapeError::RateLimited {
                            retries: policy.max_attempts,
                        };
                        warn!(offset, error = %err, "keeping partial harvest");
                        break 'pages;
                    }
                    let pause = policy.delay_after(rate_hits);
                    debug!(offset, rate_hits, pause_s = pause.as_secs(), "backing off");
                    sleep(pause).await;
                }
                other => break other,
            }
        };
        match outcome {
            PageOutcome::Page {
                mut entries,
                next_offset,
            } => {
                pages += 1;
                let batch_size = entries.len() as u64;
                if batch_size < PAGE_LIMIT as u64 {
                    debug!(offset, got = batch_size, "short batch");
                }
                for entry in &mut entries {
                    if let Some(obj) = entry.as_object_mut() {
                        obj.insert("offset".to_string(), Value::from(offset));
                        obj.insert("n_batch".to_string(), Value::from(batch_size));
                        obj.insert("app_id".to_string(), Value::from(app_id));
                    }
                }
                collected.extend(entries);
                cursor = next_offset;
                sleep(THROTTLE).await;
            }
            PageOutcome::EndOfStream => break,
            PageOutcome::Failed { status } => {
                warn!(offset, status, "review page fetch failed, keeping partial harvest");
                break;
            }
            PageOutcome::RateLimited => unreachable!("absorbed by the retry loop"),
        }
    }
    debug!(total = collected.len(), pages, "harvest finished");
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_lifted_from_environment_meta() {
        let html = r#"<html><head>
            <meta name="web-experience-app/config/environment"
                  content="%7B%22MEDIA_API%22%3A%7B%22token%22%3A%22eyJhbGciOiJFUzI1NiJ9.abc%22%7D%7D">
        </head><body></body></html>"#;
        assert_eq!(
            token_from_html(html).as_deref(),
            Some("eyJhbGciOiJFUzI1NiJ9.abc")
        );
        assert!(token_from_html("<html><body>nothing here</body></html>").is_none());
    }

    #[test]
    fn next_offset_is_parsed_from_link() {
        let caps = NEXT_OFFSET
            .captures("/v1/catalog/tw/apps/443904275/reviews?l=zh-TW&offset=21")
            .unwrap();
        assert_eq!(&caps[1], "21");
    }

    #[test]
    fn landing_url_keeps_slug_verbatim() {
        let target = AppleTarget {
            country: "tw".to_string(),
            slug: "%E5%9C%B0%E5%9C%96".to_string(),
            app_id: "915056765".to_string(),
        };
        assert_eq!(
            landing_url(&target),
            "https://apps.apple.com/tw/app/%E5%9C%B0%E5%9C%96/id915056765"
        );
    }
}
