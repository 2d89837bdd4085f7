//! Page scrape orchestration: one session per attempt, bounded retries with
//! a fixed pause, the session deleted on every exit path including timeouts.

use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::warn;

use crate::error::{Result, ScrapeError};
use crate::record::{ListingRecord, Platform};
use crate::retry::RetryPolicy;
use crate::session::{RenderSession, SessionConfig};
use crate::{android, ios};

/// One attempt: start a session, extract under the remaining wall-clock
/// budget, always close. Session startup counts against the budget too; a
/// timed-out start never produced a session, so there is nothing to close.
async fn scrape_once(
    cfg: &SessionConfig,
    platform: Platform,
    url: &str,
    remaining: Option<Duration>,
) -> Result<ListingRecord> {
    let deadline = remaining.map(|limit| (limit, Instant::now() + limit));
    let session = match deadline {
        Some((limit, _)) => match timeout(limit, RenderSession::start(cfg)).await {
            Ok(started) => started?,
            Err(_) => {
                return Err(ScrapeError::DeadlineExceeded {
                    seconds: limit.as_secs(),
                });
            }
        },
        None => RenderSession::start(cfg).await?,
    };
    let work = async {
        match platform {
            Platform::Ios => ios::extract(&session, url).await,
            Platform::Android => android::extract(&session, url).await,
        }
    };
    let result = match deadline {
        Some((limit, dl)) => {
            let left = dl.saturating_duration_since(Instant::now());
            match timeout(left, work).await {
                Ok(r) => r,
                Err(_) => Err(ScrapeError::DeadlineExceeded {
                    seconds: limit.as_secs(),
                }),
            }
        }
        None => work.await,
    };
    session.close().await;
    result
}

/// Scrape a listing with retries under one shared wall-clock budget.
///
/// Fatal errors (engine startup, blown budget) propagate immediately;
/// anything else is retried up to the policy limit, then wrapped in
/// [`ScrapeError::ScrapeExhausted`] carrying the caller's URL verbatim.
pub async fn scrape_listing(
    cfg: &SessionConfig,
    platform: Platform,
    url: &str,
    budget: Option<Duration>,
) -> Result<ListingRecord> {
    let policy = RetryPolicy::listing();
    let deadline = budget.map(|d| Instant::now() + d);
    let mut last_err: Option<ScrapeError> = None;
    for attempt in 1..=policy.max_attempts {
        let remaining = match deadline {
            Some(dl) => {
                let left = dl.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(ScrapeError::DeadlineExceeded {
                        seconds: budget.map(|d| d.as_secs()).unwrap_or_default(),
                    });
                }
                Some(left)
            }
            None => None,
        };
        match scrape_once(cfg, platform, url, remaining).await {
            Ok(record) => return Ok(record),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(url, attempt, error = %e, "listing scrape attempt failed");
                last_err = Some(e);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }
    Err(ScrapeError::ScrapeExhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
        source: Box::new(last_err.unwrap_or(ScrapeError::MalformedResponse {
            context: "no attempt recorded".to_string(),
        })),
    })
}
