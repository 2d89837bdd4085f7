//! Play Store review harvesting over the private `batchexecute` RPC used by
//! the web storefront. The endpoint self-paginates with continuation tokens;
//! one call per page, newest-first, no auth required.

use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};

const RPC_ID: &str = "UsvDTd";
/// Largest page the RPC serves.
const PAGE_SIZE: u32 = 199;
/// Sort order 2 is newest-first.
const SORT_NEWEST: u8 = 2;
/// Safety stop for a runaway continuation chain.
const MAX_PAGES: usize = 500;
const PAGE_PAUSE: Duration = Duration::from_millis(300);

/// One normalized Play Store review.
#[derive(Debug, Clone)]
pub struct PlayReview {
    pub username: String,
    pub content: String,
    pub score: f64,
    pub at_unix: i64,
    pub reply_content: Option<String>,
}

fn rpc_url(lang: &str, country: &str) -> String {
    format!(
        "https://play.google.com/_/PlayStoreUi/data/batchexecute?hl={lang}&gl={country}"
    )
}

fn rpc_body(package: &str, token: Option<&str>) -> String {
    let paging = match token {
        Some(t) => format!("[{PAGE_SIZE},null,\\\"{t}\\\"]"),
        None => format!("[{PAGE_SIZE},null,null]"),
    };
    let inner = format!(
        "[null,null,[2,{SORT_NEWEST},{paging},null,[]],[\\\"{package}\\\",7]]"
    );
    let envelope = format!("[[[\"{RPC_ID}\",\"{inner}\",null,\"generic\"]]]");
    format!("f.req={}", urlencoded(&envelope))
}

// Minimal form encoding; the envelope only needs the reserved characters.
fn urlencoded(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Peel the anti-hijack prefix and the double-encoded payload off one
/// `batchexecute` response; returns the raw review rows and the
/// continuation token.
fn parse_envelope(body: &str) -> Result<(Vec<Value>, Option<String>)> {
    let stripped = body.trim_start_matches(")]}'").trim_start();
    let outer: Value =
        serde_json::from_str(stripped).map_err(|_| ScrapeError::MalformedResponse {
            context: "batch envelope is not JSON".to_string(),
        })?;
    let payload = outer
        .get(0)
        .and_then(|row| row.get(2))
        .and_then(|v| v.as_str())
        .ok_or_else(|| ScrapeError::MalformedResponse {
            context: "batch envelope missing payload string".to_string(),
        })?;
    let inner: Value =
        serde_json::from_str(payload).map_err(|_| ScrapeError::MalformedResponse {
            context: "batch payload is not JSON".to_string(),
        })?;
    let rows = inner
        .get(0)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let token = inner
        .get(1)
        .and_then(|v| v.get(1))
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string());
    Ok((rows, token))
}

/// Field positions inside one review row, as the web client reads them.
fn review_from_row(row: &Value) -> Option<PlayReview> {
    let username = row.get(1)?.get(0)?.as_str()?.to_string();
    let score = row.get(2)?.as_f64()?;
    let content = row
        .get(4)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let at_unix = row.get(5)?.get(0)?.as_i64()?;
    let reply_content = row
        .get(7)
        .and_then(|v| v.get(1))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    Some(PlayReview {
        username,
        content,
        score,
        at_unix,
        reply_content,
    })
}

/// Pull every review for a package in one storefront language. The RPC
/// carries its own pagination; a malformed page ends the chain with what
/// was collected so far.
pub async fn pull_language(
    client: &reqwest::Client,
    package: &str,
    lang: &str,
    country: &str,
) -> Result<Vec<PlayReview>> {
    let url = rpc_url(lang, country);
    let mut collected = Vec::new();
    let mut token: Option<String> = None;

    for page in 0..MAX_PAGES {
        let body = client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded;charset=UTF-8")
            .body(rpc_body(package, token.as_deref()))
            .send()
            .await?
            .text()
            .await?;
        let (rows, next) = match parse_envelope(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(package, lang, page, error = %e, "stopping on malformed page");
                break;
            }
        };
        let before = collected.len();
        collected.extend(rows.iter().filter_map(review_from_row));
        debug!(
            package,
            lang,
            page,
            added = collected.len() - before,
            "review page parsed"
        );
        token = next;
        if token.is_none() {
            break;
        }
        sleep(PAGE_PAUSE).await;
    }
    Ok(collected)
}

/// Two storefront passes, Traditional Chinese then English, both pinned to
/// the Taiwan country code. Duplicate suppression is left to the natural
/// key downstream.
pub async fn pull_all(package: &str) -> Result<Vec<PlayReview>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let mut all = pull_language(&client, package, "zh_TW", "tw").await?;
    let english = pull_language(&client, package, "en", "tw").await?;
    all.extend(english);
    Ok(all)
}
