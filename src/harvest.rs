//! Unified review harvest: pull from both storefronts, normalize into one
//! schema, and report progress over an event channel so the frontend can
//! stay a dumb drain loop.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::Result;
use crate::normalize::{canonical_date, date_from_unix, detect_language, review_key};
use crate::record::Platform;
use crate::reviews_android::{self, PlayReview};
use crate::reviews_ios::{self, AppleReviewsClient};
use crate::urls::AppleTarget;

/// Progress events emitted while a harvest runs.
#[derive(Debug)]
pub enum HarvestEvent {
    Status(String),
    Batch { platform: Platform, count: usize },
    Error(String),
    Finished { rows: usize },
}

pub fn send_status(tx: &UnboundedSender<HarvestEvent>, message: impl Into<String>) {
    let _ = tx.send(HarvestEvent::Status(message.into()));
}

/// What to harvest; either side may be absent.
#[derive(Debug, Clone, Default)]
pub struct HarvestTargets {
    pub apple: Option<AppleTarget>,
    pub google_package: Option<String>,
}

/// One review in the cross-store schema.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    /// Natural key, `date_username`.
    pub key: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub username: String,
    pub review: String,
    pub rating: f64,
    pub platform: Platform,
    #[serde(rename = "developerResponse")]
    pub developer_response: String,
    pub language: String,
}

/// Flatten one raw catalog review into the unified schema.
fn ios_entry(raw: &Value) -> Option<ReviewEntry> {
    let attrs = raw.get("attributes")?;
    let date_raw = attrs.get("date")?.as_str()?;
    let date = canonical_date(date_raw).unwrap_or_else(|| date_raw.to_string());
    let username = attrs
        .get("userName")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let review = attrs
        .get("review")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let rating = attrs.get("rating").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let developer_response = attrs
        .pointer("/developerResponse/body")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let language = detect_language(&review).to_string();
    Some(ReviewEntry {
        key: review_key(&date, &username),
        date,
        username,
        review,
        rating,
        platform: Platform::Ios,
        developer_response,
        language,
    })
}

fn android_entry(r: &PlayReview) -> ReviewEntry {
    let date = date_from_unix(r.at_unix).unwrap_or_default();
    // storefront passes are zh/en only, so the tag is binary here
    let language = if detect_language(&r.content) == "zh" {
        "zh"
    } else {
        "en"
    };
    ReviewEntry {
        key: review_key(&date, &r.username),
        date,
        username: r.username.clone(),
        review: r.content.clone(),
        rating: r.score,
        platform: Platform::Android,
        developer_response: r.reply_content.clone().unwrap_or_default(),
        language: language.to_string(),
    }
}

/// Order newest-first; the date format makes lexicographic and
/// chronological order agree.
fn sort_newest_first(entries: &mut [ReviewEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Run the full harvest for the given targets. Events narrate progress;
/// the returned corpus is merged across stores and sorted newest-first.
pub async fn run_harvest(
    targets: HarvestTargets,
    tx: &UnboundedSender<HarvestEvent>,
) -> Result<Vec<ReviewEntry>> {
    let mut corpus = Vec::new();

    if let Some(apple) = &targets.apple {
        send_status(tx, format!("fetching App Store reviews for id{}", apple.app_id));
        let result = async {
            let client = AppleReviewsClient::connect(apple.clone()).await?;
            reviews_ios::pull_all(&client, &apple.app_id).await
        }
        .await;
        match result {
            Ok(raw) => {
                let entries: Vec<ReviewEntry> = raw.iter().filter_map(ios_entry).collect();
                debug!(raw = raw.len(), kept = entries.len(), "ios reviews normalized");
                let _ = tx.send(HarvestEvent::Batch {
                    platform: Platform::Ios,
                    count: entries.len(),
                });
                corpus.extend(entries);
            }
            Err(e) => {
                let _ = tx.send(HarvestEvent::Error(e.to_string()));
                return Err(e);
            }
        }
    }

    if let Some(package) = &targets.google_package {
        send_status(tx, format!("fetching Play Store reviews for {package}"));
        match reviews_android::pull_all(package).await {
            Ok(raw) => {
                let entries: Vec<ReviewEntry> = raw.iter().map(android_entry).collect();
                let _ = tx.send(HarvestEvent::Batch {
                    platform: Platform::Android,
                    count: entries.len(),
                });
                corpus.extend(entries);
            }
            Err(e) => {
                let _ = tx.send(HarvestEvent::Error(e.to_string()));
                return Err(e);
            }
        }
    }

    sort_newest_first(&mut corpus);
    let _ = tx.send(HarvestEvent::Finished { rows: corpus.len() });
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ios_entry_flattens_attributes() {
        let raw = json!({
            "id": "1",
            "attributes": {
                "date": "2023-05-01T08:30:00Z",
                "userName": "小明",
                "review": "介面直覺，訊息同步也快",
                "rating": 5,
                "developerResponse": { "body": "謝謝支持！" }
            },
            "offset": 1, "n_batch": 1, "app_id": "443904275"
        });
        let entry = ios_entry(&raw).unwrap();
        assert_eq!(entry.key, "2023-05-01_小明");
        assert_eq!(entry.date, "2023-05-01");
        assert_eq!(entry.rating, 5.0);
        assert_eq!(entry.platform, Platform::Ios);
        assert_eq!(entry.developer_response, "謝謝支持！");
        assert_eq!(entry.language, "zh");
    }

    #[test]
    fn ios_entry_defaults_missing_response_to_empty() {
        let raw = json!({
            "attributes": {
                "date": "2023-05-01T08:30:00Z",
                "userName": "amy",
                "review": "Works well on my phone, highly recommended",
                "rating": 4
            }
        });
        let entry = ios_entry(&raw).unwrap();
        assert_eq!(entry.developer_response, "");
        assert_eq!(entry.language, "en");
    }

    #[test]
    fn android_entry_maps_epoch_and_reply() {
        let review = PlayReview {
            username: "小華".to_string(),
            content: "很實用的程式".to_string(),
            score: 4.0,
            at_unix: 1_683_000_000,
            reply_content: Some("感謝您的回饋".to_string()),
        };
        let entry = android_entry(&review);
        assert_eq!(entry.date, "2023-05-02");
        assert_eq!(entry.key, "2023-05-02_小華");
        assert_eq!(entry.language, "zh");
        assert_eq!(entry.developer_response, "感謝您的回饋");

        let english = PlayReview {
            username: "bob".to_string(),
            content: "Decent app overall".to_string(),
            score: 3.0,
            at_unix: 1_683_000_000,
            reply_content: None,
        };
        assert_eq!(android_entry(&english).language, "en");
        assert_eq!(android_entry(&english).developer_response, "");
    }

    #[test]
    fn corpus_sorts_newest_first() {
        let mk = |date: &str| ReviewEntry {
            key: format!("{date}_u"),
            date: date.to_string(),
            username: "u".to_string(),
            review: String::new(),
            rating: 3.0,
            platform: Platform::Ios,
            developer_response: String::new(),
            language: "en".to_string(),
        };
        let mut entries = vec![mk("2022-01-05"), mk("2023-11-30"), mk("2023-02-14")];
        sort_newest_first(&mut entries);
        let dates: Vec<&str> = entries.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2023-11-30", "2023-02-14", "2022-01-05"]);
    }
}
