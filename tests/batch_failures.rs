//! Batch fidelity when the rendering engine is unreachable: every input URL
//! must come back as its own error object, in input order, URL verbatim.

use std::time::Duration;

use sc0ut::batch::{BatchConfig, ScrapeOutcome, scrape_batch};
use sc0ut::error::ScrapeError;
use sc0ut::listing::scrape_listing;
use sc0ut::record::Platform;
use sc0ut::session::SessionConfig;

fn dead_engine() -> BatchConfig {
    BatchConfig {
        session: SessionConfig {
            // discard port; connections are refused immediately
            endpoint: "http://127.0.0.1:9".to_string(),
            ..SessionConfig::default()
        },
        ..BatchConfig::default()
    }
}

#[tokio::test]
async fn unreachable_engine_yields_one_failure_per_url() {
    let urls = vec![
        "https://apps.apple.com/tw/app/line/id443904275".to_string(),
        "https://apps.apple.com/tw/app/%E5%9C%B0%E5%9C%96/id915056765".to_string(),
        "https://apps.apple.com/tw/app/maps/id915056766".to_string(),
    ];
    let outcomes = scrape_batch(&dead_engine(), Platform::Ios, &urls).await;
    assert_eq!(outcomes.len(), urls.len());
    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            ScrapeOutcome::Failure { error, url } => {
                assert_eq!(url, &urls[i], "failure must carry the input URL verbatim");
                assert!(
                    error.contains("engine startup"),
                    "unexpected error text: {error}"
                );
            }
            ScrapeOutcome::Listing(_) => panic!("no listing can come from a dead engine"),
        }
    }
}

// An engine that accepts the TCP connection but never answers: session
// startup hangs on the response, so only the wall-clock budget can end it.
#[tokio::test(start_paused = true)]
async fn session_startup_counts_against_the_url_budget() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let cfg = SessionConfig {
        endpoint: format!("http://{}", listener.local_addr().unwrap()),
        ..SessionConfig::default()
    };
    let started = tokio::time::Instant::now();
    let err = scrape_listing(
        &cfg,
        Platform::Ios,
        "https://apps.apple.com/tw/app/line/id443904275",
        Some(Duration::from_secs(5)),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, ScrapeError::DeadlineExceeded { .. }),
        "expected the budget to end the stalled startup, got: {err}"
    );
    assert!(started.elapsed() >= Duration::from_secs(5));
    drop(listener);
}

#[tokio::test]
async fn failure_documents_expose_error_and_url_keys() {
    let urls = vec!["https://play.google.com/store/apps/details?id=a.b".to_string()];
    let outcomes = scrape_batch(&dead_engine(), Platform::Android, &urls).await;
    let doc = outcomes[0].to_value();
    assert!(doc.get("error").is_some());
    assert_eq!(doc["url"], urls[0].as_str());
}
