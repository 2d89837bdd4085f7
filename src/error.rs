use thiserror::Error;

/// Failure taxonomy for scrape and harvest sessions.
///
/// Field-level misses never surface here; they collapse into sentinel values
/// inside the extractor. These variants cover listing- and session-level
/// outcomes only.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The rendering engine could not be started. Fatal, never retried.
    #[error("rendering engine startup failed: {0}")]
    EngineStartup(String),

    #[error("navigation timed out for {url}")]
    NavigationTimeout { url: String },

    #[error("no element matched `{locator}` within its wait budget")]
    ElementNotFound { locator: String },

    /// Every retry of a full listing scrape failed. Carries the caller's URL
    /// verbatim so batch consumers can report it per item.
    #[error("scrape of {url} failed after {attempts} attempts: {source}")]
    ScrapeExhausted {
        url: String,
        attempts: usize,
        #[source]
        source: Box<ScrapeError>,
    },

    /// No bearer token was found in the listing page. Fatal for the whole
    /// review-harvest session.
    #[error("no authorization token found on {url}")]
    AuthTokenMissing { url: String },

    #[error("rate limited, gave up after {retries} retries")]
    RateLimited { retries: usize },

    #[error("malformed upstream response: {context}")]
    MalformedResponse { context: String },

    #[error("webdriver error {name}: {message}")]
    WebDriver { name: String, message: String },

    #[error("scrape abandoned after {seconds}s wall-clock budget")]
    DeadlineExceeded { seconds: u64 },

    #[error("unrecognized store URL: {0}")]
    BadStoreUrl(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// Session-level failures that must propagate immediately instead of
    /// being absorbed by a retry loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::EngineStartup(_)
                | ScrapeError::AuthTokenMissing { .. }
                | ScrapeError::DeadlineExceeded { .. }
        )
    }
}
