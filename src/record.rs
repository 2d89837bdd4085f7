use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Traditional-Chinese sentinel emitted when a field cannot be extracted.
/// Consumers rely on these exact strings, so they are part of the contract.
pub mod sentinel {
    pub const NAME: &str = "未知名稱";
    pub const CATEGORY: &str = "未知類別";
    pub const DEVELOPER: &str = "未知開發者";
    pub const RATING: &str = "未知評分";
    pub const RATING_COUNT: &str = "未知評分數";
    pub const PRICE: &str = "未知價格";
    pub const ICON_URL: &str = "未知圖示URL";
    pub const VERSION: &str = "未知版本";
    pub const UPDATE_DATE: &str = "未知更新日期";
    pub const FREE: &str = "免費";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::Android => "Android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scraped store listing. Scraped fields always hold either a real value
/// or a sentinel; the match-annotation pair starts empty and is filled at
/// most once by [`ListingRecord::annotate_match`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub app_name: String,
    pub category: Option<String>,
    pub developer: String,
    pub rating: String,
    pub rating_count: String,
    pub price: String,
    pub icon_url: String,
    pub url: String,
    pub platform: Platform,
    pub version: Option<String>,
    pub update_date: Option<String>,
    pub ios_similar_app: Option<String>,
    /// Match score rendered as a percentage, e.g. `52.00%`.
    pub similarity: Option<String>,
}

impl ListingRecord {
    /// Empty record where every scraped field starts at its sentinel.
    pub fn unknown(platform: Platform, url: &str) -> Self {
        Self {
            app_name: sentinel::NAME.to_string(),
            category: None,
            developer: sentinel::DEVELOPER.to_string(),
            rating: sentinel::RATING.to_string(),
            rating_count: sentinel::RATING_COUNT.to_string(),
            price: sentinel::PRICE.to_string(),
            icon_url: sentinel::ICON_URL.to_string(),
            url: url.to_string(),
            platform,
            version: None,
            update_date: None,
            ios_similar_app: None,
            similarity: None,
        }
    }

    /// Attach the cross-store match result. Overwrites any earlier
    /// annotation; the batch layer calls this at most once per record.
    pub fn annotate_match(&mut self, ios_name: &str, category: &str, score: f64) {
        self.ios_similar_app = Some(ios_name.to_string());
        self.category = Some(category.to_string());
        self.similarity = Some(format!("{:.2}%", score * 100.0));
    }

    /// Stable export form: every key always present, scraped fields never
    /// null (sentinels substitute), annotation fields null until matched.
    pub fn export(&self) -> Value {
        json!({
            "app_name": self.app_name,
            "category": self.category.as_deref().unwrap_or(sentinel::CATEGORY),
            "developer": self.developer,
            "rating": self.rating,
            "rating_count": self.rating_count,
            "price": self.price,
            "icon_url": self.icon_url,
            "url": self.url,
            "platform": self.platform.as_str(),
            "version": self.version.as_deref().unwrap_or(sentinel::VERSION),
            "update_date": self.update_date.as_deref().unwrap_or(sentinel::UPDATE_DATE),
            "ios_similar_app": self.ios_similar_app,
            "similarity": self.similarity,
        })
    }
}
