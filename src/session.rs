//! Rendering session over the WebDriver wire protocol, spoken directly with
//! reqwest. One session per scrape task; callers must close on every exit
//! path because a leaked browser keeps its profile and memory alive.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// Poll interval while waiting for an element to appear.
const WAIT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebDriver endpoint, e.g. `http://127.0.0.1:9515`.
    pub endpoint: String,
    pub headless: bool,
    /// Accept-Language / --lang value forced on the browser.
    pub locale: String,
    pub page_load_timeout: Duration,
    pub script_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9515".to_string(),
            headless: true,
            locale: "zh-TW".to_string(),
            page_load_timeout: Duration::from_secs(30),
            script_timeout: Duration::from_secs(30),
        }
    }
}

fn chrome_capabilities(cfg: &SessionConfig) -> Value {
    let mut args = Vec::<String>::new();
    if cfg.headless {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1920,1080".to_string());
    args.push("--disable-gpu".to_string());
    args.push("--disable-dev-shm-usage".to_string());
    args.push("--disable-extensions".to_string());
    args.push("--no-first-run".to_string());
    args.push("--no-default-browser-check".to_string());
    args.push("--blink-settings=imagesEnabled=false".to_string());
    args.push("--aggressive-cache-discard".to_string());
    args.push("--disable-cache".to_string());
    args.push("--disk-cache-size=0".to_string());
    args.push(format!("--lang={}", cfg.locale));
    if !cfg!(target_os = "macos") {
        args.push("--no-sandbox".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "acceptInsecureCerts": true,
                "pageLoadStrategy": "eager",
                "goog:chromeOptions": {
                    "args": args,
                    "prefs": { "intl.accept_languages": cfg.locale }
                }
            }
        }
    })
}

pub(crate) fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}

/// A live browser session. Dropping it does not close the browser; call
/// [`RenderSession::close`].
pub struct RenderSession {
    client: reqwest::Client,
    base: String,
    session_id: String,
}

/// Handle to a located element, scoped to its session.
pub struct Element<'a> {
    session: &'a RenderSession,
    id: String,
}

impl RenderSession {
    /// Create a browser session. Any failure here is an
    /// [`ScrapeError::EngineStartup`], which callers treat as fatal.
    pub async fn start(cfg: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(40))
            .build()
            .map_err(|e| ScrapeError::EngineStartup(format!("http client build failed: {e}")))?;

        let base = cfg.endpoint.trim_end_matches('/').to_string();
        let caps = chrome_capabilities(cfg);
        let res = client
            .post(format!("{base}/session"))
            .json(&caps)
            .send()
            .await
            .map_err(|e| ScrapeError::EngineStartup(format!("session create failed: {e}")))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| ScrapeError::EngineStartup(format!("session create read failed: {e}")))?;
        if !status.is_success() {
            return Err(ScrapeError::EngineStartup(format!(
                "session create HTTP {}: {}",
                status.as_u16(),
                truncate_for_log(&body, 260)
            )));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ScrapeError::EngineStartup(format!("session create parse failed: {e}")))?;
        if let Some(err) = value.pointer("/value/error").and_then(|v| v.as_str()) {
            let message = value
                .pointer("/value/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown webdriver error");
            return Err(ScrapeError::EngineStartup(format!("{err}: {message}")));
        }
        let session_id = value
            .pointer("/value/sessionId")
            .and_then(|v| v.as_str())
            .or_else(|| value.pointer("/sessionId").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ScrapeError::EngineStartup(format!(
                    "session id missing in response: {}",
                    truncate_for_log(&body, 220)
                ))
            })?;

        let session = Self {
            client,
            base,
            session_id,
        };
        session
            .command(
                Method::POST,
                "/timeouts",
                Some(json!({
                    "pageLoad": cfg.page_load_timeout.as_millis() as u64,
                    "script": cfg.script_timeout.as_millis() as u64,
                })),
            )
            .await?;
        debug!(session = %session.session_id, "render session started");
        Ok(session)
    }

    /// Single webdriver command against this session; maps wire errors to
    /// [`ScrapeError::WebDriver`].
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let value: Value = serde_json::from_str(&text).unwrap_or_default();
        if let Some(err) = value.pointer("/value/error").and_then(|v| v.as_str()) {
            let message = value
                .pointer("/value/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown webdriver error");
            return Err(ScrapeError::WebDriver {
                name: err.to_string(),
                message: truncate_for_log(message, 240),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::WebDriver {
                name: format!("http {}", status.as_u16()),
                message: truncate_for_log(&text, 240),
            });
        }
        Ok(value)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        match self
            .command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
        {
            Ok(_) => Ok(()),
            Err(ScrapeError::WebDriver { name, .. }) if name == "timeout" => {
                Err(ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Find the first element matching a CSS selector, without waiting.
    pub async fn find(&self, css: &str) -> Result<Element<'_>> {
        let value = match self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await
        {
            Ok(v) => v,
            Err(ScrapeError::WebDriver { name, .. }) if name == "no such element" => {
                return Err(ScrapeError::ElementNotFound {
                    locator: css.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        element_id(&value)
            .map(|id| Element { session: self, id })
            .ok_or_else(|| ScrapeError::ElementNotFound {
                locator: css.to_string(),
            })
    }

    /// All elements matching a CSS selector; empty when none match.
    pub async fn find_all(&self, css: &str) -> Result<Vec<Element<'_>>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        Ok(value
            .pointer("/value")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(element_id_from_entry)
                    .map(|id| Element { session: self, id })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Poll for an element until it appears or the wait budget runs out.
    pub async fn wait_for(&self, css: &str, wait: Duration) -> Result<Element<'_>> {
        let deadline = Instant::now() + wait;
        loop {
            match self.find(css).await {
                Ok(el) => return Ok(el),
                Err(ScrapeError::ElementNotFound { .. }) if Instant::now() < deadline => {
                    sleep(WAIT_POLL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a synchronous script in page context and return its value.
    pub async fn execute(&self, script: &str) -> Result<Value> {
        let value = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({ "script": script, "args": [] })),
            )
            .await?;
        Ok(value.pointer("/value").cloned().unwrap_or(Value::Null))
    }

    /// Full page source after rendering.
    pub async fn page_source(&self) -> Result<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .pointer("/value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ScrapeError::MalformedResponse {
                context: "page source missing".to_string(),
            })
    }

    /// Delete the browser session. Errors are swallowed; there is nothing a
    /// caller can do about a failed teardown.
    pub async fn close(self) {
        let url = format!("{}/session/{}", self.base, self.session_id);
        if let Err(e) = self.client.delete(url).send().await {
            debug!(error = %e, "session delete failed");
        }
    }
}

impl Element<'_> {
    /// Rendered text of the element, trimmed.
    pub async fn text(&self) -> Result<String> {
        let value = self
            .session
            .command(Method::GET, &format!("/element/{}/text", self.id), None)
            .await?;
        Ok(value
            .pointer("/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Attribute value, `None` when the attribute is absent.
    pub async fn attr(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .session
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{name}", self.id),
                None,
            )
            .await?;
        Ok(value
            .pointer("/value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    pub async fn click(&self) -> Result<()> {
        self.session
            .command(
                Method::POST,
                &format!("/element/{}/click", self.id),
                Some(json!({})),
            )
            .await?;
        Ok(())
    }
}

/// The element id lives under a W3C-mandated opaque key; take the first
/// string value to stay driver-agnostic.
fn element_id(value: &Value) -> Option<String> {
    value
        .pointer("/value")
        .and_then(element_id_from_entry)
}

fn element_id_from_entry(entry: &Value) -> Option<String> {
    entry
        .as_object()?
        .values()
        .find_map(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_carry_locale_and_render_flags() {
        let cfg = SessionConfig::default();
        let caps = chrome_capabilities(&cfg);
        let args = caps
            .pointer("/capabilities/alwaysMatch/goog:chromeOptions/args")
            .and_then(|v| v.as_array())
            .unwrap();
        let has = |flag: &str| args.iter().any(|a| a.as_str() == Some(flag));
        assert!(has("--headless=new"));
        assert!(has("--lang=zh-TW"));
        assert!(has("--blink-settings=imagesEnabled=false"));
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/pageLoadStrategy")
                .and_then(|v| v.as_str()),
            Some("eager")
        );
    }

    #[test]
    fn element_ids_are_extracted_from_opaque_keys() {
        let value = serde_json::json!({
            "value": { "element-6066-11e4-a52e-4f735466cecf": "abc-123" }
        });
        assert_eq!(element_id(&value).as_deref(), Some("abc-123"));
        assert_eq!(element_id(&serde_json::json!({ "value": null })), None);
    }

    #[test]
    fn log_truncation_is_char_safe() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("未知名稱未知", 4), "未知名稱...");
    }
}
