//! Declarative field extraction: each scraped field carries an ordered list
//! of locator strategies and a sentinel. The first strategy that yields a
//! usable value wins; when all miss, the sentinel stands in and the scrape
//! carries on.

use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::session::RenderSession;

/// One way to locate a field on the page.
#[derive(Debug, Clone, Copy)]
pub struct Locator {
    pub css: &'static str,
    /// How long to poll for this selector before falling through.
    pub wait: Duration,
    /// Read this attribute instead of the element text.
    pub attr: Option<&'static str>,
}

impl Locator {
    pub const fn text(css: &'static str, wait_ms: u64) -> Self {
        Self {
            css,
            wait: Duration::from_millis(wait_ms),
            attr: None,
        }
    }

    pub const fn attr(css: &'static str, attr: &'static str, wait_ms: u64) -> Self {
        Self {
            css,
            wait: Duration::from_millis(wait_ms),
            attr: Some(attr),
        }
    }
}

/// A scraped field: name for logs, ordered strategies, a post-extraction
/// normalizer that may still reject the raw value, and the sentinel used
/// when everything misses.
pub struct FieldSpec {
    pub name: &'static str,
    pub sentinel: &'static str,
    pub strategies: &'static [Locator],
    pub normalize: fn(&str) -> Option<String>,
}

/// Accept any non-empty value unchanged.
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Try the strategies in order and return the first non-empty raw value.
/// Element misses fall through to the next strategy; session-level errors
/// propagate.
pub async fn raw_first(session: &RenderSession, strategies: &[Locator]) -> Result<Option<String>> {
    for locator in strategies {
        let found = if locator.wait.is_zero() {
            session.find(locator.css).await
        } else {
            session.wait_for(locator.css, locator.wait).await
        };
        let element = match found {
            Ok(el) => el,
            Err(ScrapeError::ElementNotFound { .. }) => continue,
            Err(e) => return Err(e),
        };
        let raw = match locator.attr {
            Some(attr) => element.attr(attr).await?.unwrap_or_default(),
            None => element.text().await?,
        };
        if !raw.trim().is_empty() {
            return Ok(Some(raw));
        }
    }
    Ok(None)
}

impl FieldSpec {
    /// Extract this field, collapsing every miss into the sentinel.
    pub async fn extract(&self, session: &RenderSession) -> Result<String> {
        match raw_first(session, self.strategies).await? {
            Some(raw) => match (self.normalize)(&raw) {
                Some(value) => Ok(value),
                None => {
                    debug!(field = self.name, raw = %raw, "normalizer rejected value");
                    Ok(self.sentinel.to_string())
                }
            },
            None => {
                debug!(field = self.name, "all locator strategies missed");
                Ok(self.sentinel.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims_and_rejects_blank() {
        assert_eq!(non_empty("  LINE  ").as_deref(), Some("LINE"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }

    #[test]
    fn locator_constructors_set_wait_budget() {
        let l = Locator::text(".product-header__title", 10_000);
        assert_eq!(l.wait, Duration::from_secs(10));
        assert!(l.attr.is_none());
        let a = Locator::attr("img", "src", 0);
        assert!(a.wait.is_zero());
        assert_eq!(a.attr, Some("src"));
    }
}
