//! App storefront intelligence: resilient listing scrapes over a rendering
//! engine, cross-store identity matching, and review harvesting from both
//! the App Store catalog API and the Play Store web RPC.

pub mod android;
pub mod batch;
pub mod data_io;
pub mod error;
pub mod harvest;
pub mod ios;
pub mod listing;
pub mod locator;
pub mod matcher;
pub mod normalize;
pub mod record;
pub mod retry;
pub mod reviews_android;
pub mod reviews_ios;
pub mod session;
pub mod urls;

pub use batch::{BatchConfig, ScrapeOutcome, scrape_all, scrape_batch};
pub use error::{Result, ScrapeError};
pub use harvest::{HarvestEvent, HarvestTargets, ReviewEntry, run_harvest};
pub use record::{ListingRecord, Platform};
pub use session::{RenderSession, SessionConfig};
