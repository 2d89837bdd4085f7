use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use sc0ut::harvest::{HarvestEvent, HarvestTargets, run_harvest};
use sc0ut::{BatchConfig, SessionConfig, data_io, scrape_all, urls};

#[derive(Parser)]
#[command(name = "sc0ut", version, about = "App storefront scraping and review harvesting")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter, e.g. `sc0ut=debug`. Logs go to stderr; stdout carries
    /// only the result document.
    #[arg(long, global = true, default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest reviews from one or both storefronts and print a result
    /// document on stdout.
    Reviews {
        /// App Store listing URL, e.g. https://apps.apple.com/tw/app/line/id443904275
        #[arg(long)]
        apple_url: Option<String>,

        /// Play Store listing URL, e.g. https://play.google.com/store/apps/details?id=jp.naver.line.android
        #[arg(long)]
        google_url: Option<String>,

        /// Also write the corpus to a file; .csv or .json decides the format.
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Scrape listing pages and print one record or error object per URL.
    Listings {
        #[arg(long = "ios-url")]
        ios_urls: Vec<String>,

        #[arg(long = "android-url")]
        android_urls: Vec<String>,

        /// WebDriver endpoint of a running chromedriver.
        #[arg(long, default_value = "http://127.0.0.1:9515")]
        webdriver_url: String,

        /// Run the browser with a visible window.
        #[arg(long)]
        headed: bool,
    },
}

fn init_tracing(filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: &str, details: impl std::fmt::Display) -> ! {
    eprintln!("{}", json!({ "error": message, "details": details.to_string() }));
    std::process::exit(1);
}

async fn run_reviews(
    apple_url: Option<String>,
    google_url: Option<String>,
    output: Option<String>,
) -> Result<()> {
    let mut targets = HarvestTargets::default();
    if let Some(url) = &apple_url {
        match urls::parse_apple_url(url) {
            Ok(target) => targets.apple = Some(target),
            Err(e) => fail("invalid App Store URL", e),
        }
    }
    if let Some(url) = &google_url {
        match urls::parse_google_url(url) {
            Ok(package) => targets.google_package = Some(package),
            Err(e) => fail("invalid Play Store URL", e),
        }
    }
    if targets.apple.is_none() && targets.google_package.is_none() {
        fail("nothing to harvest", "pass --apple-url and/or --google-url");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(async move { run_harvest(targets, &tx).await });

    while let Some(event) = rx.recv().await {
        match event {
            HarvestEvent::Status(message) => eprintln!("[status] {message}"),
            HarvestEvent::Batch { platform, count } => {
                eprintln!("[batch] {platform}: {count} reviews")
            }
            HarvestEvent::Error(message) => eprintln!("[error] {message}"),
            HarvestEvent::Finished { rows } => eprintln!("[done] {rows} reviews collected"),
        }
    }

    match worker.await? {
        Ok(corpus) => {
            if let Some(path) = &output {
                if let Err(e) = data_io::write_corpus(path, &corpus) {
                    fail("could not write output file", e);
                }
            }
            println!(
                "{}",
                json!({ "success": true, "data": corpus, "rows": corpus.len() })
            );
            Ok(())
        }
        Err(e) => fail("review harvest failed", e),
    }
}

async fn run_listings(
    ios_urls: Vec<String>,
    android_urls: Vec<String>,
    webdriver_url: String,
    headed: bool,
) -> Result<()> {
    if ios_urls.is_empty() && android_urls.is_empty() {
        fail("nothing to scrape", "pass --ios-url and/or --android-url");
    }
    let cfg = BatchConfig {
        session: SessionConfig {
            endpoint: webdriver_url,
            headless: !headed,
            ..SessionConfig::default()
        },
        ..BatchConfig::default()
    };
    let (ios, android) = scrape_all(&cfg, &ios_urls, &android_urls).await;
    let doc = json!({
        "ios": ios.iter().map(|o| o.to_value()).collect::<Vec<_>>(),
        "android": android.iter().map(|o| o.to_value()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);
    match cli.command {
        Command::Reviews {
            apple_url,
            google_url,
            output,
        } => run_reviews(apple_url, google_url, output).await,
        Command::Listings {
            ios_urls,
            android_urls,
            webdriver_url,
            headed,
        } => run_listings(ios_urls, android_urls, webdriver_url, headed).await,
    }
}
