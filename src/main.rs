//! Fetchloom command-line driver
//!
//! Fetches a page through the full orchestration stack (domain headers,
//! pacing, concurrency gate, retries), runs it through the registered
//! fetch-page pipeline, and prints the extracted fields as JSON.

use anyhow::Context;
use clap::Parser;
use fetchloom::config::{load_config, Config};
use fetchloom::pipeline::PipelineContext;
use fetchloom::{logging, Crawler, SelectorSpec};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Fetchloom: a concurrent fetch-orchestration engine
#[derive(Parser, Debug)]
#[command(name = "fetchloom")]
#[command(version)]
#[command(about = "Fetch a page through the orchestration engine", long_about = None)]
struct Cli {
    /// The URL to fetch
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Named CSS selector to extract, as name=selector (repeatable)
    #[arg(short, long = "selector", value_name = "NAME=CSS", value_parser = parse_selector)]
    selectors: Vec<(String, String)>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn parse_selector(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, css)) if !name.is_empty() && !css.is_empty() => {
            Ok((name.to_string(), css.to_string()))
        }
        _ => Err(format!("expected NAME=CSS, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    apply_verbosity(&mut config, cli.verbose, cli.quiet);
    logging::init(&config.logging);

    let crawler = Arc::new(Crawler::new(config)?);
    register_fetch_page(&crawler);

    let selectors: serde_json::Map<String, Value> = cli
        .selectors
        .iter()
        .map(|(name, css)| (name.clone(), json!(css)))
        .collect();

    let context = PipelineContext::new()
        .with("url", json!(cli.url))
        .with("selectors", Value::Object(selectors));

    let result = crawler.execute_pipeline("fetch-page", context).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Maps -v/-q flags onto the logging config
fn apply_verbosity(config: &mut Config, verbose: u8, quiet: bool) {
    if quiet {
        config.logging.level = "error".to_string();
    } else if verbose > 0 {
        config.logging.level = match verbose {
            1 => "fetchloom=debug,info".to_string(),
            _ => "trace".to_string(),
        };
    }
}

/// Registers the timing middleware and the fetch-page pipeline
fn register_fetch_page(crawler: &Arc<Crawler>) {
    crawler.use_middleware(|_crawler, ctx| async move {
        Ok(Some(ctx.with(
            "started-at",
            json!(chrono::Utc::now().to_rfc3339()),
        )))
    });

    crawler.add_pipeline("fetch-page", |crawler, ctx| async move {
        let url = ctx
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                fetchloom::CrawlError::new(
                    fetchloom::ErrorKind::Validation,
                    "fetch-page requires a 'url' context field",
                )
            })?
            .to_string();

        let response = crawler.fetch(&url).await?;

        let mut selectors: BTreeMap<String, SelectorSpec> = BTreeMap::new();
        selectors.insert("title".to_string(), SelectorSpec::css("title"));
        if let Some(extra) = ctx.get("selectors").and_then(Value::as_object) {
            for (name, css) in extra {
                if let Some(css) = css.as_str() {
                    selectors.insert(name.clone(), SelectorSpec::css(css));
                }
            }
        }

        let document = crawler.parse(&response.body)?;
        let fields = crawler.extract(&document, &selectors);
        drop(document);

        Ok(json!({
            "url": response.url,
            "status": response.status,
            "started-at": ctx.get("started-at").cloned().unwrap_or(Value::Null),
            "fields": fields,
        }))
    });
}
