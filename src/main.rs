//! Sumi-Harvest main entry point
//!
//! This is the command-line driver for the Sumi-Harvest entity harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{load_plan_with_hash, CrawlPlan};
use sumi_harvest::crawler::{start_crawl, HttpFetcher};
use sumi_harvest::aggregate::PageTree;
use sumi_harvest::EntityAggregate;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite entity harvester
///
/// Sumi-Harvest crawls a site from its seed URLs, extracts organization
/// details from every page with several independent strategies, and merges
/// them into one entity record with provenance.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite entity harvester", long_about = None)]
struct Cli {
    /// Path to TOML crawl plan
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the plan and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Print the whole aggregate as JSON instead of a summary
    #[arg(long, conflicts_with = "dry_run")]
    json: bool,

    /// Also print the crawled pages as a tree
    #[arg(long, conflicts_with = "json")]
    tree: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading crawl plan from: {}", cli.config.display());
    let (plan, hash) = load_plan_with_hash(&cli.config)
        .with_context(|| format!("Failed to load crawl plan {}", cli.config.display()))?;
    tracing::info!("Crawl plan loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&plan);
        return Ok(());
    }

    let entity = handle_crawl(plan).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&entity)?);
    } else {
        print_summary(&entity);
        if cli.tree {
            print_tree(&entity);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows the validated plan
fn handle_dry_run(plan: &CrawlPlan) {
    let config = &plan.config;
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Traversal: {:?}", config.crawler.traversal_order);
    println!("  Per-fetch timeout: {}s", config.crawler.per_fetch_timeout_s);
    match config.crawler.global_timeout_s {
        Some(secs) => println!("  Global timeout: {}s", secs),
        None => println!("  Global timeout: none"),
    }
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);

    println!("\nRate limit:");
    println!("  Per-domain interval: {}ms", config.rate_limit.per_domain_rate_ms);
    println!("  Max backoff: {}ms", config.rate_limit.max_backoff_ms);

    println!("\nAggregation:");
    println!("  Identifier field: {}", config.aggregation.identifier_field);
    println!(
        "  Similarity: {:?} >= {}",
        config.aggregation.similarity_algorithm, config.aggregation.similarity_threshold
    );

    println!("\nUser agent: {}", config.user_agent.header_value());

    println!("\nSeeds ({}):", plan.seeds.len());
    for seed in &plan.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Crawl plan is valid");
}

/// Handles the main crawl operation; Ctrl-C cancels and keeps a partial result
async fn handle_crawl(plan: CrawlPlan) -> anyhow::Result<EntityAggregate> {
    let timeout = Duration::from_secs(plan.config.crawler.per_fetch_timeout_s);
    let fetcher = HttpFetcher::from_config(&plan.config.user_agent, timeout)
        .context("Failed to build HTTP client")?;

    tracing::info!("Total seed URLs: {}", plan.seeds.len());
    let handle = start_crawl(&plan.seeds, plan.config, Arc::new(fetcher))?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight fetches");
            cancel.cancel();
        }
    });

    match handle.result().await {
        Ok(entity) => {
            tracing::info!("Crawl completed successfully");
            Ok(entity)
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_summary(entity: &EntityAggregate) {
    let summary = &entity.summary;
    println!("=== Harvest Summary ===\n");
    println!(
        "Pages: {} succeeded, {} failed, {} timed out, {} duplicates, {} dropped",
        summary.succeeded, summary.failed, summary.timed_out, summary.duplicates, summary.dropped
    );
    println!("Finished: {} in {:?}", summary.termination, summary.duration);
    if entity.partial {
        println!("Result is PARTIAL");
    }
    for warning in &summary.warnings {
        println!("Warning: {}", warning);
    }

    println!("\nEntity:");
    for (name, field) in &entity.fields {
        println!(
            "  {}: {} ({} from {})",
            name, field.value, field.strategy.name, field.provenance.source_url
        );
    }

    if entity.entities.len() > 1 {
        println!("\nSub-entities ({}):", entity.entities.len());
        for sub in &entity.entities {
            println!("  - {} ({} pages)", sub.identifier, sub.pages.len());
        }
    }

    if !entity.contact_hints.is_empty() {
        println!("\nContact links:");
        for hint in &entity.contact_hints {
            println!("  - {:?}: {}", hint.kind, hint.value);
        }
    }

    println!(
        "\nFields drawn from {} of {} pages",
        entity.provenance_urls().len(),
        entity.pages.len()
    );

    if !entity.manifest.failed.is_empty() {
        println!("\nFailed pages:");
        for failure in &entity.manifest.failed {
            println!("  - {}: {}", failure.url, failure.reason);
        }
    }

    if !entity.manifest.duplicates.is_empty() {
        println!("\nRedirected onto pages already fetched:");
        for duplicate in &entity.manifest.duplicates {
            println!("  - {} -> {}", duplicate.url, duplicate.final_url);
        }
    }
}

/// Prints the discovery tree, one page per line indented by depth
fn print_tree(entity: &EntityAggregate) {
    println!("\nPages:");
    let tree = entity.page_tree();
    let mut stack: Vec<&PageTree> = tree.iter().rev().collect();
    while let Some(node) = stack.pop() {
        let marker = if node.orphaned { " (orphaned)" } else { "" };
        println!(
            "{}- {} [{:?}]{}",
            "  ".repeat(node.depth as usize + 1),
            node.url,
            node.status,
            marker
        );
        stack.extend(node.children.iter().rev());
    }
}
