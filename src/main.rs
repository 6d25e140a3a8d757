use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use simplelog::{Config, WriteLogger};

use murajaah::annotation::{
    AnnotationCache, AnnotationFetcher, BrowserFetcher, FetchMethod, FileAnnotationStore,
    StaticHtmlFetcher, UnitAnnotations,
};
use murajaah::panic_handler::initialize_panic_handler;
use murajaah::paths::{resolve_data_paths, resolve_log_path};
use murajaah::render::{HeadlessBrowser, RenderConfig, RenderPipeline};
use murajaah::settings::Settings;
use murajaah::{
    AlQuranCloudClient, CorpusClient, FileProgressStore, GenerateOutcome, PageNumber,
    ProgressStore, Reviser, Variant,
};

#[derive(Parser)]
#[command(name = "murajaah", version, about = "Revise the mushaf one random page at a time")]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where progress and annotation data are kept
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Where page images are written
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// arabic or translation
    #[arg(long, global = true)]
    variant: Option<Variant>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a random page that has not been revised yet
    Next,
    /// Render a specific page
    Render { page: PageNumber },
    /// Show how many pages have been revised
    Progress,
    /// List revised pages
    Completed,
    /// Fetch (if needed) and show word-by-word data for a page
    Wbw { page: PageNumber },
}

fn init_logging(verbose: bool) -> Result<()> {
    let log_path = resolve_log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {log_path:?}"))?;
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), file)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    initialize_panic_handler();
    info!("Starting murajaah");

    let mut settings = Settings::load(cli.config.as_deref());
    if let Some(variant) = cli.variant {
        settings.variant = variant;
    }
    let paths = resolve_data_paths(&settings, cli.data_dir.as_deref(), cli.output_dir.as_deref())?;

    let progress: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(&paths.progress_file));
    let corpus: Arc<dyn CorpusClient> = Arc::new(AlQuranCloudClient::new(
        &settings.api_base_url,
        &settings.arabic_edition,
        &settings.translation_edition,
        settings.request_timeout(),
    )?);
    let browser = HeadlessBrowser::new(
        settings.browser.clone(),
        settings.viewport_width,
        settings.viewport_height,
        settings.render_timeout(),
    );

    let exit_code = match cli.command {
        Command::Next | Command::Render { .. } => {
            let pipeline = RenderPipeline::new(
                corpus.clone(),
                Arc::new(browser),
                progress.clone(),
                RenderConfig {
                    output_dir: paths.output_dir.clone(),
                    variant: settings.variant,
                    max_retries: settings.max_retries,
                    backoff: settings.retry_backoff(),
                },
            );
            let reviser = Reviser::new(progress, corpus, pipeline, settings.study_base_url.clone());
            let outcome = match cli.command {
                Command::Render { page } => reviser.render_page(page),
                _ => reviser.generate_next(),
            };
            print_outcome(&outcome, cli.json)?;
            if outcome.success || outcome.exhausted { 0 } else { 1 }
        }
        Command::Progress => {
            let summary = progress.load()?.summary();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{}/{} pages revised ({}%)",
                    summary.revised, summary.total, summary.percentage
                );
            }
            0
        }
        Command::Completed => {
            let pages: Vec<PageNumber> = progress.load()?.iter().collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&pages)?);
            } else if pages.is_empty() {
                println!("No pages revised yet");
            } else {
                let listed: Vec<String> = pages.iter().map(ToString::to_string).collect();
                println!("{}", listed.join(", "));
            }
            0
        }
        Command::Wbw { page } => {
            let fetcher: Arc<dyn AnnotationFetcher> = match settings.scrape_method {
                FetchMethod::Static => Arc::new(StaticHtmlFetcher::new(
                    &settings.study_base_url,
                    settings.request_timeout(),
                )?),
                FetchMethod::Browser => Arc::new(BrowserFetcher::new(browser, &settings.study_base_url)),
            };
            let cache = AnnotationCache::new(
                Arc::new(FileAnnotationStore::new(&paths.annotations_file)),
                fetcher,
                corpus,
            )
            .with_policy(settings.empty_annotations)
            .with_delay(settings.scrape_delay());

            if cache.ensure_scraped(page)? {
                info!("Scraped word-by-word data for page {page}");
            }
            let annotations = cache.page_annotations(page)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&annotations)?);
            } else {
                print_annotations(&annotations);
            }
            if annotations.iter().any(UnitAnnotations::has_words) { 0 } else { 1 }
        }
    };

    info!("Shutting down murajaah");
    std::process::exit(exit_code);
}

fn print_outcome(outcome: &GenerateOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    println!("{}", outcome.message);
    if let Some(summary) = &outcome.summary {
        println!("  {summary}");
    }
    if let Some(path) = &outcome.artifact {
        println!("  image: {}", path.display());
    }
    if let Some(link) = &outcome.study_link {
        println!("  word by word: {link}");
    }
    Ok(())
}

fn print_annotations(annotations: &[UnitAnnotations]) {
    if !annotations.iter().any(UnitAnnotations::has_words) {
        println!("No word-by-word data available for this page.");
        return;
    }
    for unit in annotations {
        println!("Surah {}, Ayah {}", unit.key.group_id, unit.key.in_group_seq);
        match &unit.record {
            Some(record) if record.is_usable() => {
                for word in &record.words {
                    println!(
                        "  {}  |  {}  |  {}",
                        word.arabic,
                        word.transliteration().unwrap_or("N/A"),
                        word.translation().unwrap_or("N/A")
                    );
                }
            }
            _ => println!("  Word-by-word data not available for this ayah."),
        }
    }
}
