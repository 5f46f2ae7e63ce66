use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use companyfinder::batch::{normalize_domains, parse_domain_file};
use companyfinder::cli::{Cli, Commands};
use companyfinder::config::{self, AppConfig};
use companyfinder::evidence::maps::{query_for, MapsLookup};
use companyfinder::evidence::{EvidenceSource, FetchConstraints, RegistrySearch, WebSearch};
use companyfinder::export;
use companyfinder::logger::{RunLogger, VerbosityLevel};
use companyfinder::proxy::ProxyPool;
use companyfinder::replay::ReplayMarker;
use companyfinder::resolver::{IdentityResolver, Resolution};
use companyfinder::result_sink::JournalSink;

/// Set by Ctrl-C; the batch stops before the next domain
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Exit code when a run was stopped by an anti-bot block
const EXIT_BLOCKED: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init {
        let path = cli.config_path();
        match AppConfig::create_default_config_at(&path) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run companyfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let logger = match &cli.log_file {
        Some(log_file_path) => RunLogger::with_log_file(verbosity, log_file_path.clone()),
        None => RunLogger::new(verbosity),
    };

    if let Err(e) = cli.validate() {
        logger.error(&format!("Invalid arguments: {}", e));
        std::process::exit(1);
    }

    let app_config = load_config(&cli);

    let exit_code = match &cli.command {
        Some(Commands::Places {
            keyword,
            region,
            max_results,
            json,
        }) => {
            let max_results = max_results.unwrap_or(app_config.maps.maximum_results);
            run_places(&app_config, &logger, keyword, region.as_deref(), max_results, json.as_deref()).await?
        }
        Some(Commands::Registry { name }) => run_registry_search(&app_config, &logger, name).await?,
        None => run_resolve(&cli, &app_config, &logger).await?,
    };

    if let Err(e) = logger.export_logs() {
        eprintln!("⚠️  Failed to write log file: {}", e);
    }

    std::process::exit(exit_code);
}

fn load_config(cli: &Cli) -> AppConfig {
    let path = cli.config_path();
    match AppConfig::load_from_path(&path) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            // Only offer to create the standard config, never an explicit --config path
            let prompted = if cli.config.is_none() {
                AppConfig::prompt_create_config()
            } else {
                Ok(None)
            };

            match prompted {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to customize settings, then run companyfinder again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("❌ Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn collect_domains(cli: &Cli) -> Result<Vec<String>> {
    let mut raw = cli.domain.clone();
    if let Some(input_file) = &cli.input_file {
        raw.extend(parse_domain_file(Path::new(input_file))?);
    }
    Ok(normalize_domains(raw))
}

async fn run_resolve(cli: &Cli, app_config: &AppConfig, logger: &RunLogger) -> Result<i32> {
    let domains = collect_domains(cli)?;
    if domains.is_empty() {
        logger.error("No valid domains to resolve");
        return Ok(1);
    }

    let output_dir = cli.get_output_dir();
    let output_dir = Path::new(&output_dir);

    if ReplayMarker::exists(output_dir) {
        match ReplayMarker::load(output_dir) {
            Ok(marker) => logger.info(&format!("Previous run was stopped early: {}", marker)),
            Err(e) => logger.warn(&format!("Unreadable replay marker, ignoring it: {}", e)),
        }
    }

    let mut sink = JournalSink::open(output_dir).context("Failed to open result journal")?;
    if sink.resumed() > 0 {
        logger.info(&format!(
            "Resuming: {} domains already resolved in {}",
            sink.resumed(),
            sink.path().display()
        ));
    }

    ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            eprintln!("\n⚠️  Force exiting.");
            std::process::exit(130); // 128 + SIGINT
        }
        eprintln!("\n⚠️  Interrupt received. Finishing the current domain, press Ctrl-C again to force exit...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    logger.info(&format!("Resolving {} domains", domains.len()));
    let mut resolver = IdentityResolver::from_config(app_config);

    logger.start_progress(domains.len() as u64);
    let report = resolver
        .run_batch(&domains, &mut sink, &INTERRUPTED, |domain, resolution| {
            if let Resolution::Stored(result) = resolution {
                logger.debug(&format!("{}: {} ({}%)", domain, result.company_name, result.confidence_percent));
            }
            logger.advance_progress(domain);
        })
        .await;
    logger.finish_progress();

    match &report.blocked {
        Some(blocked) => {
            let marker = ReplayMarker::new(
                &blocked.domain,
                blocked.stage,
                blocked.source,
                report.stored,
                report.not_attempted,
            );
            marker.save(output_dir).context("Failed to write replay marker")?;
            logger.error(&format!("{}. Run again later to continue.", marker));
        }
        None if !report.interrupted => {
            ReplayMarker::clear(output_dir)?;
        }
        None => {}
    }

    let results = sink.finish()?;
    let output_file = cli.get_output_file();
    let output_path = output_file.to_string_lossy().to_string();
    export::export_csv(&results, &output_path)?;
    logger.record_output_file(&output_path);

    export::print_results_summary(&results);
    logger.print_final_summary(&report);

    Ok(if report.is_blocked() {
        EXIT_BLOCKED
    } else if report.interrupted {
        130
    } else {
        0
    })
}

async fn run_places(
    app_config: &AppConfig,
    logger: &RunLogger,
    keyword: &str,
    region: Option<&str>,
    max_results: usize,
    json: Option<&str>,
) -> Result<i32> {
    let proxies = Arc::new(ProxyPool::new(app_config.proxy.proxies.clone()));
    let maps = MapsLookup::from_env(app_config, proxies)?;

    let query = query_for(keyword, region);
    logger.info(&format!("Searching places for '{}'", query));

    let fetched = maps.fetch(&query, &FetchConstraints::new(max_results, true)).await?;

    match json {
        Some(path) => export::export_places_json(&fetched.items, path)?,
        None => println!("{}", serde_json::to_string_pretty(&fetched.items)?),
    }

    if fetched.blocked {
        logger.error("The places API refused further requests; results are incomplete");
        return Ok(EXIT_BLOCKED);
    }

    logger.info(&format!("Found {} places", fetched.items.len()));
    Ok(0)
}

async fn run_registry_search(app_config: &AppConfig, logger: &RunLogger, name: &str) -> Result<i32> {
    let proxies = Arc::new(ProxyPool::new(app_config.proxy.proxies.clone()));
    let search = Arc::new(WebSearch::new(app_config, proxies.clone()));
    let registry = RegistrySearch::new(app_config, search, proxies);

    let candidates = registry.search_by_name(name).await;
    println!("{}", serde_json::to_string_pretty(&candidates)?);

    logger.info(&format!("Found {} registered companies for '{}'", candidates.len(), name));
    Ok(0)
}
