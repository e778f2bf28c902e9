//! file-indexer - Concurrent Filesystem Indexer and Query Server
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use file_indexer::config::{CheckArgs, CliArgs, Command, QueryArgs, ScanConfig, ServeConfig};
use file_indexer::db::{keys, RecordStore, SqliteStore};
use file_indexer::progress::{print_header, print_summary, print_top_extensions, ProgressReporter};
use file_indexer::protocol::QueryExecutor;
use file_indexer::scan::{ScanCoordinator, ScanResult};
use file_indexer::server::QueryServer;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    match args.command {
        Command::Scan(scan) => {
            let config = ScanConfig::from_args(scan).context("Invalid configuration")?;
            run_scan(config)
        }
        Command::Serve(serve) => {
            let config = ServeConfig::from_args(serve).context("Invalid configuration")?;
            run_serve(config)
        }
        Command::Query(query) => run_query(query),
        Command::Check(check) => run_check(check),
    }
}

fn run_scan(config: ScanConfig) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db_path).context("Failed to open index")?);

    if config.fresh {
        let removed = store.clear().context("Failed to clear index")?;
        info!(removed, "Cleared existing records");
    }

    if config.show_progress {
        print_header(
            &config.root,
            config.options.worker_count,
            config.options.batch_size,
            &config.db_path,
        );
    }

    let coordinator = ScanCoordinator::new(store.clone(), config.options.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    store.set_info(keys::SCAN_ROOT, &config.root.display().to_string())?;
    store.set_info(keys::START_TIME, &Utc::now().to_rfc3339())?;
    store.set_info(keys::WORKER_COUNT, &config.options.worker_count.to_string())?;
    store.set_info(keys::STATUS, "running")?;

    let outcome = if config.show_progress {
        let reporter = Arc::new(ProgressReporter::new());
        reporter.set_status("Scanning...");
        let display = Arc::clone(&reporter);
        let outcome = coordinator.scan_with_progress(&config.root, move |p| display.update(&p));
        reporter.finish_and_clear();
        outcome
    } else {
        coordinator.scan(&config.root)
    };

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            store.set_info(keys::STATUS, "failed")?;
            return Err(e).context("Scan failed");
        }
    };

    record_scan(&store, &result)?;

    if config.show_progress {
        print_summary(&result, &config.db_path);
        match store.aggregate_stats() {
            Ok(stats) => print_top_extensions(&stats),
            Err(e) => warn!(error = %e, "Failed to read extension histogram"),
        }
    }

    if !result.completed {
        info!("Scan was interrupted before completion");
    }
    if result.errors > 0 {
        info!(errors = result.errors, "Scan completed with errors");
    }

    Ok(())
}

fn record_scan(store: &SqliteStore, result: &ScanResult) -> Result<()> {
    let status = if result.completed { "completed" } else { "interrupted" };

    store.set_info(keys::END_TIME, &Utc::now().to_rfc3339())?;
    store.set_info(keys::DURATION_MS, &result.duration_ms().to_string())?;
    store.set_info(keys::WORKER_COUNT, &result.workers.to_string())?;
    store.set_info(keys::TOTAL_FILES, &result.files_found.to_string())?;
    store.set_info(keys::TOTAL_BYTES, &result.total_bytes.to_string())?;
    store.set_info(keys::ERROR_COUNT, &result.errors.to_string())?;
    store.set_info(keys::STATUS, status)?;
    Ok(())
}

fn run_serve(config: ServeConfig) -> Result<()> {
    let store = SqliteStore::open(&config.db_path).context("Failed to open index")?;
    let executor = QueryExecutor::new(Arc::new(store)).with_max_results(config.max_results);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(async move {
        let server = QueryServer::bind(config.addr, executor, config.server)
            .await
            .context("Failed to start server")?;

        let handle = server.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received, shutting down...");
                handle.shutdown();
            }
        });

        server.run().await.context("Server failed")
    })
}

fn run_query(args: QueryArgs) -> Result<()> {
    let store = SqliteStore::open(&args.db).context("Failed to open index")?;
    let executor = QueryExecutor::new(Arc::new(store)).with_max_results(args.max_results);

    println!("{}", executor.respond(&args.line()));
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    if !args.db.exists() {
        anyhow::bail!("Index database '{}' does not exist", args.db.display());
    }

    let store = SqliteStore::open(&args.db).context("Failed to open index")?;

    println!("Database:       {}", args.db.display());
    println!("Schema version: {}", store.schema_version()?);
    println!("Records:        {}", store.count()?);

    for key in [
        keys::SCAN_ROOT,
        keys::STATUS,
        keys::START_TIME,
        keys::END_TIME,
        keys::DURATION_MS,
        keys::WORKER_COUNT,
        keys::TOTAL_FILES,
        keys::TOTAL_BYTES,
        keys::ERROR_COUNT,
        keys::INDEXER_VERSION,
    ] {
        if let Some(value) = store.get_info(key)? {
            println!("{:<15} {}", format!("{}:", key), value);
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("file_indexer=debug,warn")
    } else {
        EnvFilter::new("file_indexer=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
