//! The gatehouse daemon: opens the store, recovers unfinished jobs and
//! keeps the worker pool running until interrupted.
//!
//! The HTTP layer (out of scope here) holds the `Dispatcher` by reference
//! and only ever calls `submit` and `status` on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::prelude::*;

use gatehouse::db::Database;
use gatehouse::photos::PhotoStore;
use gatehouse::{load_config, queue};

fn init_tracing() {
    tracing_log::LogTracer::init().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn main() {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gatehouse.json".to_string());

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config '{}': {}", config_path, e);
            std::process::exit(1);
        }
    };

    let db_path = config
        .database_path
        .clone()
        .or_else(gatehouse::db::default_database_path)
        .expect("no database path configured and no home directory");

    let db = match Database::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open database '{}': {}", db_path.display(), e);
            std::process::exit(1);
        }
    };

    let photos = match PhotoStore::new(&config.photo_directory, &config.scratch_directory, db.clone())
    {
        Ok(photos) => Arc::new(photos),
        Err(e) => {
            eprintln!("Failed to initialize photo store: {}", e);
            std::process::exit(1);
        }
    };

    let (dispatcher, pool) = queue::start(&config, db, Arc::clone(&photos));

    match dispatcher.recover() {
        Ok(count) if count > 0 => log::info!("Recovered {} unfinished job(s)", count),
        Ok(_) => log::info!("No unfinished jobs to recover"),
        Err(e) => log::error!("Startup recovery failed: {}", e),
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log::info!("Interrupt received, shutting down");
            running.store(false, Ordering::Relaxed);
        })
        .expect("failed to install signal handler");
    }

    log::info!(
        "gatehoused running with {} worker(s); press Ctrl-C to stop",
        config.queue.worker_count
    );

    // Periodic housekeeping while the workers run.
    let scratch_max_age = Duration::from_secs(config.scratch_max_age_hours * 3600);
    let mut last_purge = std::time::Instant::now();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(250));
        if last_purge.elapsed() >= Duration::from_secs(3600) {
            photos.purge_stale(scratch_max_age);
            last_purge = std::time::Instant::now();
        }
    }

    pool.shutdown();
    pool.wait();
    log::info!("gatehoused stopped");
}
