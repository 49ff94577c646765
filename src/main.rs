//! Envelope Cache - Binary Entry Point
//!
//! Inspects the offline cache of an application.
//!
//! Usage: `envelope-cache [--config FILE] [stats|list|purge]`
//!
//! Without `--config`, options come from `ENVELOPE_CACHE_*` environment
//! variables. Logs go to stderr, filtered by `RUST_LOG`.

use std::env;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use envelope_cache::{CacheOptions, CacheResult, CacheStats, OfflineStore};

const USAGE: &str = "usage: envelope-cache [--config FILE] [stats|list|purge]";

fn main() -> CacheResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let mut config = None;
    let mut command = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config = Some(path),
                None => exit_with_usage(),
            },
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ if command.is_none() => command = Some(arg),
            _ => exit_with_usage(),
        }
    }

    let options = match config {
        Some(path) => CacheOptions::from_json_file(path)?,
        None => CacheOptions::from_env(),
    };
    let store = OfflineStore::open(options);

    match command.as_deref().unwrap_or("stats") {
        "stats" => print_stats(&store),
        "list" => {
            for envelope in store.enumerate_leftovers() {
                println!(
                    "{}\t{}\t{}",
                    envelope.pool,
                    envelope.id,
                    CacheStats::format_size(envelope.bytes.len() as u64)
                );
            }
            Ok(())
        }
        "purge" => {
            println!("{}", store.purge());
            Ok(())
        }
        _ => exit_with_usage(),
    }
}

fn print_stats(store: &OfflineStore) -> CacheResult<()> {
    let stats = store.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        pending = stats.pending(),
        size = %CacheStats::format_size(stats.total_bytes()),
        "cache stats"
    );
    Ok(())
}

fn exit_with_usage() -> ! {
    eprintln!("{USAGE}");
    process::exit(2)
}
