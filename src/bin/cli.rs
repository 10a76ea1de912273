//! StrataKV CLI
//!
//! Command-line interface over an embedded StrataKV data directory.
//! Every invocation opens the engine, replays the WAL, runs one command and
//! closes the engine again.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use stratakv::config::{MemTableBackend, RunLayout, WalSyncStrategy};
use stratakv::{Config, Engine, Lookup};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv-cli")]
#[command(about = "Embedded LSM key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: PathBuf,

    /// Distinct keys held in memory before a flush
    #[arg(short = 'c', long, default_value = "1024")]
    capacity: usize,

    /// MemTable backing structure (skiplist | btree)
    #[arg(short, long, default_value = "skiplist")]
    backend: MemTableBackend,

    /// Runs per level before it is compacted
    #[arg(long, default_value = "4")]
    fan_out: usize,

    /// Highest level number
    #[arg(long, default_value = "4")]
    max_levels: usize,

    /// Write every run into a single file
    #[arg(long)]
    combined: bool,

    /// fsync the WAL after every write
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Flush the memtable to a level-1 run
    Flush,

    /// Compact one level into the next
    Compact {
        /// Level to compact (1-based)
        level: usize,
    },

    /// Trim retained WAL segments
    CleanupLog,

    /// Check every run against its integrity tree
    Verify,

    /// Print level and cache statistics
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stratakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> stratakv::Result<()> {
    let sync_strategy = if args.sync {
        WalSyncStrategy::EveryWrite
    } else {
        WalSyncStrategy::EveryNEntries { count: 100 }
    };
    let layout = if args.combined {
        RunLayout::Combined
    } else {
        RunLayout::Separate
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_capacity(args.capacity)
        .memtable_backend(args.backend)
        .level_fan_out(args.fan_out)
        .max_levels(args.max_levels)
        .run_layout(layout)
        .wal_sync_strategy(sync_strategy)
        .build();

    let engine = Engine::open(config)?;
    engine.recover()?;

    match args.command {
        Commands::Put { key, value } => {
            let flushed = engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK{}", if flushed { " (flushed)" } else { "" });
        }
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Lookup::Found(value) => println!("{}", String::from_utf8_lossy(&value)),
            Lookup::Deleted | Lookup::NotFound => println!("(nil)"),
        },
        Commands::Delete { key } => {
            let flushed = engine.delete(key.as_bytes())?;
            println!("OK{}", if flushed { " (flushed)" } else { "" });
        }
        Commands::Flush => {
            if engine.flush()? {
                println!("flushed");
            } else {
                println!("memtable empty");
            }
        }
        Commands::Compact { level } => {
            engine.compact_level(level)?;
            println!("compacted level {}", level);
        }
        Commands::CleanupLog => {
            let removed = engine.cleanup_log()?;
            println!("removed {} WAL segment(s)", removed);
        }
        Commands::Verify => {
            let damaged = engine.verify_integrity()?;
            if damaged.is_empty() {
                println!("all runs intact");
            }
            for (level, generation, chunks) in damaged {
                println!(
                    "level {} generation {}: damaged chunks {:?}",
                    level, generation, chunks
                );
            }
        }
        Commands::Stats => {
            println!("memtable: {} / {}", engine.memtable().len(), engine.memtable().capacity());
            for stats in engine.level_stats() {
                println!(
                    "level {}: {} run(s), {} entries, generations {:?}",
                    stats.level,
                    stats.generations.len(),
                    stats.entries,
                    stats.generations
                );
            }
            let cache = engine.cache_stats();
            println!("cache: {} entries, {} hits, {} misses", cache.len, cache.hits, cache.misses);
        }
    }

    engine.close()
}
