//! CLI for the featstore point-in-time feature store.
//!
//! Replays recorded event streams through a feature set, which is how
//! leakage-free training sets are generated, and reports on them.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use featstore::{
    Context, Event, Feature, FeatureSetConfig, Payload, Sliding, Store, StoreConfig, Value,
    aggregate,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// featstore: embedded point-in-time feature store CLI.
#[derive(Parser)]
#[command(name = "featstore", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Compute point-in-time features for every event in a stream.
    Replay {
        /// Feature set definition (JSON).
        #[arg(long)]
        features: PathBuf,

        /// Events, one JSON object per line.
        #[arg(long)]
        events: PathBuf,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Compute each row 1 ms before its event, so the event does not
        /// contribute to its own features. Other events of the same entity
        /// in that preceding millisecond are dropped from the row as well.
        #[arg(long)]
        exclusive: bool,
    },

    /// Load an event stream and print entity and event counts.
    Stats {
        /// Feature set definition (JSON).
        #[arg(long)]
        features: PathBuf,

        /// Events, one JSON object per line.
        #[arg(long)]
        events: PathBuf,
    },

    /// Run a push and query microbenchmark.
    Bench {
        /// Number of events to push.
        #[arg(long, default_value = "1000000")]
        events: u64,

        /// Number of entities to spread them over.
        #[arg(long, default_value = "1000")]
        entities: u64,
    },
}

/// Output format for replayed features.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values, one column per feature.
    Csv,
    /// JSON array of objects.
    Json,
}

/// One line of an event stream.
#[derive(Deserialize)]
struct EventRecord {
    entity: String,
    timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

/// Events in file order plus the instant each one was recorded at.
struct Stream {
    rows: Vec<(String, DateTime<Utc>)>,
    by_entity: HashMap<String, Vec<Event>>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            features,
            events,
            format,
            exclusive,
        } => cmd_replay(&features, &events, &format, exclusive),
        Commands::Stats { features, events } => cmd_stats(&features, &events),
        Commands::Bench { events, entities } => cmd_bench(events, entities),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Instant a replayed row is computed at.
///
/// With `exclusive` this is 1 ms before the event, which also leaves out any
/// other event of the entity within that millisecond.
fn row_instant(instant: DateTime<Utc>, exclusive: bool) -> DateTime<Utc> {
    if exclusive {
        instant - chrono::Duration::milliseconds(1)
    } else {
        instant
    }
}

/// Implements `featstore replay`.
fn cmd_replay(
    features_path: &Path,
    events_path: &Path,
    format: &OutputFormat,
    exclusive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = FeatureSetConfig::load(features_path)?;
    let names: Vec<String> = config.features.iter().map(|f| f.name.clone()).collect();
    let store = Store::new(config.into_store_config())?;
    let ctx = Context::background();

    let stream = read_stream(events_path)?;
    load_stream(&store, &ctx, stream.by_entity)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match format {
        OutputFormat::Csv => {
            let header: Vec<String> = ["entity", "timestamp"]
                .iter()
                .map(ToString::to_string)
                .chain(names.iter().map(|n| csv_field(n)))
                .collect();
            writeln!(out, "{}", header.join(","))?;

            for (entity, instant) in &stream.rows {
                let features = store.get_at(&ctx, entity, row_instant(*instant, exclusive))?;
                let mut fields = vec![csv_field(entity), instant.to_rfc3339()];
                fields.extend(names.iter().map(|n| csv_value(features.get(n))));
                writeln!(out, "{}", fields.join(","))?;
            }
        }
        OutputFormat::Json => {
            let mut rows = Vec::with_capacity(stream.rows.len());
            for (entity, instant) in &stream.rows {
                let features = store.get_at(&ctx, entity, row_instant(*instant, exclusive))?;
                rows.push(serde_json::json!({
                    "entity": entity,
                    "timestamp": instant.to_rfc3339(),
                    "features": features.to_json(),
                }));
            }
            writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        }
    }

    out.flush()?;
    tracing::info!(rows = stream.rows.len(), exclusive, "replay complete");
    Ok(())
}

/// Implements `featstore stats`.
fn cmd_stats(features_path: &Path, events_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = FeatureSetConfig::load(features_path)?;
    let ttl = config.ttl;
    let store = Store::new(config.into_store_config())?;
    let ctx = Context::background();

    let stream = read_stream(events_path)?;
    let first = stream.rows.iter().map(|(_, t)| *t).min();
    let last = stream.rows.iter().map(|(_, t)| *t).max();
    load_stream(&store, &ctx, stream.by_entity)?;

    let stats = store.stats(&ctx)?;
    println!("Events file: {}", events_path.display());
    println!("Features: {}", store.features().len());
    println!("TTL: {}", format_duration(ttl));
    println!("Entities: {}", stats.entity_count);
    println!("Events: {}", stats.total_event_count);
    if let (Some(first), Some(last)) = (first, last) {
        println!("First event: {}", first.to_rfc3339());
        println!("Last event: {}", last.to_rfc3339());
    }

    Ok(())
}

/// Implements `featstore bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(event_count: u64, entity_count: u64) -> Result<(), Box<dyn std::error::Error>> {
    if entity_count == 0 {
        return Err("--entities must be at least 1".into());
    }

    println!("featstore push/query benchmark");
    println!("  Events: {event_count}");
    println!("  Entities: {entity_count}");
    println!();

    let hour = Duration::from_secs(3600);
    let store = Store::new(StoreConfig {
        ttl: Duration::ZERO,
        features: vec![
            Feature::new("count_1h", aggregate::count())
                .with_window(Sliding::new(hour)),
            Feature::new("sum_1h", aggregate::sum("amount"))
                .with_window(Sliding::new(hour)),
            Feature::new("countries", aggregate::count_distinct("country")),
        ],
        storage: None,
    })?;
    let ctx = Context::background();
    let entities: Vec<String> = (0..entity_count).map(|i| format!("entity_{i}")).collect();
    let countries = ["US", "CA", "MX", "BR", "FR"];
    let base = Utc::now() - chrono::Duration::days(1);

    println!("Pushing {event_count} events...");
    let start = Instant::now();
    for i in 0..event_count {
        let entity = &entities[usize::try_from(i % entity_count)?];
        let second = i64::try_from(i / entity_count)?;
        let event = Event::new(base + chrono::Duration::seconds(second))
            .with("amount", (i % 500) as f64)
            .with("country", countries[usize::try_from(i % 5)?]);
        store.push(&ctx, entity, [event])?;
    }
    let push_elapsed = start.elapsed();

    println!("Querying {entity_count} entities...");
    let start = Instant::now();
    let results = store.batch_get(&ctx, &entities)?;
    let query_elapsed = start.elapsed();

    let pushes = event_count.max(1) as f64;
    println!();
    println!("Results:");
    println!("  Push elapsed: {push_elapsed:.3?}");
    println!(
        "  Avg push latency: {:.1} ns/event",
        push_elapsed.as_nanos() as f64 / pushes
    );
    println!(
        "  Push throughput: {:.0} events/sec",
        pushes / push_elapsed.as_secs_f64()
    );
    println!("  Query elapsed: {query_elapsed:.3?}");
    println!(
        "  Avg query latency: {:.1} us/entity",
        query_elapsed.as_secs_f64() * 1e6 / results.len().max(1) as f64
    );

    Ok(())
}

/// Reads a JSON-lines event stream.
fn read_stream(path: &Path) -> Result<Stream, Box<dyn std::error::Error>> {
    let file = File::open(path)
        .map_err(|e| format!("failed to open events file '{}': {e}", path.display()))?;

    let mut stream = Stream {
        rows: Vec::new(),
        by_entity: HashMap::new(),
    };
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {e}", path.display(), index + 1))?;

        let payload: Payload = record
            .data
            .into_iter()
            .map(|(field, value)| (field, Value::from(value)))
            .collect();
        let event = Event::with_offset(record.timestamp, payload);
        if !event.is_utc() {
            return Err(format!(
                "{}:{}: timestamp '{}' is not UTC",
                path.display(),
                index + 1,
                record.timestamp.to_rfc3339()
            )
            .into());
        }

        stream.rows.push((record.entity.clone(), event.instant()));
        stream.by_entity.entry(record.entity).or_default().push(event);
    }

    tracing::debug!(
        events = stream.rows.len(),
        entities = stream.by_entity.len(),
        "read event stream"
    );
    Ok(stream)
}

/// Pushes every entity's events as one batch.
fn load_stream(
    store: &Store,
    ctx: &Context,
    by_entity: HashMap<String, Vec<Event>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entities = by_entity.len();
    for (entity, events) in by_entity {
        store.push(ctx, &entity, events)?;
    }
    tracing::info!(entities, "loaded events");
    Ok(())
}

/// Renders one feature value as a CSV field.
fn csv_value(value: Option<&Value>) -> String {
    match value.map(Value::to_json) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => csv_field(&s),
        Some(other) => other.to_string(),
    }
}

/// Quotes a CSV field when it contains a separator, quote or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Formats a duration as a human-readable string.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        "none".to_string()
    } else if secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
