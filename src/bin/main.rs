//! rowdiff CLI - diff two tables across databases.
//!
//! Usage:
//!   rowdiff <db1_uri> <table1> <db2_uri> <table2> [options]
//!   rowdiff --conf rowdiff.toml --run nightly
//!
//! Examples:
//!   rowdiff postgres://u:p@host/db events mysql://u:p@host/db events -c updated_at
//!   rowdiff sqlite://a.db t sqlite://b.db t -k id -c value --stats

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rowdiff::config::ConfigFile;
use rowdiff::{connect_to_uri, DiffStream, Error, Result, Row, Sign, TableDiffer, TableSegment};

#[derive(Parser)]
#[command(name = "rowdiff")]
#[command(about = "Diff two tables across databases using checksum bisection")]
#[command(version)]
struct Cli {
    /// URI of the first database
    db1_uri: Option<String>,
    /// Table name on the first database
    table1: Option<String>,
    /// URI of the second database
    db2_uri: Option<String>,
    /// Table name on the second database
    table2: Option<String>,

    /// Name of the primary key column
    #[arg(short = 'k', long)]
    key_column: Option<String>,

    /// Names of extra columns to include in the comparison
    #[arg(short = 'c', long = "columns")]
    columns: Vec<String>,

    /// Maximum number of differences to report
    #[arg(short = 'l', long)]
    limit: Option<usize>,

    /// Segments per bisection level
    #[arg(long)]
    bisection_factor: Option<usize>,

    /// Row count below which segments are compared locally
    #[arg(long)]
    bisection_threshold: Option<u64>,

    /// Worker threads per database
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Print summary stats instead of a detailed diff
    #[arg(short = 's', long)]
    stats: bool,

    /// Debug logging plus per-level consistency checks
    #[arg(short = 'd', long)]
    debug: bool,

    /// Info logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Name of the run to load from the configuration file
    #[arg(long, requires = "conf")]
    run: Option<String>,
}

/// Everything needed to start a diff, after CLI and config are merged.
struct Params {
    uri1: String,
    table1: String,
    threads1: usize,
    uri2: String,
    table2: String,
    threads2: usize,
    key_column: String,
    columns: Vec<String>,
    differ: TableDiffer,
    limit: Option<usize>,
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let params = resolve_params(cli)?;

    let start = Instant::now();

    let (db1, db2) = tokio::try_join!(
        connect_to_uri(&params.uri1, params.threads1),
        connect_to_uri(&params.uri2, params.threads2),
    )?;

    let table1 = std::sync::Arc::new(TableSegment::new(
        db1,
        vec![params.table1.clone()],
        &params.key_column,
        &params.columns,
    ));
    let table2 = std::sync::Arc::new(TableSegment::new(
        db2,
        vec![params.table2.clone()],
        &params.key_column,
        &params.columns,
    ));

    let stream = params
        .differ
        .diff_tables(table1.clone(), table2.clone())
        .await?;

    if params.stats {
        print_stats(stream, &table1).await?;
    } else {
        print_diff(stream, params.limit).await?;
    }

    tracing::info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}

fn resolve_params(cli: Cli) -> Result<Params> {
    if cli.limit.is_some() && cli.stats {
        return Err(Error::Config(
            "cannot specify a limit together with --stats".to_string(),
        ));
    }

    let resolved = match &cli.conf {
        Some(path) => Some(ConfigFile::load(path)?.resolve_run(cli.run.as_deref())?),
        None => None,
    };

    // CLI arguments take precedence over the configuration file.
    let pick = |arg: Option<String>, conf: Option<String>, what: &str| -> Result<String> {
        arg.or(conf)
            .ok_or_else(|| Error::Config(format!("missing {what}")))
    };

    let (conf_db1, conf_t1, conf_db2, conf_t2) = match &resolved {
        Some(r) => (
            Some(r.database1.clone()),
            Some(r.table1.clone()),
            Some(r.database2.clone()),
            Some(r.table2.clone()),
        ),
        None => (None, None, None, None),
    };

    let uri1 = pick(cli.db1_uri, conf_db1, "first database uri")?;
    let table1 = pick(cli.table1, conf_t1, "first table name")?;
    let uri2 = pick(cli.db2_uri, conf_db2, "second database uri")?;
    let table2 = pick(cli.table2, conf_t2, "second table name")?;

    let conf = resolved.as_ref();
    let threads = cli
        .threads
        .or(conf.and_then(|r| r.threads))
        .unwrap_or(1);
    let threads1 = conf.and_then(|r| r.threads1).unwrap_or(threads);
    let threads2 = conf.and_then(|r| r.threads2).unwrap_or(threads);

    let key_column = cli
        .key_column
        .or_else(|| conf.and_then(|r| r.key_column.clone()))
        .unwrap_or_else(|| "id".to_string());
    let columns = if cli.columns.is_empty() {
        conf.and_then(|r| r.columns.clone())
            .unwrap_or_else(|| vec!["updated_at".to_string()])
    } else {
        cli.columns
    };

    let limit = cli.limit.or(conf.and_then(|r| r.limit));
    let defaults = TableDiffer::default();
    let differ = TableDiffer {
        bisection_factor: cli
            .bisection_factor
            .or(conf.and_then(|r| r.bisection_factor))
            .unwrap_or(defaults.bisection_factor),
        bisection_threshold: cli
            .bisection_threshold
            .or(conf.and_then(|r| r.bisection_threshold))
            .unwrap_or(defaults.bisection_threshold),
        debug: cli.debug,
    };

    Ok(Params {
        uri1,
        table1,
        threads1,
        uri2,
        table2,
        threads2,
        key_column,
        columns,
        differ,
        limit,
        stats: cli.stats,
    })
}

async fn print_diff(mut stream: DiffStream, limit: Option<usize>) -> Result<()> {
    use std::io::Write;

    let mut remaining = limit.unwrap_or(usize::MAX);
    let stdout = std::io::stdout();
    while remaining > 0 {
        let Some(item) = stream.next().await else {
            break;
        };
        let (sign, row) = item?;
        let mut out = stdout.lock();
        let _ = writeln!(out, "{sign} {}", format_row(&row));
        let _ = out.flush();
        remaining -= 1;
    }
    Ok(())
}

async fn print_stats(stream: DiffStream, table1: &TableSegment) -> Result<()> {
    let diff = stream.collect().await?;
    let total = table1.count().await?;

    let plus = diff.iter().filter(|(sign, _)| *sign == Sign::Plus).count();
    let minus = diff.len() - plus;
    let percent = if total == 0 {
        0.0
    } else {
        100.0 * diff.len() as f64 / total as f64
    };

    println!("Diff-Total: {} changed rows out of {total}", diff.len());
    println!("Diff-Percent: {percent:.4}%");
    println!("Diff-Split: +{plus}  -{minus}");
    Ok(())
}

fn format_row(row: &Row) -> String {
    let cells: Vec<&str> = row
        .iter()
        .map(|cell| cell.as_deref().unwrap_or("NULL"))
        .collect();
    format!("({})", cells.join(", "))
}
