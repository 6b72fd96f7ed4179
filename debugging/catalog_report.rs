//! Load a catalog CSV and print the load report plus derived tables as pretty JSON.
//! Usage:
//!   cargo run --bin catalog_report -- <file.csv> [--from YEAR] [--to YEAR] [--type Movie|Series] [--top N]
//! Falls back to CATALOG_PATH from the environment (.env supported) when no file is given.

use anyhow::{Context, Result};
use cinestats::aggregate::{aggregate, Filters, TrendConfig};
use cinestats::loader::load;
use cinestats::models::ContentType;
use dotenvy::dotenv;
use serde_json::json;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

struct Args {
    path: PathBuf,
    year_min: Option<i32>,
    year_max: Option<i32>,
    content_type: Option<ContentType>,
    top_n: usize,
}

fn parse_args() -> Result<Args> {
    let mut path = None;
    let mut year_min = None;
    let mut year_max = None;
    let mut content_type = None;
    let mut top_n = TrendConfig::default().top_n;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--from" => year_min = Some(next_value(&mut args, "--from")?.parse()?),
            "--to" => year_max = Some(next_value(&mut args, "--to")?.parse()?),
            "--top" => top_n = next_value(&mut args, "--top")?.parse::<usize>()?.max(1),
            "--type" => {
                let raw = next_value(&mut args, "--type")?;
                content_type = Some(
                    ContentType::parse(&raw)
                        .with_context(|| format!("Unknown content type '{}'", raw))?,
                );
            }
            _ => path = Some(PathBuf::from(arg)),
        }
    }

    let path = path
        .or_else(|| env::var("CATALOG_PATH").ok().map(PathBuf::from))
        .context("Usage: catalog_report <file.csv> [--from YEAR] [--to YEAR] [--type Movie|Series] [--top N]")?;
    Ok(Args {
        path,
        year_min,
        year_max,
        content_type,
        top_n,
    })
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{} expects a value", flag))
}

/// Narrows the catalog's year bounds with `--from`/`--to`. Either flag applies
/// even when the catalog has no release years.
fn year_range(
    bounds: Option<(i32, i32)>,
    from: Option<i32>,
    to: Option<i32>,
) -> Option<(i32, i32)> {
    if from.is_none() && to.is_none() {
        return bounds;
    }
    let (min, max) = bounds.unwrap_or((i32::MIN, i32::MAX));
    Some((from.unwrap_or(min), to.unwrap_or(max)))
}

fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let args = parse_args()?;
    let catalog = load(&args.path)?;

    let mut filters = Filters::all_for(&catalog);
    filters.year_range = year_range(filters.year_range, args.year_min, args.year_max);
    filters.content_types.extend(args.content_type);

    let config = TrendConfig {
        top_n: args.top_n,
        ..Default::default()
    };
    let tables = aggregate(&catalog, &filters, &config);
    info!(
        "{} of {} entries match {:?}",
        tables.total,
        catalog.entries.len(),
        filters
    );

    let out = json!({
        "report": catalog.report,
        "tables": tables,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
