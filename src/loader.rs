use crate::error::{CatalogError, Result};
use crate::models::{is_known_rating, rating_rank, CatalogEntry, ContentType, Duration};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Textual format of the `date_added` column, e.g. "September 25, 2021".
pub const DATE_ADDED_FORMAT: &str = "%B %d, %Y";
pub const UNKNOWN_GENRE: &str = "Unknown";
pub const REQUIRED_COLUMNS: [&str; 3] = ["type", "title", "release_year"];

/// Per-row diagnostics gathered while normalizing a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded: usize,
    pub dropped_bad_year: usize,
    pub dropped_unknown_type: usize,
    pub malformed_rows: usize,
    pub bad_duration: usize,
    pub bad_date: usize,
    pub unrecognized_rating: usize,
}

impl LoadReport {
    pub fn dropped_rows(&self) -> usize {
        self.dropped_bad_year + self.dropped_unknown_type + self.malformed_rows
    }
}

/// The normalized, immutable table produced by a load.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub source: PathBuf,
    pub entries: Vec<CatalogEntry>,
    pub report: LoadReport,
}

impl Catalog {
    pub fn year_bounds(&self) -> Option<(i32, i32)> {
        let min = self.entries.iter().map(|e| e.release_year).min()?;
        let max = self.entries.iter().map(|e| e.release_year).max()?;
        Some((min, max))
    }

    pub fn content_types(&self) -> Vec<ContentType> {
        self.entries
            .iter()
            .map(|e| e.content_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn observed_ratings(&self) -> Vec<String> {
        let mut ratings: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.rating.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        ratings.sort_by(|a, b| rating_rank(a).cmp(&rating_rank(b)).then_with(|| a.cmp(b)));
        ratings
    }
}

pub fn load(path: &Path) -> Result<Catalog> {
    let file = File::open(path).map_err(|e| CatalogError::unavailable(path, e))?;
    parse_reader(file, path)
}

/// Parses CSV text from any reader. `source` is only used for reporting.
pub fn parse_reader<R: Read>(reader: R, source: &Path) -> Result<Catalog> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| CatalogError::unavailable(source, e))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut report = LoadReport::default();
    let mut entries = Vec::new();

    for result in reader.records() {
        report.total_rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    return Err(CatalogError::unavailable(source, e));
                }
                warn!("Skipping malformed row {}: {}", report.total_rows, e);
                report.malformed_rows += 1;
                continue;
            }
        };
        if let Some(entry) = normalize_row(&record, &columns, &mut report) {
            entries.push(entry);
        }
    }
    report.loaded = entries.len();

    if report.dropped_rows() > 0 {
        warn!(
            "Dropped {} row(s) from {} (bad year: {}, unknown type: {}, malformed: {})",
            report.dropped_rows(),
            source.display(),
            report.dropped_bad_year,
            report.dropped_unknown_type,
            report.malformed_rows
        );
    }
    if report.bad_duration + report.bad_date + report.unrecognized_rating > 0 {
        warn!(
            "Nulled fields in {}: duration {}, date_added {}, rating {}",
            source.display(),
            report.bad_duration,
            report.bad_date,
            report.unrecognized_rating
        );
    }
    info!(
        "Loaded {} entries from {} ({} rows read)",
        report.loaded,
        source.display(),
        report.total_rows
    );

    Ok(Catalog {
        source: source.to_path_buf(),
        entries,
        report,
    })
}

struct Columns {
    id: Option<usize>,
    content_type: usize,
    title: usize,
    director: Option<usize>,
    cast: Option<usize>,
    country: Option<usize>,
    date_added: Option<usize>,
    release_year: usize,
    rating: Option<usize>,
    duration: Option<usize>,
    listed_in: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let name = h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase();
                (name, i)
            })
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !index.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::SchemaMismatch { missing });
        }

        let get = |name: &str| index.get(name).copied();
        Ok(Columns {
            id: get("show_id"),
            content_type: index["type"],
            title: index["title"],
            director: get("director"),
            cast: get("cast"),
            country: get("country"),
            date_added: get("date_added"),
            release_year: index["release_year"],
            rating: get("rating"),
            duration: get("duration"),
            listed_in: get("listed_in"),
        })
    }
}

fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

fn normalize_row(
    record: &StringRecord,
    columns: &Columns,
    report: &mut LoadReport,
) -> Option<CatalogEntry> {
    let row = report.total_rows;

    let raw_year = field(record, Some(columns.release_year));
    let release_year = match raw_year.trim().parse::<i32>() {
        Ok(y) => y,
        Err(_) => {
            debug!("Row {}: unparseable release_year {:?}", row, raw_year);
            report.dropped_bad_year += 1;
            return None;
        }
    };

    let raw_type = field(record, Some(columns.content_type));
    let Some(content_type) = ContentType::parse(raw_type) else {
        debug!("Row {}: unknown content type {:?}", row, raw_type);
        report.dropped_unknown_type += 1;
        return None;
    };

    let raw_duration = field(record, columns.duration);
    let duration = parse_duration(raw_duration, content_type);
    if duration.is_none() && !raw_duration.trim().is_empty() {
        report.bad_duration += 1;
    }

    let raw_date = field(record, columns.date_added);
    let date_added = parse_date_added(raw_date);
    if date_added.is_none() && !raw_date.trim().is_empty() {
        report.bad_date += 1;
    }

    let raw_rating = field(record, columns.rating).trim();
    let rating = if raw_rating.is_empty() {
        None
    } else if is_known_rating(raw_rating) {
        Some(raw_rating.to_string())
    } else {
        debug!("Row {}: unrecognized rating {:?}", row, raw_rating);
        report.unrecognized_rating += 1;
        None
    };

    let id = Some(field(record, columns.id).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(CatalogEntry {
        id,
        content_type,
        title: field(record, Some(columns.title)).trim().to_string(),
        directors: split_list(field(record, columns.director)),
        cast: split_list(field(record, columns.cast)),
        countries: split_list(field(record, columns.country)),
        date_added,
        release_year,
        rating,
        duration,
        genres: parse_genres(field(record, columns.listed_in)),
    })
}

/// Keeps only the digits ("90 min" -> 90, "2 Seasons" -> 2); the unit comes
/// from the content type.
pub fn parse_duration(raw: &str, content_type: ContentType) -> Option<Duration> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u32>()
        .ok()
        .map(|v| Duration::for_type(content_type, v))
}

pub fn parse_date_added(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_ADDED_FORMAT).ok()
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_genres(raw: &str) -> Vec<String> {
    let genres = split_list(raw);
    if genres.is_empty() {
        vec![UNKNOWN_GENRE.to_string()]
    } else {
        genres
    }
}

struct CachedCatalog {
    modified: Option<SystemTime>,
    catalog: Arc<Catalog>,
}

/// Memoizes loads by file path and modification time.
#[derive(Default)]
pub struct LoadCache {
    entries: HashMap<PathBuf, CachedCatalog>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached table when the file is unchanged, otherwise parses it again.
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<Catalog>> {
        let metadata = std::fs::metadata(path).map_err(|e| CatalogError::unavailable(path, e))?;
        if !metadata.is_file() {
            return Err(CatalogError::unavailable(path, "not a regular file"));
        }
        let modified = metadata.modified().ok();

        if let Some(cached) = self.entries.get(path) {
            if cached.modified == modified {
                debug!("Catalog cache hit for {}", path.display());
                return Ok(cached.catalog.clone());
            }
            info!("Catalog file {} changed, reloading", path.display());
        }

        let catalog = Arc::new(load(path)?);
        self.entries.insert(
            path.to_path_buf(),
            CachedCatalog {
                modified,
                catalog: catalog.clone(),
            },
        );
        Ok(catalog)
    }

    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            info!("Invalidating {} cached catalog(s)", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
