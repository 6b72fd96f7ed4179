use crate::loader::Catalog;
use crate::models::{rating_rank, CatalogEntry, ContentType, DurationUnit};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Active filter controls. Empty sets select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub year_range: Option<(i32, i32)>,
    pub content_types: BTreeSet<ContentType>,
    pub ratings: BTreeSet<String>,
}

impl Filters {
    /// Filters that pass every entry of `catalog`.
    pub fn all_for(catalog: &Catalog) -> Self {
        Filters {
            year_range: catalog.year_bounds(),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        if let Some((min, max)) = self.year_range {
            if entry.release_year < min || entry.release_year > max {
                return false;
            }
        }
        if !self.content_types.is_empty() && !self.content_types.contains(&entry.content_type) {
            return false;
        }
        if !self.ratings.is_empty() {
            match entry.rating.as_deref() {
                Some(r) if self.ratings.contains(r) => {}
                _ => return false,
            }
        }
        true
    }

    pub fn apply<'a>(&self, catalog: &'a Catalog) -> Vec<&'a CatalogEntry> {
        catalog.entries.iter().filter(|e| self.matches(e)).collect()
    }
}

/// Upper bound on the trend window, in years.
pub const MAX_LOOKBACK_YEARS: usize = 200;

/// Tunables for top-N tables and the declining-genre detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    pub top_n: usize,
    pub lookback_years: usize,
    pub decline_threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            lookback_years: 5,
            decline_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearTypeCount {
    pub year: i32,
    pub content_type: ContentType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingTypeCount {
    pub rating: String,
    pub content_type: ContentType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairCount {
    pub first: String,
    pub second: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStats {
    pub content_type: ContentType,
    pub unit: DurationUnit,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearDurationStats {
    pub year: i32,
    #[serde(flatten)]
    pub stats: DurationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreTrend {
    pub genre: String,
    pub slope: f64,
}

/// Every table the dashboard renders, computed from one filtered view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedTables {
    pub total: usize,
    pub movies: usize,
    pub series: usize,
    pub by_type: Vec<CountRow>,
    pub by_rating: Vec<CountRow>,
    pub by_release_year: Vec<YearCount>,
    pub added_by_year: Vec<YearTypeCount>,
    pub added_by_month: Vec<CountRow>,
    pub top_genres: Vec<CountRow>,
    pub top_countries: Vec<CountRow>,
    pub top_directors: Vec<CountRow>,
    pub top_actors: Vec<CountRow>,
    pub duration_by_type: Vec<DurationStats>,
    pub duration_by_year: Vec<YearDurationStats>,
    pub genre_by_year: BTreeMap<String, BTreeMap<i32, usize>>,
    pub declining_genres: Vec<GenreTrend>,
    pub rating_by_type: Vec<RatingTypeCount>,
    pub genre_pairs: Vec<PairCount>,
}

impl DerivedTables {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

pub fn aggregate(catalog: &Catalog, filters: &Filters, config: &TrendConfig) -> DerivedTables {
    let rows = filters.apply(catalog);
    derive(&rows, config)
}

/// Computes the tables from an already filtered view.
pub fn derive(rows: &[&CatalogEntry], config: &TrendConfig) -> DerivedTables {
    let movies = rows
        .iter()
        .filter(|e| e.content_type == ContentType::Movie)
        .count();
    let genre_by_year = genre_year_matrix(rows);
    let declining_genres = declining_genres(&genre_by_year, config);

    DerivedTables {
        total: rows.len(),
        movies,
        series: rows.len() - movies,
        by_type: count_by(rows, |e| Some(e.content_type.to_string())),
        by_rating: count_by(rows, |e| e.rating.clone()),
        by_release_year: counts_by_year(rows),
        added_by_year: added_by_year(rows),
        added_by_month: count_by(rows, |e| e.month_added()),
        top_genres: top_n(rows, |e| &e.genres, config.top_n),
        top_countries: top_n(rows, |e| &e.countries, config.top_n),
        top_directors: top_n(rows, |e| &e.directors, config.top_n),
        top_actors: top_n(rows, |e| &e.cast, config.top_n),
        duration_by_type: duration_by_type(rows),
        duration_by_year: duration_by_year(rows),
        genre_by_year,
        declining_genres,
        rating_by_type: rating_by_type(rows),
        genre_pairs: genre_pairs(rows, config.top_n),
    }
}

fn sorted_counts(counts: HashMap<String, usize>) -> Vec<CountRow> {
    let mut out: Vec<CountRow> = counts
        .into_iter()
        .map(|(key, count)| CountRow { key, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out
}

pub fn count_by<F>(rows: &[&CatalogEntry], key: F) -> Vec<CountRow>
where
    F: Fn(&CatalogEntry) -> Option<String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for k in rows.iter().filter_map(|&e| key(e)) {
        *counts.entry(k).or_default() += 1;
    }
    sorted_counts(counts)
}

/// Explodes a multi-valued field so each value counts once per entry, then
/// keeps at most `n` rows.
///
/// A value repeated inside one entry (e.g. "Drama, Drama") still counts once.
pub fn top_n<F>(rows: &[&CatalogEntry], values: F, n: usize) -> Vec<CountRow>
where
    F: Fn(&CatalogEntry) -> &Vec<String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for &entry in rows {
        let distinct: BTreeSet<&String> = values(entry).iter().collect();
        for value in distinct {
            *counts.entry(value.clone()).or_default() += 1;
        }
    }
    let mut out = sorted_counts(counts);
    out.truncate(n);
    out
}

fn counts_by_year(rows: &[&CatalogEntry]) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for e in rows {
        *counts.entry(e.release_year).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

fn added_by_year(rows: &[&CatalogEntry]) -> Vec<YearTypeCount> {
    let mut counts: BTreeMap<(i32, ContentType), usize> = BTreeMap::new();
    for e in rows {
        if let Some(year) = e.year_added() {
            *counts.entry((year, e.content_type)).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|((year, content_type), count)| YearTypeCount {
            year,
            content_type,
            count,
        })
        .collect()
}

fn rating_by_type(rows: &[&CatalogEntry]) -> Vec<RatingTypeCount> {
    let mut counts: BTreeMap<(usize, String, ContentType), usize> = BTreeMap::new();
    for e in rows {
        if let Some(rating) = &e.rating {
            *counts
                .entry((rating_rank(rating), rating.clone(), e.content_type))
                .or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|((_, rating, content_type), count)| RatingTypeCount {
            rating,
            content_type,
            count,
        })
        .collect()
}

fn genre_pairs(rows: &[&CatalogEntry], n: usize) -> Vec<PairCount> {
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    for e in rows {
        let genres: Vec<&String> = e.genres.iter().collect::<BTreeSet<_>>().into_iter().collect();
        for (i, first) in genres.iter().enumerate() {
            for second in &genres[i + 1..] {
                *counts
                    .entry(((*first).clone(), (*second).clone()))
                    .or_default() += 1;
            }
        }
    }
    let mut out: Vec<PairCount> = counts
        .into_iter()
        .map(|((first, second), count)| PairCount {
            first,
            second,
            count,
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.first.cmp(&b.first))
            .then_with(|| a.second.cmp(&b.second))
    });
    out.truncate(n);
    out
}

fn summarize(content_type: ContentType, mut values: Vec<f64>) -> Option<DurationStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    } else {
        values[count / 2]
    };
    Some(DurationStats {
        content_type,
        unit: content_type.duration_unit(),
        count,
        mean,
        median,
    })
}

fn duration_by_type(rows: &[&CatalogEntry]) -> Vec<DurationStats> {
    ContentType::ALL
        .into_iter()
        .filter_map(|ct| {
            let values = rows
                .iter()
                .filter(|e| e.content_type == ct)
                .filter_map(|e| e.duration)
                .map(|d| d.value() as f64)
                .collect();
            summarize(ct, values)
        })
        .collect()
}

fn duration_by_year(rows: &[&CatalogEntry]) -> Vec<YearDurationStats> {
    let mut groups: BTreeMap<(i32, ContentType), Vec<f64>> = BTreeMap::new();
    for e in rows {
        if let Some(d) = e.duration {
            groups
                .entry((e.release_year, e.content_type))
                .or_default()
                .push(d.value() as f64);
        }
    }
    groups
        .into_iter()
        .filter_map(|((year, ct), values)| {
            summarize(ct, values).map(|stats| YearDurationStats { year, stats })
        })
        .collect()
}

/// Entries per genre per release year (genres exploded).
pub fn genre_year_matrix(rows: &[&CatalogEntry]) -> BTreeMap<String, BTreeMap<i32, usize>> {
    let mut matrix: BTreeMap<String, BTreeMap<i32, usize>> = BTreeMap::new();
    for e in rows {
        let distinct: BTreeSet<&String> = e.genres.iter().collect();
        for genre in distinct {
            *matrix
                .entry(genre.clone())
                .or_default()
                .entry(e.release_year)
                .or_default() += 1;
        }
    }
    matrix
}

/// Genres whose least-squares slope over the last `lookback_years` years
/// (ending at the latest year in the matrix) is below `-decline_threshold`.
/// The window never starts before the earliest year present and is capped
/// at `MAX_LOOKBACK_YEARS`.
pub fn declining_genres(
    matrix: &BTreeMap<String, BTreeMap<i32, usize>>,
    config: &TrendConfig,
) -> Vec<GenreTrend> {
    let Some(last_year) = matrix
        .values()
        .filter_map(|years| years.keys().next_back().copied())
        .max()
    else {
        return Vec::new();
    };
    let Some(min_year) = matrix
        .values()
        .filter_map(|years| years.keys().next().copied())
        .min()
    else {
        return Vec::new();
    };
    let window = config.lookback_years.min(MAX_LOOKBACK_YEARS) as i32;
    if window < 2 {
        return Vec::new();
    }
    let first_year = last_year.saturating_sub(window - 1).max(min_year);

    let mut out: Vec<GenreTrend> = matrix
        .iter()
        .filter_map(|(genre, years)| {
            let points: Vec<(f64, f64)> = (first_year..=last_year)
                .map(|y| (y as f64, years.get(&y).copied().unwrap_or(0) as f64))
                .collect();
            let slope = linear_slope(&points)?;
            (slope < -config.decline_threshold).then(|| GenreTrend {
                genre: genre.clone(),
                slope,
            })
        })
        .collect();
    out.sort_by(|a, b| {
        a.slope
            .total_cmp(&b.slope)
            .then_with(|| a.genre.cmp(&b.genre))
    });
    out
}

/// Ordinary least-squares slope; `None` when x has no spread.
pub fn linear_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (num, den) = points.iter().fold((0.0, 0.0), |(num, den), (x, y)| {
        let dx = x - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}
