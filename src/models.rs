use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Rating vocabulary in display order (film ratings, then TV ratings).
pub const RATING_VOCABULARY: [&str; 14] = [
    "G", "PG", "PG-13", "R", "NC-17", "NR", "UR", "TV-Y", "TV-Y7", "TV-Y7-FV", "TV-G", "TV-PG",
    "TV-14", "TV-MA",
];

static RATING_RANK: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    RATING_VOCABULARY
        .iter()
        .enumerate()
        .map(|(i, r)| (*r, i))
        .collect()
});

pub fn is_known_rating(rating: &str) -> bool {
    RATING_RANK.contains_key(rating)
}

/// Position in the display order; unknown ratings sort after every known one.
pub fn rating_rank(rating: &str) -> usize {
    RATING_RANK
        .get(rating)
        .copied()
        .unwrap_or(RATING_VOCABULARY.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    Movie,
    Series,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Movie, ContentType::Series];

    /// Accepts the spellings found in catalog exports ("TV Show" is the usual one).
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "movie" => Some(ContentType::Movie),
            "series" | "tv show" | "tv series" => Some(ContentType::Series),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "Movie",
            ContentType::Series => "Series",
        }
    }

    pub fn duration_unit(&self) -> DurationUnit {
        match self {
            ContentType::Movie => DurationUnit::Minutes,
            ContentType::Series => DurationUnit::Seasons,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Minutes,
    Seasons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum Duration {
    Minutes(u32),
    Seasons(u32),
}

impl Duration {
    pub fn for_type(content_type: ContentType, value: u32) -> Self {
        match content_type {
            ContentType::Movie => Duration::Minutes(value),
            ContentType::Series => Duration::Seasons(value),
        }
    }

    pub fn value(&self) -> u32 {
        match *self {
            Duration::Minutes(v) | Duration::Seasons(v) => v,
        }
    }

    pub fn unit(&self) -> DurationUnit {
        match self {
            Duration::Minutes(_) => DurationUnit::Minutes,
            Duration::Seasons(_) => DurationUnit::Seasons,
        }
    }
}

/// One normalized catalog row. Multi-valued fields never hold empty strings
/// and `genres` always has at least one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: Option<String>,
    pub content_type: ContentType,
    pub title: String,
    pub directors: Vec<String>,
    pub cast: Vec<String>,
    pub countries: Vec<String>,
    pub date_added: Option<NaiveDate>,
    pub release_year: i32,
    pub rating: Option<String>,
    pub duration: Option<Duration>,
    pub genres: Vec<String>,
}

impl CatalogEntry {
    pub fn year_added(&self) -> Option<i32> {
        self.date_added.map(|d| d.year())
    }

    pub fn month_added(&self) -> Option<String> {
        self.date_added.map(|d| d.format("%B").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_type_spellings() {
        assert_eq!(ContentType::parse("Movie"), Some(ContentType::Movie));
        assert_eq!(ContentType::parse(" TV Show "), Some(ContentType::Series));
        assert_eq!(ContentType::parse("series"), Some(ContentType::Series));
        assert_eq!(ContentType::parse("Podcast"), None);
        assert_eq!(ContentType::parse(""), None);
    }

    #[test]
    fn duration_unit_follows_content_type() {
        assert_eq!(
            Duration::for_type(ContentType::Movie, 90).unit(),
            ContentType::Movie.duration_unit()
        );
        assert_eq!(
            Duration::for_type(ContentType::Series, 3),
            Duration::Seasons(3)
        );
    }

    #[test]
    fn unknown_ratings_rank_last() {
        assert!(rating_rank("PG") < rating_rank("TV-MA"));
        assert_eq!(rating_rank("74 min"), RATING_VOCABULARY.len());
        assert!(is_known_rating("TV-Y7-FV"));
        assert!(!is_known_rating("pg"));
    }

    #[test]
    fn derives_added_year_and_month() {
        let entry = CatalogEntry {
            id: Some("s1".to_string()),
            content_type: ContentType::Movie,
            title: "Title".to_string(),
            directors: vec![],
            cast: vec![],
            countries: vec![],
            date_added: NaiveDate::from_ymd_opt(2021, 9, 25),
            release_year: 2020,
            rating: None,
            duration: None,
            genres: vec!["Unknown".to_string()],
        };
        assert_eq!(entry.year_added(), Some(2021));
        assert_eq!(entry.month_added().as_deref(), Some("September"));
    }
}
