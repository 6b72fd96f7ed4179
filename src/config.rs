use crate::aggregate::{TrendConfig, MAX_LOOKBACK_YEARS};
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_CATALOG_PATH: &str = "netflix_titles.csv";
const DEFAULT_ADDR: &str = "0.0.0.0:3146";

#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog_path: PathBuf,
    pub addr: SocketAddr,
    pub trend: TrendConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let catalog_path = env::var("CATALOG_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string());
        let addr = parse_var("CINESTATS_ADDR", DEFAULT_ADDR.parse::<SocketAddr>()?)?;
        let defaults = TrendConfig::default();
        let trend = TrendConfig {
            top_n: parse_var("TOP_N", defaults.top_n)?,
            lookback_years: parse_var("TREND_LOOKBACK_YEARS", defaults.lookback_years)?,
            decline_threshold: parse_var("TREND_DECLINE_THRESHOLD", defaults.decline_threshold)?,
        };
        let settings = Settings {
            catalog_path: PathBuf::from(catalog_path),
            addr,
            trend,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.trend.top_n == 0 {
            anyhow::bail!("TOP_N must be at least 1");
        }
        if !(2..=MAX_LOOKBACK_YEARS).contains(&self.trend.lookback_years) {
            anyhow::bail!(
                "TREND_LOOKBACK_YEARS must be between 2 and {}",
                MAX_LOOKBACK_YEARS
            );
        }
        if !self.trend.decline_threshold.is_finite() {
            anyhow::bail!("TREND_DECLINE_THRESHOLD must be a finite number");
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}
