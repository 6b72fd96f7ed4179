pub mod aggregate;
pub mod app;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;

pub use aggregate::{aggregate, DerivedTables, Filters, TrendConfig};
pub use error::CatalogError;
pub use loader::{load, Catalog, LoadCache, LoadReport};
