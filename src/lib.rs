//! ML Constructor: turns irregular, differently sampled tabular time series
//! into one period-aligned, feature-enriched dataset per project.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod table;
