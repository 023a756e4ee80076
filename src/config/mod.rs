//! Configuration module for Trace
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and defines the immutable [`ScraperConfig`] snapshot a run is started with.
//!
//! # Example
//!
//! ```no_run
//! use trace_scraper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trace.toml")).unwrap();
//! println!("Scraper will use max depth: {}", config.scraper.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, FrontierOrder, RetryPolicy, ScrapeMode, ScraperConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_scraper_config, validate_seeds};
