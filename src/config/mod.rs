//! Configuration module for Toon-Leech
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use toon_leech::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("leech.toml")).unwrap();
//! println!("Pages fetched per chapter in parallel: {}", config.harvest.page_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, HarvestConfig, HttpConfig, RetryConfig, SeriesEntry, SourceEntry, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

pub use validation::validate_rename;
