//! Configuration module for metacrawl
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and merging them with values given on the command line.
//!
//! # Example
//!
//! ```no_run
//! use metacrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("metacrawl.toml")).unwrap();
//! println!("Crawler will store up to {} pages", config.crawler.document_budget);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ConfigOverrides, CrawlerConfig, OutputConfig, ScopeConfig, UserAgentConfig,
};

// Re-export parser and validation functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, resolve_config,
};
pub use validation::validate;
