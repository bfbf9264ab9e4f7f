//! Core types and utilities for the multi-label classification benchmark.
//!
//! This crate provides the configuration, error type, metrics and CLI
//! helpers shared by the dataset, training and runner crates.

pub mod error;
pub mod types;
pub mod config;
pub mod metrics;
pub mod backend;
pub mod cli;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
pub use metrics::*;
pub use backend::*;
pub use cli::*;
