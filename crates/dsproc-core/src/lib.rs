//! Core types, errors, and configuration for dsproc.
//!
//! This crate provides the foundations shared by the dataset pipeline:
//!
//! - The [`DsprocError`] type and [`Result`] alias
//! - [`DatasetConfig`], validated once at construction
//! - The chat template registry ([`ChatTemplateKind`]) and message [`Role`]s

#![warn(missing_docs)]

mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DatasetConfig, DatasetConfigBuilder};
    pub use crate::error::{DsprocError, Result};
    pub use crate::types::*;
}
