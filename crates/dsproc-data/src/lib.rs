//! Dataset processing for language-model training.
//!
//! This crate provides:
//! - Chat template rendering and tokenizer integration
//! - An ordered in-memory dataset store with parallel, cached map/filter
//! - Preference and SFT processors that tokenize and length-filter datasets
//! - Token length statistics and SVG histograms
//! - Padding collators for training and generation batches
//! - Coloured token boundary rendering for the terminal

#![warn(missing_docs)]

pub mod cache;
pub mod chat_templates;
pub mod collator;
pub mod dataset;
pub mod fields;
pub mod histogram;
pub mod preference;
pub mod processor;
pub mod sft;
pub mod stats;
pub mod tokenizer;
pub mod visualize;

#[cfg(test)]
mod testing;

pub use cache::*;
pub use chat_templates::*;
pub use collator::*;
pub use dataset::*;
pub use fields::*;
pub use preference::*;
pub use processor::*;
pub use sft::*;
pub use stats::*;
pub use tokenizer::*;
pub use visualize::*;
