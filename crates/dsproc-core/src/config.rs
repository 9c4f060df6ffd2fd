//! Dataset processing configuration.
//!
//! [`DatasetConfigBuilder`] is the mutable, deserializable form. Calling
//! [`DatasetConfigBuilder::build`] validates it and derives the execution
//! settings, producing an immutable [`DatasetConfig`].

use crate::{ChatTemplateKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Unvalidated dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfigBuilder {
    /// Dataset identifier (HuggingFace repo ID or local path).
    pub dataset_name: String,

    /// Name of the training split.
    #[serde(default = "default_train_split")]
    pub dataset_train_split: String,

    /// Name of the evaluation split.
    #[serde(default = "default_eval_split")]
    pub dataset_eval_split: String,

    /// Chat template registry name.
    #[serde(default = "default_chat_template")]
    pub chat_template: String,

    /// Column holding the preferred conversation.
    #[serde(default = "default_chosen_key")]
    pub preference_chosen_key: String,

    /// Column holding the dispreferred conversation.
    #[serde(default = "default_rejected_key")]
    pub preference_rejected_key: String,

    /// Column holding the SFT conversation.
    #[serde(default = "default_messages_key")]
    pub sft_messages_key: String,

    /// Drop rows whose full sequences exceed this many tokens.
    #[serde(default)]
    pub max_token_length: Option<usize>,

    /// Drop rows whose prompt exceeds this many tokens.
    #[serde(default)]
    pub max_prompt_token_length: Option<usize>,

    /// Debug mode: cap split sizes and run single-process without cache.
    #[serde(default)]
    pub sanity_check: bool,

    /// Rows kept per split in sanity check mode.
    #[serde(default = "default_sanity_check_max_samples")]
    pub sanity_check_max_samples: usize,

    /// Accepted for compatibility with existing configs; rows are always
    /// mapped one at a time.
    #[serde(default)]
    pub batched: bool,

    /// Directory where map/filter results are persisted.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Preferred histogram grid width.
    #[serde(default = "default_ncols")]
    pub ncols: usize,
}

impl DatasetConfigBuilder {
    /// Create a builder with defaults for the given dataset.
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            dataset_train_split: default_train_split(),
            dataset_eval_split: default_eval_split(),
            chat_template: default_chat_template(),
            preference_chosen_key: default_chosen_key(),
            preference_rejected_key: default_rejected_key(),
            sft_messages_key: default_messages_key(),
            max_token_length: None,
            max_prompt_token_length: None,
            sanity_check: false,
            sanity_check_max_samples: default_sanity_check_max_samples(),
            batched: false,
            cache_dir: None,
            ncols: default_ncols(),
        }
    }

    /// Load a builder from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a builder from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Set the chat template by registry name.
    pub fn chat_template(mut self, name: impl Into<String>) -> Self {
        self.chat_template = name.into();
        self
    }

    /// Set the full-sequence token limit.
    pub fn max_token_length(mut self, limit: usize) -> Self {
        self.max_token_length = Some(limit);
        self
    }

    /// Set the prompt token limit.
    pub fn max_prompt_token_length(mut self, limit: usize) -> Self {
        self.max_prompt_token_length = Some(limit);
        self
    }

    /// Enable or disable sanity check mode.
    pub fn sanity_check(mut self, enabled: bool) -> Self {
        self.sanity_check = enabled;
        self
    }

    /// Set the per-split row cap used in sanity check mode.
    pub fn sanity_check_max_samples(mut self, max_samples: usize) -> Self {
        self.sanity_check_max_samples = max_samples;
        self
    }

    /// Persist transform results under `dir`.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<DatasetConfig> {
        let chat_template: ChatTemplateKind = self.chat_template.parse()?;

        let (num_proc, load_from_cache_file) = if self.sanity_check {
            (1, false)
        } else {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (cpus, true)
        };
        debug!(
            dataset = %self.dataset_name,
            num_proc, load_from_cache_file, "Built dataset config"
        );

        Ok(DatasetConfig {
            dataset_name: self.dataset_name,
            dataset_train_split: self.dataset_train_split,
            dataset_eval_split: self.dataset_eval_split,
            chat_template,
            preference_chosen_key: self.preference_chosen_key,
            preference_rejected_key: self.preference_rejected_key,
            sft_messages_key: self.sft_messages_key,
            max_token_length: self.max_token_length,
            max_prompt_token_length: self.max_prompt_token_length,
            sanity_check: self.sanity_check,
            sanity_check_max_samples: self.sanity_check_max_samples,
            batched: self.batched,
            cache_dir: self.cache_dir,
            ncols: self.ncols,
            num_proc,
            load_from_cache_file,
        })
    }
}

/// Validated, immutable dataset configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetConfig {
    dataset_name: String,
    dataset_train_split: String,
    dataset_eval_split: String,
    chat_template: ChatTemplateKind,
    preference_chosen_key: String,
    preference_rejected_key: String,
    sft_messages_key: String,
    max_token_length: Option<usize>,
    max_prompt_token_length: Option<usize>,
    sanity_check: bool,
    sanity_check_max_samples: usize,
    batched: bool,
    cache_dir: Option<PathBuf>,
    ncols: usize,
    num_proc: usize,
    load_from_cache_file: bool,
}

impl DatasetConfig {
    /// Start building a configuration for `dataset_name`.
    pub fn builder(dataset_name: impl Into<String>) -> DatasetConfigBuilder {
        DatasetConfigBuilder::new(dataset_name)
    }

    /// Dataset identifier.
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Training split name.
    pub fn dataset_train_split(&self) -> &str {
        &self.dataset_train_split
    }

    /// Evaluation split name.
    pub fn dataset_eval_split(&self) -> &str {
        &self.dataset_eval_split
    }

    /// Selected chat template.
    pub fn chat_template(&self) -> ChatTemplateKind {
        self.chat_template
    }

    /// Column holding the preferred conversation.
    pub fn preference_chosen_key(&self) -> &str {
        &self.preference_chosen_key
    }

    /// Column holding the dispreferred conversation.
    pub fn preference_rejected_key(&self) -> &str {
        &self.preference_rejected_key
    }

    /// Column holding the SFT conversation.
    pub fn sft_messages_key(&self) -> &str {
        &self.sft_messages_key
    }

    /// Full-sequence token limit.
    pub fn max_token_length(&self) -> Option<usize> {
        self.max_token_length
    }

    /// Prompt token limit.
    pub fn max_prompt_token_length(&self) -> Option<usize> {
        self.max_prompt_token_length
    }

    /// Whether sanity check mode is on.
    pub fn sanity_check(&self) -> bool {
        self.sanity_check
    }

    /// Per-split row cap in sanity check mode.
    pub fn sanity_check_max_samples(&self) -> usize {
        self.sanity_check_max_samples
    }

    /// Compatibility flag, see [`DatasetConfigBuilder::batched`].
    pub fn batched(&self) -> bool {
        self.batched
    }

    /// Directory for persisted transform results.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Preferred histogram grid width.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Worker threads used by map and filter.
    pub fn num_proc(&self) -> usize {
        self.num_proc
    }

    /// Whether cached transform results may be reused.
    pub fn load_from_cache_file(&self) -> bool {
        self.load_from_cache_file
    }
}

fn default_train_split() -> String {
    "train".into()
}
fn default_eval_split() -> String {
    "test".into()
}
fn default_chat_template() -> String {
    ChatTemplateKind::default().name().into()
}
fn default_chosen_key() -> String {
    "chosen".into()
}
fn default_rejected_key() -> String {
    "rejected".into()
}
fn default_messages_key() -> String {
    "messages".into()
}
fn default_sanity_check_max_samples() -> usize {
    100
}
fn default_ncols() -> usize {
    2
}
