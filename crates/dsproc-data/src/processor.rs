//! The dataset processor interface and its shared behaviour.
//!
//! A processor turns raw conversations into token columns ([`tokenize`]) and
//! drops rows that exceed the configured length limits ([`filter`]). The two
//! variants are [`PreferenceDatasetProcessor`] and [`SftDatasetProcessor`];
//! [`BaseDatasetProcessor`] carries only the shared operations.
//!
//! [`tokenize`]: DatasetProcessor::tokenize
//! [`filter`]: DatasetProcessor::filter
//! [`PreferenceDatasetProcessor`]: crate::PreferenceDatasetProcessor
//! [`SftDatasetProcessor`]: crate::SftDatasetProcessor

use crate::dataset::{Dataset, DatasetDict, ExecOptions, Row, Splits};
use crate::fields::Field;
use crate::histogram;
use crate::stats::TokenLengthStats;
use crate::tokenizer::ChatTokenizer;
use dsproc_core::{DatasetConfig, DsprocError, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Default number of histogram bins.
pub const DEFAULT_BINS: usize = 30;

/// Tokenizer and configuration shared by every processor.
pub struct ProcessorCore<T> {
    tokenizer: T,
    config: Option<DatasetConfig>,
    exec: ExecOptions,
}

impl<T: ChatTokenizer> ProcessorCore<T> {
    /// Pair a tokenizer with an optional configuration.
    ///
    /// Warns when the pad token doubles as EOS: masking pad positions out of
    /// the loss then also masks every EOS, and the model never learns to stop.
    pub fn new(tokenizer: T, config: Option<DatasetConfig>) -> Self {
        if let (Some(pad), Some(eos)) = (tokenizer.pad_token_id(), tokenizer.eos_token_id()) {
            if pad == eos {
                warn!(
                    "Tokenizer's pad token is the same as EOS token, this might cause the model to not learn to generate EOS tokens."
                );
            }
        }
        let exec = config
            .as_ref()
            .map(ExecOptions::from_config)
            .unwrap_or_default();
        Self {
            tokenizer,
            config,
            exec,
        }
    }

    /// The tokenizer.
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// The configuration, if any.
    pub fn config(&self) -> Option<&DatasetConfig> {
        self.config.as_ref()
    }

    /// The configuration, failing if there is none.
    pub fn require_config(&self) -> Result<&DatasetConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| DsprocError::Config("processor has no dataset config".into()))
    }

    /// The configuration tokenization runs under.
    ///
    /// Fails when the tokenizer renders with a different chat template than
    /// the one the configuration names.
    pub fn tokenize_config(&self) -> Result<&DatasetConfig> {
        let config = self.require_config()?;
        match self.tokenizer.chat_template() {
            Some(kind) if kind != config.chat_template() => Err(DsprocError::Config(format!(
                "tokenizer renders with chat template '{}' but the config names '{}'",
                kind,
                config.chat_template()
            ))),
            _ => Ok(config),
        }
    }

    /// Map/filter settings; sequential and uncached without a config.
    pub fn exec_options(&self) -> &ExecOptions {
        &self.exec
    }

    /// Identity of a transform for cache keys.
    ///
    /// Covers the operation name, the tokenizer and template, and the
    /// operation-specific settings in `detail`.
    pub fn transform_id<S: Serialize>(&self, operation: &str, detail: &S) -> Result<String> {
        Ok(format!(
            "{}:{}:{}",
            operation,
            self.tokenizer.fingerprint(),
            serde_json::to_string(detail)?
        ))
    }

    /// Return `dataset` untouched, noting that no filter ran.
    pub fn skip_filtering<D>(&self, dataset: D) -> Result<D> {
        warn!("No config provided, skipping filtering");
        Ok(dataset)
    }

    /// Filter every split with `keep`, logging removals for named splits.
    pub fn filter_splits<D, P>(&self, dataset: D, transform: &str, keep: P) -> Result<D>
    where
        D: Splits,
        P: Fn(usize, &Row) -> Result<bool> + Sync + Send,
    {
        let exec = self.exec_options();
        dataset.try_map_splits(|name, split| {
            let total_count = split.len();
            let filtered = split.filter(transform, &keep, exec)?;
            if let Some(name) = name {
                log_filtered(name, total_count, filtered.len());
            }
            Ok(filtered)
        })
    }
}

fn log_filtered(split: &str, total_count: usize, kept: usize) {
    let filtered_count = total_count - kept;
    let percentage = if total_count > 0 {
        filtered_count as f64 / total_count as f64 * 100.0
    } else {
        0.0
    };
    info!(
        "Filtered out {} samples or {:.2}% samples from {}",
        filtered_count, percentage, split
    );
}

/// Tokenizes and length-filters conversational datasets.
///
/// `tokenize` and `filter` must be provided by each variant; the defaults
/// here only fail (or, for `filter` without a config, pass the data through).
pub trait DatasetProcessor {
    /// Tokenizer type.
    type Tokenizer: ChatTokenizer;

    /// Shared state.
    fn core(&self) -> &ProcessorCore<Self::Tokenizer>;

    /// Token columns summarised by stats and plots.
    fn features(&self) -> &[Field] {
        &[]
    }

    /// Add token columns to every row.
    fn tokenize<D: Splits>(&self, _dataset: D) -> Result<D> {
        Err(DsprocError::NotImplemented(
            "tokenize must be provided by a processor variant".into(),
        ))
    }

    /// Drop rows that exceed the configured length limits.
    fn filter<D: Splits>(&self, dataset: D) -> Result<D> {
        if self.core().config().is_none() {
            return self.core().skip_filtering(dataset);
        }
        Err(DsprocError::NotImplemented(
            "filter must be provided by a processor variant".into(),
        ))
    }

    /// In sanity check mode, keep only the first
    /// `sanity_check_max_samples` rows of every split.
    fn sanity_check_(&self, dataset: &mut DatasetDict) -> Result<()> {
        let Some(config) = self.core().config() else {
            return Ok(());
        };
        if !config.sanity_check() {
            return Ok(());
        }
        for (_, split) in dataset.iter_mut() {
            let keep = config.sanity_check_max_samples().min(split.len());
            let full = std::mem::take(split);
            *split = full.select(0..keep)?;
        }
        Ok(())
    }

    /// Length statistics of arbitrary `features`.
    fn get_token_length_stats_for<D: Splits>(
        &self,
        features: &[Field],
        dataset: &D,
    ) -> Result<TokenLengthStats> {
        TokenLengthStats::compute(features, dataset)
    }

    /// Length statistics of this processor's features.
    fn get_token_length_stats<D: Splits>(&self, dataset: &D) -> Result<TokenLengthStats> {
        self.get_token_length_stats_for(self.features(), dataset)
    }

    /// Histogram of arbitrary `features`, saved as SVG.
    fn get_token_length_visualization_for(
        &self,
        features: &[Field],
        dataset: &DatasetDict,
        save_path: &Path,
        bins: usize,
    ) -> Result<()> {
        histogram::save_svg(features, dataset, save_path, bins)
    }

    /// Histogram of this processor's features, saved as SVG.
    fn get_token_length_visualization(
        &self,
        dataset: &DatasetDict,
        save_path: &Path,
        bins: usize,
    ) -> Result<()> {
        self.get_token_length_visualization_for(self.features(), dataset, save_path, bins)
    }
}

/// A processor with only the shared behaviour.
pub struct BaseDatasetProcessor<T> {
    core: ProcessorCore<T>,
}

impl<T: ChatTokenizer> BaseDatasetProcessor<T> {
    /// Create a processor.
    pub fn new(tokenizer: T, config: Option<DatasetConfig>) -> Self {
        Self {
            core: ProcessorCore::new(tokenizer, config),
        }
    }
}

impl<T: ChatTokenizer> DatasetProcessor for BaseDatasetProcessor<T> {
    type Tokenizer = T;

    fn core(&self) -> &ProcessorCore<T> {
        &self.core
    }
}

/// Lone-dataset convenience for [`DatasetProcessor::sanity_check_`].
pub fn sanity_check_dataset<P: DatasetProcessor>(processor: &P, dataset: Dataset) -> Result<Dataset> {
    let mut dict = DatasetDict::new().with_split("", dataset);
    processor.sanity_check_(&mut dict)?;
    Ok(dict.into_iter().next().map(|(_, d)| d).unwrap_or_default())
}
