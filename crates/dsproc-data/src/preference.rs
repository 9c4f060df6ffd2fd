//! Preference (chosen vs. rejected) dataset processing.

use crate::dataset::{Row, Splits};
use crate::fields::{Field, PREFERENCE_FEATURES};
use crate::processor::{DatasetProcessor, ProcessorCore};
use crate::tokenizer::ChatTokenizer;
use dsproc_core::{DatasetConfig, Result};

/// Tokenizes chosen/rejected conversation pairs for reward modelling and
/// preference optimisation.
pub struct PreferenceDatasetProcessor<T> {
    core: ProcessorCore<T>,
}

impl<T: ChatTokenizer> PreferenceDatasetProcessor<T> {
    /// Create a processor.
    pub fn new(tokenizer: T, config: Option<DatasetConfig>) -> Self {
        Self {
            core: ProcessorCore::new(tokenizer, config),
        }
    }
}

/// Tokenize one preference row.
///
/// The prompt is the chosen conversation without its final message, rendered
/// with a generation prompt.
fn tokenize_row<T: ChatTokenizer>(
    tokenizer: &T,
    chosen_key: &str,
    rejected_key: &str,
    index: usize,
    row: Row,
) -> Result<Row> {
    let chosen = row.conversation(chosen_key, index)?;
    let rejected = row.conversation(rejected_key, index)?;
    let prompt = &chosen[..chosen.len().saturating_sub(1)];

    let prompt_ids = tokenizer.apply_chat_template(prompt, true)?;
    let chosen_ids = tokenizer.apply_chat_template(&chosen, false)?;
    let rejected_ids = tokenizer.apply_chat_template(&rejected, false)?;

    Ok(row
        .with_masked_tokens(Field::InputIdsPrompt, prompt_ids)
        .with_masked_tokens(Field::InputIdsChosen, chosen_ids)
        .with_masked_tokens(Field::InputIdsRejected, rejected_ids))
}

impl<T: ChatTokenizer> DatasetProcessor for PreferenceDatasetProcessor<T> {
    type Tokenizer = T;

    fn core(&self) -> &ProcessorCore<T> {
        &self.core
    }

    fn features(&self) -> &[Field] {
        &PREFERENCE_FEATURES
    }

    fn tokenize<D: Splits>(&self, dataset: D) -> Result<D> {
        let config = self.core.tokenize_config()?;
        let exec = self.core.exec_options();
        let chosen_key = config.preference_chosen_key();
        let rejected_key = config.preference_rejected_key();
        let transform = self
            .core
            .transform_id("preference.tokenize", &(chosen_key, rejected_key))?;
        let tokenizer = self.core.tokenizer();

        dataset.try_map_splits(|_, split| {
            split.map(
                &transform,
                |index, row| tokenize_row(tokenizer, chosen_key, rejected_key, index, row),
                exec,
            )
        })
    }

    /// Drop rows over the configured limits.
    ///
    /// When `max_prompt_token_length` is set only the prompt is checked and
    /// `max_token_length` is ignored. Otherwise `max_token_length` bounds both
    /// the chosen and the rejected sequence.
    fn filter<D: Splits>(&self, dataset: D) -> Result<D> {
        let Some(config) = self.core.config() else {
            return self.core.skip_filtering(dataset);
        };
        let max_prompt = config.max_prompt_token_length();
        let max_tokens = config.max_token_length();
        let transform = self
            .core
            .transform_id("preference.filter", &(max_prompt, max_tokens))?;

        self.core
            .filter_splits(dataset, &transform, |index, row| match (max_prompt, max_tokens) {
                (Some(limit), _) => {
                    Ok(row.require_tokens(Field::InputIdsPrompt, index)?.len() <= limit)
                }
                (None, Some(limit)) => Ok(row.require_tokens(Field::InputIdsChosen, index)?.len()
                    <= limit
                    && row.require_tokens(Field::InputIdsRejected, index)?.len() <= limit),
                (None, None) => Ok(true),
            })
    }
}
