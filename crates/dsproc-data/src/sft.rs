//! Supervised fine-tuning dataset processing.

use crate::dataset::{Row, Splits};
use crate::fields::{Field, SFT_FEATURES};
use crate::processor::{DatasetProcessor, ProcessorCore};
use crate::tokenizer::ChatTokenizer;
use dsproc_core::{DatasetConfig, Result};

/// Tokenizes demonstration conversations into a prompt and a full sequence.
pub struct SftDatasetProcessor<T> {
    core: ProcessorCore<T>,
}

impl<T: ChatTokenizer> SftDatasetProcessor<T> {
    /// Create a processor.
    pub fn new(tokenizer: T, config: Option<DatasetConfig>) -> Self {
        Self {
            core: ProcessorCore::new(tokenizer, config),
        }
    }
}

fn tokenize_row<T: ChatTokenizer>(
    tokenizer: &T,
    messages_key: &str,
    index: usize,
    row: Row,
) -> Result<Row> {
    let messages = row.conversation(messages_key, index)?;
    let prompt = &messages[..messages.len().saturating_sub(1)];

    let prompt_ids = tokenizer.apply_chat_template(prompt, true)?;
    let input_ids = tokenizer.apply_chat_template(&messages, false)?;

    Ok(row
        .with_tokens(Field::InputIdsPrompt, prompt_ids)
        .with_tokens(Field::InputIds, input_ids))
}

impl<T: ChatTokenizer> DatasetProcessor for SftDatasetProcessor<T> {
    type Tokenizer = T;

    fn core(&self) -> &ProcessorCore<T> {
        &self.core
    }

    fn features(&self) -> &[Field] {
        &SFT_FEATURES
    }

    fn tokenize<D: Splits>(&self, dataset: D) -> Result<D> {
        let config = self.core.tokenize_config()?;
        let exec = self.core.exec_options();
        let messages_key = config.sft_messages_key();
        let transform = self.core.transform_id("sft.tokenize", &messages_key)?;
        let tokenizer = self.core.tokenizer();

        dataset.try_map_splits(|_, split| {
            split.map(
                &transform,
                |index, row| tokenize_row(tokenizer, messages_key, index, row),
                exec,
            )
        })
    }

    /// Drop rows over the configured limits.
    ///
    /// `max_prompt_token_length`, when set, is the only limit checked.
    /// Otherwise `max_token_length` bounds `input_ids`.
    fn filter<D: Splits>(&self, dataset: D) -> Result<D> {
        let Some(config) = self.core.config() else {
            return self.core.skip_filtering(dataset);
        };
        let max_prompt = config.max_prompt_token_length();
        let max_tokens = config.max_token_length();
        let transform = self
            .core
            .transform_id("sft.filter", &(max_prompt, max_tokens))?;

        self.core
            .filter_splits(dataset, &transform, |index, row| {
                let (field, limit) = match (max_prompt, max_tokens) {
                    (Some(limit), _) => (Field::InputIdsPrompt, limit),
                    (None, Some(limit)) => (Field::InputIds, limit),
                    (None, None) => return Ok(true),
                };
                Ok(row.require_tokens(field, index)?.len() <= limit)
            })
    }
}
