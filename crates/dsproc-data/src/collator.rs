//! Batch collation for training and generation.
//!
//! Collators pad variable-length token columns of a batch of rows into
//! rectangular `[batch_size, seq_len]` tensors. Preference batches are padded
//! on the right so both responses line up from their first token; generation
//! prompts are padded on the left so every prompt ends at the last column.

use crate::dataset::Row;
use crate::fields::Field;
use dsproc_core::{DsprocError, Result};

/// Which end of a sequence receives padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingSide {
    /// Pad after the tokens.
    Right,
    /// Pad before the tokens.
    Left,
}

/// A rectangular batch of token ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTensor {
    /// Token IDs [batch_size, seq_len].
    pub values: Vec<Vec<u32>>,
    /// Batch size.
    pub batch_size: usize,
    /// Sequence length.
    pub seq_len: usize,
}

impl TokenTensor {
    /// `(batch_size, seq_len)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.batch_size, self.seq_len)
    }

    /// Pad `sequences` to `seq_len` with `pad`.
    fn padded(sequences: &[&[u32]], seq_len: usize, pad: u32, side: PaddingSide) -> Self {
        let values = sequences
            .iter()
            .map(|seq| {
                let mut row = vec![pad; seq_len];
                let start = match side {
                    PaddingSide::Right => 0,
                    PaddingSide::Left => seq_len - seq.len(),
                };
                row[start..start + seq.len()].copy_from_slice(seq);
                row
            })
            .collect();
        Self {
            values,
            batch_size: sequences.len(),
            seq_len,
        }
    }

    /// 1 over real tokens, 0 over padding.
    fn mask(sequences: &[&[u32]], seq_len: usize, side: PaddingSide) -> Self {
        let ones: Vec<Vec<u32>> = sequences.iter().map(|seq| vec![1; seq.len()]).collect();
        let ones: Vec<&[u32]> = ones.iter().map(Vec::as_slice).collect();
        Self::padded(&ones, seq_len, 0, side)
    }
}

/// Gather `field` from every row, failing on an empty batch or a batch with
/// nothing but empty sequences.
fn gather<'a>(rows: &'a [Row], field: Field) -> Result<Vec<&'a [u32]>> {
    if rows.is_empty() {
        return Err(DsprocError::EmptyBatch("cannot collate an empty batch".into()));
    }
    rows.iter()
        .enumerate()
        .map(|(index, row)| row.require_tokens(field, index))
        .collect()
}

fn max_len(columns: &[&[&[u32]]]) -> Result<usize> {
    let max_len = columns
        .iter()
        .flat_map(|column| column.iter().map(|seq| seq.len()))
        .max()
        .unwrap_or(0);
    if max_len == 0 {
        return Err(DsprocError::EmptyBatch(
            "every sequence in the batch is empty".into(),
        ));
    }
    Ok(max_len)
}

/// Output of [`SimplePreferenceCollator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceBatch {
    /// Right-padded chosen ids.
    pub input_ids_chosen: TokenTensor,
    /// Right-padded rejected ids.
    pub input_ids_rejected: TokenTensor,
    /// Chosen attention mask, when requested.
    pub attention_mask_chosen: Option<TokenTensor>,
    /// Rejected attention mask, when requested.
    pub attention_mask_rejected: Option<TokenTensor>,
}

/// Right-pads chosen and rejected responses to one shared length.
#[derive(Debug, Clone)]
pub struct SimplePreferenceCollator {
    /// Padding token ID.
    pub pad_token_id: u32,
    attention_masks: bool,
}

impl SimplePreferenceCollator {
    /// Create a new collator.
    pub fn new(pad_token_id: u32) -> Self {
        Self {
            pad_token_id,
            attention_masks: false,
        }
    }

    /// Also emit attention masks.
    pub fn with_attention_masks(mut self, enabled: bool) -> Self {
        self.attention_masks = enabled;
        self
    }

    /// Collate rows carrying `input_ids_chosen` and `input_ids_rejected`.
    pub fn collate(&self, rows: &[Row]) -> Result<PreferenceBatch> {
        let chosen = gather(rows, Field::InputIdsChosen)?;
        let rejected = gather(rows, Field::InputIdsRejected)?;
        let seq_len = max_len(&[chosen.as_slice(), rejected.as_slice()])?;

        let side = PaddingSide::Right;
        let (attention_mask_chosen, attention_mask_rejected) = if self.attention_masks {
            (
                Some(TokenTensor::mask(&chosen, seq_len, side)),
                Some(TokenTensor::mask(&rejected, seq_len, side)),
            )
        } else {
            (None, None)
        };

        Ok(PreferenceBatch {
            input_ids_chosen: TokenTensor::padded(&chosen, seq_len, self.pad_token_id, side),
            input_ids_rejected: TokenTensor::padded(&rejected, seq_len, self.pad_token_id, side),
            attention_mask_chosen,
            attention_mask_rejected,
        })
    }
}

/// Output of [`SimpleGenerateCollator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateBatch {
    /// Left-padded prompt ids.
    pub input_ids_prompt: TokenTensor,
    /// Prompt attention mask, when requested.
    pub attention_mask_prompt: Option<TokenTensor>,
}

/// Left-pads prompts so generation continues from the last column.
#[derive(Debug, Clone)]
pub struct SimpleGenerateCollator {
    /// Padding token ID.
    pub pad_token_id: u32,
    attention_masks: bool,
}

impl SimpleGenerateCollator {
    /// Create a new collator.
    pub fn new(pad_token_id: u32) -> Self {
        Self {
            pad_token_id,
            attention_masks: false,
        }
    }

    /// Also emit an attention mask.
    pub fn with_attention_masks(mut self, enabled: bool) -> Self {
        self.attention_masks = enabled;
        self
    }

    /// Collate rows carrying `input_ids_prompt`.
    pub fn collate(&self, rows: &[Row]) -> Result<GenerateBatch> {
        let prompts = gather(rows, Field::InputIdsPrompt)?;
        let seq_len = max_len(&[prompts.as_slice()])?;

        let side = PaddingSide::Left;
        Ok(GenerateBatch {
            input_ids_prompt: TokenTensor::padded(&prompts, seq_len, self.pad_token_id, side),
            attention_mask_prompt: self
                .attention_masks
                .then(|| TokenTensor::mask(&prompts, seq_len, side)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preference_rows(chosen: &[&[u32]], rejected: &[&[u32]]) -> Vec<Row> {
        chosen
            .iter()
            .zip(rejected)
            .map(|(c, r)| {
                Row::default()
                    .with_tokens(Field::InputIdsChosen, c.to_vec())
                    .with_tokens(Field::InputIdsRejected, r.to_vec())
            })
            .collect()
    }

    fn prompt_rows(prompts: &[&[u32]]) -> Vec<Row> {
        prompts
            .iter()
            .map(|p| Row::default().with_tokens(Field::InputIdsPrompt, p.to_vec()))
            .collect()
    }

    #[test]
    fn test_preference_right_pads() {
        let rows = preference_rows(&[&[1, 2, 3], &[4, 5]], &[&[6], &[7, 8]]);
        let batch = SimplePreferenceCollator::new(0).collate(&rows).unwrap();

        assert_eq!(batch.input_ids_chosen.values, vec![vec![1, 2, 3], vec![4, 5, 0]]);
        assert_eq!(batch.input_ids_rejected.values, vec![vec![6, 0, 0], vec![7, 8, 0]]);
        assert_eq!(batch.input_ids_chosen.shape(), (2, 3));
        assert!(batch.attention_mask_chosen.is_none());
    }

    #[test]
    fn test_preference_shares_length_across_fields() {
        let rows = preference_rows(&[&[1]], &[&[2, 3, 4, 5]]);
        let batch = SimplePreferenceCollator::new(9).collate(&rows).unwrap();
        assert_eq!(batch.input_ids_chosen.values, vec![vec![1, 9, 9, 9]]);
        assert_eq!(batch.input_ids_rejected.shape(), (1, 4));
    }

    #[test]
    fn test_preference_masks() {
        let rows = preference_rows(&[&[1, 2, 3], &[4, 5]], &[&[6], &[7, 8]]);
        let batch = SimplePreferenceCollator::new(0)
            .with_attention_masks(true)
            .collate(&rows)
            .unwrap();

        assert_eq!(
            batch.attention_mask_chosen.unwrap().values,
            vec![vec![1, 1, 1], vec![1, 1, 0]]
        );
        assert_eq!(
            batch.attention_mask_rejected.unwrap().values,
            vec![vec![1, 0, 0], vec![1, 1, 0]]
        );
    }

    #[test]
    fn test_generate_left_pads() {
        let rows = prompt_rows(&[&[7, 8], &[9]]);
        let batch = SimpleGenerateCollator::new(0)
            .with_attention_masks(true)
            .collate(&rows)
            .unwrap();

        assert_eq!(batch.input_ids_prompt.values, vec![vec![7, 8], vec![0, 9]]);
        assert_eq!(
            batch.attention_mask_prompt.unwrap().values,
            vec![vec![1, 1], vec![0, 1]]
        );
    }

    #[test]
    fn test_empty_batches_rejected() {
        assert!(matches!(
            SimplePreferenceCollator::new(0).collate(&[]),
            Err(DsprocError::EmptyBatch(_))
        ));
        assert!(matches!(
            SimpleGenerateCollator::new(0).collate(&[]),
            Err(DsprocError::EmptyBatch(_))
        ));
        assert!(matches!(
            SimpleGenerateCollator::new(0).collate(&prompt_rows(&[&[], &[]])),
            Err(DsprocError::EmptyBatch(_))
        ));
    }

    #[test]
    fn test_missing_column_fails() {
        let rows = prompt_rows(&[&[1]]);
        assert!(matches!(
            SimplePreferenceCollator::new(0).collate(&rows),
            Err(DsprocError::MissingField { .. })
        ));
    }
}
