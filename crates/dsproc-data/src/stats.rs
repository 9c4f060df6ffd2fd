//! Token length statistics.

use crate::dataset::{Dataset, Splits};
use crate::fields::Field;
use dsproc_core::{DsprocError, Result};
use serde::Serialize;

/// Length summary of one token column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureLengthStats {
    /// Longest sequence.
    pub max_token_length: usize,
    /// Shortest sequence.
    pub min_token_length: usize,
    /// Average sequence length.
    pub mean_token_length: f64,
}

impl FeatureLengthStats {
    /// Summarise a list of lengths. `None` if there are none.
    pub fn from_lengths(lengths: &[usize]) -> Option<Self> {
        let max_token_length = *lengths.iter().max()?;
        let min_token_length = *lengths.iter().min()?;
        let total: usize = lengths.iter().sum();
        Some(Self {
            max_token_length,
            min_token_length,
            mean_token_length: total as f64 / lengths.len() as f64,
        })
    }
}

/// Per-feature statistics of one split, in the order features were requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SplitLengthStats {
    features: Vec<(Field, FeatureLengthStats)>,
}

impl SplitLengthStats {
    /// Compute statistics for `features` over `dataset`.
    pub fn compute(features: &[Field], dataset: &Dataset) -> Result<Self> {
        let features = features
            .iter()
            .map(|&field| {
                let lengths = dataset.column_lengths(field)?;
                let stats = FeatureLengthStats::from_lengths(&lengths)
                    .ok_or_else(|| DsprocError::EmptyColumn(field.key().to_string()))?;
                Ok((field, stats))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { features })
    }

    /// Statistics of one feature.
    pub fn get(&self, field: Field) -> Option<&FeatureLengthStats> {
        self.features
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, stats)| stats)
    }

    /// All features in order.
    pub fn iter(&self) -> impl Iterator<Item = &(Field, FeatureLengthStats)> {
        self.features.iter()
    }
}

/// Statistics for a lone dataset or for every split of a dictionary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TokenLengthStats {
    /// A single dataset.
    Dataset(SplitLengthStats),
    /// Named splits in order.
    DatasetDict(Vec<(String, SplitLengthStats)>),
}

impl TokenLengthStats {
    /// Compute statistics for `features` over every split of `dataset`.
    pub fn compute<D: Splits>(features: &[Field], dataset: &D) -> Result<Self> {
        let views = dataset.split_views();
        if let [(None, single)] = views.as_slice() {
            return Ok(Self::Dataset(SplitLengthStats::compute(features, single)?));
        }

        let splits = views
            .into_iter()
            .map(|(name, split)| {
                Ok((
                    name.unwrap_or_default().to_string(),
                    SplitLengthStats::compute(features, split)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::DatasetDict(splits))
    }

    /// Statistics of a named split, or of the lone dataset when `name` is
    /// `None`.
    pub fn split(&self, name: Option<&str>) -> Option<&SplitLengthStats> {
        match (self, name) {
            (Self::Dataset(stats), None) => Some(stats),
            (Self::DatasetDict(splits), Some(name)) => {
                splits.iter().find(|(n, _)| n == name).map(|(_, s)| s)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetDict, Row};

    fn with_lengths(lengths: &[usize]) -> Dataset {
        lengths
            .iter()
            .map(|&n| Row::default().with_tokens(Field::InputIds, vec![7; n]))
            .collect()
    }

    #[test]
    fn test_min_max_mean() {
        let stats = FeatureLengthStats::from_lengths(&[3, 5, 7]).unwrap();
        assert_eq!(stats.max_token_length, 7);
        assert_eq!(stats.min_token_length, 3);
        assert_eq!(stats.mean_token_length, 5.0);
        assert!(FeatureLengthStats::from_lengths(&[]).is_none());
    }

    #[test]
    fn test_single_dataset() {
        let stats = TokenLengthStats::compute(&[Field::InputIds], &with_lengths(&[3, 5, 7])).unwrap();
        let split = stats.split(None).unwrap();
        assert_eq!(split.get(Field::InputIds).unwrap().max_token_length, 7);
    }

    #[test]
    fn test_dict_reports_every_split() {
        let dict = DatasetDict::new()
            .with_split("train", with_lengths(&[1, 2]))
            .with_split("test", with_lengths(&[4]));
        let stats = TokenLengthStats::compute(&[Field::InputIds], &dict).unwrap();

        let train = stats.split(Some("train")).unwrap().get(Field::InputIds).unwrap();
        assert_eq!(train.mean_token_length, 1.5);
        let test = stats.split(Some("test")).unwrap().get(Field::InputIds).unwrap();
        assert_eq!((test.min_token_length, test.max_token_length), (4, 4));
    }

    #[test]
    fn test_missing_and_empty_columns_fail() {
        let dataset = with_lengths(&[1]);
        assert!(matches!(
            TokenLengthStats::compute(&[Field::InputIdsPrompt], &dataset),
            Err(DsprocError::MissingField { .. })
        ));
        assert!(matches!(
            TokenLengthStats::compute(&[Field::InputIds], &Dataset::new()),
            Err(DsprocError::EmptyColumn(_))
        ));
    }
}
