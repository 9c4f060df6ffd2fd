//! Names of the token fields added to rows by tokenization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A derived token column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Conversation minus its final message, with a generation prompt.
    InputIdsPrompt,
    /// All-ones mask matching [`Field::InputIdsPrompt`].
    AttentionMaskPrompt,
    /// The preferred conversation.
    InputIdsChosen,
    /// All-ones mask matching [`Field::InputIdsChosen`].
    AttentionMaskChosen,
    /// The dispreferred conversation.
    InputIdsRejected,
    /// All-ones mask matching [`Field::InputIdsRejected`].
    AttentionMaskRejected,
    /// The full SFT conversation.
    InputIds,
}

impl Field {
    /// Column name as it appears in serialized datasets.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::InputIdsPrompt => "input_ids_prompt",
            Self::AttentionMaskPrompt => "attention_mask_prompt",
            Self::InputIdsChosen => "input_ids_chosen",
            Self::AttentionMaskChosen => "attention_mask_chosen",
            Self::InputIdsRejected => "input_ids_rejected",
            Self::AttentionMaskRejected => "attention_mask_rejected",
            Self::InputIds => "input_ids",
        }
    }

    /// The mask column paired with an id column, if any.
    #[must_use]
    pub const fn attention_mask(&self) -> Option<Field> {
        match self {
            Self::InputIdsPrompt => Some(Self::AttentionMaskPrompt),
            Self::InputIdsChosen => Some(Self::AttentionMaskChosen),
            Self::InputIdsRejected => Some(Self::AttentionMaskRejected),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fields a preference collator consumes.
pub const TOKENIZED_PREFERENCE_DATASET_KEYS: [Field; 2] =
    [Field::InputIdsChosen, Field::InputIdsRejected];

/// Fields summarised for preference datasets.
pub const PREFERENCE_FEATURES: [Field; 3] = [
    Field::InputIdsPrompt,
    Field::InputIdsChosen,
    Field::InputIdsRejected,
];

/// Fields summarised for SFT datasets.
pub const SFT_FEATURES: [Field; 2] = [Field::InputIdsPrompt, Field::InputIds];
