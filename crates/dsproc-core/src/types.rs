//! Common type definitions.

use crate::{DsprocError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Human turn.
    User,
    /// Model turn.
    Assistant,
}

impl Role {
    /// Lowercase role name as it appears in datasets.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Role name with the first letter capitalised.
    #[must_use]
    pub const fn capitalized(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of chat templates a dataset can be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplateKind {
    /// Message contents joined by a single space.
    SimpleConcatWithSpace,
    /// Message contents joined by a newline.
    SimpleConcatWithNewLine,
    /// `Role: content` turns separated by a blank line.
    #[default]
    SimpleChat,
    /// Zephyr format: `<|role|>\ncontent</s>` for every turn.
    Zephyr,
    /// Tulu format: EOS only after assistant turns.
    Tulu,
}

impl ChatTemplateKind {
    /// Every registered template, in registry order.
    pub const ALL: [ChatTemplateKind; 5] = [
        Self::SimpleConcatWithSpace,
        Self::SimpleConcatWithNewLine,
        Self::SimpleChat,
        Self::Zephyr,
        Self::Tulu,
    ];

    /// Registry name of this template.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SimpleConcatWithSpace => "simple_concat_with_space",
            Self::SimpleConcatWithNewLine => "simple_concat_with_new_line",
            Self::SimpleChat => "simple_chat",
            Self::Zephyr => "zephyr",
            Self::Tulu => "tulu",
        }
    }

    /// Names of every registered template.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.name()).collect()
    }
}

impl fmt::Display for ChatTemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChatTemplateKind {
    type Err = DsprocError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| {
                DsprocError::Config(format!(
                    "chat_template must be one of {:?}, got '{}'",
                    Self::names(),
                    name
                ))
            })
    }
}
