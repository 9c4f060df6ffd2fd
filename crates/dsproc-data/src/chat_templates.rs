//! Chat template system for rendering conversations.
//!
//! Every template in the registry follows the same end-of-sequence contract:
//! rendered without a generation prompt, the text ends with the EOS marker
//! after the final message; rendered with a generation prompt, that trailing
//! EOS is left out and role-tagged templates open an assistant turn instead.
//! An empty conversation renders to the empty string.

use dsproc_core::{ChatTemplateKind, Role};
use serde::{Deserialize, Serialize};

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Speaker of this turn.
    pub role: Role,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Assistant turn opener used by role-tagged templates.
const ASSISTANT_TAG: &str = "<|assistant|>\n";

/// A registry template bound to a tokenizer's EOS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTemplate {
    kind: ChatTemplateKind,
    eos_token: String,
}

impl ChatTemplate {
    /// Create a template that terminates sequences with `eos_token`.
    pub fn new(kind: ChatTemplateKind, eos_token: impl Into<String>) -> Self {
        Self {
            kind,
            eos_token: eos_token.into(),
        }
    }

    /// The registry entry this template renders.
    pub fn kind(&self) -> ChatTemplateKind {
        self.kind
    }

    /// The EOS marker appended by this template.
    pub fn eos_token(&self) -> &str {
        &self.eos_token
    }

    /// Render a conversation to text.
    pub fn apply(&self, messages: &[Message], add_generation_prompt: bool) -> String {
        match self.kind {
            ChatTemplateKind::SimpleConcatWithSpace => {
                self.format_concat(messages, " ", add_generation_prompt, |m| m.content.clone())
            }
            ChatTemplateKind::SimpleConcatWithNewLine => {
                self.format_concat(messages, "\n", add_generation_prompt, |m| m.content.clone())
            }
            ChatTemplateKind::SimpleChat => {
                self.format_concat(messages, "\n\n", add_generation_prompt, |m| {
                    format!("{}: {}", m.role.capitalized(), m.content)
                })
            }
            ChatTemplateKind::Zephyr => self.format_zephyr(messages, add_generation_prompt),
            ChatTemplateKind::Tulu => self.format_tulu(messages, add_generation_prompt),
        }
    }

    /// Join rendered turns with `separator`, EOS after the last one.
    fn format_concat(
        &self,
        messages: &[Message],
        separator: &str,
        add_generation_prompt: bool,
        turn: impl Fn(&Message) -> String,
    ) -> String {
        let mut text = String::new();

        for (i, msg) in messages.iter().enumerate() {
            if i > 0 {
                text.push_str(separator);
            }
            text.push_str(&turn(msg));
            if i == messages.len() - 1 && !add_generation_prompt {
                text.push_str(&self.eos_token);
            }
        }

        text
    }

    /// Zephyr closes every turn with EOS.
    fn format_zephyr(&self, messages: &[Message], add_generation_prompt: bool) -> String {
        let mut text = String::new();

        for msg in messages {
            text.push_str(&format!("<|{}|>\n", msg.role));
            text.push_str(&msg.content);
            text.push_str(&self.eos_token);
            text.push('\n');
        }

        if add_generation_prompt && !messages.is_empty() {
            text.push_str(ASSISTANT_TAG);
        }

        text
    }

    /// Tulu only closes assistant turns with EOS.
    fn format_tulu(&self, messages: &[Message], add_generation_prompt: bool) -> String {
        let mut text = String::new();

        for msg in messages {
            text.push_str(&format!("<|{}|>\n", msg.role));
            text.push_str(&msg.content);
            if msg.role == Role::Assistant {
                text.push_str(&self.eos_token);
            }
            text.push('\n');
        }

        if add_generation_prompt && !messages.is_empty() {
            text.push_str(ASSISTANT_TAG);
        }

        text
    }
}
