//! Deterministic tokenizer for unit tests.

use crate::chat_templates::{ChatTemplate, Message};
use crate::tokenizer::ChatTokenizer;
use dsproc_core::{ChatTemplateKind, DsprocError, Result};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub(crate) const PAD: u32 = 0;
pub(crate) const EOS: u32 = 2;
const EOS_TEXT: &str = "</s>";

/// One token per character, `</s>` as a single EOS token.
pub(crate) struct CharTokenizer {
    template: ChatTemplate,
    pad_token_id: u32,
}

impl CharTokenizer {
    pub(crate) fn new() -> Self {
        Self::with_template(ChatTemplateKind::SimpleConcatWithSpace)
    }

    pub(crate) fn with_template(kind: ChatTemplateKind) -> Self {
        Self {
            template: ChatTemplate::new(kind, EOS_TEXT),
            pad_token_id: PAD,
        }
    }

    pub(crate) fn with_pad(mut self, pad_token_id: u32) -> Self {
        self.pad_token_id = pad_token_id;
        self
    }
}

impl ChatTokenizer for CharTokenizer {
    fn apply_chat_template(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<Vec<u32>> {
        let text = self.template.apply(messages, add_generation_prompt);
        let mut ids = Vec::new();
        for (i, piece) in text.split(EOS_TEXT).enumerate() {
            if i > 0 {
                ids.push(EOS);
            }
            ids.extend(piece.chars().map(u32::from));
        }
        Ok(ids)
    }

    fn decode(&self, token_id: u32) -> Result<String> {
        if token_id == EOS {
            return Ok(EOS_TEXT.to_string());
        }
        char::from_u32(token_id)
            .map(String::from)
            .ok_or_else(|| DsprocError::Tokenizer(format!("unknown token id {}", token_id)))
    }

    fn pad_token_id(&self) -> Option<u32> {
        Some(self.pad_token_id)
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }

    fn fingerprint(&self) -> String {
        format!("chars:{}", self.template.kind())
    }

    fn chat_template(&self) -> Option<ChatTemplateKind> {
        Some(self.template.kind())
    }
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Run `f` with a subscriber that writes into this sink.
    pub(crate) fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub(crate) fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
