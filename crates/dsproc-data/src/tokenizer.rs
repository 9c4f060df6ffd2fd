//! Tokenizer integration.
//!
//! [`ChatTokenizer`] is the capability the processors and the token
//! visualizer are written against. [`TemplatedTokenizer`] implements it on top
//! of the `tokenizers` library and a registry [`ChatTemplate`].

use crate::cache::fingerprint_bytes;
use crate::chat_templates::{ChatTemplate, Message};
use dsproc_core::{ChatTemplateKind, DatasetConfig, DsprocError, Result};
use std::path::Path;

/// Turns conversations into token ids.
pub trait ChatTokenizer: Send + Sync {
    /// Render `messages` with the chat template and tokenize the result.
    ///
    /// Deterministic for a fixed tokenizer and template.
    fn apply_chat_template(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<Vec<u32>>;

    /// Decode a single token id.
    fn decode(&self, token_id: u32) -> Result<String>;

    /// Padding token id, if the tokenizer has one.
    fn pad_token_id(&self) -> Option<u32>;

    /// End-of-sequence token id, if the tokenizer has one.
    fn eos_token_id(&self) -> Option<u32>;

    /// Stable identity of the vocabulary and template, used in cache keys.
    fn fingerprint(&self) -> String;

    /// Registry template this tokenizer renders with, if it uses one.
    fn chat_template(&self) -> Option<ChatTemplateKind> {
        None
    }
}

/// Wrapper around the tokenizers library.
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
}

impl Tokenizer {
    /// Load a tokenizer from a local file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| DsprocError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Load a tokenizer from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| DsprocError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encode text to token IDs without adding special tokens.
    ///
    /// Chat templates place their own markers, so nothing else is added.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| DsprocError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token IDs to text without skipping special tokens.
    pub fn decode_with_special_tokens(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| DsprocError::Tokenizer(e.to_string()))
    }

    /// Get vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Look up the text of a token id.
    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }

    /// Digest of the vocabulary, including added tokens.
    pub fn vocab_fingerprint(&self) -> String {
        let mut vocab: Vec<(String, u32)> = self.inner.get_vocab(true).into_iter().collect();
        vocab.sort_by_key(|(_, id)| *id);

        let mut bytes = Vec::new();
        for (token, id) in vocab {
            bytes.extend_from_slice(&id.to_le_bytes());
            bytes.extend_from_slice(token.as_bytes());
        }
        fingerprint_bytes(&bytes)
    }

    /// Get pad token ID if available.
    ///
    /// Tries common pad token names, falls back to EOS token.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.inner
            .token_to_id("<pad>")
            .or_else(|| self.inner.token_to_id("[PAD]"))
            .or_else(|| self.inner.token_to_id("<|pad|>"))
            .or_else(|| self.eos_token_id())
    }

    /// Get EOS token ID if available.
    pub fn eos_token_id(&self) -> Option<u32> {
        self.inner
            .token_to_id("</s>")
            .or_else(|| self.inner.token_to_id("<|endoftext|>"))
            .or_else(|| self.inner.token_to_id("<|end_of_text|>"))
            .or_else(|| self.inner.token_to_id("<eos>"))
    }
}

/// A [`Tokenizer`] paired with a registry chat template.
pub struct TemplatedTokenizer {
    tokenizer: Tokenizer,
    template: ChatTemplate,
    pad_token_id: Option<u32>,
    eos_token_id: u32,
    fingerprint: String,
}

impl TemplatedTokenizer {
    /// Bind `tokenizer` to the template `kind`.
    ///
    /// Fails if the tokenizer has no recognisable EOS token, since every
    /// template needs one.
    pub fn new(tokenizer: Tokenizer, kind: ChatTemplateKind) -> Result<Self> {
        let eos_token_id = tokenizer
            .eos_token_id()
            .ok_or_else(|| DsprocError::Tokenizer("tokenizer has no EOS token".into()))?;
        let eos_token = tokenizer.id_to_token(eos_token_id).ok_or_else(|| {
            DsprocError::Tokenizer(format!("EOS token id {} is not in the vocabulary", eos_token_id))
        })?;

        let identity = format!("{}:{}", tokenizer.vocab_fingerprint(), kind.name());

        Ok(Self {
            pad_token_id: tokenizer.pad_token_id(),
            template: ChatTemplate::new(kind, eos_token),
            fingerprint: fingerprint_bytes(identity.as_bytes()),
            tokenizer,
            eos_token_id,
        })
    }

    /// Bind `tokenizer` to the template named by `config`.
    pub fn from_config(tokenizer: Tokenizer, config: &DatasetConfig) -> Result<Self> {
        Self::new(tokenizer, config.chat_template())
    }

    /// Override the padding token.
    pub fn with_pad_token_id(mut self, pad_token_id: u32) -> Self {
        self.pad_token_id = Some(pad_token_id);
        self
    }

    /// The chat template used for rendering.
    pub fn template(&self) -> &ChatTemplate {
        &self.template
    }

    /// The wrapped tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }
}

impl ChatTokenizer for TemplatedTokenizer {
    fn apply_chat_template(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<Vec<u32>> {
        let text = self.template.apply(messages, add_generation_prompt);
        self.tokenizer.encode(&text)
    }

    fn decode(&self, token_id: u32) -> Result<String> {
        self.tokenizer.decode_with_special_tokens(&[token_id])
    }

    fn pad_token_id(&self) -> Option<u32> {
        self.pad_token_id
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(self.eos_token_id)
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn chat_template(&self) -> Option<ChatTemplateKind> {
        Some(self.template.kind())
    }
}
