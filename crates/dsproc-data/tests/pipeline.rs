//! End-to-end: JSONL splits through tokenize, filter, stats, plot and collate.

use dsproc_core::{DatasetConfig, DsprocError, Result};
use dsproc_data::{
    ChatTokenizer, Dataset, DatasetDict, DatasetProcessor, Field, Message,
    PreferenceDatasetProcessor, SftDatasetProcessor, SimpleGenerateCollator,
    SimplePreferenceCollator, TokenLengthStats, DEFAULT_BINS,
};
use std::io::Write;
use std::path::Path;

const VOCAB: [&str; 12] = [
    "<pad>", "<unk>", "</s>", "what", "is", "two", "plus", "four", "five", "hello", "hi", "there",
];
const EOS: u32 = 2;

/// Splits contents on whitespace, one id per known word.
struct WhitespaceTokenizer;

impl ChatTokenizer for WhitespaceTokenizer {
    fn apply_chat_template(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = messages
            .iter()
            .flat_map(|m| m.content.split_whitespace())
            .map(|word| VOCAB.iter().position(|v| *v == word).unwrap_or(1) as u32)
            .collect();
        if !messages.is_empty() && !add_generation_prompt {
            ids.push(EOS);
        }
        Ok(ids)
    }

    fn decode(&self, token_id: u32) -> Result<String> {
        VOCAB
            .get(token_id as usize)
            .map(|s| s.to_string())
            .ok_or_else(|| DsprocError::Tokenizer(format!("unknown id {token_id}")))
    }

    fn pad_token_id(&self) -> Option<u32> {
        Some(0)
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }

    fn fingerprint(&self) -> String {
        "whitespace-v1".into()
    }
}

fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

const TRAIN: [&str; 3] = [
    r#"{"chosen": [{"role": "user", "content": "what is two plus two"}, {"role": "assistant", "content": "four"}], "rejected": [{"role": "user", "content": "what is two plus two"}, {"role": "assistant", "content": "five five"}]}"#,
    r#"{"chosen": [{"role": "user", "content": "hello"}, {"role": "assistant", "content": "hi there"}], "rejected": [{"role": "user", "content": "hello"}, {"role": "assistant", "content": "hi"}]}"#,
    r#"{"chosen": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}], "rejected": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "what"}]}"#,
];

const TEST: [&str; 1] = [
    r#"{"chosen": [{"role": "user", "content": "hello there"}, {"role": "assistant", "content": "hi"}], "rejected": [{"role": "user", "content": "hello there"}, {"role": "assistant", "content": "what"}]}"#,
];

fn load_splits(dir: &Path) -> DatasetDict {
    let train = Dataset::from_jsonl(write_jsonl(dir, "train.jsonl", &TRAIN)).unwrap();
    let test = Dataset::from_jsonl(write_jsonl(dir, "test.jsonl", &TEST)).unwrap();
    DatasetDict::new()
        .with_split("train", train)
        .with_split("test", test)
}

#[test]
fn test_preference_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatasetConfig::builder("pairs")
        .max_token_length(4)
        .build()
        .unwrap();
    let processor = PreferenceDatasetProcessor::new(WhitespaceTokenizer, Some(config));

    let tokenized = processor.tokenize(load_splits(dir.path())).unwrap();
    // Chosen/rejected lengths: train (7, 8), (4, 3), (3, 3); test (4, 4).
    let filtered = processor.filter(tokenized).unwrap();
    assert_eq!(filtered.get("train").unwrap().len(), 2);
    assert_eq!(filtered.get("test").unwrap().len(), 1);

    let stats = processor.get_token_length_stats(&filtered).unwrap();
    let TokenLengthStats::DatasetDict(splits) = &stats else {
        panic!("expected per-split stats, got {stats:?}");
    };
    assert_eq!(splits.len(), 2);
    let train_chosen = stats
        .split(Some("train"))
        .unwrap()
        .get(Field::InputIdsChosen)
        .unwrap();
    assert_eq!(train_chosen.max_token_length, 4);
    assert_eq!(train_chosen.min_token_length, 3);
    assert_eq!(train_chosen.mean_token_length, 3.5);

    let plot = dir.path().join("lengths.svg");
    processor
        .get_token_length_visualization(&filtered, &plot, DEFAULT_BINS)
        .unwrap();
    let svg = std::fs::read_to_string(&plot).unwrap();
    assert!(svg.contains("train split"));
    assert!(svg.contains("input_ids_rejected"));

    let batch = SimplePreferenceCollator::new(0)
        .collate(filtered.get("train").unwrap().rows())
        .unwrap();
    assert_eq!(batch.input_ids_chosen.values, vec![vec![9, 10, 11, 2], vec![10, 9, 2, 0]]);
    assert_eq!(batch.input_ids_rejected.values, vec![vec![9, 10, 2, 0], vec![10, 3, 2, 0]]);

    let prompts = SimpleGenerateCollator::new(0)
        .collate(filtered.get("test").unwrap().rows())
        .unwrap();
    assert_eq!(prompts.input_ids_prompt.values, vec![vec![9, 11]]);
}

#[test]
fn test_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let config = DatasetConfig::builder("pairs")
        .max_prompt_token_length(1)
        .cache_dir(&cache_dir)
        .build()
        .unwrap();
    assert!(config.load_from_cache_file());
    let processor = PreferenceDatasetProcessor::new(WhitespaceTokenizer, Some(config));

    let run = || {
        let tokenized = processor.tokenize(load_splits(dir.path())).unwrap();
        processor.filter(tokenized).unwrap()
    };
    let first = run();
    assert!(std::fs::read_dir(&cache_dir).unwrap().count() > 0);
    let second = run();

    assert_eq!(first, second);
    assert_eq!(first.get("train").unwrap().len(), 2);
    assert_eq!(first.get("test").unwrap().len(), 0);
}

#[test]
fn test_sft_pipeline_in_sanity_mode() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [
        r#"{"messages": [{"role": "user", "content": "hello"}, {"role": "assistant", "content": "hi there"}]}"#,
        r#"{"messages": [{"role": "user", "content": "what is two"}, {"role": "assistant", "content": "two"}]}"#,
        r#"{"messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]}"#,
    ];
    let train = Dataset::from_jsonl(write_jsonl(dir.path(), "sft.jsonl", &rows)).unwrap();
    let config = DatasetConfig::builder("sft")
        .sanity_check(true)
        .sanity_check_max_samples(2)
        .build()
        .unwrap();
    assert_eq!(config.num_proc(), 1);
    let processor = SftDatasetProcessor::new(WhitespaceTokenizer, Some(config));

    let mut dict = DatasetDict::new().with_split("train", train);
    processor.sanity_check_(&mut dict).unwrap();
    let tokenized = processor.tokenize(dict).unwrap();
    let train = tokenized.get("train").unwrap();

    assert_eq!(train.len(), 2);
    assert_eq!(train.get(0).unwrap().tokens(Field::InputIdsPrompt), Some(&[9][..]));
    assert_eq!(train.get(0).unwrap().tokens(Field::InputIds), Some(&[9, 10, 11, 2][..]));
    assert_eq!(train.column_lengths(Field::InputIds).unwrap(), vec![4, 5]);
}
